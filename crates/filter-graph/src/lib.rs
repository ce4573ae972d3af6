//! Clipforge Filter Graph: the edit compiler
//!
//! Translates a declarative [`JobSettings`](clipforge_edit_model::JobSettings)
//! into a single filter-graph description for the media engine:
//! - **Graph:** typed chains with labeled ports and label-closure validation
//! - **Builder:** canvas composition, overlays, text, and subtitle burn-in
//! - **Audio:** the companion simple audio filter chain
//!
//! This crate is pure computation. It performs no I/O and spawns no processes.
//! All inputs are data; all outputs are data.

pub mod audio;
pub mod builder;
pub mod color;
pub mod escape;
pub mod geometry;
pub mod graph;
pub mod overlay;
pub mod text;

pub use audio::audio_filters;
pub use builder::build;
pub use geometry::{resolve_canvas, Canvas};
pub use graph::{CompiledGraph, Filter, FilterGraph, GraphError, GraphInput, Label, Pad};
