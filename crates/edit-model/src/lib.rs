//! Clipforge Edit Model
//!
//! Defines the core data contracts for Clipforge jobs:
//! - **Settings:** Immutable per-file editing options (geometry, grading,
//!   overlays, subtitles, text, intro/outro, encoder preference)
//! - **Media:** Facts probed from a source file
//! - **Results:** Per-job outcome with an error classification
//!
//! Overlay positions are normalized to the `[0.0, 1.0]` range relative to
//! the output canvas so they survive changes of target resolution.

pub mod media;
pub mod result;
pub mod settings;

pub use media::*;
pub use result::*;
pub use settings::*;
