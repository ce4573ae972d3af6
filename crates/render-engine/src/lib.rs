//! Clipforge Render Engine
//!
//! Drives the external media engine for edit jobs: probing sources,
//! supervising the render process, normalizing and concatenating
//! segments, and running batches of jobs on a bounded worker pool.
//!
//! # Pipeline Architecture
//!
//! ```text
//! input.mp4 ── probe ── build graph ── supervise render ──┐
//!                  (advisory)      (GPU, then CPU once)   │
//!                                                         ▼
//!                                               output.mp4 (main)
//!                                                         │
//! intro.mp4 ── normalize ──┐                              │
//!                          ├─ main ── normalize ──────────┤
//! outro.mp4 ── normalize ──┤                              │
//! text card ── render ─────┘                              ▼
//!                                          concat (copy, backup/restore)
//!                                                         │
//!                                                         ▼
//!                                                    output.mp4
//! ```

pub mod batch;
pub mod concat;
pub mod engine;
pub mod hooks;
pub mod job;
pub mod normalize;
pub mod probe;
pub mod supervisor;

pub use batch::{default_output_path, BatchHooks, BatchJob, BatchScheduler, BatchSummary};
pub use concat::ConcatStage;
pub use engine::{EncoderProfile, Engine};
pub use hooks::{JobHooks, ProgressSlot};
pub use job::{sanitize_assets, JobRequest, JobRunner, SharedSegments};
pub use probe::{probe, probe_with_hooks, ProbeError};
pub use supervisor::{supervise, RunOutcome, RunReport};
