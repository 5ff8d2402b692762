// THEORY:
// This file is the entry point for the `laser_receiver` library crate.
//
// The crate is the signal-processing core of a phone-camera laser-level
// receiver. Camera frames go in; a stable "is the laser above, below, or on
// the reference line, and how far" judgement comes out, along with the
// audio/visual feedback a renderer should produce for it.
//
// `pipeline::ReceiverPipeline` is the one-session, one-thread interface and
// `parallel_pipeline::ParallelPipeline` moves frame sampling onto a tokio
// worker while keeping tracker updates on the coordinating side. Everything
// they compose lives in `core_modules` and can be used on its own.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use error::{LaserError, Result};
pub use pipeline::{FrameReport, PipelineConfig, ReceiverPipeline};
