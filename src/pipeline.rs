// THEORY:
// The `pipeline` module is the top-level API for one receiver session. It
// wires the three stages together in the order every frame must take:
//
//   FrameSampler (pure, per frame) -> PositionTracker (the only mutable
//   state) -> FeedbackMapper (pure).
//
// Settings arrive as whole snapshots over a watch channel. Each frame takes
// exactly one snapshot at the start of its cycle and uses it for every stage,
// so a settings change published mid-frame is seen in full by the next frame
// and never in part by the current one.
//
// Stopping a session resets the tracker to uninitialised. Nothing else
// carries over between sessions.

use crate::core_modules::frame::FrameBuffer;
use crate::core_modules::frame_sampler::{FrameSampler, FrameSampling};
use crate::core_modules::settings::{DetectionSettings, SettingsHandle};
use crate::core_modules::tracker::{PositionTracker, TrackerConfig, TrackingContext, TrackingStrategy};
use std::sync::Arc;
use tokio::sync::watch;

// Re-export the data a consumer of the pipeline needs.
pub use crate::core_modules::feedback::{AudioDirective, FeedbackDirective, SoundStyle, VisualDirective};
pub use crate::core_modules::frame_sampler::DetectionSample;
pub use crate::core_modules::tracker::{TrackState, TrackerUpdate};

/// Session tuning that does not come from the user-facing settings record.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineConfig {
    pub strategy: TrackingStrategy,
    pub tracker: TrackerConfig,
}

/// Everything the session produced for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Zero-based index of the frame within the session.
    pub frame_index: u64,
    pub sampling: FrameSampling,
    pub update: TrackerUpdate,
    pub directive: FeedbackDirective,
}

impl FrameReport {
    pub fn sample(&self) -> Option<DetectionSample> {
        self.sampling.sample
    }

    pub fn state(&self) -> TrackState {
        self.update.state
    }

    pub fn ratio(&self) -> f64 {
        self.update.ratio
    }
}

/// One detection session: sampler, tracker and feedback mapping for a frame feed.
pub struct ReceiverPipeline {
    settings: watch::Receiver<Arc<DetectionSettings>>,
    tracker: Box<dyn PositionTracker>,
    tilt_beta: Option<f64>,
    frames: u64,
}

impl ReceiverPipeline {
    /// A session that follows every snapshot published on `settings`.
    pub fn new(config: PipelineConfig, settings: &SettingsHandle) -> Self {
        let tracker = config.strategy.build(config.tracker);
        log::info!("Receiver session started ({} tracker)", tracker.name());
        Self { settings: settings.subscribe(), tracker, tilt_beta: None, frames: 0 }
    }

    /// A session with fixed settings.
    pub fn with_settings(config: PipelineConfig, settings: DetectionSettings) -> Self {
        Self::new(config, &SettingsHandle::new(settings))
    }

    /// The snapshot the next cycle will use.
    pub fn settings(&self) -> Arc<DetectionSettings> {
        self.settings.borrow().clone()
    }

    /// Latest device pitch in degrees, or `None` when no sensor reading is available.
    pub fn set_tilt(&mut self, beta: Option<f64>) {
        self.tilt_beta = beta;
    }

    pub fn state(&self) -> TrackState {
        self.tracker.state()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// Runs one frame through every stage.
    pub fn process_frame(&mut self, frame: &FrameBuffer) -> FrameReport {
        // Stage 0: one settings snapshot for the whole cycle
        let settings = self.settings();

        // Stage 1: Sampling
        let sampling = FrameSampler::new(&settings).analyze(frame);

        // Stages 2 and 3
        self.track(sampling, &settings)
    }

    /// Tracker and feedback stages for a frame sampled elsewhere under `settings`.
    pub fn track(&mut self, sampling: FrameSampling, settings: &DetectionSettings) -> FrameReport {
        // Stage 2: Tracking
        let context = TrackingContext::from_settings(settings, self.tilt_beta);
        let update = self.tracker.update(&sampling, &context);

        // Stage 3: Feedback
        let directive = crate::core_modules::feedback::map_update(&update, &settings.sound_style.profile());

        let frame_index = self.frames;
        self.frames += 1;

        log::debug!(
            "frame {}: sample {:?}, {} ratio {:.3}, {:?}",
            frame_index,
            sampling.sample,
            update.state,
            update.ratio,
            directive.audio
        );

        FrameReport { frame_index, sampling, update, directive }
    }

    /// Ends the session: the frame feed stops and the tracker returns to uninitialised.
    pub fn stop(&mut self) {
        self.tracker.reset();
        log::info!("Receiver session stopped after {} frames", self.frames);
        self.frames = 0;
    }
}
