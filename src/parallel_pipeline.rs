// THEORY:
// Sampling a full camera frame is the expensive part of a cycle, so a live
// session moves it onto a tokio worker task. The worker only ever runs the
// pure `FrameSampler`; the tracker stays on the coordinating side and is
// updated strictly in arrival order when a result comes back.
//
// Backpressure is a queue depth of one. While a frame is being sampled, any
// newer frame is dropped and counted rather than queued, so a slow worker
// can never build up a backlog of stale frames.
//
// Each submitted frame carries the settings snapshot it was taken under, and
// the same snapshot drives tracking for that frame when its result returns.

use crate::core_modules::frame::FrameBuffer;
use crate::core_modules::frame_sampler::{FrameSampler, FrameSampling};
use crate::core_modules::settings::{DetectionSettings, SettingsHandle};
use crate::error::{LaserError, Result};
use crate::pipeline::{FrameReport, PipelineConfig, ReceiverPipeline};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

pub struct SampleTask {
    pub frame: FrameBuffer,
    pub settings: Arc<DetectionSettings>,
    pub result_sender: oneshot::Sender<FrameSampling>,
}

/// A single tokio task that samples frames on request.
pub struct SamplingWorker {
    task_sender: mpsc::UnboundedSender<SampleTask>,
    worker: tokio::task::JoinHandle<()>,
}

impl SamplingWorker {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn() -> Self {
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<SampleTask>();

        let worker = tokio::spawn(async move {
            while let Some(task) = task_receiver.recv().await {
                let sampling = FrameSampler::new(&task.settings).analyze(&task.frame);
                // The requester may have gone away; nothing to do then.
                let _ = task.result_sender.send(sampling);
            }
            log::debug!("sampling worker finished");
        });

        Self { task_sender, worker }
    }

    /// Queues `frame` and returns the receiver its sampling will arrive on.
    pub fn submit(
        &self,
        frame: FrameBuffer,
        settings: Arc<DetectionSettings>,
    ) -> Result<oneshot::Receiver<FrameSampling>> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.task_sender
            .send(SampleTask { frame, settings, result_sender })
            .map_err(|_| LaserError::WorkerUnavailable)?;
        Ok(result_receiver)
    }

    pub async fn sample(&self, frame: FrameBuffer, settings: Arc<DetectionSettings>) -> Result<FrameSampling> {
        self.submit(frame, settings)?.await.map_err(|_| LaserError::WorkerUnavailable)
    }

    /// Closes the task queue and waits for the worker to drain it.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        if let Err(e) = self.worker.await {
            log::warn!("sampling worker ended abnormally: {}", e);
        }
    }
}

struct InFlight {
    reply: oneshot::Receiver<FrameSampling>,
    settings: Arc<DetectionSettings>,
}

/// Totals for one `run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: u64,
    pub dropped: u64,
}

/// A receiver session whose frame sampling happens off the coordinating task.
pub struct ParallelPipeline {
    worker: SamplingWorker,
    session: ReceiverPipeline,
    in_flight: Option<InFlight>,
    tilt: Option<watch::Receiver<Option<f64>>>,
    dropped: u64,
}

impl ParallelPipeline {
    /// Must be called from within a tokio runtime.
    pub fn new(config: PipelineConfig, settings: &SettingsHandle) -> Self {
        Self {
            worker: SamplingWorker::spawn(),
            session: ReceiverPipeline::new(config, settings),
            in_flight: None,
            tilt: None,
            dropped: 0,
        }
    }

    /// Follows device pitch readings published on `tilt`.
    pub fn follow_tilt(&mut self, tilt: watch::Receiver<Option<f64>>) {
        self.tilt = Some(tilt);
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn session(&self) -> &ReceiverPipeline {
        &self.session
    }

    /// Hands `frame` to the worker unless one is already being sampled.
    ///
    /// Returns `Ok(false)` when the frame was dropped.
    pub fn try_submit(&mut self, frame: FrameBuffer) -> Result<bool> {
        if self.in_flight.is_some() {
            self.dropped += 1;
            log::warn!("frame dropped, sampling still pending ({} dropped)", self.dropped);
            return Ok(false);
        }
        let settings = self.session.settings();
        let reply = self.worker.submit(frame, settings.clone())?;
        self.in_flight = Some(InFlight { reply, settings });
        Ok(true)
    }

    /// Waits for the pending frame, if any, and runs it through tracking and feedback.
    pub async fn next_report(&mut self) -> Result<Option<FrameReport>> {
        let Some(in_flight) = self.in_flight.take() else {
            return Ok(None);
        };
        let sampling = in_flight.reply.await.map_err(|_| LaserError::WorkerUnavailable)?;
        Ok(Some(self.complete(sampling, &in_flight.settings)))
    }

    /// Feeds `frames` through the session until the stream ends or `reports` closes,
    /// then stops the session.
    pub async fn run<S>(&mut self, mut frames: S, reports: mpsc::Sender<FrameReport>) -> Result<RunSummary>
    where
        S: Stream<Item = FrameBuffer> + Unpin,
    {
        let dropped_before = self.dropped;
        let outcome = self.feed(&mut frames, &reports).await;

        // The session stops however the feed ended; anything still pending belongs to it.
        self.in_flight = None;
        self.session.stop();

        let processed = outcome?;
        Ok(RunSummary { processed, dropped: self.dropped - dropped_before })
    }

    async fn feed<S>(&mut self, frames: &mut S, reports: &mpsc::Sender<FrameReport>) -> Result<u64>
    where
        S: Stream<Item = FrameBuffer> + Unpin,
    {
        let mut processed = 0u64;

        loop {
            tokio::select! {
                reply = Self::pending_reply(&mut self.in_flight) => {
                    let settings = match self.in_flight.take() {
                        Some(in_flight) => in_flight.settings,
                        None => continue,
                    };
                    let sampling = reply.map_err(|_| LaserError::WorkerUnavailable)?;
                    let report = self.complete(sampling, &settings);
                    processed += 1;
                    if reports.send(report).await.is_err() {
                        log::info!("report consumer closed");
                        break;
                    }
                }
                frame = frames.next() => match frame {
                    Some(frame) => {
                        self.try_submit(frame)?;
                    }
                    None => {
                        if let Some(report) = self.next_report().await? {
                            processed += 1;
                            let _ = reports.send(report).await;
                        }
                        break;
                    }
                },
            }
        }

        Ok(processed)
    }

    /// Stops the worker. Pending work is discarded.
    pub async fn shutdown(self) {
        self.worker.shutdown().await;
    }

    fn complete(&mut self, sampling: FrameSampling, settings: &DetectionSettings) -> FrameReport {
        if let Some(tilt) = &self.tilt {
            self.session.set_tilt(*tilt.borrow());
        }
        self.session.track(sampling, settings)
    }

    async fn pending_reply(
        in_flight: &mut Option<InFlight>,
    ) -> std::result::Result<FrameSampling, oneshot::error::RecvError> {
        match in_flight {
            Some(in_flight) => (&mut in_flight.reply).await,
            None => std::future::pending().await,
        }
    }
}
