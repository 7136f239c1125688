//! Off-thread pose estimation.

use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

use ar_anchor_core::{MarkerSet, PoseSample, VideoFrame};

use crate::collaborators::PoseEstimator;
use crate::error::{InitError, ReleaseError};

const WORKER_THREAD_NAME: &str = "ar-pose-worker";

struct Worker {
    jobs: Sender<VideoFrame>,
    results: Receiver<Vec<PoseSample>>,
    thread: JoinHandle<Box<dyn PoseEstimator>>,
}

/// Runs any estimator on its own thread so `detect` never blocks the render
/// loop.
///
/// At most one frame is queued; frames arriving while the worker is busy are
/// dropped. `detect` returns the newest finished result, or `None` when
/// nothing finished since the last call.
pub struct WorkerEstimator {
    /// Present while no worker is running; the worker owns it otherwise.
    inner: Option<Box<dyn PoseEstimator>>,
    worker: Option<Worker>,
}

impl WorkerEstimator {
    pub fn new(inner: Box<dyn PoseEstimator>) -> Self {
        Self {
            inner: Some(inner),
            worker: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    /// Stop the worker and take the estimator back.
    fn shutdown(&mut self) -> Result<(), ReleaseError> {
        let Some(Worker {
            jobs,
            results,
            thread,
        }) = self.worker.take()
        else {
            return Ok(());
        };
        // Both ends gone: an idle worker sees no more jobs, a busy one fails to
        // deliver its result.
        drop(jobs);
        drop(results);
        match thread.join() {
            Ok(inner) => {
                self.inner = Some(inner);
                Ok(())
            }
            Err(_) => Err(ReleaseError::new(
                "pose estimator",
                "estimator worker thread panicked",
            )),
        }
    }
}

#[async_trait]
impl PoseEstimator for WorkerEstimator {
    async fn init(&mut self, markers: &MarkerSet) -> Result<(), InitError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let Some(inner) = self.inner.as_mut() else {
            return Err(InitError::new("estimator lost by an earlier worker"));
        };
        inner.init(markers).await?;

        let Some(mut inner) = self.inner.take() else {
            return Err(InitError::new("estimator lost by an earlier worker"));
        };
        let (jobs, job_rx) = bounded::<VideoFrame>(1);
        let (result_tx, results) = bounded::<Vec<PoseSample>>(1);
        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn(move || {
                for frame in job_rx.iter() {
                    let Some(samples) = inner.detect(&frame) else {
                        continue;
                    };
                    if result_tx.send(samples).is_err() {
                        break;
                    }
                }
                inner
            })
            .map_err(|e| InitError::new(format!("failed to spawn estimator worker: {e}")))?;

        self.worker = Some(Worker {
            jobs,
            results,
            thread,
        });
        log::debug!("pose estimator worker started");
        Ok(())
    }

    fn detect(&mut self, frame: &VideoFrame) -> Option<Vec<PoseSample>> {
        let worker = self.worker.as_ref()?;
        let finished = match worker.results.try_recv() {
            Ok(samples) => Some(samples),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log::warn!("pose estimator worker exited");
                None
            }
        };
        // A busy worker drops the frame; the next tick offers a newer one.
        if let Err(TrySendError::Disconnected(_)) = worker.jobs.try_send(frame.clone()) {
            log::debug!("frame dropped, estimator worker is gone");
        }
        finished
    }

    fn release(&mut self) -> Result<(), ReleaseError> {
        if self.worker.is_none() {
            return Ok(());
        }
        self.shutdown()?;
        log::debug!("pose estimator worker stopped");
        match self.inner.as_mut() {
            Some(inner) => inner.release(),
            None => Ok(()),
        }
    }
}

impl Drop for WorkerEstimator {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("{err}");
        }
    }
}
