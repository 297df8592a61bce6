//! Background media jobs.
//!
//! A dedicated worker thread runs probes, beat detection and transcription
//! so the editing thread never blocks on media. Results come back as plain
//! [`JobOutcome`] values that the caller applies through the session.

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::{AssetProbe, BeatAnalysis, BeatDetector, CancelToken, Transcriber};
use crate::error::MediaError;
use crate::time::Time;
use crate::timeline::types::{Caption, MediaAsset};

/// Work the runner can do.
#[derive(Debug, Clone)]
pub enum JobRequest {
    Import { path: PathBuf },
    /// Detect beats in `asset`; beats land at `offset` on the timeline.
    DetectBeats { asset: MediaAsset, offset: Time },
    Transcribe { asset: MediaAsset, language: String, offset: Time },
}

#[derive(Debug)]
pub enum JobOutcome {
    Imported(MediaAsset),
    Beats { analysis: BeatAnalysis, offset: Time },
    Captions { language: String, captions: Vec<Caption>, offset: Time },
    Cancelled,
    Failed(MediaError),
}

/// The collaborators a runner hands work to.
#[derive(Clone)]
pub struct Collaborators {
    pub probe: Arc<dyn AssetProbe>,
    pub detector: Arc<dyn BeatDetector>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
}

impl Collaborators {
    /// Symphonia probing and energy beat detection; no transcriber.
    pub fn with_defaults() -> Self {
        Self {
            probe: Arc::new(super::SymphoniaProbe),
            detector: Arc::new(super::EnergyBeatDetector::default()),
            transcriber: None,
        }
    }

    fn run(&self, request: JobRequest, cancel: &CancelToken) -> Result<JobOutcome, MediaError> {
        cancel.check()?;
        match request {
            JobRequest::Import { path } => Ok(JobOutcome::Imported(self.probe.probe(&path, cancel)?)),
            JobRequest::DetectBeats { asset, offset } => {
                let analysis = self.detector.detect(&asset, cancel)?;
                Ok(JobOutcome::Beats { analysis, offset })
            }
            JobRequest::Transcribe {
                asset,
                language,
                offset,
            } => {
                let transcriber = self
                    .transcriber
                    .as_ref()
                    .ok_or_else(|| MediaError::TranscriptionFailed("no transcriber configured".into()))?;
                let captions = transcriber.transcribe(&asset, &language, cancel)?;
                Ok(JobOutcome::Captions {
                    language,
                    captions,
                    offset,
                })
            }
        }
    }
}

/// Handle to a submitted job.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub id: u64,
    cancel: CancelToken,
}

impl JobTicket {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

struct Envelope {
    id: u64,
    request: JobRequest,
    cancel: CancelToken,
}

/// Owns the worker thread. Dropping the runner stops accepting work and
/// waits for the job in progress.
pub struct JobRunner {
    job_tx: Option<mpsc::Sender<Envelope>>,
    outcome_rx: mpsc::Receiver<(u64, JobOutcome)>,
    worker: Option<JoinHandle<()>>,
    next_id: u64,
}

impl JobRunner {
    pub fn spawn(collaborators: Collaborators) -> std::io::Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Envelope>();
        let (outcome_tx, outcome_rx) = mpsc::channel();

        let worker = std::thread::Builder::new()
            .name("media-jobs".into())
            .spawn(move || worker_loop(job_rx, outcome_tx, collaborators))?;

        Ok(Self {
            job_tx: Some(job_tx),
            outcome_rx,
            worker: Some(worker),
            next_id: 0,
        })
    }

    /// Queue a job. Returns `None` if the worker has stopped.
    pub fn submit(&mut self, request: JobRequest) -> Option<JobTicket> {
        let id = self.next_id;
        self.next_id += 1;
        let cancel = CancelToken::new();
        let envelope = Envelope {
            id,
            request,
            cancel: cancel.clone(),
        };
        match self.job_tx.as_ref()?.send(envelope) {
            Ok(()) => Some(JobTicket { id, cancel }),
            Err(_) => {
                log::error!("Media job thread is not running (channel closed)");
                None
            }
        }
    }

    /// A finished job, if one is ready.
    pub fn try_recv(&self) -> Option<(u64, JobOutcome)> {
        self.outcome_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for a finished job.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<(u64, JobOutcome)> {
        self.outcome_rx.recv_timeout(timeout).ok()
    }
}

impl Drop for JobRunner {
    fn drop(&mut self) {
        drop(self.job_tx.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Media job thread panicked");
            }
        }
    }
}

fn worker_loop(
    rx: mpsc::Receiver<Envelope>,
    tx: mpsc::Sender<(u64, JobOutcome)>,
    collaborators: Collaborators,
) {
    while let Ok(Envelope { id, request, cancel }) = rx.recv() {
        let outcome = match collaborators.run(request, &cancel) {
            _ if cancel.is_cancelled() => JobOutcome::Cancelled,
            Ok(outcome) => outcome,
            Err(MediaError::Cancelled) => JobOutcome::Cancelled,
            Err(e) => {
                log::warn!("media job {} failed: {}", id, e);
                JobOutcome::Failed(e)
            }
        };
        if tx.send((id, outcome)).is_err() {
            break;
        }
    }
    log::debug!("media job thread exiting");
}
