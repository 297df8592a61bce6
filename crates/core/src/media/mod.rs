//! Seams to media collaborators: probing, beat detection, transcription and
//! export. The editing engine never decodes media itself; callers inject
//! implementations of these traits.

pub mod beats;
pub mod export;
pub mod jobs;
pub mod probe;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::MediaError;
use crate::time::Time;
use crate::timeline::project::Project;
use crate::timeline::types::{BeatMarker, Caption, MediaAsset};

pub use beats::EnergyBeatDetector;
pub use export::ManifestExporter;
pub use jobs::{Collaborators, JobOutcome, JobRequest, JobRunner, JobTicket};
pub use probe::SymphoniaProbe;

/// Shared flag a long-running collaborator polls between work units.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), MediaError> {
        if self.is_cancelled() {
            return Err(MediaError::Cancelled);
        }
        Ok(())
    }
}

/// Reads a media file's kind and duration.
pub trait AssetProbe: Send + Sync {
    fn probe(&self, path: &Path, cancel: &CancelToken) -> Result<MediaAsset, MediaError>;
}

/// Beats found in an asset, in asset-local time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeatAnalysis {
    pub beats: Vec<BeatMarker>,
    pub tempo_bpm: Option<f64>,
}

pub trait BeatDetector: Send + Sync {
    fn detect(&self, asset: &MediaAsset, cancel: &CancelToken) -> Result<BeatAnalysis, MediaError>;
}

/// Speech-to-text. Captions are in asset-local time.
pub trait Transcriber: Send + Sync {
    fn transcribe(
        &self,
        asset: &MediaAsset,
        language: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<Caption>, MediaError>;
}

/// Output settings handed to an [`Exporter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportProfile {
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// Limit the export to `[start, end)`; the whole project when `None`.
    #[serde(default)]
    pub range: Option<(Time, Time)>,
}

impl ExportProfile {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            width: 1920,
            height: 1080,
            frame_rate: 30.0,
            range: None,
        }
    }
}

/// Renders or hands off a validated project snapshot.
pub trait Exporter {
    fn export(&self, project: &Project, profile: &ExportProfile) -> Result<(), MediaError>;
}
