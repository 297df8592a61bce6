//! Error types for timeline edits and media collaborators.

use std::path::PathBuf;

use thiserror::Error;

use crate::time::Time;
use crate::timeline::types::{AssetId, ClipId, TrackId};

/// Why an edit was rejected. A rejected edit leaves the project unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("split time {time} is not strictly inside clip {clip}")]
    InvalidSplitPosition { clip: ClipId, time: Time },
    #[error("clip {clip} would overlap another clip on track {track}")]
    OverlapViolation { track: TrackId, clip: ClipId },
    #[error("clip {clip} source window would leave its asset bounds")]
    OutOfSourceRange { clip: ClipId },
    #[error("operation needs a target clip or track")]
    EmptySelection,
    #[error("clip {clip} duration would fall below the minimum")]
    DurationUnderflow { clip: ClipId },
    #[error("clip not found: {0}")]
    ClipNotFound(ClipId),
    #[error("track not found: {0}")]
    TrackNotFound(TrackId),
    #[error("asset not found: {0}")]
    AssetNotFound(AssetId),
    #[error("asset {asset} is still referenced by {clips} clip(s)")]
    AssetInUse { asset: AssetId, clips: usize },
    #[error("clips {left} and {right} are not adjacent")]
    NotAdjacent { left: ClipId, right: ClipId },
    #[error("track {0} is locked")]
    TrackLocked(TrackId),
    #[error("a {clip} clip cannot be placed on a {track} track")]
    KindMismatch { clip: &'static str, track: &'static str },
    #[error("keyframe time {time} is outside clip {clip}")]
    InvalidKeyframeTime { clip: ClipId, time: Time },
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("clip {clip} would start before timeline zero")]
    NegativePosition { clip: ClipId },
    #[error("invalid range: start {start}, length {length}")]
    InvalidRange { start: Time, length: Time },
    #[error("clip {clip} {field} must be a finite number")]
    NonFiniteValue { clip: ClipId, field: &'static str },
}

pub type Result<T> = std::result::Result<T, EditError>;

/// Failure reported by an external collaborator (import, detection,
/// transcription, export). Never partially applied to a project.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("unreadable media {path}: {reason}")]
    UnreadableMedia { path: PathBuf, reason: String },
    #[error("beat detection failed: {0}")]
    DetectionFailed(String),
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),
    #[error("export failed: {0}")]
    ExportFailed(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("project is not exportable: {0}")]
    InvalidProject(#[from] EditError),
}
