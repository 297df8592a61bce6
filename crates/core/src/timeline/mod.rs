//! The timeline model and everything that edits it.

pub mod history;
pub mod keyframe;
pub mod ops;
pub mod persist;
pub mod project;
pub mod session;
pub mod track;
pub mod types;

pub use history::{EditHistory, TrackRevision};
pub use keyframe::{AnimatedProperty, Easing, Keyframe, KeyframeTrack, TransformSample};
pub use persist::{load_project, save_project, ProjectDocument, FORMAT_VERSION};
pub use project::Project;
pub use session::{ClipUpdate, EditSession};
pub use track::{TimelineTrack, TrackKind};
pub use types::{
    AssetId, AssetKind, AssetRegistry, BeatMarker, Caption, CaptionTrack, ClipId, ColorGrading, Effect,
    MarkerId, MarkerKind, MediaAsset, TimelineClip, TimelineMarker, TrackId, TransitionRef,
};
