//! Splicer core: non-linear timeline model, edit operations, undo history,
//! project persistence and the collaborator seams for media work.

pub mod error;
pub mod media;
pub mod settings;
pub mod time;
pub mod timeline;

pub use error::{EditError, MediaError};
pub use settings::EditorSettings;
pub use time::Time;
