//! Editor tunables, loadable from a JSON settings file.
//!
//! Lookup order: an explicit path, then the `SPLICER_CONFIG` environment
//! variable, then built-in defaults. Missing fields fall back to defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::time::{self, Time};
use crate::timeline::ops::beat_sync::BeatSyncOptions;
use crate::timeline::ops::ripple::RippleScope;
use crate::timeline::persist::atomic_write;

pub const CONFIG_ENV_VAR: &str = "SPLICER_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    /// Project frame rate, used for the default minimum clip duration.
    pub frame_rate: f64,
    /// Shortest duration a slide/trim/beat-sync may leave a clip with.
    pub min_clip_duration: Time,
    /// Whether ripple edits shift only the target track or every track.
    pub ripple_scope: RippleScope,
    /// Maximum undo entries kept per track.
    pub history_limit: usize,
    pub beat_sync: BeatSyncOptions,
}

impl Default for EditorSettings {
    fn default() -> Self {
        let frame_rate = 30.0;
        Self {
            frame_rate,
            min_clip_duration: time::frame_duration(frame_rate),
            ripple_scope: RippleScope::Track,
            history_limit: 200,
            beat_sync: BeatSyncOptions::default(),
        }
    }
}

impl EditorSettings {
    /// Settings file named by `SPLICER_CONFIG`, if set.
    pub fn env_path() -> Option<PathBuf> {
        std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from)
    }

    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: Self = serde_json::from_str(&data)
            .with_context(|| format!("Invalid settings file: {}", path.display()))?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Resolve settings: `explicit` must exist if given; the env path is
    /// optional and a missing file there yields defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::env_path() {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) => {
                log::warn!(
                    "{} points at missing file {}, using defaults",
                    CONFIG_ENV_VAR,
                    path.display()
                );
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        atomic_write(path, json.as_bytes())
            .with_context(|| format!("Failed to write settings: {}", path.display()))
    }
}
