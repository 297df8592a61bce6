//! Render manifest export: a JSON edit decision list for an external
//! encoder.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{ExportProfile, Exporter};
use crate::error::MediaError;
use crate::time::Time;
use crate::timeline::keyframe::KeyframeTrack;
use crate::timeline::persist::atomic_write;
use crate::timeline::project::Project;
use crate::timeline::types::{Caption, Effect, TransitionRef};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestClip {
    pub source: PathBuf,
    pub kind: String,
    pub start: Time,
    pub duration: Time,
    pub source_in: Time,
    pub source_out: Time,
    pub speed: f64,
    pub volume: f64,
    pub opacity: f64,
    pub effects: Vec<Effect>,
    pub keyframes: Vec<KeyframeTrack>,
    pub transition_in: Option<TransitionRef>,
    pub transition_out: Option<TransitionRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestTrack {
    pub name: String,
    pub kind: String,
    pub clips: Vec<ManifestClip>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderManifest {
    pub project: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub start: Time,
    pub end: Time,
    /// Unmuted tracks in stacking order.
    pub tracks: Vec<ManifestTrack>,
    pub captions: Vec<Caption>,
}

impl RenderManifest {
    pub fn build(project: &Project, profile: &ExportProfile) -> Result<Self, MediaError> {
        let (start, end) = profile.range.unwrap_or((0, project.duration()));
        if start < 0 || end <= start {
            return Err(MediaError::ExportFailed(format!("empty export range {}..{}", start, end)));
        }

        let mut tracks = Vec::new();
        for track in project.tracks().iter().filter(|t| !t.muted) {
            let mut clips = Vec::new();
            for clip in track.clips_in_range(start, end) {
                let asset = project.assets.require(clip.asset_id)?;
                clips.push(ManifestClip {
                    source: asset.source_path.clone(),
                    kind: clip.kind.as_str().to_string(),
                    start: clip.timeline_position,
                    duration: clip.duration,
                    source_in: clip.source_in,
                    source_out: clip.source_out,
                    speed: clip.speed,
                    volume: clip.volume,
                    opacity: clip.opacity,
                    effects: clip.effects.iter().filter(|e| e.enabled).cloned().collect(),
                    keyframes: clip.keyframe_tracks.clone(),
                    transition_in: clip.transition_in.clone(),
                    transition_out: clip.transition_out.clone(),
                });
            }
            tracks.push(ManifestTrack {
                name: track.name.clone(),
                kind: track.kind.as_str().to_string(),
                clips,
            });
        }

        let captions = project
            .caption_tracks
            .first()
            .map(|t| {
                t.captions
                    .iter()
                    .filter(|c| c.start < end && c.end > start)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            project: project.name.clone(),
            width: profile.width,
            height: profile.height,
            frame_rate: profile.frame_rate,
            start,
            end,
            tracks,
            captions,
        })
    }
}

/// Writes a [`RenderManifest`] to the profile's output path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestExporter;

impl Exporter for ManifestExporter {
    fn export(&self, project: &Project, profile: &ExportProfile) -> Result<(), MediaError> {
        let manifest = RenderManifest::build(project, profile)?;
        let json = serde_json::to_vec_pretty(&manifest).map_err(|e| MediaError::ExportFailed(e.to_string()))?;
        atomic_write(&profile.output, &json).map_err(|e| MediaError::ExportFailed(format!("{:#}", e)))?;
        log::info!(
            "wrote render manifest {} ({} tracks)",
            profile.output.display(),
            manifest.tracks.len()
        );
        Ok(())
    }
}
