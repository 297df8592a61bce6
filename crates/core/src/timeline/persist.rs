//! Project documents: versioned JSON on disk.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::keyframe::KeyframeTrack;
use super::project::Project;
use super::track::{TimelineTrack, TrackKind};
use super::types::{AssetRegistry, BeatMarker, CaptionTrack, MediaAsset, TimelineClip, TimelineMarker, TrackId};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDocument {
    pub id: TrackId,
    pub kind: TrackKind,
    pub name: String,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub locked: bool,
    /// Clips in timeline order.
    pub clips: Vec<TimelineClip>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub format_version: u32,
    pub name: String,
    pub assets: Vec<MediaAsset>,
    pub tracks: Vec<TrackDocument>,
    #[serde(default)]
    pub markers: Vec<TimelineMarker>,
    #[serde(default)]
    pub beat_markers: Vec<BeatMarker>,
    #[serde(default)]
    pub tempo_bpm: Option<f64>,
    #[serde(default)]
    pub caption_tracks: Vec<CaptionTrack>,
}

impl ProjectDocument {
    pub fn from_project(project: &Project) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            name: project.name.clone(),
            assets: project.assets.iter().cloned().collect(),
            tracks: project
                .tracks()
                .iter()
                .map(|t| TrackDocument {
                    id: t.id,
                    kind: t.kind,
                    name: t.name.clone(),
                    muted: t.muted,
                    locked: t.locked,
                    clips: t.clips().cloned().collect(),
                })
                .collect(),
            markers: project.markers.clone(),
            beat_markers: project.beat_markers().to_vec(),
            tempo_bpm: project.tempo_bpm,
            caption_tracks: project.caption_tracks.clone(),
        }
    }

    /// Rebuild the model. Keyframes are re-sorted and the result must
    /// satisfy every track invariant.
    pub fn into_project(self) -> Result<Project> {
        if self.format_version != FORMAT_VERSION {
            bail!(
                "Unsupported project format version {} (expected {})",
                self.format_version,
                FORMAT_VERSION
            );
        }
        let mut assets = AssetRegistry::new();
        for asset in self.assets {
            assets.insert(asset);
        }
        let tracks = self
            .tracks
            .into_iter()
            .map(|doc| {
                let clips = doc.clips.into_iter().map(normalize_keyframes).collect();
                TimelineTrack::from_parts(doc.id, doc.kind, doc.name, doc.muted, doc.locked, clips)
            })
            .collect();
        let caption_tracks = self
            .caption_tracks
            .into_iter()
            .map(|mut t| {
                t.captions.sort_by_key(|c| (c.start, c.end));
                t
            })
            .collect();
        let project = Project::from_parts(
            self.name,
            assets,
            tracks,
            self.markers,
            self.beat_markers,
            self.tempo_bpm,
            caption_tracks,
        );
        project.check_invariants().context("Project violates timeline invariants")?;
        Ok(project)
    }
}

fn normalize_keyframes(mut clip: TimelineClip) -> TimelineClip {
    clip.keyframe_tracks = clip
        .keyframe_tracks
        .into_iter()
        .map(|t| KeyframeTrack::from_keyframes(t.property.clone(), t.keyframes().to_vec()))
        .filter(|t| !t.is_empty())
        .collect();
    clip
}

pub fn to_json(project: &Project) -> Result<String> {
    serde_json::to_string_pretty(&ProjectDocument::from_project(project)).context("Failed to serialize project")
}

pub fn from_json(json: &str) -> Result<Project> {
    let doc: ProjectDocument = serde_json::from_str(json).context("Invalid project document")?;
    doc.into_project()
}

/// Atomically write data to a file via temp file + rename.
pub(crate) fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let tmp_path = target.with_extension("tmp");
    std::fs::write(&tmp_path, data).with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, target)
        .with_context(|| format!("Failed to move {} into place", tmp_path.display()))?;
    Ok(())
}

pub fn save_project(project: &Project, path: &Path) -> Result<()> {
    let json = to_json(project)?;
    atomic_write(path, json.as_bytes())?;
    log::info!("Saved project '{}' to {}", project.name, path.display());
    Ok(())
}

pub fn load_project(path: &Path) -> Result<Project> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read project: {}", path.display()))?;
    let project = from_json(&json).with_context(|| format!("Failed to load project: {}", path.display()))?;
    log::info!(
        "Loaded project '{}' ({} tracks, {} assets)",
        project.name,
        project.tracks().len(),
        project.assets.len()
    );
    Ok(project)
}
