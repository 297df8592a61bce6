//! Timeline data model: assets, clips, markers, captions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::keyframe::{AnimatedProperty, KeyframeTrack};
use crate::error::{EditError, Result};
use crate::time::{self, Time};

pub type AssetId = Uuid;
pub type ClipId = Uuid;
pub type TrackId = Uuid;
pub type MarkerId = Uuid;

/// Default length given to a still image dropped on the timeline.
pub const DEFAULT_STILL_DURATION: Time = 5 * time::MICROS_PER_SECOND;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Video,
    Audio,
    Image,
}

impl AssetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Video => "video",
            AssetKind::Audio => "audio",
            AssetKind::Image => "image",
        }
    }

    /// Whether the asset has an intrinsic duration that bounds source points.
    pub fn is_time_based(self) -> bool {
        !matches!(self, AssetKind::Image)
    }
}

/// Imported media. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: AssetId,
    pub kind: AssetKind,
    pub source_path: PathBuf,
    /// Zero for images.
    pub probed_duration: Time,
}

impl MediaAsset {
    pub fn new(kind: AssetKind, source_path: impl Into<PathBuf>, probed_duration: Time) -> Self {
        let probed_duration = if kind.is_time_based() { probed_duration.max(0) } else { 0 };
        Self {
            id: Uuid::new_v4(),
            kind,
            source_path: source_path.into(),
            probed_duration,
        }
    }

    pub fn display_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// Source-window limits for clips, looked up by asset.
pub trait SourceBounds {
    /// Upper bound for `source_out`, or `None` when the asset is unbounded (stills).
    fn source_limit(&self, asset: AssetId) -> Option<Time>;
}

/// Canonical record of imported media.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetRegistry {
    assets: BTreeMap<AssetId, MediaAsset>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: MediaAsset) -> AssetId {
        let id = asset.id;
        self.assets.insert(id, asset);
        id
    }

    pub fn get(&self, id: AssetId) -> Option<&MediaAsset> {
        self.assets.get(&id)
    }

    pub fn require(&self, id: AssetId) -> Result<&MediaAsset> {
        self.get(id).ok_or(EditError::AssetNotFound(id))
    }

    pub fn find_by_path(&self, path: &Path) -> Option<&MediaAsset> {
        self.assets.values().find(|a| a.source_path == path)
    }

    /// Remove without reference checks; callers go through the project.
    pub(crate) fn remove(&mut self, id: AssetId) -> Option<MediaAsset> {
        self.assets.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MediaAsset> {
        self.assets.values()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl SourceBounds for AssetRegistry {
    fn source_limit(&self, asset: AssetId) -> Option<Time> {
        self.get(asset)
            .filter(|a| a.kind.is_time_based())
            .map(|a| a.probed_duration)
    }
}

/// Primary color correction block, owned by a clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorGrading {
    pub exposure: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub temperature: f64,
    pub tint: f64,
    /// Optional LUT file applied after the primary controls.
    pub lut: Option<PathBuf>,
}

impl Default for ColorGrading {
    fn default() -> Self {
        Self {
            exposure: 0.0,
            contrast: 1.0,
            saturation: 1.0,
            temperature: 0.0,
            tint: 0.0,
            lut: None,
        }
    }
}

impl ColorGrading {
    pub fn is_finite(&self) -> bool {
        [self.exposure, self.contrast, self.saturation, self.temperature, self.tint]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// A named effect with numeric parameters, applied in list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Effect {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
            enabled: true,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// One end of a blend between two abutting clips. Both ends share `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRef {
    pub id: Uuid,
    /// Blend style understood by the renderer ("crossfade", "wipe_left", ...).
    pub kind: String,
    pub duration: Time,
}

/// A placed window into one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineClip {
    pub id: ClipId,
    pub asset_id: AssetId,
    pub kind: AssetKind,
    #[serde(default)]
    pub label: String,
    pub timeline_position: Time,
    pub duration: Time,
    pub source_in: Time,
    pub source_out: Time,
    pub speed: f64,
    pub volume: f64,
    pub opacity: f64,
    #[serde(default)]
    pub color_grading: Option<ColorGrading>,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub keyframe_tracks: Vec<KeyframeTrack>,
    #[serde(default)]
    pub transition_in: Option<TransitionRef>,
    #[serde(default)]
    pub transition_out: Option<TransitionRef>,
}

impl TimelineClip {
    /// Create a clip showing an asset from its start.
    ///
    /// `duration` defaults to the whole asset (or [`DEFAULT_STILL_DURATION`]
    /// for images) and is capped at the probed duration for time-based media.
    pub fn from_asset(asset: &MediaAsset, position: Time, duration: Option<Time>) -> Self {
        let duration = match (asset.kind.is_time_based(), duration) {
            (true, Some(d)) => d.min(asset.probed_duration),
            (true, None) => asset.probed_duration,
            (false, Some(d)) => d,
            (false, None) => DEFAULT_STILL_DURATION,
        };
        let source_out = if asset.kind.is_time_based() { duration } else { 0 };
        Self {
            id: Uuid::new_v4(),
            asset_id: asset.id,
            kind: asset.kind,
            label: asset.display_name(),
            timeline_position: position,
            duration,
            source_in: 0,
            source_out,
            speed: 1.0,
            volume: 1.0,
            opacity: 1.0,
            color_grading: None,
            effects: Vec::new(),
            keyframe_tracks: Vec::new(),
            transition_in: None,
            transition_out: None,
        }
    }

    /// Start the clip at `source_in` in its asset instead of the beginning.
    pub fn with_source_in(mut self, source_in: Time) -> Self {
        if self.is_time_based() {
            self.source_in = source_in;
            self.source_out = source_in + self.duration;
        }
        self
    }

    /// Exclusive end on the timeline.
    pub fn end(&self) -> Time {
        self.timeline_position + self.duration
    }

    pub fn is_time_based(&self) -> bool {
        self.kind.is_time_based()
    }

    /// Half-open containment: `[position, end)`.
    pub fn contains(&self, t: Time) -> bool {
        t >= self.timeline_position && t < self.end()
    }

    pub fn overlaps(&self, other: &TimelineClip) -> bool {
        self.timeline_position < other.end() && other.timeline_position < self.end()
    }

    /// Whether the clip intersects the half-open range `[start, end)`.
    pub fn intersects(&self, start: Time, end: Time) -> bool {
        self.timeline_position < end && start < self.end()
    }

    /// Clip-local time for an absolute timeline time.
    pub fn local_time(&self, t: Time) -> Time {
        t - self.timeline_position
    }

    /// Source time shown at timeline time `t`, if `t` is inside the clip.
    pub fn source_time_at(&self, t: Time) -> Option<Time> {
        if !self.contains(t) {
            return None;
        }
        Some(self.source_in + self.local_time(t))
    }

    pub fn keyframe_track(&self, property: &AnimatedProperty) -> Option<&KeyframeTrack> {
        self.keyframe_tracks.iter().find(|t| &t.property == property)
    }

    /// The keyframe track for `property`, created empty if missing.
    pub fn keyframe_track_mut(&mut self, property: &AnimatedProperty) -> &mut KeyframeTrack {
        let idx = match self.keyframe_tracks.iter().position(|t| &t.property == property) {
            Some(idx) => idx,
            None => {
                self.keyframe_tracks.push(KeyframeTrack::new(property.clone()));
                self.keyframe_tracks.len() - 1
            }
        };
        &mut self.keyframe_tracks[idx]
    }

    /// Move the start edge, keeping the end and the source alignment.
    /// Keyframes stay attached to the content they animated.
    pub(crate) fn set_start_keep_end(&mut self, new_start: Time) {
        let delta = new_start - self.timeline_position;
        self.timeline_position = new_start;
        self.duration -= delta;
        if self.is_time_based() {
            self.source_in += delta;
        }
        self.shift_keyframes(-delta);
        self.fit_keyframes_to_duration();
    }

    /// Move the end edge, keeping the start.
    pub(crate) fn set_end(&mut self, new_end: Time) {
        self.duration = new_end - self.timeline_position;
        if self.is_time_based() {
            self.source_out = self.source_in + self.duration;
        }
        self.fit_keyframes_to_duration();
    }

    /// First numeric field that is NaN or infinite, if any.
    pub(crate) fn non_finite_field(&self) -> Option<&'static str> {
        let scalars = [("speed", self.speed), ("volume", self.volume), ("opacity", self.opacity)];
        if let Some((field, _)) = scalars.iter().find(|(_, v)| !v.is_finite()) {
            return Some(*field);
        }
        if self.color_grading.as_ref().is_some_and(|g| !g.is_finite()) {
            return Some("color grading");
        }
        if self.effects.iter().any(|e| e.params.values().any(|v| !v.is_finite())) {
            return Some("effect parameter");
        }
        if self
            .keyframe_tracks
            .iter()
            .any(|t| t.keyframes().iter().any(|k| !k.value.is_finite()))
        {
            return Some("keyframe value");
        }
        None
    }

    /// Check the per-clip invariants against the asset bounds.
    pub fn validate(&self, bounds: &dyn SourceBounds) -> Result<()> {
        if self.duration <= 0 {
            return Err(EditError::DurationUnderflow { clip: self.id });
        }
        if self.timeline_position < 0 {
            return Err(EditError::NegativePosition { clip: self.id });
        }
        if let Some(field) = self.non_finite_field() {
            return Err(EditError::NonFiniteValue { clip: self.id, field });
        }
        if self.is_time_based() {
            let in_range = self.source_in >= 0
                && self.source_in <= self.source_out
                && self.source_out - self.source_in == self.duration;
            let within_asset = bounds
                .source_limit(self.asset_id)
                .map_or(true, |limit| self.source_out <= limit);
            if !in_range || !within_asset {
                return Err(EditError::OutOfSourceRange { clip: self.id });
            }
        }
        Ok(())
    }
}

/// A detected beat in timeline time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatMarker {
    pub timestamp: Time,
    /// Relative onset strength, normally in `[0, 1]`.
    pub strength: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Standard,
    Chapter,
    Todo,
}

/// A named point on the timeline. Annotation only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineMarker {
    pub id: MarkerId,
    pub position: Time,
    pub name: String,
    pub kind: MarkerKind,
    #[serde(default)]
    pub color: Option<String>,
}

impl TimelineMarker {
    pub fn new(position: Time, name: impl Into<String>, kind: MarkerKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            position,
            name: name.into(),
            kind,
            color: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub id: Uuid,
    pub start: Time,
    pub end: Time,
    pub text: String,
}

impl Caption {
    pub fn new(start: Time, end: Time, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            start,
            end,
            text: text.into(),
        }
    }
}

/// Captions for one language, ordered by start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub id: Uuid,
    pub language: String,
    pub captions: Vec<Caption>,
}

impl CaptionTrack {
    pub fn new(language: impl Into<String>, mut captions: Vec<Caption>) -> Self {
        captions.sort_by_key(|c| (c.start, c.end));
        Self {
            id: Uuid::new_v4(),
            language: language.into(),
            captions,
        }
    }

    /// Captions visible at `t`.
    pub fn active_at(&self, t: Time) -> impl Iterator<Item = &Caption> {
        self.captions.iter().filter(move |c| c.start <= t && t < c.end)
    }
}
