//! The project aggregate: assets, tracks, markers, beats and captions.

use std::path::Path;

use super::track::{TimelineTrack, TrackKind};
use super::types::{
    AssetId, AssetRegistry, BeatMarker, CaptionTrack, ClipId, MarkerId, MediaAsset, TimelineClip,
    TimelineMarker, TrackId,
};
use crate::error::{EditError, Result};
use crate::time::Time;

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub name: String,
    pub assets: AssetRegistry,
    tracks: Vec<TimelineTrack>,
    pub markers: Vec<TimelineMarker>,
    beat_markers: Vec<BeatMarker>,
    pub tempo_bpm: Option<f64>,
    pub caption_tracks: Vec<CaptionTrack>,
    duration: Time,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assets: AssetRegistry::new(),
            tracks: Vec::new(),
            markers: Vec::new(),
            beat_markers: Vec::new(),
            tempo_bpm: None,
            caption_tracks: Vec::new(),
            duration: 0,
        }
    }

    /// A project with one video track ("V1") and one audio track ("A1").
    pub fn with_default_tracks(name: impl Into<String>) -> Self {
        let mut project = Self::new(name);
        project.add_track(TrackKind::Video, "V1");
        project.add_track(TrackKind::Audio, "A1");
        project
    }

    /// Rebuild a project from loaded parts and recompute derived state.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        name: String,
        assets: AssetRegistry,
        tracks: Vec<TimelineTrack>,
        markers: Vec<TimelineMarker>,
        beat_markers: Vec<BeatMarker>,
        tempo_bpm: Option<f64>,
        caption_tracks: Vec<CaptionTrack>,
    ) -> Self {
        let mut project = Self {
            name,
            assets,
            tracks,
            markers,
            beat_markers,
            tempo_bpm,
            caption_tracks,
            duration: 0,
        };
        project.markers.sort_by_key(|m| m.position);
        project.beat_markers.sort_by_key(|b| b.timestamp);
        project.recompute_derived();
        project
    }

    /// End of the last clip on any track.
    pub fn duration(&self) -> Time {
        self.duration
    }

    pub fn recompute_derived(&mut self) {
        self.duration = self.tracks.iter().map(TimelineTrack::end).max().unwrap_or(0);
    }

    pub fn tracks(&self) -> &[TimelineTrack] {
        &self.tracks
    }

    pub(crate) fn tracks_mut(&mut self) -> &mut [TimelineTrack] {
        &mut self.tracks
    }

    pub fn track(&self, id: TrackId) -> Result<&TimelineTrack> {
        self.tracks
            .iter()
            .find(|t| t.id == id)
            .ok_or(EditError::TrackNotFound(id))
    }

    pub(crate) fn track_mut(&mut self, id: TrackId) -> Result<&mut TimelineTrack> {
        self.tracks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(EditError::TrackNotFound(id))
    }

    /// Split borrow of one track and the asset registry.
    pub(crate) fn track_and_assets(&mut self, id: TrackId) -> Result<(&mut TimelineTrack, &AssetRegistry)> {
        let track = self
            .tracks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(EditError::TrackNotFound(id))?;
        Ok((track, &self.assets))
    }

    pub fn track_by_name(&self, name: &str) -> Option<&TimelineTrack> {
        self.tracks.iter().find(|t| t.name == name)
    }

    pub fn add_track(&mut self, kind: TrackKind, name: impl Into<String>) -> TrackId {
        let track = TimelineTrack::new(kind, name);
        let id = track.id;
        self.tracks.push(track);
        id
    }

    pub fn remove_track(&mut self, id: TrackId) -> Result<TimelineTrack> {
        let idx = self
            .tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or(EditError::TrackNotFound(id))?;
        let track = self.tracks.remove(idx);
        self.recompute_derived();
        Ok(track)
    }

    /// Locate a clip on any track.
    pub fn find_clip(&self, id: ClipId) -> Option<(&TimelineTrack, &TimelineClip)> {
        self.tracks
            .iter()
            .find_map(|t| t.clip(id).map(|c| (t, c)))
    }

    pub fn track_of_clip(&self, id: ClipId) -> Result<TrackId> {
        self.find_clip(id)
            .map(|(t, _)| t.id)
            .ok_or(EditError::ClipNotFound(id))
    }

    /// Ids of every clip referencing `asset`.
    pub fn clip_references(&self, asset: AssetId) -> Vec<ClipId> {
        self.tracks
            .iter()
            .flat_map(|t| t.clips())
            .filter(|c| c.asset_id == asset)
            .map(|c| c.id)
            .collect()
    }

    /// Register an asset. Re-importing a path already known returns the
    /// existing id.
    pub fn import_asset(&mut self, asset: MediaAsset) -> AssetId {
        if let Some(existing) = self.assets.find_by_path(&asset.source_path) {
            log::debug!("asset {} already imported", existing.source_path.display());
            return existing.id;
        }
        log::info!("imported {} ({})", asset.source_path.display(), asset.kind.as_str());
        self.assets.insert(asset)
    }

    pub fn asset_by_path(&self, path: &Path) -> Option<&MediaAsset> {
        self.assets.find_by_path(path)
    }

    pub fn remove_asset(&mut self, id: AssetId) -> Result<MediaAsset> {
        let clips = self.clip_references(id).len();
        if clips > 0 {
            return Err(EditError::AssetInUse { asset: id, clips });
        }
        self.assets.remove(id).ok_or(EditError::AssetNotFound(id))
    }

    pub fn add_marker(&mut self, marker: TimelineMarker) -> MarkerId {
        let id = marker.id;
        let idx = self.markers.partition_point(|m| m.position <= marker.position);
        self.markers.insert(idx, marker);
        id
    }

    pub fn remove_marker(&mut self, id: MarkerId) -> Option<TimelineMarker> {
        let idx = self.markers.iter().position(|m| m.id == id)?;
        Some(self.markers.remove(idx))
    }

    pub fn beat_markers(&self) -> &[BeatMarker] {
        &self.beat_markers
    }

    /// Replace the stored beats, keeping them sorted.
    pub fn set_beats(&mut self, mut beats: Vec<BeatMarker>, tempo_bpm: Option<f64>) {
        beats.sort_by_key(|b| b.timestamp);
        self.beat_markers = beats;
        self.tempo_bpm = tempo_bpm;
    }

    /// Add captions, replacing an existing track for the same language.
    pub fn add_caption_track(&mut self, track: CaptionTrack) {
        self.caption_tracks.retain(|t| t.language != track.language);
        self.caption_tracks.push(track);
    }

    /// Clips that would be shown or heard at `t`, one per unmuted track.
    pub fn active_clips_at(&self, t: Time) -> Vec<(TrackId, &TimelineClip)> {
        self.tracks
            .iter()
            .filter(|track| !track.muted)
            .filter_map(|track| track.clip_at(t).map(|c| (track.id, c)))
            .collect()
    }

    pub fn check_invariants(&self) -> Result<()> {
        for track in &self.tracks {
            track.check_invariants(&self.assets)?;
            for clip in track.clips() {
                self.assets.require(clip.asset_id)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::from_seconds;
    use crate::timeline::types::{AssetKind, MarkerKind};

    fn make_test_project() -> (Project, AssetId, TrackId) {
        let mut project = Project::with_default_tracks("test");
        let asset = project.import_asset(MediaAsset::new(AssetKind::Video, "clip.mp4", from_seconds(30.0)));
        let track = project.tracks()[0].id;
        (project, asset, track)
    }

    fn place(project: &mut Project, track: TrackId, asset: AssetId, start: f64, len: f64) -> ClipId {
        let clip = TimelineClip::from_asset(
            project.assets.require(asset).unwrap(),
            from_seconds(start),
            Some(from_seconds(len)),
        );
        let id = project.track_mut(track).unwrap().insert(clip).unwrap();
        project.recompute_derived();
        id
    }

    #[test]
    fn test_default_tracks() {
        let project = Project::with_default_tracks("p");
        let kinds: Vec<_> = project.tracks().iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![TrackKind::Video, TrackKind::Audio]);
        assert_eq!(project.duration(), 0);
    }

    #[test]
    fn test_reimport_returns_existing_id() {
        let (mut project, asset, _) = make_test_project();
        let again = project.import_asset(MediaAsset::new(AssetKind::Video, "clip.mp4", from_seconds(30.0)));
        assert_eq!(again, asset);
        assert_eq!(project.assets.len(), 1);
    }

    #[test]
    fn test_duration_is_derived() {
        let (mut project, asset, track) = make_test_project();
        place(&mut project, track, asset, 0.0, 4.0);
        let id = place(&mut project, track, asset, 10.0, 5.0);
        assert_eq!(project.duration(), from_seconds(15.0));
        project.track_mut(track).unwrap().remove(id);
        project.recompute_derived();
        assert_eq!(project.duration(), from_seconds(4.0));
    }

    #[test]
    fn test_remove_asset_in_use_rejected() {
        let (mut project, asset, track) = make_test_project();
        let clip = place(&mut project, track, asset, 0.0, 4.0);
        assert_eq!(project.remove_asset(asset), Err(EditError::AssetInUse { asset, clips: 1 }));
        project.track_mut(track).unwrap().remove(clip);
        assert!(project.remove_asset(asset).is_ok());
        assert_eq!(project.remove_asset(asset), Err(EditError::AssetNotFound(asset)));
    }

    #[test]
    fn test_active_clips_skip_muted() {
        let (mut project, asset, track) = make_test_project();
        let overlay = project.add_track(TrackKind::Overlay, "O1");
        let a = place(&mut project, track, asset, 0.0, 4.0);
        place(&mut project, overlay, asset, 2.0, 4.0);

        let active: Vec<_> = project.active_clips_at(from_seconds(3.0)).into_iter().map(|(t, _)| t).collect();
        assert_eq!(active, vec![track, overlay]);
        project.track_mut(overlay).unwrap().muted = true;
        let active = project.active_clips_at(from_seconds(3.0));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].1.id, a);
        assert!(project.active_clips_at(from_seconds(4.0)).is_empty());
    }

    #[test]
    fn test_markers_sorted() {
        let mut project = Project::new("p");
        project.add_marker(TimelineMarker::new(from_seconds(5.0), "b", MarkerKind::Standard));
        let first = project.add_marker(TimelineMarker::new(from_seconds(1.0), "a", MarkerKind::Chapter));
        assert_eq!(project.markers[0].id, first);
        assert!(project.remove_marker(first).is_some());
        assert_eq!(project.markers.len(), 1);
    }

    #[test]
    fn test_find_clip_and_remove_track() {
        let (mut project, asset, track) = make_test_project();
        let clip = place(&mut project, track, asset, 0.0, 4.0);
        assert_eq!(project.track_of_clip(clip), Ok(track));
        project.remove_track(track).unwrap();
        assert_eq!(project.track_of_clip(clip), Err(EditError::ClipNotFound(clip)));
        assert_eq!(project.duration(), 0);
    }
}
