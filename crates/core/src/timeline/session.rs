//! The editing session: the single writer over a [`Project`].
//!
//! Every mutating entry point goes through [`EditSession::edit`], which
//! snapshots the tracks the operation may touch, runs it, re-checks the
//! track invariants, and either records the change in the history or puts
//! the snapshots back.

use std::path::Path;

use super::history::{EditHistory, TrackRevision};
use super::keyframe::{AnimatedProperty, Easing};
use super::ops::{self, BeatSyncOptions, BeatSyncResult, OverwriteResult, RippleDeleteResult,
    RippleInsertResult, RippleScope, SlideResult, SplitResult};
use super::project::Project;
use super::track::{TimelineTrack, TrackKind};
use super::types::{
    AssetId, BeatMarker, CaptionTrack, ClipId, ColorGrading, Effect, MarkerId, MarkerKind, MediaAsset,
    TimelineClip, TimelineMarker, TrackId,
};
use crate::error::{EditError, MediaError, Result};
use crate::media::{AssetProbe, BeatDetector, CancelToken, ExportProfile, Exporter, JobOutcome, Transcriber};
use crate::settings::EditorSettings;
use crate::time::{self, Time};

/// Clip fields that can be changed without moving the clip. `None` leaves
/// a field as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipUpdate {
    pub label: Option<String>,
    pub volume: Option<f64>,
    pub opacity: Option<f64>,
    pub speed: Option<f64>,
    pub color_grading: Option<Option<ColorGrading>>,
    pub effects: Option<Vec<Effect>>,
}

impl ClipUpdate {
    fn non_finite_field(&self) -> Option<&'static str> {
        let scalars = [("volume", self.volume), ("opacity", self.opacity), ("speed", self.speed)];
        if let Some((field, _)) = scalars.iter().find(|(_, v)| v.is_some_and(|v| !v.is_finite())) {
            return Some(*field);
        }
        if self.color_grading.as_ref().is_some_and(|g| g.as_ref().is_some_and(|g| !g.is_finite())) {
            return Some("color grading");
        }
        let bad_effect = self
            .effects
            .as_ref()
            .is_some_and(|fx| fx.iter().any(|e| e.params.values().any(|v| !v.is_finite())));
        bad_effect.then_some("effect parameter")
    }
}

pub struct EditSession {
    project: Project,
    history: EditHistory,
    pub settings: EditorSettings,
    playhead: Time,
}

impl EditSession {
    pub fn new(project: Project, settings: EditorSettings) -> Self {
        let history = EditHistory::new(settings.history_limit);
        let mut project = project;
        project.recompute_derived();
        Self {
            project,
            history,
            settings,
            playhead: 0,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn into_project(self) -> Project {
        self.project
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    pub fn playhead(&self) -> Time {
        self.playhead
    }

    pub fn set_playhead(&mut self, t: Time) {
        self.playhead = t.max(0);
    }

    /// Run `op` against the project as one undoable step touching `tracks`.
    fn edit<T>(
        &mut self,
        label: &str,
        tracks: &[TrackId],
        op: impl FnOnce(&mut Project) -> Result<T>,
    ) -> Result<T> {
        let snapshots = tracks
            .iter()
            .map(|id| self.project.track(*id).cloned())
            .collect::<Result<Vec<TimelineTrack>>>()?;

        let outcome = op(&mut self.project).and_then(|value| {
            for id in tracks {
                self.project.track(*id)?.check_invariants(&self.project.assets)?;
            }
            Ok(value)
        });

        match outcome {
            Ok(value) => {
                let revisions: Vec<TrackRevision> = snapshots
                    .iter()
                    .filter_map(|before| {
                        let after = self.project.track(before.id).ok()?;
                        TrackRevision::capture(before, after)
                    })
                    .collect();
                let touched = revisions.len();
                self.history.record(label, revisions);
                self.project.recompute_derived();
                log::debug!("{}: {} track(s) changed", label, touched);
                Ok(value)
            }
            Err(err) => {
                for snapshot in snapshots {
                    if let Ok(track) = self.project.track_mut(snapshot.id) {
                        *track = snapshot;
                    }
                }
                log::warn!("{} rolled back: {}", label, err);
                Err(err)
            }
        }
    }

    /// Tracks a ripple on `target` moves under `scope`.
    fn ripple_tracks(&self, target: TrackId, scope: RippleScope) -> Vec<TrackId> {
        match scope {
            RippleScope::Track => vec![target],
            RippleScope::AllTracks => self
                .project
                .tracks()
                .iter()
                .filter(|t| t.id == target || !t.locked)
                .map(|t| t.id)
                .collect(),
        }
    }

    // Tracks and assets

    pub fn add_track(&mut self, kind: TrackKind, name: impl Into<String>) -> TrackId {
        self.project.add_track(kind, name)
    }

    /// Remove a track and its history. Not undoable.
    pub fn remove_track(&mut self, id: TrackId) -> Result<TimelineTrack> {
        let track = self.project.remove_track(id)?;
        self.history.forget_track(id);
        Ok(track)
    }

    pub fn set_track_locked(&mut self, id: TrackId, locked: bool) -> Result<()> {
        self.project.track_mut(id)?.locked = locked;
        Ok(())
    }

    pub fn set_track_muted(&mut self, id: TrackId, muted: bool) -> Result<()> {
        self.project.track_mut(id)?.muted = muted;
        Ok(())
    }

    /// Probe a file and register it.
    pub fn import_asset(
        &mut self,
        probe: &dyn AssetProbe,
        path: &Path,
        cancel: &CancelToken,
    ) -> std::result::Result<AssetId, MediaError> {
        if let Some(existing) = self.project.asset_by_path(path) {
            return Ok(existing.id);
        }
        let asset = probe.probe(path, cancel)?;
        Ok(self.project.import_asset(asset))
    }

    pub fn remove_asset(&mut self, id: AssetId) -> Result<MediaAsset> {
        self.project.remove_asset(id)
    }

    /// A clip showing `asset` from its start, positioned at zero.
    pub fn new_clip(&self, asset: AssetId, duration: Option<Time>) -> Result<TimelineClip> {
        let asset = self.project.assets.require(asset)?;
        Ok(TimelineClip::from_asset(asset, 0, duration))
    }

    // Clip placement

    /// Place a clip at its own position; fails if the spot is taken.
    pub fn add_clip(&mut self, track: TrackId, clip: TimelineClip) -> Result<ClipId> {
        self.edit("Add clip", &[track], |project| {
            let (track, assets) = project.track_and_assets(track)?;
            track.ensure_unlocked()?;
            clip.validate(assets)?;
            track.insert(clip)
        })
    }

    pub fn overwrite(&mut self, track: TrackId, clip: TimelineClip) -> Result<OverwriteResult> {
        self.edit("Overwrite", &[track], |project| {
            let (track, assets) = project.track_and_assets(track)?;
            ops::overwrite(track, clip, assets)
        })
    }

    pub fn append(&mut self, track: TrackId, clip: TimelineClip) -> Result<ClipId> {
        self.edit("Append", &[track], |project| {
            let (track, assets) = project.track_and_assets(track)?;
            ops::append(track, clip, assets)
        })
    }

    pub fn ripple_insert(&mut self, track: TrackId, clip: TimelineClip, at: Time) -> Result<RippleInsertResult> {
        self.ripple_insert_with_scope(track, clip, at, self.settings.ripple_scope)
    }

    pub fn ripple_insert_with_scope(
        &mut self,
        target: TrackId,
        clip: TimelineClip,
        at: Time,
        scope: RippleScope,
    ) -> Result<RippleInsertResult> {
        let tracks = self.ripple_tracks(target, scope);
        let others: Vec<TrackId> = tracks.iter().copied().filter(|t| *t != target).collect();
        self.edit("Ripple insert", &tracks, |project| {
            let length = clip.duration;
            let (track, assets) = project.track_and_assets(target)?;
            let result = ops::ripple_insert(track, clip, at, assets)?;
            for id in others {
                ops::ripple_shift(project.track_mut(id)?, result.at, length)?;
            }
            Ok(result)
        })
    }

    /// Ripple-insert at the playhead.
    pub fn insert_at_playhead(&mut self, track: TrackId, clip: TimelineClip) -> Result<RippleInsertResult> {
        self.ripple_insert(track, clip, self.playhead)
    }

    pub fn ripple_delete(&mut self, track: TrackId, start: Time, length: Time) -> Result<RippleDeleteResult> {
        self.ripple_delete_with_scope(track, start, length, self.settings.ripple_scope)
    }

    /// Ripple delete on the target; under `AllTracks` the same range is
    /// removed from every other unlocked track. Only the target's result is
    /// returned.
    pub fn ripple_delete_with_scope(
        &mut self,
        target: TrackId,
        start: Time,
        length: Time,
        scope: RippleScope,
    ) -> Result<RippleDeleteResult> {
        let tracks = self.ripple_tracks(target, scope);
        self.edit("Ripple delete", &tracks, |project| {
            let mut target_result = RippleDeleteResult::default();
            for id in &tracks {
                let (track, assets) = project.track_and_assets(*id)?;
                let result = ops::ripple_delete(track, start, length, assets)?;
                if *id == target {
                    target_result = result;
                }
            }
            Ok(target_result)
        })
    }

    // Single-clip edits

    pub fn split(&mut self, clip: ClipId, at: Time) -> Result<SplitResult> {
        let track = self.project.track_of_clip(clip)?;
        self.edit("Split", &[track], |project| ops::split(project.track_mut(track)?, clip, at))
    }

    /// Split whatever clip on `track` is under the playhead.
    pub fn split_at_playhead(&mut self, track: TrackId) -> Result<SplitResult> {
        let clip = self
            .project
            .track(track)?
            .clip_at(self.playhead)
            .map(|c| c.id)
            .ok_or(EditError::EmptySelection)?;
        self.split(clip, self.playhead)
    }

    pub fn duplicate(&mut self, clip: ClipId, at: Option<Time>) -> Result<ClipId> {
        let track = self.project.track_of_clip(clip)?;
        self.edit("Duplicate", &[track], |project| {
            ops::duplicate(project.track_mut(track)?, clip, at)
        })
    }

    pub fn trim_start(&mut self, clip: ClipId, new_start: Time) -> Result<()> {
        let track = self.project.track_of_clip(clip)?;
        self.edit("Trim start", &[track], |project| {
            let (track, assets) = project.track_and_assets(track)?;
            ops::trim_start(track, clip, new_start, assets)
        })
    }

    pub fn trim_end(&mut self, clip: ClipId, new_end: Time) -> Result<()> {
        let track = self.project.track_of_clip(clip)?;
        self.edit("Trim end", &[track], |project| {
            let (track, assets) = project.track_and_assets(track)?;
            ops::trim_end(track, clip, new_end, assets)
        })
    }

    pub fn move_clip(&mut self, clip: ClipId, new_position: Time) -> Result<()> {
        let track = self.project.track_of_clip(clip)?;
        self.edit("Move", &[track], |project| {
            let (track, assets) = project.track_and_assets(track)?;
            ops::move_clip(track, clip, new_position, assets)
        })
    }

    pub fn delete_clip(&mut self, clip: ClipId) -> Result<TimelineClip> {
        let track = self.project.track_of_clip(clip)?;
        self.edit("Delete", &[track], |project| ops::delete_clip(project.track_mut(track)?, clip))
    }

    pub fn ripple_delete_clip(&mut self, clip: ClipId) -> Result<RippleDeleteResult> {
        let (start, length) = match self.project.find_clip(clip) {
            Some((_, c)) => (c.timeline_position, c.duration),
            None => return Err(EditError::ClipNotFound(clip)),
        };
        let track = self.project.track_of_clip(clip)?;
        self.ripple_delete(track, start, length)
    }

    /// Returns the delta actually applied; a clamped-to-zero slip records
    /// nothing.
    pub fn slip(&mut self, clip: ClipId, delta: Time) -> Result<Time> {
        let track = self.project.track_of_clip(clip)?;
        self.edit("Slip", &[track], |project| {
            let (track, assets) = project.track_and_assets(track)?;
            ops::slip(track, clip, delta, assets)
        })
    }

    pub fn slide(&mut self, clip: ClipId, delta: Time) -> Result<SlideResult> {
        let track = self.project.track_of_clip(clip)?;
        let min_duration = self.settings.min_clip_duration;
        self.edit("Slide", &[track], |project| {
            let (track, assets) = project.track_and_assets(track)?;
            ops::slide(track, clip, delta, assets, min_duration)
        })
    }

    pub fn roll(&mut self, left: ClipId, right: ClipId, delta: Time) -> Result<()> {
        let track = self.project.track_of_clip(left)?;
        if self.project.track_of_clip(right)? != track {
            return Err(EditError::NotAdjacent { left, right });
        }
        self.edit("Roll", &[track], |project| {
            let (track, assets) = project.track_and_assets(track)?;
            ops::roll(track, left, right, delta, assets)
        })
    }

    pub fn update_clip_properties(&mut self, clip: ClipId, update: ClipUpdate) -> Result<()> {
        let track = self.project.track_of_clip(clip)?;
        if let Some(field) = update.non_finite_field() {
            return Err(EditError::NonFiniteValue { clip, field });
        }
        self.edit("Clip properties", &[track], |project| {
            let track = project.track_mut(track)?;
            track.ensure_unlocked()?;
            let target = track.clip_mut(clip)?;
            if let Some(label) = update.label {
                target.label = label;
            }
            if let Some(volume) = update.volume {
                target.volume = volume.max(0.0);
            }
            if let Some(opacity) = update.opacity {
                target.opacity = opacity.clamp(0.0, 1.0);
            }
            if let Some(speed) = update.speed {
                target.speed = speed.clamp(0.01, 100.0);
            }
            if let Some(grading) = update.color_grading {
                target.color_grading = grading;
            }
            if let Some(effects) = update.effects {
                target.effects = effects;
            }
            Ok(())
        })
    }

    // Keyframes and transitions

    pub fn set_keyframe(
        &mut self,
        clip: ClipId,
        property: &AnimatedProperty,
        local_time: Time,
        value: f64,
        easing: Easing,
    ) -> Result<()> {
        let track = self.project.track_of_clip(clip)?;
        self.edit("Set keyframe", &[track], |project| {
            ops::set_keyframe(project.track_mut(track)?, clip, property, local_time, value, easing)
        })
    }

    pub fn remove_keyframe(&mut self, clip: ClipId, property: &AnimatedProperty, local_time: Time) -> Result<bool> {
        let track = self.project.track_of_clip(clip)?;
        self.edit("Remove keyframe", &[track], |project| {
            ops::remove_keyframe(project.track_mut(track)?, clip, property, local_time)
        })
    }

    pub fn set_transition(&mut self, left: ClipId, right: ClipId, kind: &str, duration: Time) -> Result<uuid::Uuid> {
        let track = self.project.track_of_clip(left)?;
        self.edit("Set transition", &[track], |project| {
            ops::set_transition(project.track_mut(track)?, left, right, kind, duration)
        })
    }

    pub fn clear_transition(&mut self, left: ClipId, right: ClipId) -> Result<bool> {
        let track = self.project.track_of_clip(left)?;
        self.edit("Clear transition", &[track], |project| {
            ops::clear_transition(project.track_mut(track)?, left, right)
        })
    }

    // Beats

    /// Place `clips` on the stored beat markers. `opts` defaults to the
    /// session settings.
    pub fn beat_sync(
        &mut self,
        track: TrackId,
        clips: Vec<TimelineClip>,
        opts: Option<&BeatSyncOptions>,
    ) -> Result<BeatSyncResult> {
        if self.project.beat_markers().is_empty() || clips.is_empty() {
            return Err(EditError::EmptySelection);
        }
        let opts = opts.cloned().unwrap_or_else(|| self.settings.beat_sync.clone());
        let min_duration = self.settings.min_clip_duration;
        self.edit("Beat sync", &[track], |project| {
            let beats = project.beat_markers().to_vec();
            let (track, assets) = project.track_and_assets(track)?;
            ops::beat_sync(track, &beats, clips, &opts, assets, min_duration)
        })
    }

    /// Run a beat detector on an asset and store the beats, shifted to
    /// where the asset starts on the timeline. Returns the beat count.
    pub fn detect_beats(
        &mut self,
        detector: &dyn BeatDetector,
        asset: AssetId,
        offset: Time,
        cancel: &CancelToken,
    ) -> std::result::Result<usize, MediaError> {
        let asset = self.project.assets.require(asset)?.clone();
        let analysis = detector.detect(&asset, cancel)?;
        cancel.check()?;
        Ok(self.store_beats(analysis.beats, analysis.tempo_bpm, offset))
    }

    fn store_beats(&mut self, beats: Vec<BeatMarker>, tempo_bpm: Option<f64>, offset: Time) -> usize {
        let beats: Vec<BeatMarker> = beats
            .into_iter()
            .map(|b| BeatMarker {
                timestamp: b.timestamp + offset,
                ..b
            })
            .filter(|b| b.timestamp >= 0)
            .collect();
        let count = beats.len();
        self.project.set_beats(beats, tempo_bpm);
        count
    }

    /// Transcribe an asset into a caption track for `language`.
    pub fn transcribe(
        &mut self,
        transcriber: &dyn Transcriber,
        asset: AssetId,
        language: &str,
        offset: Time,
        cancel: &CancelToken,
    ) -> std::result::Result<usize, MediaError> {
        let asset = self.project.assets.require(asset)?.clone();
        let captions = transcriber.transcribe(&asset, language, cancel)?;
        cancel.check()?;
        Ok(self.store_captions(language, captions, offset))
    }

    fn store_captions(&mut self, language: &str, captions: Vec<super::types::Caption>, offset: Time) -> usize {
        let captions: Vec<_> = captions
            .into_iter()
            .map(|mut c| {
                c.start += offset;
                c.end += offset;
                c
            })
            .collect();
        let count = captions.len();
        self.project.add_caption_track(CaptionTrack::new(language, captions));
        count
    }

    // Markers

    pub fn add_marker(&mut self, position: Time, name: &str, kind: MarkerKind) -> MarkerId {
        self.project.add_marker(TimelineMarker::new(position.max(0), name, kind))
    }

    pub fn remove_marker(&mut self, id: MarkerId) -> Option<TimelineMarker> {
        self.project.remove_marker(id)
    }

    // Collaborator results and export

    /// Apply a finished background job. Cancelled jobs change nothing.
    /// Returns whether the project changed.
    pub fn apply_outcome(&mut self, outcome: JobOutcome) -> std::result::Result<bool, MediaError> {
        match outcome {
            JobOutcome::Imported(asset) => {
                self.project.import_asset(asset);
                Ok(true)
            }
            JobOutcome::Beats { analysis, offset } => {
                self.store_beats(analysis.beats, analysis.tempo_bpm, offset);
                Ok(true)
            }
            JobOutcome::Captions {
                language,
                captions,
                offset,
            } => {
                self.store_captions(&language, captions, offset);
                Ok(true)
            }
            JobOutcome::Cancelled => {
                log::warn!("ignoring cancelled media job");
                Ok(false)
            }
            JobOutcome::Failed(err) => Err(err),
        }
    }

    /// Validate the project and hand it to `exporter`.
    pub fn export(&self, exporter: &dyn Exporter, profile: &ExportProfile) -> std::result::Result<(), MediaError> {
        self.project.check_invariants()?;
        if self.project.duration() == 0 {
            return Err(MediaError::ExportFailed("project has no clips".into()));
        }
        log::info!(
            "exporting '{}' ({}) to {}",
            self.project.name,
            time::format_time(self.project.duration()),
            profile.output.display()
        );
        exporter.export(&self.project, profile)
    }

    // History

    pub fn undo(&mut self) -> Option<String> {
        let label = self.history.undo(self.project.tracks_mut())?;
        self.project.recompute_derived();
        log::debug!("undo: {}", label);
        Some(label)
    }

    pub fn redo(&mut self) -> Option<String> {
        let label = self.history.redo(self.project.tracks_mut())?;
        self.project.recompute_derived();
        log::debug!("redo: {}", label);
        Some(label)
    }

    /// Undo the latest edit on one track only.
    pub fn undo_track(&mut self, track: TrackId) -> Result<Option<String>> {
        let label = self.history.undo_track(self.project.track_mut(track)?);
        self.project.recompute_derived();
        Ok(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::jobs::tests::make_test_collaborators;
    use crate::media::BeatAnalysis;
    use crate::time::from_seconds;
    use crate::timeline::types::AssetKind;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::cell::Cell;

    fn make_test_session() -> (EditSession, AssetId, TrackId) {
        let mut project = Project::with_default_tracks("session");
        let asset = project.import_asset(MediaAsset::new(AssetKind::Video, "source.mp4", from_seconds(120.0)));
        let track = project.tracks()[0].id;
        (EditSession::new(project, EditorSettings::default()), asset, track)
    }

    fn spans(session: &EditSession, track: TrackId) -> Vec<(f64, f64)> {
        session
            .project()
            .track(track)
            .unwrap()
            .clips()
            .map(|c| (time::to_seconds(c.timeline_position), time::to_seconds(c.end())))
            .collect()
    }

    fn place(session: &mut EditSession, asset: AssetId, track: TrackId, start: f64, len: f64) -> ClipId {
        let mut clip = session.new_clip(asset, Some(from_seconds(len))).unwrap();
        clip.timeline_position = from_seconds(start);
        session.add_clip(track, clip).unwrap()
    }

    #[test]
    fn test_split_ripple_undo_scenario() {
        let (mut session, asset, track) = make_test_session();
        let a = place(&mut session, asset, track, 0.0, 10.0);

        session.split(a, from_seconds(4.0)).unwrap();
        assert_eq!(spans(&session, track), vec![(0.0, 4.0), (4.0, 10.0)]);

        let b = session.new_clip(asset, Some(from_seconds(2.0))).unwrap();
        session.ripple_insert(track, b, from_seconds(4.0)).unwrap();
        assert_eq!(spans(&session, track), vec![(0.0, 4.0), (4.0, 6.0), (6.0, 12.0)]);
        assert_eq!(session.project().duration(), from_seconds(12.0));

        assert_eq!(session.undo().as_deref(), Some("Ripple insert"));
        assert_eq!(spans(&session, track), vec![(0.0, 4.0), (4.0, 10.0)]);
        assert_eq!(session.undo().as_deref(), Some("Split"));
        assert_eq!(spans(&session, track), vec![(0.0, 10.0)]);
        assert_eq!(session.undo().as_deref(), Some("Add clip"));
        assert_eq!(session.undo(), None);

        session.redo();
        session.redo();
        assert_eq!(spans(&session, track), vec![(0.0, 4.0), (4.0, 10.0)]);
    }

    #[test]
    fn test_split_undo_restores_identical_clip() {
        let (mut session, asset, track) = make_test_session();
        let a = place(&mut session, asset, track, 1.0, 8.0);
        session
            .set_keyframe(a, &AnimatedProperty::ScaleX, from_seconds(1.0), 2.0, Easing::EaseOut)
            .unwrap();
        session
            .update_clip_properties(a, ClipUpdate { volume: Some(0.3), ..Default::default() })
            .unwrap();
        let original = session.project().find_clip(a).unwrap().1.clone();

        let halves = session.split(a, from_seconds(5.0)).unwrap();
        assert!(session.project().find_clip(halves.right).is_some());
        session.undo();
        assert_eq!(session.project().find_clip(a).unwrap().1, &original);
        assert!(session.project().find_clip(halves.right).is_none());
    }

    #[test]
    fn test_failed_edit_changes_nothing() {
        let (mut session, asset, track) = make_test_session();
        let a = place(&mut session, asset, track, 0.0, 10.0);
        let before = session.project().clone();
        let depth = session.history().depth(track);

        assert!(session.split(a, from_seconds(10.0)).is_err());
        let mut clip = session.new_clip(asset, Some(from_seconds(2.0))).unwrap();
        clip.timeline_position = from_seconds(3.0);
        assert!(matches!(session.add_clip(track, clip), Err(EditError::OverlapViolation { .. })));

        assert_eq!(session.project(), &before);
        assert_eq!(session.history().depth(track), depth);
    }

    #[test]
    fn test_ripple_all_tracks_skips_locked() {
        let (mut session, asset, track) = make_test_session();
        session.settings.ripple_scope = RippleScope::AllTracks;
        let overlay = session.add_track(TrackKind::Overlay, "O1");
        let locked = session.add_track(TrackKind::Overlay, "O2");
        place(&mut session, asset, track, 0.0, 4.0);
        place(&mut session, asset, overlay, 5.0, 1.0);
        place(&mut session, asset, locked, 5.0, 1.0);
        session.set_track_locked(locked, true).unwrap();

        let clip = session.new_clip(asset, Some(from_seconds(2.0))).unwrap();
        session.ripple_insert(track, clip, from_seconds(4.0)).unwrap();
        assert_eq!(spans(&session, overlay), vec![(7.0, 8.0)]);
        assert_eq!(spans(&session, locked), vec![(5.0, 6.0)]);

        session.undo();
        assert_eq!(spans(&session, overlay), vec![(5.0, 6.0)]);
        assert_eq!(spans(&session, track), vec![(0.0, 4.0)]);
    }

    #[test]
    fn test_edit_after_all_tracks_undo_discards_redo() {
        let (mut session, asset, track) = make_test_session();
        let overlay = session.add_track(TrackKind::Overlay, "O1");
        place(&mut session, asset, track, 0.0, 4.0);
        place(&mut session, asset, overlay, 5.0, 1.0);

        let clip = session.new_clip(asset, Some(from_seconds(2.0))).unwrap();
        session
            .ripple_insert_with_scope(track, clip, from_seconds(4.0), RippleScope::AllTracks)
            .unwrap();
        session.undo();
        place(&mut session, asset, track, 20.0, 1.0);

        assert_eq!(session.redo(), None);
        assert_eq!(spans(&session, track), vec![(0.0, 4.0), (20.0, 21.0)]);
        assert_eq!(spans(&session, overlay), vec![(5.0, 6.0)]);
    }

    #[test]
    fn test_non_finite_properties_rejected() {
        let (mut session, asset, track) = make_test_session();
        let a = place(&mut session, asset, track, 0.0, 4.0);
        let before = session.project().clone();

        let err = session
            .update_clip_properties(a, ClipUpdate { opacity: Some(f64::NAN), ..Default::default() })
            .unwrap_err();
        assert_eq!(err, EditError::NonFiniteValue { clip: a, field: "opacity" });
        let grading = ColorGrading { exposure: f64::INFINITY, ..Default::default() };
        assert!(session
            .update_clip_properties(a, ClipUpdate { color_grading: Some(Some(grading)), ..Default::default() })
            .is_err());
        assert!(session
            .set_keyframe(a, &AnimatedProperty::Opacity, 0, f64::NAN, Easing::Linear)
            .is_err());
        assert_eq!(session.project(), &before);

        session
            .update_clip_properties(a, ClipUpdate { opacity: Some(0.5), ..Default::default() })
            .unwrap();
        let json = crate::timeline::persist::to_json(session.project()).unwrap();
        let loaded = crate::timeline::persist::from_json(&json).unwrap();
        assert_eq!(&loaded, session.project());
    }

    #[test]
    fn test_ripple_delete_all_tracks() {
        let (mut session, asset, track) = make_test_session();
        let overlay = session.add_track(TrackKind::Overlay, "O1");
        place(&mut session, asset, track, 0.0, 10.0);
        place(&mut session, asset, overlay, 6.0, 2.0);
        session
            .ripple_delete_with_scope(track, from_seconds(2.0), from_seconds(3.0), RippleScope::AllTracks)
            .unwrap();
        assert_eq!(spans(&session, track), vec![(0.0, 7.0)]);
        assert_eq!(spans(&session, overlay), vec![(3.0, 5.0)]);
    }

    #[test]
    fn test_split_at_playhead() {
        let (mut session, asset, track) = make_test_session();
        place(&mut session, asset, track, 0.0, 4.0);
        session.set_playhead(from_seconds(6.0));
        assert_eq!(session.split_at_playhead(track), Err(EditError::EmptySelection));
        session.set_playhead(from_seconds(1.0));
        session.split_at_playhead(track).unwrap();
        assert_eq!(spans(&session, track), vec![(0.0, 1.0), (1.0, 4.0)]);

        let clip = session.new_clip(asset, Some(from_seconds(1.0))).unwrap();
        session.insert_at_playhead(track, clip).unwrap();
        assert_eq!(spans(&session, track), vec![(0.0, 1.0), (1.0, 2.0), (2.0, 5.0)]);
    }

    #[test]
    fn test_zero_slip_records_nothing() {
        let (mut session, asset, track) = make_test_session();
        let a = place(&mut session, asset, track, 0.0, 4.0);
        let depth = session.history().depth(track);
        assert_eq!(session.slip(a, -from_seconds(1.0)), Ok(0));
        assert_eq!(session.history().depth(track), depth);
        assert_eq!(session.slip(a, from_seconds(1.0)), Ok(from_seconds(1.0)));
        assert_eq!(session.history().depth(track), depth + 1);
    }

    #[test]
    fn test_slide_uses_min_duration_setting() {
        let (mut session, asset, track) = make_test_session();
        session.settings.min_clip_duration = from_seconds(0.5);
        let a = place(&mut session, asset, track, 0.0, 2.0);
        let b = place(&mut session, asset, track, 2.0, 1.0);
        assert_eq!(session.slide(a, from_seconds(0.8)), Err(EditError::DurationUnderflow { clip: b }));
        assert_eq!(session.slide(a, from_seconds(0.4)).unwrap().neighbor, Some(b));
    }

    #[test]
    fn test_roll_across_tracks_rejected() {
        let (mut session, asset, track) = make_test_session();
        let overlay = session.add_track(TrackKind::Overlay, "O1");
        let a = place(&mut session, asset, track, 0.0, 2.0);
        let b = place(&mut session, asset, overlay, 2.0, 2.0);
        assert_eq!(session.roll(a, b, 1), Err(EditError::NotAdjacent { left: a, right: b }));
    }

    #[test]
    fn test_remove_track_forgets_history() {
        let (mut session, asset, track) = make_test_session();
        place(&mut session, asset, track, 0.0, 2.0);
        session.remove_track(track).unwrap();
        assert!(!session.history().can_undo());
        assert_eq!(session.undo(), None);
    }

    #[test]
    fn test_beat_sync_uses_stored_beats() {
        let (mut session, asset, track) = make_test_session();
        let clips = vec![session.new_clip(asset, Some(from_seconds(4.0))).unwrap()];
        assert_eq!(session.beat_sync(track, clips.clone(), None), Err(EditError::EmptySelection));

        let outcome = JobOutcome::Beats {
            analysis: BeatAnalysis {
                beats: vec![
                    BeatMarker { timestamp: 0, strength: 1.0 },
                    BeatMarker { timestamp: from_seconds(0.5), strength: 1.0 },
                ],
                tempo_bpm: Some(120.0),
            },
            offset: from_seconds(2.0),
        };
        assert!(matches!(session.apply_outcome(outcome), Ok(true)));
        let result = session.beat_sync(track, clips, None).unwrap();
        assert_eq!(result.placed.len(), 1);
        assert_eq!(spans(&session, track), vec![(2.0, 2.5)]);
        assert_eq!(session.project().tempo_bpm, Some(120.0));
    }

    #[test]
    fn test_cancelled_outcome_is_noop() {
        let (mut session, _, _) = make_test_session();
        let before = session.project().clone();
        assert!(matches!(session.apply_outcome(JobOutcome::Cancelled), Ok(false)));
        assert_eq!(session.project(), &before);
    }

    #[test]
    fn test_import_through_probe() {
        let (mut session, _, _) = make_test_session();
        let collaborators = make_test_collaborators();
        let cancel = CancelToken::new();
        let id = session
            .import_asset(collaborators.probe.as_ref(), Path::new("b.mp4"), &cancel)
            .unwrap();
        let again = session
            .import_asset(collaborators.probe.as_ref(), Path::new("b.mp4"), &cancel)
            .unwrap();
        assert_eq!(id, again);
        assert_eq!(session.project().assets.len(), 2);

        cancel.cancel();
        assert!(matches!(
            session.import_asset(collaborators.probe.as_ref(), Path::new("slow.mp4"), &cancel),
            Err(MediaError::Cancelled)
        ));
        assert_eq!(session.project().assets.len(), 2);
    }

    #[test]
    fn test_remove_asset_in_use() {
        let (mut session, asset, track) = make_test_session();
        let a = place(&mut session, asset, track, 0.0, 2.0);
        assert_eq!(session.remove_asset(asset), Err(EditError::AssetInUse { asset, clips: 1 }));
        session.delete_clip(a).unwrap();
        assert!(session.remove_asset(asset).is_ok());
    }

    struct RecordingExporter {
        calls: Cell<usize>,
    }

    impl Exporter for RecordingExporter {
        fn export(&self, _project: &Project, _profile: &ExportProfile) -> std::result::Result<(), MediaError> {
            self.calls.set(self.calls.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_export_validates_first() {
        let (mut session, asset, track) = make_test_session();
        let exporter = RecordingExporter { calls: Cell::new(0) };
        let profile = ExportProfile::new("out.json");
        assert!(matches!(session.export(&exporter, &profile), Err(MediaError::ExportFailed(_))));
        place(&mut session, asset, track, 0.0, 2.0);
        session.export(&exporter, &profile).unwrap();
        assert_eq!(exporter.calls.get(), 1);
    }

    #[test]
    fn test_random_edits_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let (session, asset, track) = make_test_session();
        let settings = EditorSettings {
            history_limit: 10_000,
            ..EditorSettings::default()
        };
        let mut session = EditSession::new(session.into_project(), settings);
        let overlay = session.add_track(TrackKind::Overlay, "O1");
        let tracks = [track, overlay];
        let secs = |rng: &mut StdRng, max: f64| from_seconds((rng.gen_range(0.0..max) * 10.0).round() / 10.0);

        for step in 0..400 {
            let target = tracks[rng.gen_range(0..tracks.len())];
            let ids: Vec<ClipId> = session.project().track(target).unwrap().clip_ids().to_vec();
            let pick = |rng: &mut StdRng| (!ids.is_empty()).then(|| ids[rng.gen_range(0..ids.len())]);
            let before = session.project().clone();

            let result: Result<()> = match rng.gen_range(0..11) {
                0 | 1 => {
                    let mut clip = session.new_clip(asset, Some(secs(&mut rng, 6.0).max(1))).unwrap();
                    clip.timeline_position = secs(&mut rng, 40.0);
                    session.overwrite(target, clip).map(|_| ())
                }
                2 => {
                    let clip = session.new_clip(asset, Some(secs(&mut rng, 4.0).max(1))).unwrap();
                    let at = secs(&mut rng, 40.0);
                    session.ripple_insert(target, clip, at).map(|_| ())
                }
                3 => match pick(&mut rng) {
                    Some(c) => session.split(c, secs(&mut rng, 40.0)).map(|_| ()),
                    None => Ok(()),
                },
                4 => session
                    .ripple_delete(target, secs(&mut rng, 40.0), secs(&mut rng, 5.0).max(1))
                    .map(|_| ()),
                5 => match pick(&mut rng) {
                    Some(c) => session.slip(c, secs(&mut rng, 10.0) - from_seconds(5.0)).map(|_| ()),
                    None => Ok(()),
                },
                6 => match pick(&mut rng) {
                    Some(c) => session.slide(c, secs(&mut rng, 4.0) - from_seconds(2.0)).map(|_| ()),
                    None => Ok(()),
                },
                7 => match (pick(&mut rng), pick(&mut rng)) {
                    (Some(l), Some(r)) => session.roll(l, r, secs(&mut rng, 2.0) - from_seconds(1.0)),
                    _ => Ok(()),
                },
                8 => match pick(&mut rng) {
                    Some(c) => session.trim_end(c, secs(&mut rng, 40.0)),
                    None => Ok(()),
                },
                9 => match pick(&mut rng) {
                    Some(c) => session.move_clip(c, secs(&mut rng, 40.0)),
                    None => Ok(()),
                },
                _ => {
                    session.undo();
                    Ok(())
                }
            };

            if result.is_err() {
                assert_eq!(session.project(), &before, "failed edit changed the project at step {step}");
            }
            session
                .project()
                .check_invariants()
                .unwrap_or_else(|e| panic!("invariant broken at step {step}: {e}"));
            let expected = session.project().tracks().iter().map(TimelineTrack::end).max().unwrap_or(0);
            assert_eq!(session.project().duration(), expected);
        }

        while session.undo().is_some() {}
        assert!(session.project().tracks().iter().all(|t| t.is_empty()));
    }
}
