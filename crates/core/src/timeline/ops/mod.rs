//! Timeline edit algorithms.
//!
//! Every operation validates first and mutates after: on `Err` the track is
//! untouched. Operations work on one [`TimelineTrack`] at a time; multi-track
//! behavior (ripple across all tracks) is composed by the session.

pub mod beat_sync;
pub mod edit;
pub mod placement;
pub mod ripple;
pub mod trim_modes;

pub use beat_sync::{beat_sync, BeatSyncOptions, BeatSyncResult, OverlapPolicy};
pub use edit::{
    clear_transition, delete_clip, duplicate, move_clip, remove_keyframe, set_keyframe,
    set_transition, split, trim_end, trim_start, SplitResult,
};
pub use placement::{append, overwrite, OverwriteResult};
pub use ripple::{
    ripple_delete, ripple_delete_clip, ripple_insert, ripple_shift, RippleDeleteResult,
    RippleInsertResult, RippleScope,
};
pub use trim_modes::{roll, slide, slip, SlideResult};

use super::track::TimelineTrack;
use super::types::{ClipId, SourceBounds, TimelineClip};
use crate::error::{EditError, Result};

/// Validate replacement versions of existing clips against the asset
/// bounds and the rest of the track, then swap them in.
pub(crate) fn commit(
    track: &mut TimelineTrack,
    candidates: Vec<TimelineClip>,
    bounds: &dyn SourceBounds,
) -> Result<()> {
    let ids: Vec<ClipId> = candidates.iter().map(|c| c.id).collect();
    for (i, clip) in candidates.iter().enumerate() {
        clip.validate(bounds)?;
        if let Some(conflict) = track
            .clips_in_range(clip.timeline_position, clip.end())
            .into_iter()
            .find(|other| !ids.contains(&other.id))
        {
            log::trace!("{} collides with {}", clip.id, conflict.id);
            return Err(EditError::OverlapViolation { track: track.id, clip: clip.id });
        }
        if candidates[i + 1..].iter().any(|other| other.overlaps(clip)) {
            return Err(EditError::OverlapViolation { track: track.id, clip: clip.id });
        }
    }
    for clip in candidates {
        track.put_clip(clip);
    }
    track.resort();
    prune_transitions(track);
    Ok(())
}

/// Clear transition ends on other clips that pointed at a removed clip.
pub(crate) fn detach_transitions(track: &mut TimelineTrack, removed: &TimelineClip) {
    let ids: Vec<_> = [&removed.transition_in, &removed.transition_out]
        .into_iter()
        .flatten()
        .map(|t| t.id)
        .collect();
    if ids.is_empty() {
        return;
    }
    for clip in track.clips_mut() {
        if clip.transition_in.as_ref().is_some_and(|t| ids.contains(&t.id)) {
            clip.transition_in = None;
        }
        if clip.transition_out.as_ref().is_some_and(|t| ids.contains(&t.id)) {
            clip.transition_out = None;
        }
    }
}

/// Drop transitions whose clips no longer abut or are now shorter than the
/// blend. Returns how many were dropped.
pub(crate) fn prune_transitions(track: &mut TimelineTrack) -> usize {
    let linked = track.linked_transitions();
    let mut dropped = Vec::new();
    for clip in track.clips_mut() {
        for end in [&mut clip.transition_in, &mut clip.transition_out] {
            if end.as_ref().is_some_and(|t| !linked.contains(&t.id)) {
                dropped.extend(end.take().map(|t| t.id));
            }
        }
    }
    dropped.sort_unstable();
    dropped.dedup();
    if !dropped.is_empty() {
        log::debug!("dropped {} stale transition(s) on {}", dropped.len(), track.name);
    }
    dropped.len()
}
