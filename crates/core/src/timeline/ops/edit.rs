//! Single-clip edits: split, duplicate, trim, move, delete, keyframes,
//! transitions.

use uuid::Uuid;

use super::{commit, detach_transitions, prune_transitions};
use crate::error::{EditError, Result};
use crate::time::Time;
use crate::timeline::keyframe::{AnimatedProperty, Easing};
use crate::timeline::track::TimelineTrack;
use crate::timeline::types::{ClipId, SourceBounds, TimelineClip, TransitionRef};

/// The two halves produced by a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitResult {
    /// The original clip, now ending at the split point.
    pub left: ClipId,
    /// The new clip starting at the split point.
    pub right: ClipId,
}

/// Cut `original` at absolute time `at`. The caller guarantees `at` is
/// strictly inside the clip.
pub(crate) fn split_clip(original: &TimelineClip, at: Time) -> (TimelineClip, TimelineClip) {
    let local = at - original.timeline_position;
    let mut left = original.clone();
    let mut right = original.clone();
    right.id = Uuid::new_v4();

    left.duration = local;
    right.timeline_position = at;
    right.duration = original.duration - local;
    if original.is_time_based() {
        left.source_out = original.source_in + local;
        right.source_in = original.source_in + local;
        right.source_out = original.source_out;
    }

    let (heads, tails): (Vec<_>, Vec<_>) = original
        .keyframe_tracks
        .iter()
        .map(|track| track.split_at(local))
        .unzip();
    left.keyframe_tracks = heads.into_iter().filter(|t| !t.is_empty()).collect();
    right.keyframe_tracks = tails.into_iter().filter(|t| !t.is_empty()).collect();

    left.transition_out = None;
    right.transition_in = None;
    (left, right)
}

/// Split a clip at absolute time `at`.
pub fn split(track: &mut TimelineTrack, clip_id: ClipId, at: Time) -> Result<SplitResult> {
    track.ensure_unlocked()?;
    let original = track.require(clip_id)?;
    if !(original.timeline_position < at && at < original.end()) {
        return Err(EditError::InvalidSplitPosition { clip: clip_id, time: at });
    }
    let (left, right) = split_clip(original, at);
    let right_id = right.id;
    track.put_clip(left);
    track.insert(right)?;
    prune_transitions(track);
    Ok(SplitResult { left: clip_id, right: right_id })
}

/// Copy a clip (new id, no transitions) to `at`, or to the track end.
pub fn duplicate(track: &mut TimelineTrack, clip_id: ClipId, at: Option<Time>) -> Result<ClipId> {
    track.ensure_unlocked()?;
    let mut copy = track.require(clip_id)?.clone();
    copy.id = Uuid::new_v4();
    copy.transition_in = None;
    copy.transition_out = None;
    copy.timeline_position = at.unwrap_or_else(|| track.end());
    track.insert(copy)
}

/// Move the start edge to `new_start`, keeping the end fixed.
pub fn trim_start(
    track: &mut TimelineTrack,
    clip_id: ClipId,
    new_start: Time,
    bounds: &dyn SourceBounds,
) -> Result<()> {
    track.ensure_unlocked()?;
    let clip = track.require(clip_id)?;
    if new_start >= clip.end() {
        return Err(EditError::DurationUnderflow { clip: clip_id });
    }
    if new_start < 0 {
        return Err(EditError::NegativePosition { clip: clip_id });
    }
    let mut candidate = clip.clone();
    candidate.set_start_keep_end(new_start);
    commit(track, vec![candidate], bounds)
}

/// Move the end edge to `new_end`, keeping the start fixed.
pub fn trim_end(
    track: &mut TimelineTrack,
    clip_id: ClipId,
    new_end: Time,
    bounds: &dyn SourceBounds,
) -> Result<()> {
    track.ensure_unlocked()?;
    let clip = track.require(clip_id)?;
    if new_end <= clip.timeline_position {
        return Err(EditError::DurationUnderflow { clip: clip_id });
    }
    let mut candidate = clip.clone();
    candidate.set_end(new_end);
    commit(track, vec![candidate], bounds)
}

/// Reposition a clip without changing its length or source window.
pub fn move_clip(
    track: &mut TimelineTrack,
    clip_id: ClipId,
    new_position: Time,
    bounds: &dyn SourceBounds,
) -> Result<()> {
    track.ensure_unlocked()?;
    let mut candidate = track.require(clip_id)?.clone();
    if new_position < 0 {
        return Err(EditError::NegativePosition { clip: clip_id });
    }
    candidate.timeline_position = new_position;
    commit(track, vec![candidate], bounds)
}

/// Lift a clip off the track, leaving a gap.
pub fn delete_clip(track: &mut TimelineTrack, clip_id: ClipId) -> Result<TimelineClip> {
    track.ensure_unlocked()?;
    let removed = track.remove(clip_id).ok_or(EditError::ClipNotFound(clip_id))?;
    detach_transitions(track, &removed);
    Ok(removed)
}

/// Set a keyframe at clip-local `time`; an existing keyframe at that time is
/// overwritten.
pub fn set_keyframe(
    track: &mut TimelineTrack,
    clip_id: ClipId,
    property: &AnimatedProperty,
    time: Time,
    value: f64,
    easing: Easing,
) -> Result<()> {
    track.ensure_unlocked()?;
    let clip = track.clip_mut(clip_id)?;
    if time < 0 || time > clip.duration {
        return Err(EditError::InvalidKeyframeTime { clip: clip_id, time });
    }
    if !value.is_finite() {
        return Err(EditError::NonFiniteValue { clip: clip_id, field: "keyframe value" });
    }
    clip.keyframe_track_mut(property).set(time, value, easing);
    Ok(())
}

/// Remove the keyframe at `time`. Returns whether one existed; an emptied
/// property track is dropped.
pub fn remove_keyframe(
    track: &mut TimelineTrack,
    clip_id: ClipId,
    property: &AnimatedProperty,
    time: Time,
) -> Result<bool> {
    track.ensure_unlocked()?;
    let clip = track.clip_mut(clip_id)?;
    let Some(idx) = clip.keyframe_tracks.iter().position(|t| &t.property == property) else {
        return Ok(false);
    };
    let removed = clip.keyframe_tracks[idx].remove(time).is_some();
    if clip.keyframe_tracks[idx].is_empty() {
        clip.keyframe_tracks.remove(idx);
    }
    Ok(removed)
}

pub(crate) fn ensure_adjacent(track: &TimelineTrack, left: ClipId, right: ClipId) -> Result<()> {
    let l = track.require(left)?;
    let r = track.require(right)?;
    let consecutive = track.next(left).map(|c| c.id) == Some(right);
    if !consecutive || l.end() != r.timeline_position {
        return Err(EditError::NotAdjacent { left, right });
    }
    Ok(())
}

/// Attach a blend between two abutting clips. Replaces any transition
/// already on those ends.
pub fn set_transition(
    track: &mut TimelineTrack,
    left: ClipId,
    right: ClipId,
    kind: &str,
    duration: Time,
) -> Result<Uuid> {
    track.ensure_unlocked()?;
    ensure_adjacent(track, left, right)?;
    let max = track.require(left)?.duration.min(track.require(right)?.duration);
    if duration <= 0 || duration > max {
        return Err(EditError::InvalidTransition(format!(
            "duration {} must be in (0, {}]",
            duration, max
        )));
    }
    if kind.trim().is_empty() {
        return Err(EditError::InvalidTransition("empty transition kind".into()));
    }

    clear_transition(track, left, right)?;
    let transition = TransitionRef {
        id: Uuid::new_v4(),
        kind: kind.to_string(),
        duration,
    };
    let id = transition.id;
    track.clip_mut(left)?.transition_out = Some(transition.clone());
    track.clip_mut(right)?.transition_in = Some(transition);
    Ok(id)
}

/// Remove the transitions on `left`'s out end and `right`'s in end, along
/// with their partners elsewhere on the track. Returns whether anything changed.
pub fn clear_transition(track: &mut TimelineTrack, left: ClipId, right: ClipId) -> Result<bool> {
    track.ensure_unlocked()?;
    let mut ids = Vec::new();
    ids.extend(track.require(left)?.transition_out.as_ref().map(|t| t.id));
    ids.extend(track.require(right)?.transition_in.as_ref().map(|t| t.id));
    if ids.is_empty() {
        return Ok(false);
    }
    for clip in track.clips_mut() {
        if clip.transition_in.as_ref().is_some_and(|t| ids.contains(&t.id)) {
            clip.transition_in = None;
        }
        if clip.transition_out.as_ref().is_some_and(|t| ids.contains(&t.id)) {
            clip.transition_out = None;
        }
    }
    Ok(true)
}
