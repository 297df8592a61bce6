//! Overwrite and append: place a clip without moving anything else.

use super::{detach_transitions, prune_transitions};
use super::edit::split_clip;
use crate::error::Result;
use crate::timeline::track::TimelineTrack;
use crate::timeline::types::{ClipId, SourceBounds, TimelineClip};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverwriteResult {
    pub clip_id: ClipId,
    pub removed: Vec<ClipId>,
    pub trimmed: Vec<ClipId>,
    /// Tail piece created when the new clip landed inside an existing one.
    pub split_tail: Option<ClipId>,
}

/// Put `clip` at its own position, cutting away whatever it covers.
pub fn overwrite(
    track: &mut TimelineTrack,
    clip: TimelineClip,
    bounds: &dyn SourceBounds,
) -> Result<OverwriteResult> {
    track.ensure_unlocked()?;
    track.ensure_accepts(&clip)?;
    clip.validate(bounds)?;

    let (start, end) = (clip.timeline_position, clip.end());
    let mut result = OverwriteResult {
        clip_id: clip.id,
        ..Default::default()
    };
    let mut replacements = Vec::new();
    let mut tail = None;

    for existing in track.clips_in_range(start, end) {
        let (pos, existing_end) = (existing.timeline_position, existing.end());
        if pos >= start && existing_end <= end {
            result.removed.push(existing.id);
        } else if pos < start && existing_end > end {
            let (mut head, right) = split_clip(existing, end);
            head.set_end(start);
            result.trimmed.push(existing.id);
            result.split_tail = Some(right.id);
            replacements.push(head);
            tail = Some(right);
        } else if pos < start {
            let mut head = existing.clone();
            head.set_end(start);
            result.trimmed.push(existing.id);
            replacements.push(head);
        } else {
            let mut rest = existing.clone();
            rest.set_start_keep_end(end);
            result.trimmed.push(existing.id);
            replacements.push(rest);
        }
    }

    for id in &result.removed {
        if let Some(removed) = track.remove(*id) {
            detach_transitions(track, &removed);
        }
    }
    for piece in replacements {
        track.put_clip(piece);
    }
    track.resort();
    if let Some(tail) = tail {
        track.insert(tail)?;
    }
    track.insert(clip)?;
    prune_transitions(track);
    Ok(result)
}

/// Place `clip` right after the last clip on the track.
pub fn append(
    track: &mut TimelineTrack,
    mut clip: TimelineClip,
    bounds: &dyn SourceBounds,
) -> Result<ClipId> {
    clip.timeline_position = track.end();
    Ok(overwrite(track, clip, bounds)?.clip_id)
}
