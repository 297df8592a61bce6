//! Ripple edits: inserts and deletes that push or pull later material.

use serde::{Deserialize, Serialize};

use super::{detach_transitions, prune_transitions};
use crate::error::{EditError, Result};
use crate::time::Time;
use crate::timeline::track::TimelineTrack;
use crate::timeline::types::{ClipId, SourceBounds, TimelineClip};

/// Which tracks a ripple moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RippleScope {
    /// Only the edited track.
    #[default]
    Track,
    /// Every unlocked track in the project.
    AllTracks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RippleInsertResult {
    pub clip_id: ClipId,
    /// Where the clip actually landed; differs from the requested point
    /// when that point fell inside a clip.
    pub at: Time,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RippleDeleteResult {
    pub removed: Vec<ClipId>,
    pub trimmed: Vec<ClipId>,
}

/// The point a ripple at `at` really opens at: the start of a clip
/// straddling `at`, or `at` itself.
pub fn insertion_point(track: &TimelineTrack, at: Time) -> Time {
    match track.clip_at(at) {
        Some(clip) if clip.timeline_position < at => clip.timeline_position,
        _ => at,
    }
}

/// Shift every clip at or after the insertion point by `delta`. A clip
/// straddling `at` moves wholesale. Returns the effective point.
pub fn ripple_shift(track: &mut TimelineTrack, at: Time, delta: Time) -> Result<Time> {
    if delta < 0 || at < 0 {
        return Err(EditError::InvalidRange { start: at, length: delta });
    }
    track.ensure_unlocked()?;
    let point = insertion_point(track, at);
    if delta == 0 {
        return Ok(point);
    }
    for clip in track.clips_mut() {
        if clip.timeline_position >= point {
            clip.timeline_position += delta;
        }
    }
    prune_transitions(track);
    Ok(point)
}

/// Open a gap the length of `clip` at `at` and place the clip in it.
pub fn ripple_insert(
    track: &mut TimelineTrack,
    mut clip: TimelineClip,
    at: Time,
    bounds: &dyn SourceBounds,
) -> Result<RippleInsertResult> {
    track.ensure_unlocked()?;
    track.ensure_accepts(&clip)?;
    if at < 0 {
        return Err(EditError::NegativePosition { clip: clip.id });
    }
    let point = insertion_point(track, at);
    clip.timeline_position = point;
    clip.validate(bounds)?;

    ripple_shift(track, point, clip.duration)?;
    let clip_id = track.insert(clip)?;
    Ok(RippleInsertResult { clip_id, at: point })
}

enum Plan {
    Keep,
    Remove,
    Replace(TimelineClip),
}

fn plan_delete(clip: &TimelineClip, start: Time, end: Time, length: Time) -> Plan {
    let (pos, clip_end) = (clip.timeline_position, clip.end());
    if clip_end <= start {
        return Plan::Keep;
    }
    let mut next = clip.clone();
    if pos >= end {
        next.timeline_position -= length;
    } else if pos >= start && clip_end <= end {
        return Plan::Remove;
    } else if pos < start && clip_end > end {
        next.set_end(clip_end - length);
    } else if pos < start {
        next.set_end(start);
    } else {
        next.set_start_keep_end(end);
        next.timeline_position = start;
    }
    Plan::Replace(next)
}

/// Remove `[start, start + length)` from the track and close the gap.
///
/// Clips inside the range are removed, clips crossing an edge are trimmed
/// back to it, and everything after the range moves left by `length`.
pub fn ripple_delete(
    track: &mut TimelineTrack,
    start: Time,
    length: Time,
    bounds: &dyn SourceBounds,
) -> Result<RippleDeleteResult> {
    if start < 0 || length <= 0 {
        return Err(EditError::InvalidRange { start, length });
    }
    track.ensure_unlocked()?;
    let end = start + length;

    let mut result = RippleDeleteResult::default();
    let mut replacements = Vec::new();
    for clip in track.clips() {
        match plan_delete(clip, start, end, length) {
            Plan::Keep => {}
            Plan::Remove => result.removed.push(clip.id),
            Plan::Replace(next) => {
                next.validate(bounds)?;
                if next.duration != clip.duration {
                    result.trimmed.push(clip.id);
                }
                replacements.push(next);
            }
        }
    }

    for id in &result.removed {
        if let Some(removed) = track.remove(*id) {
            detach_transitions(track, &removed);
        }
    }
    for clip in replacements {
        track.put_clip(clip);
    }
    track.resort();
    prune_transitions(track);
    log::trace!(
        "ripple delete on {}: {} removed, {} trimmed",
        track.name,
        result.removed.len(),
        result.trimmed.len()
    );
    Ok(result)
}

/// Delete a clip and close the gap it leaves.
pub fn ripple_delete_clip(
    track: &mut TimelineTrack,
    clip_id: ClipId,
    bounds: &dyn SourceBounds,
) -> Result<RippleDeleteResult> {
    let clip = track.require(clip_id)?;
    let (start, length) = (clip.timeline_position, clip.duration);
    ripple_delete(track, start, length, bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::from_seconds;
    use crate::timeline::ops::test_support::*;

    #[test]
    fn test_shift_moves_later_clips() {
        let (_, video, _) = make_test_registry();
        let (mut track, _) = make_track(&video, &[(0.0, 2.0), (4.0, 2.0)]);
        let point = ripple_shift(&mut track, from_seconds(3.0), from_seconds(1.0)).unwrap();
        assert_eq!(point, from_seconds(3.0));
        assert_eq!(spans(&track), vec![(0.0, 2.0), (5.0, 7.0)]);
    }

    #[test]
    fn test_shift_moves_straddling_clip_wholesale() {
        let (_, video, _) = make_test_registry();
        let (mut track, _) = make_track(&video, &[(0.0, 4.0), (4.0, 2.0)]);
        let point = ripple_shift(&mut track, from_seconds(1.0), from_seconds(2.0)).unwrap();
        assert_eq!(point, 0);
        assert_eq!(spans(&track), vec![(2.0, 6.0), (6.0, 8.0)]);
    }

    #[test]
    fn test_shift_rejects_negative_delta() {
        let (_, video, _) = make_test_registry();
        let (mut track, _) = make_track(&video, &[(0.0, 4.0)]);
        assert_eq!(
            ripple_shift(&mut track, 0, -5),
            Err(EditError::InvalidRange { start: 0, length: -5 })
        );
    }

    #[test]
    fn test_insert_after_split_point() {
        let (registry, video, _) = make_test_registry();
        let (mut track, _) = make_track(&video, &[(0.0, 4.0), (4.0, 6.0)]);
        let result = ripple_insert(&mut track, make_clip(&video, 0.0, 2.0), from_seconds(4.0), &registry).unwrap();
        assert_eq!(result.at, from_seconds(4.0));
        assert_eq!(spans(&track), vec![(0.0, 4.0), (4.0, 6.0), (6.0, 12.0)]);
        assert!(track.check_invariants(&registry).is_ok());
    }

    #[test]
    fn test_insert_inside_clip_snaps_to_its_start() {
        let (registry, video, _) = make_test_registry();
        let (mut track, ids) = make_track(&video, &[(2.0, 4.0)]);
        let result = ripple_insert(&mut track, make_clip(&video, 0.0, 1.0), from_seconds(3.0), &registry).unwrap();
        assert_eq!(result.at, from_seconds(2.0));
        assert_eq!(track.clip_ids(), &[result.clip_id, ids[0]]);
        assert_eq!(spans(&track), vec![(2.0, 3.0), (3.0, 7.0)]);
    }

    #[test]
    fn test_insert_then_delete_restores_track() {
        let (registry, video, _) = make_test_registry();
        let (mut track, _) = make_track(&video, &[(0.0, 3.0), (3.0, 2.0), (8.0, 4.0)]);
        let before = track.clone();
        for at in [0.0, 3.0, 5.0, 6.5, 20.0] {
            let result = ripple_insert(&mut track, make_clip(&video, 0.0, 1.5), from_seconds(at), &registry).unwrap();
            ripple_delete(&mut track, result.at, from_seconds(1.5), &registry).unwrap();
            assert_eq!(track, before, "insert/delete at {at}");
        }
    }

    #[test]
    fn test_delete_trims_edges() {
        let (registry, video, _) = make_test_registry();
        let (mut track, ids) = make_track(&video, &[(0.0, 4.0), (5.0, 1.0), (7.0, 5.0), (14.0, 2.0)]);
        let result = ripple_delete(&mut track, from_seconds(2.0), from_seconds(7.0), &registry).unwrap();

        assert_eq!(result.removed, vec![ids[1]]);
        assert_eq!(result.trimmed, vec![ids[0], ids[2]]);
        assert_eq!(spans(&track), vec![(0.0, 2.0), (2.0, 5.0), (7.0, 9.0)]);
        let tail = track.clip(ids[2]).unwrap();
        assert_eq!(tail.source_in, from_seconds(2.0));
        assert!(track.check_invariants(&registry).is_ok());
    }

    #[test]
    fn test_delete_inside_one_clip_shortens_it() {
        let (registry, video, _) = make_test_registry();
        let (mut track, ids) = make_track(&video, &[(0.0, 10.0), (10.0, 2.0)]);
        let result = ripple_delete(&mut track, from_seconds(2.0), from_seconds(3.0), &registry).unwrap();
        assert_eq!(result.trimmed, vec![ids[0]]);
        assert_eq!(spans(&track), vec![(0.0, 7.0), (7.0, 9.0)]);
        assert_eq!(track.clip(ids[0]).unwrap().source_out, from_seconds(7.0));
    }

    #[test]
    fn test_delete_rejects_empty_range() {
        let (registry, video, _) = make_test_registry();
        let (mut track, _) = make_track(&video, &[(0.0, 10.0)]);
        assert_eq!(
            ripple_delete(&mut track, 0, 0, &registry),
            Err(EditError::InvalidRange { start: 0, length: 0 })
        );
    }

    #[test]
    fn test_ripple_delete_clip_closes_gap() {
        let (registry, video, _) = make_test_registry();
        let (mut track, ids) = make_track(&video, &[(0.0, 2.0), (2.0, 3.0), (6.0, 1.0)]);
        let result = ripple_delete_clip(&mut track, ids[1], &registry).unwrap();
        assert_eq!(result.removed, vec![ids[1]]);
        assert_eq!(spans(&track), vec![(0.0, 2.0), (3.0, 4.0)]);
    }
}
