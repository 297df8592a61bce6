//! Slip, slide and roll: trims that keep the overall cut structure.

use super::commit;
use super::edit::ensure_adjacent;
use crate::error::{EditError, Result};
use crate::time::Time;
use crate::timeline::track::TimelineTrack;
use crate::timeline::types::{ClipId, SourceBounds};

/// Outcome of a slide edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideResult {
    /// The abutting neighbor that absorbed the move, if any.
    pub neighbor: Option<ClipId>,
}

/// Move a clip's source window by `delta` without moving it on the
/// timeline. The shift is clamped to the asset; returns the delta applied.
pub fn slip(
    track: &mut TimelineTrack,
    clip_id: ClipId,
    delta: Time,
    bounds: &dyn SourceBounds,
) -> Result<Time> {
    track.ensure_unlocked()?;
    let clip = track.clip_mut(clip_id)?;
    if !clip.is_time_based() {
        return Ok(0);
    }
    let max_forward = bounds
        .source_limit(clip.asset_id)
        .map_or(Time::MAX, |limit| limit - clip.source_out)
        .max(0);
    let applied = delta.clamp(-clip.source_in, max_forward);
    clip.source_in += applied;
    clip.source_out += applied;
    Ok(applied)
}

/// Move a clip by `delta`, letting the neighbor it abuts on the side of the
/// move give up or take the time so the rest of the track stays put.
pub fn slide(
    track: &mut TimelineTrack,
    clip_id: ClipId,
    delta: Time,
    bounds: &dyn SourceBounds,
    min_duration: Time,
) -> Result<SlideResult> {
    track.ensure_unlocked()?;
    let clip = track.require(clip_id)?;
    if delta == 0 {
        return Ok(SlideResult { neighbor: None });
    }
    let new_position = clip.timeline_position + delta;
    if new_position < 0 {
        return Err(EditError::NegativePosition { clip: clip_id });
    }

    let mut moved = clip.clone();
    moved.timeline_position = new_position;

    let neighbor = if delta > 0 {
        track
            .next(clip_id)
            .filter(|n| n.timeline_position == clip.end())
            .map(|n| {
                let mut n = n.clone();
                n.set_start_keep_end(n.timeline_position + delta);
                n
            })
    } else {
        track
            .previous(clip_id)
            .filter(|p| p.end() == clip.timeline_position)
            .map(|p| {
                let mut p = p.clone();
                p.set_end(p.end() + delta);
                p
            })
    };

    let mut candidates = vec![moved];
    let neighbor_id = match neighbor {
        Some(n) => {
            if n.duration < min_duration.max(1) {
                return Err(EditError::DurationUnderflow { clip: n.id });
            }
            let id = n.id;
            candidates.push(n);
            Some(id)
        }
        None => None,
    };
    commit(track, candidates, bounds)?;
    Ok(SlideResult { neighbor: neighbor_id })
}

/// Move the cut between two abutting clips by `delta`.
pub fn roll(
    track: &mut TimelineTrack,
    left: ClipId,
    right: ClipId,
    delta: Time,
    bounds: &dyn SourceBounds,
) -> Result<()> {
    track.ensure_unlocked()?;
    ensure_adjacent(track, left, right)?;
    let mut l = track.require(left)?.clone();
    let mut r = track.require(right)?.clone();
    let cut = l.end() + delta;
    l.set_end(cut);
    r.set_start_keep_end(cut);
    commit(track, vec![l, r], bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::from_seconds;
    use crate::timeline::ops::edit::set_transition;
    use crate::timeline::ops::test_support::*;

    #[test]
    fn test_slip_moves_source_window_only() {
        let (registry, video, _) = make_test_registry();
        let (mut track, ids) = make_track(&video, &[(2.0, 4.0)]);
        let applied = slip(&mut track, ids[0], from_seconds(3.0), &registry).unwrap();
        assert_eq!(applied, from_seconds(3.0));
        let clip = track.clip(ids[0]).unwrap();
        assert_eq!((clip.source_in, clip.source_out), (from_seconds(3.0), from_seconds(7.0)));
        assert_eq!(spans(&track), vec![(2.0, 6.0)]);
    }

    #[test]
    fn test_slip_clamps_to_asset() {
        let (registry, video, _) = make_test_registry();
        let (mut track, ids) = make_track(&video, &[(0.0, 10.0)]);
        assert_eq!(slip(&mut track, ids[0], -from_seconds(5.0), &registry), Ok(0));
        let applied = slip(&mut track, ids[0], from_seconds(100.0), &registry).unwrap();
        assert_eq!(applied, from_seconds(50.0));
        assert_eq!(track.clip(ids[0]).unwrap().source_out, from_seconds(60.0));
        assert!(track.check_invariants(&registry).is_ok());
    }

    #[test]
    fn test_slip_image_is_noop() {
        let (registry, _, image) = make_test_registry();
        let (mut track, ids) = make_track(&image, &[(0.0, 5.0)]);
        assert_eq!(slip(&mut track, ids[0], from_seconds(1.0), &registry), Ok(0));
    }

    #[test]
    fn test_slide_right_shortens_next() {
        let (registry, video, _) = make_test_registry();
        let (mut track, ids) = make_track(&video, &[(0.0, 3.0), (3.0, 2.0), (5.0, 4.0)]);
        let result = slide(&mut track, ids[1], from_seconds(1.0), &registry, 1).unwrap();
        assert_eq!(result.neighbor, Some(ids[2]));
        assert_eq!(spans(&track), vec![(0.0, 3.0), (4.0, 6.0), (6.0, 9.0)]);
        assert_eq!(track.clip(ids[2]).unwrap().source_in, from_seconds(1.0));
        assert!(track.check_invariants(&registry).is_ok());
    }

    #[test]
    fn test_slide_left_shortens_previous() {
        let (registry, video, _) = make_test_registry();
        let (mut track, ids) = make_track(&video, &[(0.0, 3.0), (3.0, 2.0)]);
        let result = slide(&mut track, ids[1], -from_seconds(1.0), &registry, 1).unwrap();
        assert_eq!(result.neighbor, Some(ids[0]));
        assert_eq!(spans(&track), vec![(0.0, 2.0), (2.0, 4.0)]);
        assert_eq!(track.clip(ids[0]).unwrap().source_out, from_seconds(2.0));
    }

    #[test]
    fn test_slide_respects_min_duration() {
        let (registry, video, _) = make_test_registry();
        let (mut track, ids) = make_track(&video, &[(0.0, 3.0), (3.0, 1.0)]);
        let before = track.clone();
        assert_eq!(
            slide(&mut track, ids[0], from_seconds(0.9), &registry, from_seconds(0.5)),
            Err(EditError::DurationUnderflow { clip: ids[1] })
        );
        assert_eq!(track, before);
    }

    #[test]
    fn test_slide_without_neighbor_checks_overlap() {
        let (registry, video, _) = make_test_registry();
        let (mut track, ids) = make_track(&video, &[(0.0, 2.0), (3.0, 2.0)]);
        assert!(matches!(
            slide(&mut track, ids[0], from_seconds(2.0), &registry, 1),
            Err(EditError::OverlapViolation { .. })
        ));
        assert_eq!(
            slide(&mut track, ids[0], -1, &registry, 1),
            Err(EditError::NegativePosition { clip: ids[0] })
        );
        slide(&mut track, ids[0], from_seconds(0.5), &registry, 1).unwrap();
        assert_eq!(spans(&track), vec![(0.5, 2.5), (3.0, 5.0)]);
    }

    #[test]
    fn test_slide_drops_transition_across_new_gap() {
        let (registry, video, _) = make_test_registry();
        let (mut track, ids) = make_track(&video, &[(0.0, 4.0), (4.0, 4.0), (8.0, 4.0)]);
        set_transition(&mut track, ids[0], ids[1], "crossfade", from_seconds(1.0)).unwrap();
        let kept = set_transition(&mut track, ids[1], ids[2], "wipe", from_seconds(1.0)).unwrap();

        slide(&mut track, ids[1], from_seconds(1.0), &registry, 1).unwrap();
        assert_eq!(spans(&track), vec![(0.0, 4.0), (5.0, 9.0), (9.0, 12.0)]);
        assert!(track.clip(ids[0]).unwrap().transition_out.is_none());
        assert!(track.clip(ids[1]).unwrap().transition_in.is_none());
        assert_eq!(track.clip(ids[2]).unwrap().transition_in.as_ref().map(|t| t.id), Some(kept));
        assert!(track.check_invariants(&registry).is_ok());
    }

    #[test]
    fn test_roll_drops_transition_longer_than_clip() {
        let (registry, video, _) = make_test_registry();
        let (mut track, ids) = make_track(&video, &[(0.0, 4.0), (4.0, 4.0)]);
        set_transition(&mut track, ids[0], ids[1], "crossfade", from_seconds(3.0)).unwrap();
        roll(&mut track, ids[0], ids[1], from_seconds(2.0), &registry).unwrap();
        assert!(track.clip(ids[0]).unwrap().transition_out.is_none());
        assert!(track.clip(ids[1]).unwrap().transition_in.is_none());
        assert!(track.check_invariants(&registry).is_ok());
    }

    #[test]
    fn test_roll_moves_cut() {
        let (registry, video, _) = make_test_registry();
        let (mut track, ids) = make_track(&video, &[(0.0, 4.0), (4.0, 4.0)]);
        roll(&mut track, ids[0], ids[1], from_seconds(1.0), &registry).unwrap();
        assert_eq!(spans(&track), vec![(0.0, 5.0), (5.0, 8.0)]);
        let right = track.clip(ids[1]).unwrap();
        assert_eq!(right.source_in, from_seconds(1.0));

        roll(&mut track, ids[0], ids[1], -from_seconds(1.0), &registry).unwrap();
        assert_eq!(spans(&track), vec![(0.0, 4.0), (4.0, 8.0)]);
        // The right clip already starts at source zero.
        assert_eq!(
            roll(&mut track, ids[0], ids[1], -from_seconds(1.0), &registry),
            Err(EditError::OutOfSourceRange { clip: ids[1] })
        );
    }

    #[test]
    fn test_roll_rejects_underflow_and_gaps() {
        let (registry, video, _) = make_test_registry();
        let (mut track, ids) = make_track(&video, &[(0.0, 4.0), (4.0, 2.0), (7.0, 1.0)]);
        assert_eq!(
            roll(&mut track, ids[0], ids[1], from_seconds(2.0), &registry),
            Err(EditError::DurationUnderflow { clip: ids[1] })
        );
        assert_eq!(
            roll(&mut track, ids[1], ids[2], 1, &registry),
            Err(EditError::NotAdjacent { left: ids[1], right: ids[2] })
        );
    }
}
