//! Beat-synchronized placement of clips onto a track.
//!
//! The whole placement is planned against a snapshot of the occupied
//! intervals before anything is inserted, so a failing clip leaves the
//! track untouched.

use std::collections::BTreeMap;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use super::prune_transitions;
use crate::error::Result;
use crate::time::Time;
use crate::timeline::track::TimelineTrack;
use crate::timeline::types::{BeatMarker, ClipId, SourceBounds, TimelineClip};

/// What to do when a clip placed on a beat would run into an occupied clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Shorten the clip to end where the obstacle starts.
    #[default]
    Truncate,
    /// Leave the beat empty and try the next one.
    SkipBeat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatSyncOptions {
    /// Stretch or cut each clip to the interval until the following beat.
    pub snap_duration: bool,
    pub overlap_policy: OverlapPolicy,
    /// Beats weaker than this are ignored.
    pub min_strength: f32,
    /// Beats before this time are ignored.
    pub start_at: Time,
}

impl Default for BeatSyncOptions {
    fn default() -> Self {
        Self {
            snap_duration: true,
            overlap_policy: OverlapPolicy::Truncate,
            min_strength: 0.0,
            start_at: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeatSyncResult {
    pub placed: Vec<ClipId>,
    /// Clips that ran out of beats.
    pub unplaced: Vec<ClipId>,
    /// Beats passed over because they were occupied or too short.
    pub skipped_beats: usize,
}

/// Occupied intervals keyed by start. Spans never overlap.
struct Occupancy {
    spans: BTreeMap<Time, Time>,
}

impl Occupancy {
    fn from_track(track: &TimelineTrack) -> Self {
        Self {
            spans: track.clips().map(|c| (c.timeline_position, c.end())).collect(),
        }
    }

    fn contains(&self, t: Time) -> bool {
        self.spans.range(..=t).next_back().is_some_and(|(_, &end)| t < end)
    }

    /// Start of the first occupied span beginning after `t`.
    fn next_obstacle(&self, t: Time) -> Option<Time> {
        self.spans
            .range((Bound::Excluded(t), Bound::Unbounded))
            .next()
            .map(|(&start, _)| start)
    }

    fn add(&mut self, start: Time, end: Time) {
        self.spans.insert(start, end);
    }
}

fn usable_beats(beats: &[BeatMarker], opts: &BeatSyncOptions) -> Vec<Time> {
    let mut times: Vec<Time> = beats
        .iter()
        .filter(|b| b.strength >= opts.min_strength && b.timestamp >= opts.start_at)
        .map(|b| b.timestamp)
        .collect();
    times.sort_unstable();
    times.dedup();
    times
}

/// Longest duration `clip` can take from its current source in point.
fn available(clip: &TimelineClip, bounds: &dyn SourceBounds) -> Option<Time> {
    if !clip.is_time_based() {
        return None;
    }
    bounds
        .source_limit(clip.asset_id)
        .map(|limit| limit - clip.source_in)
}

/// Place `clips` in order on successive beats of `beats`.
pub fn beat_sync(
    track: &mut TimelineTrack,
    beats: &[BeatMarker],
    clips: Vec<TimelineClip>,
    opts: &BeatSyncOptions,
    bounds: &dyn SourceBounds,
    min_duration: Time,
) -> Result<BeatSyncResult> {
    track.ensure_unlocked()?;
    for clip in &clips {
        track.ensure_accepts(clip)?;
    }

    let beats = usable_beats(beats, opts);
    let mut occupied = Occupancy::from_track(track);
    let mut result = BeatSyncResult::default();
    let mut planned = Vec::with_capacity(clips.len());
    let mut cursor = 0;
    let mut earliest = opts.start_at;

    for clip in clips {
        let mut placed = None;
        while cursor < beats.len() {
            let beat = beats[cursor];
            if beat < earliest {
                cursor += 1;
                continue;
            }
            if occupied.contains(beat) {
                result.skipped_beats += 1;
                cursor += 1;
                continue;
            }

            let mut duration = match (opts.snap_duration, beats.get(cursor + 1)) {
                (true, Some(&next)) => {
                    let interval = next - beat;
                    available(&clip, bounds).map_or(interval, |avail| interval.min(avail))
                }
                _ => clip.duration,
            };
            if let Some(obstacle) = occupied.next_obstacle(beat) {
                if beat + duration > obstacle {
                    let room = obstacle - beat;
                    let fits = opts.overlap_policy == OverlapPolicy::Truncate
                        && room >= min_duration.min(clip.duration).max(1);
                    if !fits {
                        result.skipped_beats += 1;
                        cursor += 1;
                        continue;
                    }
                    duration = room;
                }
            }

            let mut candidate = clip.clone();
            candidate.timeline_position = beat;
            candidate.set_end(beat + duration);
            candidate.validate(bounds)?;
            occupied.add(beat, candidate.end());
            cursor += 1;
            if !opts.snap_duration {
                earliest = candidate.end();
            }
            placed = Some(candidate);
            break;
        }
        match placed {
            Some(candidate) => planned.push(candidate),
            None => result.unplaced.push(clip.id),
        }
    }

    for clip in &planned {
        track.check_fits(clip)?;
    }
    for clip in planned {
        result.placed.push(track.insert(clip)?);
    }
    prune_transitions(track);
    log::debug!(
        "beat sync on {}: {} placed, {} unplaced, {} beats skipped",
        track.name,
        result.placed.len(),
        result.unplaced.len(),
        result.skipped_beats
    );
    Ok(result)
}
