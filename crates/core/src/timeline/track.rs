//! Tracks: an arena of clips keyed by id plus an ordered id list.
//!
//! The id list is sorted by `timeline_position` and clip intervals never
//! overlap, so clip ends are sorted too and lookups can binary search.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{AssetKind, ClipId, SourceBounds, TimelineClip, TrackId};
use crate::error::{EditError, Result};
use crate::time::Time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Video,
    Audio,
    Overlay,
}

impl TrackKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Audio => "audio",
            TrackKind::Overlay => "overlay",
        }
    }

    pub fn accepts(self, kind: AssetKind) -> bool {
        match self {
            TrackKind::Video | TrackKind::Overlay => kind != AssetKind::Audio,
            TrackKind::Audio => kind == AssetKind::Audio,
        }
    }

    /// Track kind that naturally holds clips of an asset kind.
    pub fn for_asset(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Audio => TrackKind::Audio,
            AssetKind::Video | AssetKind::Image => TrackKind::Video,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineTrack {
    pub id: TrackId,
    pub kind: TrackKind,
    pub name: String,
    pub muted: bool,
    pub locked: bool,
    clips: BTreeMap<ClipId, TimelineClip>,
    order: Vec<ClipId>,
}

impl TimelineTrack {
    pub fn new(kind: TrackKind, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: name.into(),
            muted: false,
            locked: false,
            clips: BTreeMap::new(),
            order: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clip(&self, id: ClipId) -> Option<&TimelineClip> {
        self.clips.get(&id)
    }

    pub fn require(&self, id: ClipId) -> Result<&TimelineClip> {
        self.clip(id).ok_or(EditError::ClipNotFound(id))
    }

    pub(crate) fn clip_mut(&mut self, id: ClipId) -> Result<&mut TimelineClip> {
        self.clips.get_mut(&id).ok_or(EditError::ClipNotFound(id))
    }

    /// Clip ids in timeline order.
    pub fn clip_ids(&self) -> &[ClipId] {
        &self.order
    }

    /// Clips in timeline order.
    pub fn clips(&self) -> impl Iterator<Item = &TimelineClip> + '_ {
        self.order.iter().filter_map(move |id| self.clips.get(id))
    }

    pub fn index_of(&self, id: ClipId) -> Option<usize> {
        self.order.iter().position(|c| *c == id)
    }

    fn at(&self, idx: usize) -> &TimelineClip {
        &self.clips[&self.order[idx]]
    }

    /// End of the last clip, or zero for an empty track.
    pub fn end(&self) -> Time {
        self.order.last().map(|id| self.clips[id].end()).unwrap_or(0)
    }

    /// The clip showing at `t`, if any.
    pub fn clip_at(&self, t: Time) -> Option<&TimelineClip> {
        let idx = self.order.partition_point(|id| self.clips[id].timeline_position <= t);
        if idx == 0 {
            return None;
        }
        let clip = self.at(idx - 1);
        clip.contains(t).then_some(clip)
    }

    /// Clips intersecting the half-open range `[start, end)`, in order.
    pub fn clips_in_range(&self, start: Time, end: Time) -> Vec<&TimelineClip> {
        let first = self.order.partition_point(|id| self.clips[id].end() <= start);
        self.order[first..]
            .iter()
            .map(|id| &self.clips[id])
            .take_while(|c| c.timeline_position < end)
            .collect()
    }

    pub fn previous(&self, id: ClipId) -> Option<&TimelineClip> {
        let idx = self.index_of(id)?;
        idx.checked_sub(1).map(|i| self.at(i))
    }

    pub fn next(&self, id: ClipId) -> Option<&TimelineClip> {
        let idx = self.index_of(id)?;
        self.order.get(idx + 1).map(|c| &self.clips[c])
    }

    /// First clip (other than those in `ignore`) overlapping `[start, end)`.
    pub fn find_conflict(&self, start: Time, end: Time, ignore: &[ClipId]) -> Option<ClipId> {
        self.clips_in_range(start, end)
            .into_iter()
            .find(|c| !ignore.contains(&c.id))
            .map(|c| c.id)
    }

    /// Start of the first clip beginning at or after `t`.
    pub fn next_start_at_or_after(&self, t: Time) -> Option<Time> {
        let idx = self.order.partition_point(|id| self.clips[id].timeline_position < t);
        self.order.get(idx).map(|id| self.clips[id].timeline_position)
    }

    pub fn ensure_unlocked(&self) -> Result<()> {
        if self.locked {
            return Err(EditError::TrackLocked(self.id));
        }
        Ok(())
    }

    pub fn ensure_accepts(&self, clip: &TimelineClip) -> Result<()> {
        if !self.kind.accepts(clip.kind) {
            return Err(EditError::KindMismatch {
                clip: clip.kind.as_str(),
                track: self.kind.as_str(),
            });
        }
        Ok(())
    }

    /// Check that `clip` could be placed without overlapping, ignoring its own id.
    pub fn check_fits(&self, clip: &TimelineClip) -> Result<()> {
        if clip.timeline_position < 0 {
            return Err(EditError::NegativePosition { clip: clip.id });
        }
        match self.find_conflict(clip.timeline_position, clip.end(), &[clip.id]) {
            Some(_) => Err(EditError::OverlapViolation {
                track: self.id,
                clip: clip.id,
            }),
            None => Ok(()),
        }
    }

    /// Insert a clip at its sorted position after kind and overlap checks.
    pub(crate) fn insert(&mut self, clip: TimelineClip) -> Result<ClipId> {
        self.ensure_accepts(&clip)?;
        self.check_fits(&clip)?;
        let id = clip.id;
        let idx = self
            .order
            .partition_point(|c| self.clips[c].timeline_position <= clip.timeline_position);
        self.order.insert(idx, id);
        self.clips.insert(id, clip);
        Ok(id)
    }

    pub(crate) fn remove(&mut self, id: ClipId) -> Option<TimelineClip> {
        let clip = self.clips.remove(&id)?;
        self.order.retain(|c| *c != id);
        Some(clip)
    }

    /// Re-sort the id list after positions were changed in bulk.
    pub(crate) fn resort(&mut self) {
        let clips = &self.clips;
        self.order.sort_by_key(|id| clips[id].timeline_position);
    }

    pub(crate) fn clips_mut(&mut self) -> impl Iterator<Item = &mut TimelineClip> {
        self.clips.values_mut()
    }

    // Raw arena access for history restore.

    pub(crate) fn order(&self) -> &[ClipId] {
        &self.order
    }

    pub(crate) fn set_order(&mut self, order: Vec<ClipId>) {
        self.order = order;
    }

    pub(crate) fn put_clip(&mut self, clip: TimelineClip) {
        self.clips.insert(clip.id, clip);
    }

    pub(crate) fn take_clip(&mut self, id: ClipId) -> Option<TimelineClip> {
        self.clips.remove(&id)
    }

    /// Rebuild from clips in any order (used when loading documents).
    pub(crate) fn from_parts(
        id: TrackId,
        kind: TrackKind,
        name: String,
        muted: bool,
        locked: bool,
        clips: Vec<TimelineClip>,
    ) -> Self {
        let mut track = Self {
            id,
            kind,
            name,
            muted,
            locked,
            clips: BTreeMap::new(),
            order: Vec::with_capacity(clips.len()),
        };
        for clip in clips {
            track.order.push(clip.id);
            track.clips.insert(clip.id, clip);
        }
        track.resort();
        track
    }

    /// Ids of transitions joining two abutting clips that are both at
    /// least as long as the blend.
    pub(crate) fn linked_transitions(&self) -> BTreeSet<Uuid> {
        self.order
            .windows(2)
            .filter_map(|pair| {
                let (a, b) = (self.clips.get(&pair[0])?, self.clips.get(&pair[1])?);
                let (out, inn) = (a.transition_out.as_ref()?, b.transition_in.as_ref()?);
                let fits = out.duration > 0 && out.duration <= a.duration.min(b.duration);
                (out.id == inn.id && a.end() == b.timeline_position && fits).then_some(out.id)
            })
            .collect()
    }

    /// Verify ordering, non-overlap and per-clip invariants.
    pub fn check_invariants(&self, bounds: &dyn SourceBounds) -> Result<()> {
        if self.order.len() != self.clips.len() || self.order.iter().any(|id| !self.clips.contains_key(id)) {
            return Err(EditError::OverlapViolation {
                track: self.id,
                clip: self.order.first().copied().unwrap_or_default(),
            });
        }
        let mut prev: Option<&TimelineClip> = None;
        for clip in self.clips() {
            clip.validate(bounds)?;
            self.ensure_accepts(clip)?;
            if let Some(p) = prev {
                if p.end() > clip.timeline_position {
                    return Err(EditError::OverlapViolation {
                        track: self.id,
                        clip: clip.id,
                    });
                }
            }
            prev = Some(clip);
        }
        let linked = self.linked_transitions();
        for clip in self.clips() {
            let stray = [&clip.transition_in, &clip.transition_out]
                .into_iter()
                .flatten()
                .any(|t| !linked.contains(&t.id));
            if stray {
                return Err(EditError::InvalidTransition(format!(
                    "clip {} has a transition without an abutting partner",
                    clip.id
                )));
            }
        }
        Ok(())
    }
}
