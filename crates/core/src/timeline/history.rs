//! Per-track undo/redo.
//!
//! Each edit records one [`TrackRevision`] per track it touched, holding
//! only the clips that changed plus both id orders. Revisions from the same
//! edit share a group number so a single undo reverts all of them.

use std::collections::{BTreeMap, BTreeSet};

use super::track::TimelineTrack;
use super::types::{ClipId, TimelineClip, TrackId};

/// The difference between two states of one track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRevision {
    pub track: TrackId,
    before_order: Vec<ClipId>,
    after_order: Vec<ClipId>,
    /// Prior versions of changed or removed clips.
    before: Vec<TimelineClip>,
    /// New versions of changed or created clips.
    after: Vec<TimelineClip>,
}

impl TrackRevision {
    /// Diff two states of the same track. Returns `None` when nothing changed.
    pub fn capture(before: &TimelineTrack, after: &TimelineTrack) -> Option<Self> {
        let mut old = Vec::new();
        let mut new = Vec::new();
        for clip in before.clips() {
            match after.clip(clip.id) {
                Some(current) if current == clip => {}
                Some(current) => {
                    old.push(clip.clone());
                    new.push(current.clone());
                }
                None => old.push(clip.clone()),
            }
        }
        new.extend(after.clips().filter(|c| before.clip(c.id).is_none()).cloned());

        if old.is_empty() && new.is_empty() && before.order() == after.order() {
            return None;
        }
        Some(Self {
            track: after.id,
            before_order: before.order().to_vec(),
            after_order: after.order().to_vec(),
            before: old,
            after: new,
        })
    }

    /// Number of clips this revision touches.
    pub fn len(&self) -> usize {
        let mut ids: Vec<ClipId> = self.before.iter().chain(&self.after).map(|c| c.id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn revert(&self, track: &mut TimelineTrack) {
        Self::swap(track, &self.after, &self.before, &self.before_order);
    }

    pub fn reapply(&self, track: &mut TimelineTrack) {
        Self::swap(track, &self.before, &self.after, &self.after_order);
    }

    fn swap(track: &mut TimelineTrack, out: &[TimelineClip], back: &[TimelineClip], order: &[ClipId]) {
        for clip in out {
            track.take_clip(clip.id);
        }
        for clip in back {
            track.put_clip(clip.clone());
        }
        track.set_order(order.to_vec());
    }
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub group: u64,
    pub label: String,
    pub revision: TrackRevision,
}

/// Undo and redo stacks kept per track.
#[derive(Debug, Clone)]
pub struct EditHistory {
    undo: BTreeMap<TrackId, Vec<HistoryEntry>>,
    redo: BTreeMap<TrackId, Vec<HistoryEntry>>,
    max_entries: usize,
    next_group: u64,
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::new(200)
    }
}

impl EditHistory {
    /// Create a history keeping at most `max_entries` revisions per track.
    pub fn new(max_entries: usize) -> Self {
        Self {
            undo: BTreeMap::new(),
            redo: BTreeMap::new(),
            max_entries: max_entries.max(1),
            next_group: 0,
        }
    }

    /// Record the revisions of one edit as a single undo step. Clears the
    /// redo stacks of the touched tracks, along with every redo entry on
    /// other tracks that belongs to a discarded edit. Returns the group
    /// number, or `None` when there was nothing to record.
    pub fn record(&mut self, label: &str, revisions: Vec<TrackRevision>) -> Option<u64> {
        if revisions.is_empty() {
            return None;
        }
        let touched: Vec<TrackId> = revisions.iter().map(|r| r.track).collect();
        self.discard_redo(&touched);
        let group = self.next_group;
        self.next_group += 1;
        for revision in revisions {
            let track = revision.track;
            let stack = self.undo.entry(track).or_default();
            stack.push(HistoryEntry {
                group,
                label: label.to_string(),
                revision,
            });
            if stack.len() > self.max_entries {
                let excess = stack.len() - self.max_entries;
                stack.drain(..excess);
            }
        }
        log::debug!("history: recorded group {} ({})", group, label);
        Some(group)
    }

    /// Drop every redo group with an entry on `tracks`, then every group
    /// that can only be replayed after a dropped one on some track.
    fn discard_redo(&mut self, tracks: &[TrackId]) {
        let mut doomed: BTreeSet<u64> = tracks
            .iter()
            .filter_map(|t| self.redo.get(t))
            .flatten()
            .map(|e| e.group)
            .collect();
        if doomed.is_empty() {
            return;
        }
        loop {
            let known = doomed.len();
            for stack in self.redo.values() {
                // Entries below a doomed one replay after it.
                if let Some(pos) = stack.iter().rposition(|e| doomed.contains(&e.group)) {
                    doomed.extend(stack[..pos].iter().map(|e| e.group));
                }
            }
            if doomed.len() == known {
                break;
            }
        }
        for stack in self.redo.values_mut() {
            stack.retain(|e| !doomed.contains(&e.group));
        }
        self.redo.retain(|_, s| !s.is_empty());
    }

    fn top_group(stacks: &BTreeMap<TrackId, Vec<HistoryEntry>>, newest: bool) -> Option<u64> {
        let tops = stacks.values().filter_map(|s| s.last()).map(|e| e.group);
        if newest {
            tops.max()
        } else {
            tops.min()
        }
    }

    fn pop_group(stacks: &mut BTreeMap<TrackId, Vec<HistoryEntry>>, group: u64) -> Vec<HistoryEntry> {
        let mut entries = Vec::new();
        for stack in stacks.values_mut() {
            if stack.last().is_some_and(|e| e.group == group) {
                entries.extend(stack.pop());
            }
        }
        stacks.retain(|_, s| !s.is_empty());
        entries
    }

    fn push(stacks: &mut BTreeMap<TrackId, Vec<HistoryEntry>>, entry: HistoryEntry) {
        stacks.entry(entry.revision.track).or_default().push(entry);
    }

    /// Revert the most recent edit across all tracks. Returns its label.
    pub fn undo(&mut self, tracks: &mut [TimelineTrack]) -> Option<String> {
        let group = Self::top_group(&self.undo, true)?;
        let entries = Self::pop_group(&mut self.undo, group);
        let label = entries.first().map(|e| e.label.clone());
        for entry in entries {
            if let Some(track) = tracks.iter_mut().find(|t| t.id == entry.revision.track) {
                entry.revision.revert(track);
            }
            Self::push(&mut self.redo, entry);
        }
        label
    }

    /// Reapply the most recently undone edit. Returns its label.
    pub fn redo(&mut self, tracks: &mut [TimelineTrack]) -> Option<String> {
        let group = Self::top_group(&self.redo, false)?;
        let entries = Self::pop_group(&mut self.redo, group);
        let label = entries.first().map(|e| e.label.clone());
        for entry in entries {
            if let Some(track) = tracks.iter_mut().find(|t| t.id == entry.revision.track) {
                entry.revision.reapply(track);
            }
            Self::push(&mut self.undo, entry);
        }
        label
    }

    /// Revert only the latest revision recorded on `track`.
    pub fn undo_track(&mut self, track: &mut TimelineTrack) -> Option<String> {
        let stack = self.undo.get_mut(&track.id)?;
        let entry = stack.pop()?;
        if stack.is_empty() {
            self.undo.remove(&track.id);
        }
        entry.revision.revert(track);
        let label = entry.label.clone();
        Self::push(&mut self.redo, entry);
        Some(label)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Label of the edit the next `undo` would revert.
    pub fn undo_label(&self) -> Option<&str> {
        let group = Self::top_group(&self.undo, true)?;
        self.undo
            .values()
            .filter_map(|s| s.last())
            .find(|e| e.group == group)
            .map(|e| e.label.as_str())
    }

    /// Total number of revisions that can be undone on `track`.
    pub fn depth(&self, track: TrackId) -> usize {
        self.undo.get(&track).map_or(0, Vec::len)
    }

    /// Drop all history for a removed track.
    pub fn forget_track(&mut self, track: TrackId) {
        self.undo.remove(&track);
        self.redo.remove(&track);
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
