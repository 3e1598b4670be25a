use std::collections::HashMap;

use shared::domain::{Subject, SubjectId, VoteDirection, VoteMark};

/// Optimistic state for one subject that the indexer has not reported yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayEntry {
    /// Confirmed votes not yet seen in the authoritative counts.
    pub like_delta: u64,
    pub dislike_delta: u64,
    /// Authoritative counts the confirmed deltas are relative to.
    pub baseline_likes: u64,
    pub baseline_dislikes: u64,
    /// The vote still on its way to the ledger, if any.
    pub in_flight: Option<VoteDirection>,
}

impl OverlayEntry {
    fn is_empty(&self) -> bool {
        !self.has_settled() && self.in_flight.is_none()
    }

    fn has_settled(&self) -> bool {
        self.like_delta != 0 || self.dislike_delta != 0
    }

    fn delta_mut(&mut self, direction: VoteDirection) -> &mut u64 {
        match direction {
            VoteDirection::Like => &mut self.like_delta,
            VoteDirection::Dislike => &mut self.dislike_delta,
        }
    }

    /// Settled deltas plus the in-flight vote.
    pub fn total(&self) -> (u64, u64) {
        let (like, dislike) = match self.in_flight {
            Some(VoteDirection::Like) => (1, 0),
            Some(VoteDirection::Dislike) => (0, 1),
            None => (0, 0),
        };
        (
            self.like_delta.saturating_add(like),
            self.dislike_delta.saturating_add(dislike),
        )
    }
}

/// Additive local layer over catalog counts plus the user's vote marks.
#[derive(Debug, Default)]
pub struct VoteOverlayStore {
    entries: HashMap<SubjectId, OverlayEntry>,
    marks: HashMap<SubjectId, VoteDirection>,
}

impl VoteOverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts one optimistic vote in flight on `subject`. While no confirmed
    /// delta is pending the baseline follows `subject`'s current counts.
    ///
    /// At most one vote per subject may be in flight; a second `apply`
    /// before `settle` or `revert` replaces the first.
    pub fn apply(&mut self, subject: &Subject, direction: VoteDirection) {
        let entry = self
            .entries
            .entry(subject.subject_id)
            .or_insert(OverlayEntry {
                like_delta: 0,
                dislike_delta: 0,
                baseline_likes: subject.like_count,
                baseline_dislikes: subject.dislike_count,
                in_flight: None,
            });
        if !entry.has_settled() {
            entry.baseline_likes = subject.like_count;
            entry.baseline_dislikes = subject.dislike_count;
        }
        entry.in_flight = Some(direction);
    }

    /// Drops the in-flight `direction` vote. Confirmed deltas stay.
    pub fn revert(&mut self, subject_id: SubjectId, direction: VoteDirection) {
        let Some(entry) = self.entries.get_mut(&subject_id) else {
            return;
        };
        if entry.in_flight == Some(direction) {
            entry.in_flight = None;
        }
        if entry.is_empty() {
            self.entries.remove(&subject_id);
        }
    }

    /// The in-flight vote is confirmed; it now waits for the indexer.
    pub fn settle(&mut self, subject_id: SubjectId) {
        if let Some(entry) = self.entries.get_mut(&subject_id) {
            if let Some(direction) = entry.in_flight.take() {
                let delta = entry.delta_mut(direction);
                *delta = delta.saturating_add(1);
            }
        }
    }

    pub fn clear(&mut self, subject_id: SubjectId) {
        self.entries.remove(&subject_id);
    }

    /// Folds a fresh authoritative snapshot into the overlay and returns the
    /// subjects whose entries were cleared.
    ///
    /// Whatever part of the confirmed deltas the indexer already reports is
    /// dropped and the baseline moves to the new counts. An in-flight vote
    /// is left alone and keeps its entry alive.
    pub fn reconcile(&mut self, subjects: &[Subject]) -> Vec<SubjectId> {
        let mut cleared = Vec::new();
        for subject in subjects {
            let Some(entry) = self.entries.get_mut(&subject.subject_id) else {
                continue;
            };

            let target_likes = entry.baseline_likes.saturating_add(entry.like_delta);
            let target_dislikes = entry.baseline_dislikes.saturating_add(entry.dislike_delta);
            entry.like_delta = target_likes.saturating_sub(subject.like_count);
            entry.dislike_delta = target_dislikes.saturating_sub(subject.dislike_count);
            entry.baseline_likes = subject.like_count;
            entry.baseline_dislikes = subject.dislike_count;

            if entry.is_empty() {
                self.entries.remove(&subject.subject_id);
                cleared.push(subject.subject_id);
            }
        }
        cleared
    }

    /// The only counts that should ever be rendered.
    pub fn effective_counts(&self, subject: &Subject) -> (u64, u64) {
        match self.entries.get(&subject.subject_id) {
            Some(entry) => {
                let (likes, dislikes) = entry.total();
                (
                    subject.like_count.saturating_add(likes),
                    subject.dislike_count.saturating_add(dislikes),
                )
            }
            None => (subject.like_count, subject.dislike_count),
        }
    }

    pub fn entry(&self, subject_id: SubjectId) -> Option<OverlayEntry> {
        self.entries.get(&subject_id).copied()
    }

    pub fn pending_subjects(&self) -> Vec<SubjectId> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn mark(&self, subject_id: SubjectId) -> VoteMark {
        self.marks.get(&subject_id).copied()
    }

    /// Sets the mark and returns the one it replaced.
    pub fn set_mark(&mut self, subject_id: SubjectId, mark: VoteMark) -> VoteMark {
        match mark {
            Some(direction) => self.marks.insert(subject_id, direction),
            None => self.marks.remove(&subject_id),
        }
    }
}

#[cfg(test)]
#[path = "tests/overlay_tests.rs"]
mod tests;
