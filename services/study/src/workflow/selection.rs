//! services/study/src/workflow/selection.rs
//!
//! Bookkeeping for the set of note ids chosen from the candidate list.
//!
//! The set holds no reference to the candidate list itself; keeping the two
//! consistent is the consensus controller's job, which clears the selection
//! whenever it replaces the candidates (see `ConsensusState::replace_candidates`).

use std::collections::BTreeSet;

/// A set of selected note identifiers. Iteration order is ascending by id,
/// which keeps the synthesized request body deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: BTreeSet<i64>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips membership for one note id. Never fails.
    pub fn toggle(&mut self, note_id: i64) {
        if !self.ids.remove(&note_id) {
            self.ids.insert(note_id);
        }
    }

    /// Replaces the selection with exactly the given candidate ids.
    pub fn select_all(&mut self, candidate_ids: &[i64]) {
        self.ids = candidate_ids.iter().copied().collect();
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, note_id: i64) -> bool {
        self.ids.contains(&note_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether a "select all" control should act as "deselect all" instead.
    ///
    /// This is deliberately a coarse count comparison, not a per-id check: if
    /// a candidate id were swapped for another without the list length
    /// changing, a full-looking selection could contain an id that is no
    /// longer a candidate. In practice the candidate list only changes
    /// through a scope search, which clears the selection first.
    pub fn is_fully_selected(&self, candidate_ids: &[i64]) -> bool {
        self.ids.len() == candidate_ids.len()
    }

    /// The selected ids in ascending order.
    pub fn ids(&self) -> Vec<i64> {
        self.ids.iter().copied().collect()
    }
}
