use std::collections::VecDeque;

use geometry::{approx_eq, Coordinate, Path};

/// Snapshots beyond this are forgotten, oldest first
pub const MAX_HISTORY: usize = 100;

const SNAPSHOT_TOLERANCE: f64 = 1e-9;

/// Undo/redo over copies of the draft path. The newest snapshot always matches the current draft,
/// and the oldest starts out as the empty path.
pub struct History {
    // Oldest to newest
    undo: VecDeque<Path>,
    redo: Vec<Path>,
}

impl History {
    pub fn new() -> Self {
        let mut undo = VecDeque::new();
        undo.push_back(Vec::new());
        Self {
            undo,
            redo: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Remembers a new edit, unless nothing changed. Returns true if a snapshot was added. Any new
    /// edit means the redo stack is stale.
    pub fn record(&mut self, path: &[Coordinate]) -> bool {
        if let Some(last) = self.undo.back() {
            if same_path(last, path) {
                return false;
            }
        }
        self.push(path.to_vec());
        self.redo.clear();
        true
    }

    /// Returns the path to restore, or None if there's nothing to undo.
    pub fn undo(&mut self) -> Option<Path> {
        if self.undo.len() <= 1 {
            return None;
        }
        let current = self.undo.pop_back()?;
        self.redo.push(current);
        self.undo.back().cloned()
    }

    /// Returns the path to restore, or None if there's nothing to redo. Redoing doesn't clear the
    /// rest of the redo stack, so it can be repeated.
    pub fn redo(&mut self) -> Option<Path> {
        let path = self.redo.pop()?;
        self.push(path.clone());
        Some(path)
    }

    fn push(&mut self, path: Path) {
        self.undo.push_back(path);
        // TODO A ring buffer would avoid shuffling, but at 100 entries it doesn't matter
        while self.undo.len() > MAX_HISTORY {
            self.undo.pop_front();
        }
    }

    /// How many snapshots are stored, including the current one
    pub fn len(&self) -> usize {
        self.undo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo.is_empty()
    }

    /// How many times undo would do something
    pub fn undo_length(&self) -> usize {
        self.undo.len().saturating_sub(1)
    }

    pub fn redo_length(&self) -> usize {
        self.redo.len()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

fn same_path(a: &[Coordinate], b: &[Coordinate]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(a, b)| approx_eq(*a, *b, SNAPSHOT_TOLERANCE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(i: usize) -> Coordinate {
        Coordinate::new(-26.2 + 0.001 * (i as f64), 28.05)
    }

    fn path(n: usize) -> Path {
        (1..=n).map(pt).collect()
    }

    #[test]
    fn undo_redo_walk() {
        let mut history = History::new();
        for n in 1..=3 {
            assert!(history.record(&path(n)));
        }
        assert_eq!(history.undo(), Some(path(2)));
        assert_eq!(history.undo(), Some(path(1)));
        assert_eq!(history.redo(), Some(path(2)));
        assert_eq!(history.redo(), Some(path(3)));
        assert_eq!(history.redo(), None);

        assert_eq!(history.undo(), Some(path(2)));
        assert_eq!(history.undo(), Some(path(1)));
        assert_eq!(history.undo(), Some(Vec::new()));
        assert_eq!(history.undo(), None);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn new_edit_clears_redo() {
        let mut history = History::new();
        history.record(&path(1));
        history.record(&path(2));
        history.undo();
        assert_eq!(history.redo_length(), 1);
        history.record(&[pt(7)]);
        assert_eq!(history.redo_length(), 0);
        assert_eq!(history.redo(), None);
    }

    #[test]
    fn identical_snapshots_skipped() {
        let mut history = History::new();
        assert!(history.record(&path(2)));
        let mut nudged = path(2);
        nudged[1].lat += 1e-12;
        assert!(!history.record(&nudged));
        assert_eq!(history.len(), 2);

        nudged[1].lat += 1e-6;
        assert!(history.record(&nudged));
    }

    #[test]
    fn capped() {
        let mut history = History::new();
        for n in 1..=150 {
            history.record(&path(n));
            assert!(history.len() <= MAX_HISTORY);
        }
        assert_eq!(history.len(), MAX_HISTORY);
        // Undoing bottoms out at the oldest remembered snapshot, not the empty path
        let mut last = None;
        while let Some(p) = history.undo() {
            last = Some(p);
        }
        assert_eq!(last, Some(path(51)));
    }
}
