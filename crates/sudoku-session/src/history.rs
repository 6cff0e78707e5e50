//! Snapshot-based undo/redo.
//!
//! Each entry is a full copy of the board, cursor and metadata. 81 cells is
//! small enough that diffing would buy nothing.

use crate::grid::{Grid, Position};
use crate::session::SessionMeta;
use std::collections::VecDeque;

/// Default depth of each history stack
pub const MAX_STACK: usize = 100;

/// An immutable capture of the session at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    grid: Grid,
    selection: Position,
    meta: SessionMeta,
}

impl Snapshot {
    pub fn new(grid: Grid, selection: Position, meta: SessionMeta) -> Self {
        Self { grid, selection, meta }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn selection(&self) -> Position {
        self.selection
    }

    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    pub(crate) fn into_parts(self) -> (Grid, Position, SessionMeta) {
        (self.grid, self.selection, self.meta)
    }
}

/// Bounded undo and redo stacks. When a stack is full the oldest entry is dropped.
#[derive(Debug, Clone)]
pub struct History {
    undo_stack: VecDeque<Snapshot>,
    redo_stack: VecDeque<Snapshot>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(MAX_STACK)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            undo_stack: VecDeque::with_capacity(capacity),
            redo_stack: VecDeque::new(),
            capacity,
        }
    }

    /// Push the pre-mutation state. Any new edit invalidates the redo stack.
    pub fn record(&mut self, before: Snapshot) {
        push_bounded(&mut self.undo_stack, before, self.capacity);
        self.redo_stack.clear();
    }

    /// Step back. `current` goes onto the redo stack and the state to restore
    /// is returned; `None` (and no change) when there is nothing to undo.
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let previous = self.undo_stack.pop_back()?;
        push_bounded(&mut self.redo_stack, current, self.capacity);
        Some(previous)
    }

    /// Step forward again, mirroring [`History::undo`]
    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let next = self.redo_stack.pop_back()?;
        push_bounded(&mut self.undo_stack, current, self.capacity);
        Some(next)
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest snapshot still reachable by undo
    pub fn oldest(&self) -> Option<&Snapshot> {
        self.undo_stack.front()
    }
}

fn push_bounded(stack: &mut VecDeque<Snapshot>, snapshot: Snapshot, capacity: usize) {
    stack.push_back(snapshot);
    while stack.len() > capacity {
        stack.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snapshot_with(value: u8) -> Snapshot {
        let mut grid = Grid::new();
        grid.set_value(Position::new(0, 0), value % 10);
        grid.set_value(Position::new(0, 1), value / 10 % 10);
        grid.set_value(Position::new(0, 2), value / 100 % 10);
        Snapshot::new(grid, Position::new(0, 0), SessionMeta::default())
    }

    #[test]
    fn test_undo_on_empty_is_noop() {
        let mut history = History::default();
        assert_eq!(history.undo(snapshot_with(1)), None);
        assert_eq!(history.redo_len(), 0);
        assert_eq!(history.redo(snapshot_with(1)), None);
        assert_eq!(history.undo_len(), 0);
    }

    #[test]
    fn test_undo_redo_swap_states() {
        let mut history = History::default();
        history.record(snapshot_with(1));

        let restored = history.undo(snapshot_with(2)).unwrap();
        assert_eq!(restored, snapshot_with(1));
        assert!(history.can_redo());
        assert!(!history.can_undo());

        let again = history.redo(snapshot_with(1)).unwrap();
        assert_eq!(again, snapshot_with(2));
        assert_eq!(history.undo_len(), 1);
        assert_eq!(history.redo_len(), 0);
    }

    #[test]
    fn test_record_clears_redo() {
        let mut history = History::default();
        history.record(snapshot_with(1));
        history.undo(snapshot_with(2));
        assert!(history.can_redo());

        history.record(snapshot_with(1));
        assert!(!history.can_redo());
        assert_eq!(history.redo(snapshot_with(3)), None);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut history = History::new(MAX_STACK);
        for i in 0..105 {
            history.record(snapshot_with(i));
        }
        assert_eq!(history.undo_len(), 100);
        // entries 0..5 were evicted
        assert_eq!(history.oldest(), Some(&snapshot_with(5)));
    }

    #[test]
    fn test_redo_stack_is_bounded() {
        let mut history = History::new(3);
        for i in 0..3 {
            history.record(snapshot_with(i));
        }
        for i in 10..13 {
            history.undo(snapshot_with(i));
        }
        assert_eq!(history.redo_len(), 3);
        assert_eq!(history.undo_len(), 0);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let history = History::new(0);
        assert_eq!(history.capacity(), 1);
    }
}
