//! Board storage: 81 cells holding a value, a given flag and pencil notes.
//!
//! The grid is a plain value type. It knows nothing about history, timers or
//! persistence; the session controller decides when a mutation is recorded.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Width and height of the board.
pub const SIZE: usize = 9;

/// Number of cells on the board.
pub const CELL_COUNT: usize = SIZE * SIZE;

/// A (row, col) coordinate on the board, both in `0..9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    /// Create a position, clamping both coordinates onto the board
    pub fn new(row: usize, col: usize) -> Self {
        Self {
            row: row.min(SIZE - 1),
            col: col.min(SIZE - 1),
        }
    }

    /// Create a position only if both coordinates are on the board
    pub fn checked(row: usize, col: usize) -> Option<Self> {
        (row < SIZE && col < SIZE).then_some(Self { row, col })
    }

    /// Index of the 3x3 box containing this position (0..9, row-major)
    pub fn box_index(&self) -> usize {
        (self.row / 3) * 3 + (self.col / 3)
    }

    /// Top-left corner of the containing 3x3 box
    pub fn box_origin(&self) -> Position {
        Position {
            row: (self.row / 3) * 3,
            col: (self.col / 3) * 3,
        }
    }

    /// Move by a delta, wrapping around the board edges
    pub fn offset_wrapping(self, row_delta: i32, col_delta: i32) -> Self {
        let size = SIZE as i32;
        Self {
            row: (self.row as i32 + row_delta).rem_euclid(size) as usize,
            col: (self.col as i32 + col_delta).rem_euclid(size) as usize,
        }
    }

    /// Every position in row-major order
    pub fn all() -> impl Iterator<Item = Position> {
        (0..CELL_COUNT).map(|i| Position {
            row: i / SIZE,
            col: i % SIZE,
        })
    }

    fn index(&self) -> usize {
        self.row * SIZE + self.col
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}c{}", self.row + 1, self.col + 1)
    }
}

/// A set of digits 1-9 stored as a bitmask (bit `d` set means digit `d` present).
///
/// Used both for manual notes and for computed candidates. The canonical text
/// form is the sorted digits with no separator, e.g. `"137"`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DigitSet(u16);

impl DigitSet {
    const MASK: u16 = 0b11_1111_1110;

    pub const fn empty() -> Self {
        Self(0)
    }

    /// All nine digits
    pub const fn full() -> Self {
        Self(Self::MASK)
    }

    pub fn single(digit: u8) -> Self {
        let mut set = Self::empty();
        set.insert(digit);
        set
    }

    /// Build from raw bits; bits outside 1..=9 are dropped
    pub fn from_raw(bits: u16) -> Self {
        Self(bits & Self::MASK)
    }

    pub fn as_raw(&self) -> u16 {
        self.0
    }

    pub fn contains(&self, digit: u8) -> bool {
        Self::is_digit(digit) && self.0 & (1 << digit) != 0
    }

    pub fn insert(&mut self, digit: u8) {
        if Self::is_digit(digit) {
            self.0 |= 1 << digit;
        }
    }

    pub fn remove(&mut self, digit: u8) {
        if Self::is_digit(digit) {
            self.0 &= !(1 << digit);
        }
    }

    /// Flip membership of `digit`. Returns false (and does nothing) for digits outside 1-9.
    pub fn toggle(&mut self, digit: u8) -> bool {
        if !Self::is_digit(digit) {
            return false;
        }
        self.0 ^= 1 << digit;
        true
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// The only member, if the set has exactly one
    pub fn single_value(&self) -> Option<u8> {
        (self.len() == 1).then(|| self.0.trailing_zeros() as u8)
    }

    /// Digits in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (1..=9u8).filter(move |d| self.contains(*d))
    }

    /// Parse the canonical text form. Anything that is not a digit 1-9 is ignored,
    /// so `"931"`, `"1 3 9"` and `"1,3,9,0"` all give `{1, 3, 9}`.
    pub fn parse(text: &str) -> Self {
        text.chars()
            .filter_map(|c| c.to_digit(10))
            .fold(Self::empty(), |mut set, d| {
                set.insert(d as u8);
                set
            })
    }

    fn is_digit(digit: u8) -> bool {
        (1..=9).contains(&digit)
    }
}

impl FromIterator<u8> for DigitSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = Self::empty();
        for digit in iter {
            set.insert(digit);
        }
        set
    }
}

impl fmt::Display for DigitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for digit in self.iter() {
            write!(f, "{}", digit)?;
        }
        Ok(())
    }
}

impl fmt::Debug for DigitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DigitSet(\"{}\")", self)
    }
}

/// A single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cell {
    value: u8,
    fixed: bool,
    notes: DigitSet,
}

impl Cell {
    /// Current value, 0 when empty
    pub fn value(&self) -> u8 {
        self.value
    }

    /// Whether this cell is part of the original puzzle
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Manual notes. These are kept even while the cell holds a value.
    pub fn notes(&self) -> DigitSet {
        self.notes
    }

    pub fn is_empty(&self) -> bool {
        self.value == 0
    }
}

/// Plain nested-array form of the grid, used for bulk transfer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoardData {
    pub values: Vec<Vec<u8>>,
    pub fixed: Vec<Vec<bool>>,
    pub notes: Vec<Vec<String>>,
}

/// The 9x9 cell matrix
#[derive(Clone, PartialEq, Eq)]
pub struct Grid {
    cells: [Cell; CELL_COUNT],
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}

impl Grid {
    /// An empty board: every cell 0, unfixed, no notes
    pub fn new() -> Self {
        Self {
            cells: [Cell::default(); CELL_COUNT],
        }
    }

    /// Build an unfixed board from a value matrix (partial input is padded with 0)
    pub fn from_values(values: &[Vec<u8>]) -> Self {
        let mut grid = Self::new();
        grid.load(values, &[], None);
        grid
    }

    pub fn cell(&self, pos: Position) -> &Cell {
        &self.cells[pos.index()]
    }

    pub fn get(&self, pos: Position) -> u8 {
        self.cell(pos).value
    }

    pub fn notes(&self, pos: Position) -> DigitSet {
        self.cell(pos).notes
    }

    pub fn is_fixed(&self, pos: Position) -> bool {
        self.cell(pos).fixed
    }

    /// Set a value. Fixed cells are left alone (returns false). The value is
    /// clamped to 0-9 and a nonzero value clears the cell's notes.
    pub fn set_value(&mut self, pos: Position, value: u8) -> bool {
        let cell = &mut self.cells[pos.index()];
        if cell.fixed {
            return false;
        }
        cell.value = value.min(9);
        if cell.value != 0 {
            cell.notes = DigitSet::empty();
        }
        true
    }

    /// Flip a note digit. Fixed cells and digits outside 1-9 are ignored.
    /// Notes may be toggled under a value; they stay hidden until it is cleared.
    pub fn toggle_note(&mut self, pos: Position, digit: u8) -> bool {
        let cell = &mut self.cells[pos.index()];
        if cell.fixed {
            return false;
        }
        cell.notes.toggle(digit)
    }

    /// Mark or unmark a cell as a given. Only used when a puzzle is installed.
    pub fn set_fixed(&mut self, pos: Position, fixed: bool) {
        self.cells[pos.index()].fixed = fixed;
    }

    /// Overwrite the values of every unfixed cell, leaving fixed cells and all
    /// given flags untouched. Follows `set_value` semantics per cell.
    pub fn replace_values(&mut self, values: &[Vec<u8>]) {
        for pos in Position::all() {
            let value = lookup(values, pos).copied().unwrap_or(0);
            self.set_value(pos, value);
        }
    }

    /// Bulk replace all 81 cells. Missing rows/cells default to empty, unfixed
    /// and without notes; out-of-range values are clamped.
    pub fn load(&mut self, values: &[Vec<u8>], fixed: &[Vec<bool>], notes: Option<&[Vec<String>]>) {
        for pos in Position::all() {
            self.cells[pos.index()] = Cell {
                value: lookup(values, pos).copied().unwrap_or(0).min(9),
                fixed: lookup(fixed, pos).copied().unwrap_or(false),
                notes: notes
                    .and_then(|n| lookup(n, pos))
                    .map(|text| DigitSet::parse(text))
                    .unwrap_or_default(),
            };
        }
    }

    /// Export values, given flags and canonical note strings
    pub fn serialize(&self) -> BoardData {
        BoardData {
            values: self.values(),
            fixed: self.fixed_flags(),
            notes: self.note_strings(),
        }
    }

    pub fn values(&self) -> Vec<Vec<u8>> {
        self.rows(|cell| cell.value)
    }

    pub fn fixed_flags(&self) -> Vec<Vec<bool>> {
        self.rows(|cell| cell.fixed)
    }

    pub fn note_strings(&self) -> Vec<Vec<String>> {
        self.rows(|cell| cell.notes.to_string())
    }

    /// Number of cells holding a value
    pub fn filled_count(&self) -> usize {
        self.cells.iter().filter(|c| c.value != 0).count()
    }

    pub fn is_full(&self) -> bool {
        self.filled_count() == CELL_COUNT
    }

    fn rows<T>(&self, f: impl Fn(&Cell) -> T) -> Vec<Vec<T>> {
        self.cells.chunks(SIZE).map(|row| row.iter().map(&f).collect()).collect()
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Grid {{")?;
        for row in self.cells.chunks(SIZE) {
            let line: String = row
                .iter()
                .map(|c| if c.value == 0 { '.' } else { (b'0' + c.value) as char })
                .collect();
            writeln!(f, "    {}", line)?;
        }
        write!(f, "}}")
    }
}

fn lookup<T>(rows: &[Vec<T>], pos: Position) -> Option<&T> {
    rows.get(pos.row).and_then(|row| row.get(pos.col))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_position_wraps() {
        let origin = Position::new(0, 0);
        assert_eq!(origin.offset_wrapping(-1, 0), Position::new(8, 0));
        assert_eq!(origin.offset_wrapping(0, -1), Position::new(0, 8));
        assert_eq!(Position::new(8, 8).offset_wrapping(1, 1), origin);
        assert_eq!(origin.offset_wrapping(-10, 19), Position::new(8, 1));
    }

    #[test]
    fn test_position_clamps_and_boxes() {
        assert_eq!(Position::new(12, 40), Position::new(8, 8));
        assert_eq!(Position::checked(9, 0), None);
        assert_eq!(Position::new(4, 7).box_index(), 5);
        assert_eq!(Position::new(4, 7).box_origin(), Position::new(3, 6));
    }

    #[test]
    fn test_digit_set_text_form() {
        let set = DigitSet::parse("931");
        assert_eq!(set.to_string(), "139");
        assert_eq!(DigitSet::parse("1, 3, 0, x9"), set);
        assert_eq!(set.len(), 3);
        assert_eq!(DigitSet::single(4).single_value(), Some(4));
        assert_eq!(DigitSet::full().len(), 9);
    }

    #[test]
    fn test_digit_set_ignores_out_of_range() {
        let mut set = DigitSet::empty();
        assert!(!set.toggle(0));
        assert!(!set.toggle(10));
        set.insert(0);
        assert!(set.is_empty());
        assert_eq!(DigitSet::from_raw(0xFFFF), DigitSet::full());
    }

    #[test]
    fn test_set_value_clears_notes() {
        let mut grid = Grid::new();
        let pos = Position::new(2, 3);
        grid.toggle_note(pos, 4);
        grid.toggle_note(pos, 7);
        assert_eq!(grid.notes(pos).to_string(), "47");

        assert!(grid.set_value(pos, 5));
        assert_eq!(grid.get(pos), 5);
        assert!(grid.notes(pos).is_empty());
    }

    #[test]
    fn test_clearing_value_keeps_notes() {
        let mut grid = Grid::new();
        let pos = Position::new(0, 0);
        grid.set_value(pos, 3);
        // notes toggled under a value survive and reappear once it is cleared
        grid.toggle_note(pos, 2);
        assert_eq!(grid.notes(pos).to_string(), "2");
        grid.set_value(pos, 0);
        assert_eq!(grid.notes(pos).to_string(), "2");
    }

    #[test]
    fn test_set_value_clamps() {
        let mut grid = Grid::new();
        let pos = Position::new(1, 1);
        grid.set_value(pos, 200);
        assert_eq!(grid.get(pos), 9);
    }

    #[test]
    fn test_load_partial_input_defaults() {
        let mut grid = Grid::new();
        grid.set_value(Position::new(8, 8), 4);

        let values = vec![vec![5, 3], vec![], vec![0, 0, 12]];
        let fixed = vec![vec![true]];
        let notes = vec![vec![String::new(), "21".to_string()]];
        grid.load(&values, &fixed, Some(&notes));

        assert_eq!(grid.get(Position::new(0, 0)), 5);
        assert!(grid.is_fixed(Position::new(0, 0)));
        assert!(!grid.is_fixed(Position::new(0, 1)));
        assert_eq!(grid.notes(Position::new(0, 1)).to_string(), "12");
        assert_eq!(grid.get(Position::new(2, 2)), 9);
        assert_eq!(grid.get(Position::new(8, 8)), 0);
        assert_eq!(grid.filled_count(), 3);
    }

    #[test]
    fn test_serialize_shape() {
        let mut grid = Grid::new();
        grid.set_value(Position::new(0, 0), 7);
        grid.set_fixed(Position::new(0, 0), true);
        grid.toggle_note(Position::new(0, 1), 9);
        grid.toggle_note(Position::new(0, 1), 1);

        let data = grid.serialize();
        assert_eq!(data.values.len(), 9);
        assert!(data.values.iter().all(|row| row.len() == 9));
        assert_eq!(data.values[0][0], 7);
        assert!(data.fixed[0][0]);
        assert_eq!(data.notes[0][1], "19");

        let mut copy = Grid::new();
        copy.load(&data.values, &data.fixed, Some(&data.notes));
        assert_eq!(copy, grid);
    }

    #[test]
    fn test_replace_values_skips_fixed() {
        let mut grid = Grid::new();
        let given = Position::new(0, 0);
        grid.set_value(given, 1);
        grid.set_fixed(given, true);

        let mut values = vec![vec![0u8; 9]; 9];
        values[0][0] = 9;
        values[0][1] = 2;
        grid.replace_values(&values);

        assert_eq!(grid.get(given), 1);
        assert!(grid.is_fixed(given));
        assert_eq!(grid.get(Position::new(0, 1)), 2);
    }

    proptest! {
        #[test]
        fn prop_set_value_clamps_and_clears(row in 0usize..9, col in 0usize..9, value in any::<u8>(), note in 1u8..=9) {
            let mut grid = Grid::new();
            let pos = Position::new(row, col);
            grid.toggle_note(pos, note);
            grid.set_value(pos, value);
            let expected = value.min(9);
            prop_assert_eq!(grid.get(pos), expected);
            if expected != 0 {
                prop_assert!(grid.notes(pos).is_empty());
            }
        }

        #[test]
        fn prop_fixed_cells_ignore_edits(row in 0usize..9, col in 0usize..9, value in 0u8..=9, edit in any::<u8>(), digit in any::<u8>()) {
            let mut grid = Grid::new();
            let pos = Position::new(row, col);
            grid.set_value(pos, value);
            grid.set_fixed(pos, true);
            let before = *grid.cell(pos);

            prop_assert!(!grid.set_value(pos, edit));
            prop_assert!(!grid.toggle_note(pos, digit));
            prop_assert_eq!(*grid.cell(pos), before);
        }
    }
}
