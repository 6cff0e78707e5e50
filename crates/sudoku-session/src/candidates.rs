//! Row/column/box constraint checks against the live board.
//!
//! Everything here is a pure read of a [`Grid`]; results are never cached
//! because they must reflect the board as it is right now.

use crate::grid::{DigitSet, Grid, Position, SIZE};

/// Whether `digit` could go at `pos` without repeating in its row, column or box.
/// The cell's own value is not excluded, so only ask this of empty cells.
pub fn is_allowed(grid: &Grid, pos: Position, digit: u8) -> bool {
    for i in 0..SIZE {
        if grid.get(Position::new(pos.row, i)) == digit || grid.get(Position::new(i, pos.col)) == digit {
            return false;
        }
    }

    let origin = pos.box_origin();
    for row in origin.row..origin.row + 3 {
        for col in origin.col..origin.col + 3 {
            if grid.get(Position::new(row, col)) == digit {
                return false;
            }
        }
    }
    true
}

/// Digits that can legally go in an empty cell. Filled cells have none.
pub fn candidates(grid: &Grid, pos: Position) -> DigitSet {
    if grid.get(pos) != 0 {
        return DigitSet::empty();
    }
    (1..=9u8).filter(|&d| is_allowed(grid, pos, d)).collect()
}

/// The value for `pos` when exactly one candidate remains
pub fn sole_candidate(grid: &Grid, pos: Position) -> Option<u8> {
    candidates(grid, pos).single_value()
}

/// First naked single in row-major order
pub fn first_single(grid: &Grid) -> Option<(Position, u8)> {
    Position::all().find_map(|pos| sole_candidate(grid, pos).map(|value| (pos, value)))
}

/// Cells whose value is repeated somewhere in the same row, column or box.
/// Every cell taking part in a repeat is reported once, in row-major order.
pub fn conflicts(grid: &Grid) -> Vec<Position> {
    Position::all()
        .filter(|&pos| {
            let value = grid.get(pos);
            value != 0 && peers(pos).any(|peer| grid.get(peer) == value)
        })
        .collect()
}

/// Every other cell sharing a row, column or box with `pos`
fn peers(pos: Position) -> impl Iterator<Item = Position> {
    Position::all().filter(move |&other| {
        other != pos && (other.row == pos.row || other.col == pos.col || other.box_index() == pos.box_index())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn grid_from(rows: &[&str]) -> Grid {
        let values: Vec<Vec<u8>> = rows
            .iter()
            .map(|row| row.chars().map(|c| c.to_digit(10).unwrap_or(0) as u8).collect())
            .collect();
        Grid::from_values(&values)
    }

    #[test]
    fn test_empty_board_allows_everything() {
        let grid = Grid::new();
        assert_eq!(candidates(&grid, Position::new(4, 4)), DigitSet::full());
    }

    #[test]
    fn test_row_column_and_box_exclusions() {
        let grid = grid_from(&[
            "020000003", // row 0: 2 and 3
            "000000000",
            "004000000", // box (0,0): 4
            "000000000",
            "500000000", // column 0: 5
            "000000000",
            "000000000",
            "000000000",
            "000000000",
        ]);
        assert_eq!(candidates(&grid, Position::new(0, 0)).to_string(), "16789");
    }

    #[test]
    fn test_filled_cell_has_no_candidates() {
        let grid = grid_from(&["7"]);
        assert!(candidates(&grid, Position::new(0, 0)).is_empty());
    }

    #[test]
    fn test_sole_candidate() {
        // row has 2..5, column has 6..8, box has 9
        let grid = grid_from(&[
            "023450000",
            "000000000",
            "090000000",
            "600000000",
            "700000000",
            "800000000",
            "000000000",
            "000000000",
            "000000000",
        ]);
        assert_eq!(sole_candidate(&grid, Position::new(0, 0)), Some(1));
        assert_eq!(first_single(&grid), Some((Position::new(0, 0), 1)));
    }

    #[test]
    fn test_conflicts_reports_all_repeats() {
        let grid = grid_from(&[
            "500000005",
            "000000000",
            "050000000",
        ]);
        assert_eq!(
            conflicts(&grid),
            vec![Position::new(0, 0), Position::new(0, 8), Position::new(2, 1)]
        );
        assert!(conflicts(&Grid::new()).is_empty());
    }

    proptest! {
        #[test]
        fn prop_candidates_are_allowed_and_absent_when_filled(cells in proptest::collection::vec(0u8..=9, 81), row in 0usize..9, col in 0usize..9) {
            let values: Vec<Vec<u8>> = cells.chunks(9).map(|c| c.to_vec()).collect();
            let grid = Grid::from_values(&values);
            let pos = Position::new(row, col);
            let set = candidates(&grid, pos);
            if grid.get(pos) != 0 {
                prop_assert!(set.is_empty());
            }
            for digit in set.iter() {
                prop_assert!(is_allowed(&grid, pos, digit));
            }
        }
    }
}
