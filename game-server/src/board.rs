//! The 19x19 board and the five-in-a-row check.

use protocol::{BOARD_SIZE, CELL_COUNT, Stone};

/// Horizontal, vertical, diagonal and anti-diagonal.
const DIRECTIONS: [(isize, isize); 4] = [(1, 0), (0, 1), (1, 1), (-1, 1)];

/// Length of a winning line.
const RUN_LENGTH: isize = 5;

/// The grid of one match. A cell goes from empty to a stone once and never back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    /// Cell (x, y) lives at `x * BOARD_SIZE + y`, the same order as on the wire.
    cells: [Stone; CELL_COUNT],
}

impl Default for Board {
    fn default() -> Self {
        Board {
            cells: [Stone::Empty; CELL_COUNT],
        }
    }
}

impl Board {
    /// Converts wire coordinates into board coordinates, `None` if off the board.
    pub fn locate(x: u32, y: u32) -> Option<(usize, usize)> {
        let (x, y) = (x as usize, y as usize);
        (x < BOARD_SIZE && y < BOARD_SIZE).then_some((x, y))
    }

    pub fn get(&self, x: usize, y: usize) -> Stone {
        self.cells[x * BOARD_SIZE + y]
    }

    /// Puts a stone on an empty cell. Returns false and leaves the board untouched if the
    /// cell is taken.
    pub fn place(&mut self, x: usize, y: usize, stone: Stone) -> bool {
        let cell = &mut self.cells[x * BOARD_SIZE + y];
        if *cell != Stone::Empty {
            return false;
        }
        *cell = stone;
        true
    }

    /// All cells in wire order.
    pub fn cells(&self) -> &[Stone] {
        &self.cells
    }

    pub fn stone_count(&self) -> usize {
        self.cells.iter().filter(|cell| **cell != Stone::Empty).count()
    }
}

/// Checks if the stone just placed at (x, y) is part of an unbroken line of five or more
/// stones of its color along any of the four axes.
///
/// Every window of five cells along an axis that contains (x, y) is inspected. Windows that
/// would leave the board are skipped before any cell is read.
pub fn completes_five(board: &Board, x: usize, y: usize, stone: Stone) -> bool {
    if stone == Stone::Empty {
        return false;
    }
    let (x, y) = (x as isize, y as isize);
    DIRECTIONS.iter().any(|&(dx, dy)| {
        (0..RUN_LENGTH).any(|back| window_matches(board, x - back * dx, y - back * dy, dx, dy, stone))
    })
}

fn window_matches(board: &Board, x: isize, y: isize, dx: isize, dy: isize, stone: Stone) -> bool {
    let (end_x, end_y) = (x + (RUN_LENGTH - 1) * dx, y + (RUN_LENGTH - 1) * dy);
    // A straight window is on the board iff both of its ends are.
    if !on_board(x, y) || !on_board(end_x, end_y) {
        return false;
    }
    (0..RUN_LENGTH).all(|step| board.get((x + step * dx) as usize, (y + step * dy) as usize) == stone)
}

fn on_board(x: isize, y: isize) -> bool {
    (0..BOARD_SIZE as isize).contains(&x) && (0..BOARD_SIZE as isize).contains(&y)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Places `count` stones starting at (x, y) along (dx, dy).
    fn line(board: &mut Board, x: isize, y: isize, (dx, dy): (isize, isize), count: isize, stone: Stone) {
        for step in 0..count {
            assert!(board.place((x + step * dx) as usize, (y + step * dy) as usize, stone));
        }
    }

    #[test]
    fn test_five_wins_in_every_direction() {
        let starts = [(3, 3), (3, 3), (3, 3), (10, 3)];
        for (&direction, &(x, y)) in DIRECTIONS.iter().zip(starts.iter()) {
            let mut board = Board::default();
            line(&mut board, x, y, direction, 5, Stone::Black);
            for step in 0..5 {
                let (px, py) = (x + step * direction.0, y + step * direction.1);
                assert!(
                    completes_five(&board, px as usize, py as usize, Stone::Black),
                    "direction {direction:?}, probe at step {step}"
                );
            }
        }
    }

    #[test]
    fn test_six_in_a_row_also_wins() {
        let mut board = Board::default();
        line(&mut board, 2, 7, (1, 0), 6, Stone::White);
        assert!(completes_five(&board, 7, 7, Stone::White));
        assert!(completes_five(&board, 4, 7, Stone::White));
    }

    #[test]
    fn test_four_with_blocked_ends_does_not_win() {
        let mut board = Board::default();
        line(&mut board, 5, 5, (1, 1), 4, Stone::Black);
        board.place(4, 4, Stone::White);
        board.place(9, 9, Stone::White);
        for step in 0..4 {
            assert!(!completes_five(&board, 5 + step, 5 + step, Stone::Black));
        }
    }

    #[test]
    fn test_four_with_empty_ends_does_not_win() {
        let mut board = Board::default();
        line(&mut board, 9, 2, (0, 1), 4, Stone::White);
        assert!(!completes_five(&board, 9, 5, Stone::White));
    }

    #[test]
    fn test_other_color_does_not_count() {
        let mut board = Board::default();
        line(&mut board, 0, 0, (1, 0), 5, Stone::Black);
        assert!(!completes_five(&board, 0, 0, Stone::White));
        assert!(!completes_five(&board, 0, 0, Stone::Empty));
    }

    #[test]
    fn test_lines_along_the_edges() {
        let mut board = Board::default();
        line(&mut board, 14, 18, (1, 0), 5, Stone::Black);
        assert!(completes_five(&board, 18, 18, Stone::Black));

        let mut board = Board::default();
        line(&mut board, 18, 0, (-1, 1), 5, Stone::White);
        assert!(completes_five(&board, 18, 0, Stone::White));
        assert!(completes_five(&board, 14, 4, Stone::White));
    }

    #[test]
    fn test_corner_stones_never_read_off_board() {
        let mut board = Board::default();
        for (x, y) in [(0, 0), (0, 18), (18, 0), (18, 18)] {
            board.place(x, y, Stone::Black);
            assert!(!completes_five(&board, x, y, Stone::Black));
        }
    }

    #[test]
    fn test_place_never_overwrites() {
        let mut board = Board::default();
        assert!(board.place(3, 4, Stone::Black));
        assert!(!board.place(3, 4, Stone::White));
        assert_eq!(board.get(3, 4), Stone::Black);
        assert_eq!(board.stone_count(), 1);
    }

    #[test]
    fn test_locate_bounds() {
        assert_eq!(Board::locate(0, 18), Some((0, 18)));
        assert_eq!(Board::locate(19, 0), None);
        assert_eq!(Board::locate(0, u32::MAX), None);
    }
}
