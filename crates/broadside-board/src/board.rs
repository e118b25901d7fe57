//! Game board state: ship occupancy, hits and misses.

use crate::ship::{Ship, ShipType};
use crate::{BoardError, Coord, Orientation, BOARD_SIZE};

/// State of a single grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Ship,
    Hit,
    Miss,
}

impl Cell {
    /// Glyph shown to players. Unhit ships look like open water.
    pub fn glyph(self) -> char {
        match self {
            Cell::Empty | Cell::Ship => '.',
            Cell::Hit => 'X',
            Cell::Miss => 'o',
        }
    }
}

/// Result of firing at a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotResult {
    /// The shot struck an unhit ship segment.
    Hit,
    /// The shot landed in open water.
    Miss,
    /// The cell was already resolved; nothing changed.
    AlreadyShot,
}

impl ShotResult {
    /// Upper-case wire form: `HIT`, `MISS` or `ALREADY_SHOT`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::AlreadyShot => "ALREADY_SHOT",
        }
    }
}

/// A 10×10 grid and the ships placed on it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Board {
    cells: [[Cell; BOARD_SIZE]; BOARD_SIZE],
    ships: Vec<Ship>,
}

impl Board {
    /// Create an empty board (no ships placed).
    pub fn new() -> Self {
        Self::default()
    }

    /// State of one cell.
    pub fn cell(&self, coord: Coord) -> Cell {
        self.cells[coord.row][coord.col]
    }

    /// Ships placed so far.
    pub fn ships(&self) -> &[Ship] {
        &self.ships
    }

    /// Returns `true` if a ship of `length` starting at `origin` stays on
    /// the grid and touches no other ship.
    pub fn can_place_ship(&self, origin: Coord, length: usize, orientation: Orientation) -> bool {
        self.run(origin, length, orientation).is_some()
    }

    /// Place a ship, committing every cell or none of them.
    pub fn do_place_ship(
        &mut self,
        ship_type: ShipType,
        origin: Coord,
        orientation: Orientation,
    ) -> Result<(), BoardError> {
        let cells = self
            .run(origin, ship_type.length(), orientation)
            .ok_or(BoardError::Blocked {
                ship: ship_type.name(),
                origin,
            })?;

        for coord in &cells {
            self.cells[coord.row][coord.col] = Cell::Ship;
        }
        self.ships
            .push(Ship::new(ship_type, origin, orientation, &cells));
        Ok(())
    }

    /// Process a shot at `coord`, marking a hit or a miss.
    ///
    /// Returns the sunk ship's name alongside `Hit` when this shot removed
    /// its last remaining cell. A cell that was already hit or missed
    /// returns `AlreadyShot` and leaves the board untouched.
    pub fn fire_at(&mut self, coord: Coord) -> (ShotResult, Option<&'static str>) {
        let cell = &mut self.cells[coord.row][coord.col];
        match *cell {
            Cell::Hit | Cell::Miss => (ShotResult::AlreadyShot, None),
            Cell::Empty => {
                *cell = Cell::Miss;
                (ShotResult::Miss, None)
            }
            Cell::Ship => {
                *cell = Cell::Hit;
                let mut sunk = None;
                for ship in self.ships.iter_mut() {
                    if ship.hit(coord) {
                        if ship.is_sunk() {
                            sunk = Some(ship.name());
                        }
                        break;
                    }
                }
                (ShotResult::Hit, sunk)
            }
        }
    }

    /// Returns `true` when every placed ship is sunk.
    pub fn all_ships_sunk(&self) -> bool {
        self.ships.iter().all(Ship::is_sunk)
    }

    /// Text rendering sent in answer to SHOW.
    ///
    /// A header row of column numbers, then one row per letter. Ships that
    /// have not been hit are drawn as open water.
    pub fn render(&self) -> String {
        let header: Vec<String> = (1..=BOARD_SIZE).map(|n| format!("{n:>2}")).collect();
        let mut out = format!("    {}\n", header.join("  "));

        for (r, row) in self.cells.iter().enumerate() {
            let glyphs: Vec<String> = row.iter().map(|c| c.glyph().to_string()).collect();
            let label = (b'A' + r as u8) as char;
            out.push_str(&format!("{label}   {}\n", glyphs.join("  ")));
        }
        out
    }

    /// Cells a ship would cover, or `None` if any is off-grid or occupied.
    fn run(&self, origin: Coord, length: usize, orientation: Orientation) -> Option<Vec<Coord>> {
        (0..length)
            .map(|step| {
                origin
                    .offset(orientation, step)
                    .filter(|c| self.cell(*c) == Cell::Empty)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FLEET;

    fn at(text: &str) -> Coord {
        Coord::parse(text).unwrap()
    }

    #[test]
    fn test_can_place_ship_rejects_edge_overflow() {
        let board = Board::new();
        assert!(board.can_place_ship(at("A6"), 5, Orientation::Horizontal));
        assert!(!board.can_place_ship(at("A7"), 5, Orientation::Horizontal));
        assert!(!board.can_place_ship(at("G1"), 5, Orientation::Vertical));
    }

    #[test]
    fn test_do_place_ship_overlap_leaves_board_unchanged() {
        let mut board = Board::new();
        board
            .do_place_ship(FLEET[0], at("C1"), Orientation::Horizontal)
            .unwrap();
        let before = board.clone();

        // Vertical run through C3 crosses the carrier.
        let err = board
            .do_place_ship(FLEET[1], at("A3"), Orientation::Vertical)
            .unwrap_err();

        assert!(matches!(err, BoardError::Blocked { ship: "Battleship", .. }));
        assert_eq!(board, before, "failed placement must not mark any cell");
    }

    #[test]
    fn test_render_header_and_glyphs() {
        let mut board = Board::new();
        board
            .do_place_ship(FLEET[4], at("A1"), Orientation::Horizontal)
            .unwrap();
        board.fire_at(at("A1"));
        board.fire_at(at("B2"));

        let text = board.render();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 11);
        assert!(lines[0].starts_with("     1   2   3"));
        assert!(lines[0].ends_with("10"));
        assert_eq!(lines[1], "A   X  .  .  .  .  .  .  .  .  .");
        assert_eq!(lines[2], "B   .  o  .  .  .  .  .  .  .  .");
        assert_eq!(text.len(), 373);
    }

    #[test]
    fn test_all_ships_sunk_tracks_every_ship() {
        let mut board = Board::new();
        board
            .do_place_ship(FLEET[4], at("A1"), Orientation::Horizontal)
            .unwrap();
        board
            .do_place_ship(FLEET[4], at("C1"), Orientation::Vertical)
            .unwrap();

        board.fire_at(at("A1"));
        board.fire_at(at("A2"));
        assert!(!board.all_ships_sunk());

        board.fire_at(at("C1"));
        assert_eq!(board.fire_at(at("D1")), (ShotResult::Hit, Some("Destroyer")));
        assert!(board.all_ships_sunk());
    }
}
