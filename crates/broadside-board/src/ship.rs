//! Ship definitions, the fleet roster, and per-ship hit tracking.

use std::collections::BTreeSet;

use crate::{Coord, Orientation};

/// Type of ship: name and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipType {
    name: &'static str,
    length: usize,
}

impl ShipType {
    /// Create a new ship type.
    pub const fn new(name: &'static str, length: usize) -> Self {
        Self { name, length }
    }

    /// Ship's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Ship's length.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Looks up a roster entry by name, ignoring case.
    pub fn lookup(name: &str) -> Option<Self> {
        FLEET
            .iter()
            .copied()
            .find(|ship| ship.name.eq_ignore_ascii_case(name.trim()))
    }
}

/// Every player places exactly these ships, in any order.
pub const FLEET: [ShipType; 5] = [
    ShipType::new("Carrier", 5),
    ShipType::new("Battleship", 4),
    ShipType::new("Cruiser", 3),
    ShipType::new("Submarine", 3),
    ShipType::new("Destroyer", 2),
];

/// A ship placed on the board.
///
/// `remaining` starts as every cell the ship covers and loses one cell per
/// hit. It never grows back, so once empty the ship stays sunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ship {
    ship_type: ShipType,
    origin: Coord,
    orientation: Orientation,
    remaining: BTreeSet<Coord>,
}

impl Ship {
    pub(crate) fn new(ship_type: ShipType, origin: Coord, orientation: Orientation, cells: &[Coord]) -> Self {
        Self {
            ship_type,
            origin,
            orientation,
            remaining: cells.iter().copied().collect(),
        }
    }

    /// Ship's type.
    pub fn ship_type(&self) -> ShipType {
        self.ship_type
    }

    /// Ship's name.
    pub fn name(&self) -> &'static str {
        self.ship_type.name()
    }

    /// Where the ship starts.
    pub fn origin(&self) -> Coord {
        self.origin
    }

    /// Orientation of the ship.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Cells not yet hit.
    pub fn remaining(&self) -> &BTreeSet<Coord> {
        &self.remaining
    }

    /// `true` once every cell has been hit.
    pub fn is_sunk(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Removes `coord` from the remaining cells. Returns `true` if the ship
    /// covered that cell and it had not been hit before.
    pub(crate) fn hit(&mut self, coord: Coord) -> bool {
        self.remaining.remove(&coord)
    }
}
