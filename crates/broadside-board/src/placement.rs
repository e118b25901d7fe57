//! One player's fleet layout: the board plus which roster ships are down.

use rand::Rng;

use crate::{Board, BoardError, Coord, Orientation, ShipType, BOARD_SIZE, FLEET};

/// Attempts per ship before random placement gives up.
const RANDOM_ATTEMPTS: usize = 100;

/// A player's board and the roster of ships placed on it so far.
///
/// Cloning a `Placement` gives an independent snapshot, which is what the
/// reconnection registry keeps for a dropped player.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Placement {
    board: Board,
    placed: Vec<&'static str>,
}

impl Placement {
    /// Empty board, nothing placed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Places the roster ship called `ship_name` (any case).
    ///
    /// Returns the ship's canonical name on success. Fails without touching
    /// the board if the name is unknown, the ship is already down, or any
    /// cell of the run is off-grid or taken.
    pub fn place(
        &mut self,
        ship_name: &str,
        origin: Coord,
        orientation: Orientation,
    ) -> Result<&'static str, BoardError> {
        let ship_type = ShipType::lookup(ship_name)
            .ok_or_else(|| BoardError::UnknownShip(ship_name.trim().to_string()))?;
        if self.placed.contains(&ship_type.name()) {
            return Err(BoardError::AlreadyPlaced(ship_type.name()));
        }

        self.board.do_place_ship(ship_type, origin, orientation)?;
        self.placed.push(ship_type.name());
        Ok(ship_type.name())
    }

    /// Lays out every ship not yet placed at random free positions.
    ///
    /// Returns the names that were placed. Ships already down stay where
    /// the player put them.
    pub fn place_remaining<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<Vec<&'static str>, BoardError> {
        let mut newly_placed = Vec::new();
        for ship_type in FLEET {
            if self.placed.contains(&ship_type.name()) {
                continue;
            }
            let (origin, orientation) = self.random_spot(rng, ship_type)?;
            self.board.do_place_ship(ship_type, origin, orientation)?;
            self.placed.push(ship_type.name());
            newly_placed.push(ship_type.name());
        }
        Ok(newly_placed)
    }

    /// `true` once every roster ship is on the board.
    pub fn is_complete(&self) -> bool {
        self.placed.len() == FLEET.len()
    }

    /// Names of roster ships still to be placed, in roster order.
    pub fn remaining_ships(&self) -> Vec<&'static str> {
        FLEET
            .iter()
            .map(ShipType::name)
            .filter(|name| !self.placed.contains(name))
            .collect()
    }

    /// Names of ships placed so far, in placement order.
    pub fn placed_ships(&self) -> &[&'static str] {
        &self.placed
    }

    /// The underlying board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Mutable access for firing.
    pub fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    /// Clears the board and the roster.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn random_spot<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        ship_type: ShipType,
    ) -> Result<(Coord, Orientation), BoardError> {
        for _ in 0..RANDOM_ATTEMPTS {
            let orientation = if rng.random_bool(0.5) {
                Orientation::Horizontal
            } else {
                Orientation::Vertical
            };
            let row = rng.random_range(0..BOARD_SIZE);
            let col = rng.random_range(0..BOARD_SIZE);
            let Some(origin) = Coord::new(row, col) else {
                continue;
            };
            if self
                .board
                .can_place_ship(origin, ship_type.length(), orientation)
            {
                return Ok((origin, orientation));
            }
        }
        Err(BoardError::NoRoom(ship_type.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn at(text: &str) -> Coord {
        Coord::parse(text).unwrap()
    }

    #[test]
    fn test_place_matches_name_case_insensitively() {
        let mut placement = Placement::new();
        let name = placement
            .place("cArRiEr", at("A1"), Orientation::Horizontal)
            .unwrap();
        assert_eq!(name, "Carrier");
        assert_eq!(placement.placed_ships(), &["Carrier"]);
    }

    #[test]
    fn test_place_unknown_ship_rejected() {
        let mut placement = Placement::new();
        let err = placement
            .place("Rowboat", at("A1"), Orientation::Horizontal)
            .unwrap_err();
        assert_eq!(err, BoardError::UnknownShip("Rowboat".into()));
        assert!(placement.placed_ships().is_empty());
    }

    #[test]
    fn test_place_duplicate_rejected() {
        let mut placement = Placement::new();
        placement
            .place("Destroyer", at("A1"), Orientation::Horizontal)
            .unwrap();
        let err = placement
            .place("destroyer", at("E5"), Orientation::Vertical)
            .unwrap_err();
        assert_eq!(err, BoardError::AlreadyPlaced("Destroyer"));
        assert_eq!(placement.board().ships().len(), 1);
    }

    #[test]
    fn test_place_blocked_does_not_mark_ship_placed() {
        let mut placement = Placement::new();
        let err = placement
            .place("Carrier", at("A8"), Orientation::Horizontal)
            .unwrap_err();
        assert!(matches!(err, BoardError::Blocked { .. }));
        assert_eq!(placement.remaining_ships().len(), FLEET.len());
    }

    #[test]
    fn test_is_complete_after_full_roster() {
        let mut placement = Placement::new();
        for (i, ship) in FLEET.iter().enumerate() {
            assert!(!placement.is_complete());
            let origin = Coord::new(i * 2, 0).unwrap();
            placement
                .place(ship.name(), origin, Orientation::Horizontal)
                .unwrap();
        }
        assert!(placement.is_complete());
        assert!(placement.remaining_ships().is_empty());
    }

    #[test]
    fn test_place_remaining_keeps_manual_ships() {
        let mut placement = Placement::new();
        placement
            .place("Carrier", at("J1"), Orientation::Horizontal)
            .unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let placed = placement.place_remaining(&mut rng).unwrap();

        assert_eq!(placed.len(), FLEET.len() - 1);
        assert!(!placed.contains(&"Carrier"));
        assert!(placement.is_complete());
        let carrier = &placement.board().ships()[0];
        assert_eq!(carrier.origin(), at("J1"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut placement = Placement::new();
        let mut rng = StdRng::seed_from_u64(1);
        placement.place_remaining(&mut rng).unwrap();
        placement.reset();
        assert_eq!(placement, Placement::new());
    }
}
