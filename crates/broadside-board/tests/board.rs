//! Integration tests for the board model: firing, sinking, idempotence.

use broadside_board::{Board, Cell, Coord, Orientation, Placement, ShotResult, BOARD_SIZE};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn at(text: &str) -> Coord {
    Coord::parse(text).expect("valid coordinate")
}

/// A board holding a full random fleet.
fn random_fleet(seed: u64) -> Placement {
    let mut placement = Placement::new();
    let mut rng = StdRng::seed_from_u64(seed);
    placement
        .place_remaining(&mut rng)
        .expect("an empty board always has room");
    placement
}

// =========================================================================
// Sinking
// =========================================================================

#[test]
fn test_fire_at_sinks_lone_destroyer_on_second_hit() {
    let mut placement = Placement::new();
    placement
        .place("Destroyer", at("A1"), Orientation::Horizontal)
        .unwrap();
    let board = placement.board_mut();

    assert_eq!(board.fire_at(at("A1")), (ShotResult::Hit, None));
    assert!(!board.all_ships_sunk());

    assert_eq!(board.fire_at(at("A2")), (ShotResult::Hit, Some("Destroyer")));
    assert!(board.all_ships_sunk());
}

#[test]
fn test_fire_at_miss_marks_cell() {
    let mut board = Board::new();
    assert_eq!(board.fire_at(at("E5")), (ShotResult::Miss, None));
    assert_eq!(board.cell(at("E5")), Cell::Miss);
}

#[test]
fn test_fire_at_sunk_ship_cell_is_already_shot() {
    let mut placement = Placement::new();
    placement
        .place("Destroyer", at("B2"), Orientation::Vertical)
        .unwrap();
    let board = placement.board_mut();
    board.fire_at(at("B2"));
    board.fire_at(at("C2"));

    // Sinking is irreversible and never reported twice.
    assert_eq!(board.fire_at(at("C2")), (ShotResult::AlreadyShot, None));
    assert!(board.all_ships_sunk());
}

#[test]
fn test_sweeping_every_cell_sinks_full_fleet() {
    let mut placement = random_fleet(99);
    let board = placement.board_mut();
    let mut sunk = Vec::new();

    for row in 0..BOARD_SIZE {
        for col in 0..BOARD_SIZE {
            if let (_, Some(name)) = board.fire_at(Coord::new(row, col).unwrap()) {
                sunk.push(name);
            }
        }
    }

    sunk.sort_unstable();
    assert_eq!(
        sunk,
        vec!["Battleship", "Carrier", "Cruiser", "Destroyer", "Submarine"]
    );
    assert!(board.all_ships_sunk());
}

// =========================================================================
// Properties
// =========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn fire_at_is_idempotent(seed in any::<u64>(), row in 0..BOARD_SIZE, col in 0..BOARD_SIZE) {
        let mut placement = random_fleet(seed);
        let board = placement.board_mut();
        let coord = Coord::new(row, col).unwrap();

        let (first, _) = board.fire_at(coord);
        prop_assert!(matches!(first, ShotResult::Hit | ShotResult::Miss));
        let after_first = board.clone();

        let second = board.fire_at(coord);
        prop_assert_eq!(second, (ShotResult::AlreadyShot, None));
        prop_assert_eq!(&*board, &after_first);
    }

    #[test]
    fn random_fleet_never_overlaps(seed in any::<u64>()) {
        let placement = random_fleet(seed);
        let ship_cells: usize = placement
            .board()
            .ships()
            .iter()
            .map(|ship| ship.remaining().len())
            .sum();
        prop_assert_eq!(ship_cells, 5 + 4 + 3 + 3 + 2);
        prop_assert!(placement.is_complete());
    }
}
