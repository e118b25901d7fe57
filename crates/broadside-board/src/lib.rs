//! Grid and fleet model for Broadside.
//!
//! This crate knows nothing about sockets or turns. It answers three
//! questions for the layers above it:
//!
//! - can this ship go here? ([`Board::can_place_ship`], [`Placement::place`])
//! - what happens when someone fires at this cell? ([`Board::fire_at`])
//! - is the fleet gone? ([`Board::all_ships_sunk`])
//!
//! # Key types
//!
//! - [`Coord`] / [`Orientation`]: cells and directions, with their `B5` /
//!   `H` text forms
//! - [`Board`]: the 10×10 grid and the ships on it
//! - [`Placement`]: one player's board plus the roster of placed ships
//! - [`FLEET`]: the five ships every player places

mod board;
mod coord;
mod error;
mod placement;
mod ship;

pub use board::{Board, Cell, ShotResult};
pub use coord::{Coord, Orientation};
pub use error::BoardError;
pub use placement::Placement;
pub use ship::{Ship, ShipType, FLEET};

/// Width and height of the grid.
pub const BOARD_SIZE: usize = 10;
