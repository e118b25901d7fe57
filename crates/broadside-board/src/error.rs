//! Error types for the board layer.

/// Errors returned by board, coordinate and placement operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// The text could not be read as a coordinate like `B5`.
    #[error("invalid coordinate {0:?}: expected a letter A-J followed by 1-10")]
    InvalidCoordinate(String),

    /// The text was neither `H` nor `V`.
    #[error("invalid orientation {0:?}: expected H or V")]
    InvalidOrientation(String),

    /// No ship with this name exists in the fleet roster.
    #[error("unknown ship: {0}")]
    UnknownShip(String),

    /// This ship has already been placed.
    #[error("{0} already placed")]
    AlreadyPlaced(&'static str),

    /// The ship would leave the grid or overlap another ship.
    #[error("cannot place {ship} at {origin}: out of bounds or overlapping")]
    Blocked {
        /// The ship being placed.
        ship: &'static str,
        /// The requested starting cell.
        origin: crate::Coord,
    },

    /// Random placement gave up finding a free run for this ship.
    #[error("no room left for {0}")]
    NoRoom(&'static str),
}
