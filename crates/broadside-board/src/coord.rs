//! Grid coordinates and ship orientation, with their text forms.

use std::fmt;

use crate::{BoardError, BOARD_SIZE};

/// A cell on the grid, zero-based.
///
/// The text form is a row letter followed by a one-based column number:
/// `Coord { row: 1, col: 4 }` is `"B5"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    /// Returns the coordinate if it lies on the grid.
    pub fn new(row: usize, col: usize) -> Option<Self> {
        (row < BOARD_SIZE && col < BOARD_SIZE).then_some(Self { row, col })
    }

    /// Parses `"B5"`-style text, case-insensitively, ignoring surrounding
    /// whitespace.
    pub fn parse(text: &str) -> Result<Self, BoardError> {
        let invalid = || BoardError::InvalidCoordinate(text.to_string());
        let trimmed = text.trim();

        let mut chars = trimmed.chars();
        let letter = chars.next().ok_or_else(invalid)?.to_ascii_uppercase();
        if !letter.is_ascii_uppercase() {
            return Err(invalid());
        }
        let row = (letter as u8 - b'A') as usize;

        let number: usize = chars.as_str().parse().map_err(|_| invalid())?;
        if number == 0 {
            return Err(invalid());
        }

        Self::new(row, number - 1).ok_or_else(invalid)
    }

    /// Returns the cell `step` cells further along `orientation`, if it is
    /// still on the grid.
    pub fn offset(self, orientation: Orientation, step: usize) -> Option<Self> {
        match orientation {
            Orientation::Horizontal => Self::new(self.row, self.col + step),
            Orientation::Vertical => Self::new(self.row + step, self.col),
        }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", (b'A' + self.row as u8) as char, self.col + 1)
    }
}

/// Orientation of a ship on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    /// Parses `H` or `V`, case-insensitively.
    pub fn parse(text: &str) -> Result<Self, BoardError> {
        match text.trim().to_ascii_uppercase().as_str() {
            "H" => Ok(Self::Horizontal),
            "V" => Ok(Self::Vertical),
            _ => Err(BoardError::InvalidOrientation(text.to_string())),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Horizontal => write!(f, "H"),
            Self::Vertical => write!(f, "V"),
        }
    }
}
