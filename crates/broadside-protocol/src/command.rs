//! Text grammars carried inside PLACE, FIRE and REMATCH payloads.

use broadside_board::{Coord, Orientation};

use crate::CommandError;

/// A PLACE request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceCommand {
    /// `<coord> <H|V> <ship>`, e.g. `A1 H Carrier`.
    Ship {
        origin: Coord,
        orientation: Orientation,
        ship: String,
    },
    /// `AUTO`: lay out every remaining ship at random.
    Auto,
}

impl PlaceCommand {
    pub const USAGE: &'static str = "PLACE <coord> <H|V> <ship> | PLACE AUTO";

    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("AUTO") {
            return Ok(Self::Auto);
        }

        let mut parts = text.split_whitespace();
        let (Some(coord), Some(orientation), Some(ship), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CommandError::Usage(Self::USAGE));
        };

        Ok(Self::Ship {
            origin: Coord::parse(coord)?,
            orientation: Orientation::parse(orientation)?,
            ship: ship.to_string(),
        })
    }
}

/// A FIRE request: a single coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireCommand {
    pub target: Coord,
}

impl FireCommand {
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CommandError::Usage("FIRE <coord>"));
        }
        Ok(Self {
            target: Coord::parse(text)?,
        })
    }
}

/// Answer to a rematch offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RematchAnswer {
    Yes,
    No,
}

impl RematchAnswer {
    /// Accepts `YES`/`Y` and `NO`/`N`, any case.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        match text.trim().to_ascii_uppercase().as_str() {
            "YES" | "Y" => Ok(Self::Yes),
            "NO" | "N" => Ok(Self::No),
            _ => Err(CommandError::Usage("REMATCH YES | REMATCH NO")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broadside_board::BoardError;

    #[test]
    fn test_place_parses_ship_form() {
        let cmd = PlaceCommand::parse("b2 v cruiser").unwrap();
        assert_eq!(
            cmd,
            PlaceCommand::Ship {
                origin: Coord::new(1, 1).unwrap(),
                orientation: Orientation::Vertical,
                ship: "cruiser".into(),
            }
        );
    }

    #[test]
    fn test_place_auto() {
        assert_eq!(PlaceCommand::parse(" auto "), Ok(PlaceCommand::Auto));
    }

    #[test]
    fn test_place_wrong_arity_is_usage_error() {
        assert_eq!(
            PlaceCommand::parse("A1 H"),
            Err(CommandError::Usage(PlaceCommand::USAGE))
        );
        assert_eq!(
            PlaceCommand::parse("A1 H Carrier extra"),
            Err(CommandError::Usage(PlaceCommand::USAGE))
        );
    }

    #[test]
    fn test_place_bad_orientation() {
        assert!(matches!(
            PlaceCommand::parse("A1 D Carrier"),
            Err(CommandError::Board(BoardError::InvalidOrientation(_)))
        ));
    }

    #[test]
    fn test_fire_rejects_out_of_range() {
        assert!(matches!(
            FireCommand::parse("K1"),
            Err(CommandError::Board(BoardError::InvalidCoordinate(_)))
        ));
        assert!(matches!(
            FireCommand::parse("A11"),
            Err(CommandError::Board(BoardError::InvalidCoordinate(_)))
        ));
        assert_eq!(
            FireCommand::parse("j10").unwrap().target,
            Coord::new(9, 9).unwrap()
        );
    }

    #[test]
    fn test_rematch_answers() {
        assert_eq!(RematchAnswer::parse("yes"), Ok(RematchAnswer::Yes));
        assert_eq!(RematchAnswer::parse("N"), Ok(RematchAnswer::No));
        assert!(RematchAnswer::parse("maybe").is_err());
    }
}
