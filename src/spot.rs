//! Spot and comment domain model.
//!
//! Enumerations are closed sum types. Their `FromStr` impls are the single
//! place where stored strings become domain values, and they refuse anything
//! unknown with [`Error::DataIntegrity`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::{id_newtype, GpsPoint, Timestamp};

id_newtype!(
    /// Identifier of a hitchhiking spot.
    SpotId
);
id_newtype!(
    /// Identifier of a comment left on a spot.
    CommentId
);

/// How good a spot is for hitchhiking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum Appreciation {
    Perfect,
    Good,
    Bad,
}

impl Appreciation {
    pub const ALL: [Appreciation; 3] = [Appreciation::Perfect, Appreciation::Good, Appreciation::Bad];

    pub fn as_str(&self) -> &'static str {
        match self {
            Appreciation::Perfect => "perfect",
            Appreciation::Good => "good",
            Appreciation::Bad => "bad",
        }
    }
}

impl FromStr for Appreciation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Appreciation::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| Error::DataIntegrity(format!("Unknown appreciation \"{}\"", s)))
    }
}

impl fmt::Display for Appreciation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Eight-point compass direction a spot faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::North => "North",
            Direction::NorthEast => "North-East",
            Direction::East => "East",
            Direction::SouthEast => "South-East",
            Direction::South => "South",
            Direction::SouthWest => "South-West",
            Direction::West => "West",
            Direction::NorthWest => "North-West",
        }
    }

    /// Compass bearing in degrees (North = 0, clockwise).
    pub fn bearing_degrees(&self) -> f64 {
        match self {
            Direction::North => 0.0,
            Direction::NorthEast => 45.0,
            Direction::East => 90.0,
            Direction::SouthEast => 135.0,
            Direction::South => 180.0,
            Direction::SouthWest => 225.0,
            Direction::West => 270.0,
            Direction::NorthWest => 315.0,
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Direction::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| Error::DataIntegrity(format!("Unknown direction \"{}\"", s)))
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-reported roadside hitchhiking location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spot {
    pub id: SpotId,
    pub coordinates: GpsPoint,
    pub road_name: String,
    pub appreciation: Appreciation,
    pub direction: Direction,
    /// Destinations reachable from this spot, as free text
    pub destinations: Vec<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub created_by: String,
}

impl Spot {
    /// Create a new spot with a generated id.
    pub fn new(
        coordinates: GpsPoint,
        road_name: &str,
        appreciation: Appreciation,
        direction: Direction,
        destinations: Vec<String>,
        created_by: &str,
        now: Timestamp,
    ) -> Self {
        Self {
            id: SpotId::generate(),
            coordinates,
            road_name: road_name.to_string(),
            appreciation,
            direction,
            destinations,
            created_at: now,
            updated_at: now,
            created_by: created_by.to_string(),
        }
    }
}

/// Rating attached to a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentAppreciation {
    Perfect,
    Good,
    Bad,
}

impl CommentAppreciation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentAppreciation::Perfect => "perfect",
            CommentAppreciation::Good => "good",
            CommentAppreciation::Bad => "bad",
        }
    }
}

impl FromStr for CommentAppreciation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "perfect" => Ok(CommentAppreciation::Perfect),
            "good" => Ok(CommentAppreciation::Good),
            "bad" => Ok(CommentAppreciation::Bad),
            other => Err(Error::DataIntegrity(format!(
                "Unknown comment appreciation \"{}\"",
                other
            ))),
        }
    }
}

/// A user comment on a spot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub spot_id: SpotId,
    pub appreciation: CommentAppreciation,
    /// Trimmed, never empty
    pub comment: String,
    pub waiting_time_minutes: Option<u32>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub created_by: String,
}

// ============================================================================
// Row parsing helpers
// ============================================================================

/// Parse a stored spot appreciation.
pub fn parse_appreciation(value: &str, spot_id: &str) -> Result<Appreciation> {
    value
        .parse()
        .map_err(|_| Error::invalid_value("appreciation", value, "spot", spot_id))
}

/// Parse a stored spot direction.
pub fn parse_direction(value: &str, spot_id: &str) -> Result<Direction> {
    value
        .parse()
        .map_err(|_| Error::invalid_value("direction", value, "spot", spot_id))
}

/// Parse a stored comment appreciation.
pub fn parse_comment_appreciation(value: &str, comment_id: &str) -> Result<CommentAppreciation> {
    value
        .parse()
        .map_err(|_| Error::invalid_value("comment appreciation", value, "comment", comment_id))
}

/// Trim a stored comment body, rejecting blank text.
pub fn parse_comment_text(value: &str, comment_id: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::DataIntegrity(format!(
            "Comment \"{}\" is missing a comment",
            comment_id
        )));
    }
    Ok(trimmed.to_string())
}

/// Validate a stored waiting time: absent, or finite and non-negative (rounded).
pub fn parse_waiting_time_minutes(value: Option<f64>, comment_id: &str) -> Result<Option<u32>> {
    match value {
        None => Ok(None),
        Some(v) if v.is_finite() && v >= 0.0 && v <= u32::MAX as f64 => Ok(Some(v.round() as u32)),
        Some(v) => Err(Error::invalid_value("waiting time", &v.to_string(), "comment", comment_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_round_trips_through_str() {
        for d in Direction::ALL {
            assert_eq!(d.as_str().parse::<Direction>().unwrap(), d);
        }
        assert_eq!("South-West".parse::<Direction>().unwrap(), Direction::SouthWest);
    }

    #[test]
    fn test_invalid_direction_is_integrity_error() {
        let err = parse_direction("Up", "spot-9").unwrap_err();
        assert!(matches!(err, Error::DataIntegrity(_)));
        assert!(err.to_string().contains("spot-9"));
    }

    #[test]
    fn test_invalid_appreciation() {
        assert_eq!(parse_appreciation("good", "s").unwrap(), Appreciation::Good);
        assert!(parse_appreciation("Good", "s").is_err());
        assert!(parse_appreciation("", "s").is_err());
    }

    #[test]
    fn test_comment_appreciation() {
        assert_eq!(
            parse_comment_appreciation("perfect", "c").unwrap(),
            CommentAppreciation::Perfect
        );
        assert!(parse_comment_appreciation("excellent", "c").is_err());
    }

    #[test]
    fn test_comment_text_is_trimmed() {
        assert_eq!(parse_comment_text("  nice spot \n", "c").unwrap(), "nice spot");
        assert!(parse_comment_text("   ", "c").is_err());
    }

    #[test]
    fn test_waiting_time_validation() {
        assert_eq!(parse_waiting_time_minutes(None, "c").unwrap(), None);
        assert_eq!(parse_waiting_time_minutes(Some(12.6), "c").unwrap(), Some(13));
        assert!(parse_waiting_time_minutes(Some(-1.0), "c").is_err());
        assert!(parse_waiting_time_minutes(Some(f64::NAN), "c").is_err());
        assert!(parse_waiting_time_minutes(Some(f64::INFINITY), "c").is_err());
    }

    #[test]
    fn test_bearing() {
        assert_eq!(Direction::North.bearing_degrees(), 0.0);
        assert_eq!(Direction::SouthWest.bearing_degrees(), 225.0);
    }
}
