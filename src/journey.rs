//! Journey domain model: location fixes, detector configuration, travels and steps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::spot::SpotId;
use crate::{id_newtype, GpsPoint, Timestamp};

id_newtype!(
    /// Identifier of a recorded travel.
    TravelId
);
id_newtype!(
    /// Identifier of a single step inside a travel.
    TravelStepId
);
id_newtype!(
    /// Identifier of the user owning a travel.
    UserId
);

/// A single fix from the location-tracking collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
    /// Unix timestamp in milliseconds
    pub timestamp: Timestamp,
    /// Reported ground speed in m/s
    pub speed: Option<f64>,
    /// Horizontal accuracy radius in meters
    pub accuracy: Option<f64>,
}

impl LocationUpdate {
    /// Create a fix without speed or accuracy.
    pub fn new(latitude: f64, longitude: f64, timestamp: Timestamp) -> Self {
        Self { latitude, longitude, timestamp, speed: None, accuracy: None }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// Thresholds driving the journey detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(default, rename_all = "camelCase")]
pub struct JourneyConfig {
    /// Minutes stationary at a spot before the user is considered waiting.
    /// Default: 3
    pub waiting_threshold_minutes: f64,

    /// Minutes stationary away from any spot before the user is on a break.
    /// Default: 10
    pub break_threshold_minutes: f64,

    /// Speed at or above which the user is considered in a vehicle.
    /// Default: 15 km/h
    pub moving_speed_threshold_kmh: f64,

    /// Radius around a spot within which the user is "at" that spot.
    /// Default: 100 meters
    pub spot_proximity_meters: f64,
}

impl Default for JourneyConfig {
    fn default() -> Self {
        Self {
            waiting_threshold_minutes: 3.0,
            break_threshold_minutes: 10.0,
            moving_speed_threshold_kmh: 15.0,
            spot_proximity_meters: 100.0,
        }
    }
}

/// Travel phase inferred by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum JourneyStatus {
    Idle,
    Waiting,
    InVehicle,
    Break,
}

/// Kind of a travel step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum StepType {
    Waiting,
    InVehicle,
    Walking,
    Break,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Waiting => "Waiting",
            StepType::InVehicle => "InVehicle",
            StepType::Walking => "Walking",
            StepType::Break => "Break",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Waiting" => Ok(StepType::Waiting),
            "InVehicle" => Ok(StepType::InVehicle),
            "Walking" => Ok(StepType::Walking),
            "Break" => Ok(StepType::Break),
            other => Err(Error::DataIntegrity(format!("Unknown step type \"{}\"", other))),
        }
    }
}

/// Lifecycle of a recorded travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum TravelStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl TravelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelStatus::InProgress => "InProgress",
            TravelStatus::Completed => "Completed",
            TravelStatus::Abandoned => "Abandoned",
        }
    }
}

impl fmt::Display for TravelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TravelStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "InProgress" => Ok(TravelStatus::InProgress),
            "Completed" => Ok(TravelStatus::Completed),
            "Abandoned" => Ok(TravelStatus::Abandoned),
            other => Err(Error::DataIntegrity(format!("Unknown travel status \"{}\"", other))),
        }
    }
}

/// A time-bounded segment of a travel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelStep {
    pub id: TravelStepId,
    pub travel_id: TravelId,
    pub step_type: StepType,
    /// Spot the step is associated with (waiting steps)
    pub spot_id: Option<SpotId>,
    pub start_time: Timestamp,
    /// `None` while the step is still open
    pub end_time: Option<Timestamp>,
    pub notes: Option<String>,
}

impl TravelStep {
    /// Open a new step starting at `start_time`.
    pub fn open(travel_id: TravelId, step_type: StepType, spot_id: Option<SpotId>, start_time: Timestamp) -> Self {
        Self {
            id: TravelStepId::generate(),
            travel_id,
            step_type,
            spot_id,
            start_time,
            end_time: None,
            notes: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Return a copy of this step closed at `end_time`.
    ///
    /// An already closed step keeps its original end time.
    pub fn closed_at(&self, end_time: Timestamp) -> Self {
        Self {
            end_time: Some(self.end_time.unwrap_or(end_time)),
            ..self.clone()
        }
    }

    /// Duration in minutes, or `None` while open.
    pub fn duration_minutes(&self) -> Option<f64> {
        self.end_time
            .map(|end| (end - self.start_time) as f64 / 60_000.0)
    }
}

/// A recorded trip from origin to destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Travel {
    pub id: TravelId,
    pub user_id: UserId,
    pub start_date: Timestamp,
    pub end_date: Option<Timestamp>,
    pub origin: String,
    pub destination: String,
    pub status: TravelStatus,
    /// Append-only, ordered by creation
    pub steps: Vec<TravelStep>,
    /// Meters
    pub total_distance: f64,
    /// Minutes
    pub total_wait_time: f64,
}

impl Travel {
    /// Start a new in-progress travel with no steps.
    pub fn start(user_id: UserId, origin: &str, destination: &str, start_date: Timestamp) -> Self {
        Self {
            id: TravelId::generate(),
            user_id,
            start_date,
            end_date: None,
            origin: origin.to_string(),
            destination: destination.to_string(),
            status: TravelStatus::InProgress,
            steps: Vec::new(),
            total_distance: 0.0,
            total_wait_time: 0.0,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == TravelStatus::InProgress
    }

    /// Replace the stored copy of `step` (matched by id). Returns false if absent.
    pub fn replace_step(&mut self, step: &TravelStep) -> bool {
        match self.steps.iter_mut().find(|s| s.id == step.id) {
            Some(slot) => {
                *slot = step.clone();
                true
            }
            None => false,
        }
    }

    /// Sum of closed waiting-step durations, in minutes.
    pub fn waiting_minutes(&self) -> f64 {
        self.steps
            .iter()
            .filter(|s| s.step_type == StepType::Waiting)
            .filter_map(TravelStep::duration_minutes)
            .sum()
    }
}

/// Travel phase as maintained by the session orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct JourneyState {
    pub status: JourneyStatus,
    pub current_step: Option<TravelStep>,
    /// Only ever increments within a travel
    pub detected_vehicle_changes: u32,
    pub start_time: Timestamp,
}

impl JourneyState {
    pub fn idle(start_time: Timestamp) -> Self {
        Self {
            status: JourneyStatus::Idle,
            current_step: None,
            detected_vehicle_changes: 0,
            start_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = JourneyConfig::default();
        assert_eq!(config.waiting_threshold_minutes, 3.0);
        assert_eq!(config.break_threshold_minutes, 10.0);
        assert_eq!(config.moving_speed_threshold_kmh, 15.0);
        assert_eq!(config.spot_proximity_meters, 100.0);
    }

    #[test]
    fn test_config_partial_json_keeps_defaults() {
        let config: JourneyConfig =
            serde_json::from_str(r#"{"waitingThresholdMinutes": 5}"#).unwrap();
        assert_eq!(config.waiting_threshold_minutes, 5.0);
        assert_eq!(config.break_threshold_minutes, 10.0);
    }

    #[test]
    fn test_closed_at_returns_new_value() {
        let step = TravelStep::open(TravelId::generate(), StepType::InVehicle, None, 1_000);
        let closed = step.closed_at(61_000);

        assert!(step.is_open());
        assert_eq!(closed.end_time, Some(61_000));
        assert_eq!(closed.id, step.id);
        assert_eq!(closed.duration_minutes(), Some(1.0));

        // Closing twice keeps the first end time
        assert_eq!(closed.closed_at(120_000).end_time, Some(61_000));
    }

    #[test]
    fn test_step_type_parse() {
        assert_eq!("Walking".parse::<StepType>().unwrap(), StepType::Walking);
        assert!(matches!("Swimming".parse::<StepType>(), Err(Error::DataIntegrity(_))));
        assert_eq!("Completed".parse::<TravelStatus>().unwrap(), TravelStatus::Completed);
        assert!("Done".parse::<TravelStatus>().is_err());
    }

    #[test]
    fn test_waiting_minutes() {
        let mut travel = Travel::start(UserId::new("u"), "Lyon", "Marseille", 0);
        let waiting = TravelStep::open(travel.id.clone(), StepType::Waiting, None, 0).closed_at(600_000);
        let ride = TravelStep::open(travel.id.clone(), StepType::InVehicle, None, 600_000);
        travel.steps.push(waiting);
        travel.steps.push(ride);
        assert_eq!(travel.waiting_minutes(), 10.0);
    }
}
