//! # Journey Detector
//!
//! Infers the travel phase of a hitchhiker from a noisy, intermittent stream
//! of GPS fixes.
//!
//! Each fix is classified as moving or stationary, checked against the known
//! spots nearby, and folded into a "stationary since" timer. The resulting
//! [`DetectionResult`] tells the caller which status the journey is in now and
//! whether a new travel step starts with this fix.
//!
//! ## Transition policy
//!
//! Evaluated in priority order, first match wins:
//!
//! | Condition | Status | New step |
//! |-----------|--------|----------|
//! | moving | `InVehicle` | only when entering |
//! | at a spot, stationary ≥ waiting threshold | `Waiting` | only when entering |
//! | away from spots, stationary ≥ break threshold | `Break` | only when entering |
//! | anything else | unchanged | never |
//!
//! The last row is the debounce band: short stops (red lights, traffic) never
//! flip the status.
//!
//! The detector never mutates a [`JourneyState`]; applying the result is the
//! orchestrator's job.

use log::{debug, info};
use std::collections::VecDeque;

use crate::geo_utils::haversine_distance;
use crate::journey::{JourneyConfig, JourneyState, JourneyStatus, LocationUpdate, StepType};
use crate::spot::Spot;
use crate::Timestamp;

/// Maximum number of fixes kept for movement inference.
pub const MAX_HISTORY_SIZE: usize = 100;

/// Displacement under which a fix with a reported speed is treated as GPS noise.
const MIN_MOVEMENT_DISTANCE_METERS: f64 = 10.0;

/// Outcome of processing a single fix.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub new_status: JourneyStatus,
    pub should_create_new_step: bool,
    /// Set whenever `should_create_new_step` is true
    pub step_type: Option<StepType>,
    /// Spot the user is waiting at, for `Waiting` results
    pub nearby_spot: Option<Spot>,
}

impl DetectionResult {
    fn unchanged(status: JourneyStatus) -> Self {
        Self {
            new_status: status,
            should_create_new_step: false,
            step_type: None,
            nearby_spot: None,
        }
    }

    fn enter(status: JourneyStatus, step_type: StepType, current: JourneyStatus) -> Self {
        let entering = current != status;
        Self {
            new_status: status,
            should_create_new_step: entering,
            step_type: entering.then_some(step_type),
            nearby_spot: None,
        }
    }
}

/// Stateful classifier of GPS fixes into travel phases.
#[derive(Debug, Clone)]
pub struct JourneyDetector {
    config: JourneyConfig,
    history: VecDeque<LocationUpdate>,
    stationary_since: Option<Timestamp>,
    nearby_spots: Vec<Spot>,
}

impl Default for JourneyDetector {
    fn default() -> Self {
        Self::new(JourneyConfig::default())
    }
}

impl JourneyDetector {
    pub fn new(config: JourneyConfig) -> Self {
        Self {
            config,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE + 1),
            stationary_since: None,
            nearby_spots: Vec::new(),
        }
    }

    pub fn config(&self) -> &JourneyConfig {
        &self.config
    }

    /// Replace the spots considered for "at a spot" detection.
    pub fn set_nearby_spots(&mut self, spots: Vec<Spot>) {
        debug!("[JourneyDetector] Setting {} nearby spots", spots.len());
        self.nearby_spots = spots;
    }

    /// Process a new fix and classify the journey state.
    pub fn process_location(&mut self, location: LocationUpdate, current_state: &JourneyState) -> DetectionResult {
        debug!(
            "[JourneyDetector] Fix ({:.5}, {:.5}) speed={:?} accuracy={:?} status={:?}",
            location.latitude, location.longitude, location.speed, location.accuracy, current_state.status
        );

        self.history.push_back(location);
        while self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }

        let is_moving = self.detect_movement(&location);
        let nearby_spot = self.find_nearby_spot(&location).cloned();

        if is_moving {
            self.stationary_since = None;
        } else if self.stationary_since.is_none() {
            debug!("[JourneyDetector] User became stationary");
            self.stationary_since = Some(location.timestamp);
        }

        let stationary_minutes = self.stationary_minutes(location.timestamp);
        debug!(
            "[JourneyDetector] moving={} at_spot={} stationary={:.1}min",
            is_moving,
            nearby_spot.is_some(),
            stationary_minutes
        );

        let result = self.determine_state(is_moving, nearby_spot, stationary_minutes, current_state.status);

        if result.new_status != current_state.status {
            info!(
                "[JourneyDetector] Transition {:?} -> {:?} (new step: {})",
                current_state.status, result.new_status, result.should_create_new_step
            );
        }

        result
    }

    /// Clear history and the stationary timer. Nearby spots are kept.
    pub fn reset(&mut self) {
        self.history.clear();
        self.stationary_since = None;
    }

    /// Copy of the retained fixes, oldest first.
    pub fn location_history(&self) -> Vec<LocationUpdate> {
        self.history.iter().copied().collect()
    }

    /// Decide whether the latest fix indicates vehicle-speed movement.
    fn detect_movement(&self, location: &LocationUpdate) -> bool {
        let Some(previous) = self.previous_fix() else {
            return false;
        };
        let distance = haversine_distance(&previous.point(), &location.point());

        match location.speed {
            Some(speed) => {
                let accuracy_buffer = location.accuracy.unwrap_or(0.0) + previous.accuracy.unwrap_or(0.0);
                if distance < MIN_MOVEMENT_DISTANCE_METERS.max(accuracy_buffer) {
                    return false;
                }
                speed * 3.6 >= self.config.moving_speed_threshold_kmh
            }
            None => {
                let elapsed_secs = (location.timestamp - previous.timestamp) as f64 / 1000.0;
                if elapsed_secs <= 0.0 {
                    return false;
                }
                let speed_kmh = distance / elapsed_secs * 3.6;
                speed_kmh >= self.config.moving_speed_threshold_kmh
            }
        }
    }

    /// The fix received just before the latest one.
    fn previous_fix(&self) -> Option<&LocationUpdate> {
        let len = self.history.len();
        if len < 2 {
            return None;
        }
        self.history.get(len - 2)
    }

    /// First spot, in input order, within the proximity radius.
    fn find_nearby_spot(&self, location: &LocationUpdate) -> Option<&Spot> {
        let here = location.point();
        self.nearby_spots
            .iter()
            .find(|spot| haversine_distance(&here, &spot.coordinates) <= self.config.spot_proximity_meters)
    }

    fn stationary_minutes(&self, now: Timestamp) -> f64 {
        self.stationary_since
            .map_or(0.0, |since| (now - since) as f64 / 60_000.0)
    }

    fn determine_state(
        &self,
        is_moving: bool,
        nearby_spot: Option<Spot>,
        stationary_minutes: f64,
        current: JourneyStatus,
    ) -> DetectionResult {
        if is_moving {
            return DetectionResult::enter(JourneyStatus::InVehicle, StepType::InVehicle, current);
        }

        match nearby_spot {
            Some(spot) if stationary_minutes >= self.config.waiting_threshold_minutes => DetectionResult {
                nearby_spot: Some(spot),
                ..DetectionResult::enter(JourneyStatus::Waiting, StepType::Waiting, current)
            },
            None if stationary_minutes >= self.config.break_threshold_minutes => {
                DetectionResult::enter(JourneyStatus::Break, StepType::Break, current)
            }
            _ => DetectionResult::unchanged(current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spot::{Appreciation, Direction};
    use crate::GpsPoint;

    const MINUTE: i64 = 60_000;

    fn make_spot(lat: f64, lng: f64) -> Spot {
        Spot::new(
            GpsPoint::new(lat, lng),
            "N7",
            Appreciation::Good,
            Direction::South,
            vec!["Marseille".to_string()],
            "tester",
            0,
        )
    }

    fn state(status: JourneyStatus) -> JourneyState {
        JourneyState { status, ..JourneyState::idle(0) }
    }

    #[test]
    fn test_movement_from_derived_speed() {
        // Two fixes 2s apart, ~200m apart: ~360 km/h
        let mut detector = JourneyDetector::default();
        let idle = state(JourneyStatus::Idle);
        detector.process_location(LocationUpdate::new(45.0, 5.0, 0), &idle);
        let result = detector.process_location(LocationUpdate::new(45.0018, 5.0, 2_000), &idle);
        assert_eq!(result.new_status, JourneyStatus::InVehicle);
        assert!(result.should_create_new_step);
        assert_eq!(result.step_type, Some(StepType::InVehicle));
    }

    #[test]
    fn test_no_movement_for_tiny_displacement() {
        // ~1m over 2s is 1.8 km/h
        let mut detector = JourneyDetector::default();
        let idle = state(JourneyStatus::Idle);
        detector.process_location(LocationUpdate::new(45.0, 5.0, 0), &idle);
        let result = detector.process_location(LocationUpdate::new(45.000009, 5.0, 2_000), &idle);
        assert_eq!(result.new_status, JourneyStatus::Idle);
        assert!(!result.should_create_new_step);
    }

    #[test]
    fn test_single_fix_is_not_moving() {
        let mut detector = JourneyDetector::default();
        let fix = LocationUpdate::new(45.0, 5.0, 0).with_speed(30.0);
        let result = detector.process_location(fix, &state(JourneyStatus::Idle));
        assert_eq!(result.new_status, JourneyStatus::Idle);
    }

    #[test]
    fn test_reported_speed_ignored_below_noise_floor() {
        let mut detector = JourneyDetector::default();
        let idle = state(JourneyStatus::Idle);
        detector.process_location(LocationUpdate::new(45.0, 5.0, 0).with_accuracy(20.0), &idle);

        // ~33m displacement, but combined accuracy is 40m: treated as noise
        let noisy = LocationUpdate::new(45.0003, 5.0, 5_000).with_speed(20.0).with_accuracy(20.0);
        let result = detector.process_location(noisy, &idle);
        assert_eq!(result.new_status, JourneyStatus::Idle);
    }

    #[test]
    fn test_reported_speed_used_above_noise_floor() {
        let mut detector = JourneyDetector::default();
        let idle = state(JourneyStatus::Idle);
        detector.process_location(LocationUpdate::new(45.0, 5.0, 0).with_accuracy(5.0), &idle);

        // ~111m displacement, 20 m/s = 72 km/h
        let fix = LocationUpdate::new(45.001, 5.0, 5_000).with_speed(20.0).with_accuracy(5.0);
        let result = detector.process_location(fix, &idle);
        assert_eq!(result.new_status, JourneyStatus::InVehicle);

        // Same displacement but walking pace reported
        let walk = LocationUpdate::new(45.002, 5.0, 10_000).with_speed(1.2).with_accuracy(5.0);
        let result = detector.process_location(walk, &state(JourneyStatus::InVehicle));
        assert_eq!(result.new_status, JourneyStatus::InVehicle);
        assert!(!result.should_create_new_step);
    }

    #[test]
    fn test_zero_elapsed_time_is_not_moving() {
        let mut detector = JourneyDetector::default();
        let idle = state(JourneyStatus::Idle);
        detector.process_location(LocationUpdate::new(45.0, 5.0, 1_000), &idle);
        let result = detector.process_location(LocationUpdate::new(45.01, 5.0, 1_000), &idle);
        assert_eq!(result.new_status, JourneyStatus::Idle);
    }

    #[test]
    fn test_debounce_band_keeps_status() {
        let mut detector = JourneyDetector::default();
        for status in [JourneyStatus::Idle, JourneyStatus::InVehicle, JourneyStatus::Waiting, JourneyStatus::Break] {
            detector.reset();
            let result = detector.process_location(LocationUpdate::new(45.0, 5.0, 0), &state(status));
            assert_eq!(result.new_status, status);
            assert!(!result.should_create_new_step);
            assert!(result.step_type.is_none());
        }
    }

    #[test]
    fn test_sustained_movement_creates_one_step() {
        let mut detector = JourneyDetector::default();
        let mut current = state(JourneyStatus::Idle);
        let mut created = 0;

        for i in 0..10 {
            let fix = LocationUpdate::new(45.0 + i as f64 * 0.002, 5.0, i * 5_000);
            let result = detector.process_location(fix, &current);
            if result.should_create_new_step {
                created += 1;
            }
            current.status = result.new_status;
        }

        assert_eq!(current.status, JourneyStatus::InVehicle);
        assert_eq!(created, 1);
    }

    #[test]
    fn test_waiting_at_spot_after_threshold() {
        let mut detector = JourneyDetector::default();
        let spot = make_spot(45.0, 5.0);
        detector.set_nearby_spots(vec![spot.clone()]);
        let current = state(JourneyStatus::InVehicle);

        // 50m from the spot, stationary
        let here = (45.00045, 5.0);
        let first = detector.process_location(LocationUpdate::new(here.0, here.1, 0), &current);
        assert_eq!(first.new_status, JourneyStatus::InVehicle);

        let early = detector.process_location(LocationUpdate::new(here.0, here.1, 2 * MINUTE), &current);
        assert_eq!(early.new_status, JourneyStatus::InVehicle);

        let waiting = detector.process_location(LocationUpdate::new(here.0, here.1, 3 * MINUTE), &current);
        assert_eq!(waiting.new_status, JourneyStatus::Waiting);
        assert!(waiting.should_create_new_step);
        assert_eq!(waiting.step_type, Some(StepType::Waiting));
        assert_eq!(waiting.nearby_spot.as_ref().map(|s| &s.id), Some(&spot.id));

        // Already waiting: spot still reported, no new step
        let again = detector.process_location(
            LocationUpdate::new(here.0, here.1, 4 * MINUTE),
            &state(JourneyStatus::Waiting),
        );
        assert_eq!(again.new_status, JourneyStatus::Waiting);
        assert!(!again.should_create_new_step);
        assert!(again.nearby_spot.is_some());
    }

    #[test]
    fn test_first_spot_in_input_order_wins() {
        let mut detector = JourneyDetector::default();
        let far_but_first = make_spot(45.0008, 5.0); // ~89m away
        let closer = make_spot(45.0001, 5.0); // ~11m away
        detector.set_nearby_spots(vec![far_but_first.clone(), closer]);

        let current = state(JourneyStatus::Idle);
        detector.process_location(LocationUpdate::new(45.0, 5.0, 0), &current);
        let result = detector.process_location(LocationUpdate::new(45.0, 5.0, 5 * MINUTE), &current);
        assert_eq!(result.nearby_spot.map(|s| s.id), Some(far_but_first.id));
    }

    #[test]
    fn test_break_away_from_spots() {
        let mut detector = JourneyDetector::default();
        detector.set_nearby_spots(vec![make_spot(46.0, 6.0)]);
        let current = state(JourneyStatus::InVehicle);

        detector.process_location(LocationUpdate::new(45.0, 5.0, 0), &current);
        let waiting_range = detector.process_location(LocationUpdate::new(45.0, 5.0, 5 * MINUTE), &current);
        assert_eq!(waiting_range.new_status, JourneyStatus::InVehicle);

        let on_break = detector.process_location(LocationUpdate::new(45.0, 5.0, 10 * MINUTE), &current);
        assert_eq!(on_break.new_status, JourneyStatus::Break);
        assert!(on_break.should_create_new_step);
        assert_eq!(on_break.step_type, Some(StepType::Break));
        assert!(on_break.nearby_spot.is_none());
    }

    #[test]
    fn test_movement_clears_stationary_timer() {
        let mut detector = JourneyDetector::default();
        let current = state(JourneyStatus::Idle);

        detector.process_location(LocationUpdate::new(45.0, 5.0, 0), &current);
        detector.process_location(LocationUpdate::new(45.0, 5.0, 8 * MINUTE), &current);
        // Drive off ~1.1km in a minute
        detector.process_location(LocationUpdate::new(45.01, 5.0, 9 * MINUTE), &current);
        // Stop again: timer restarts from here
        detector.process_location(LocationUpdate::new(45.01, 5.0, 10 * MINUTE), &current);
        let result = detector.process_location(LocationUpdate::new(45.01, 5.0, 15 * MINUTE), &current);
        assert_eq!(result.new_status, JourneyStatus::Idle);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut detector = JourneyDetector::default();
        let current = state(JourneyStatus::Idle);
        for i in 0..150 {
            detector.process_location(LocationUpdate::new(45.0, 5.0, i * 1_000), &current);
        }
        let history = detector.location_history();
        assert_eq!(history.len(), MAX_HISTORY_SIZE);
        assert_eq!(history[0].timestamp, 50_000);
        assert_eq!(history[MAX_HISTORY_SIZE - 1].timestamp, 149_000);
    }

    #[test]
    fn test_reset_clears_history_and_timer() {
        let mut detector = JourneyDetector::default();
        let current = state(JourneyStatus::InVehicle);
        detector.process_location(LocationUpdate::new(45.0, 5.0, 0), &current);
        detector.process_location(LocationUpdate::new(45.0, 5.0, 9 * MINUTE), &current);
        detector.reset();
        assert!(detector.location_history().is_empty());

        // Timer restarted: one more minute is not a break
        detector.process_location(LocationUpdate::new(45.0, 5.0, 10 * MINUTE), &current);
        let result = detector.process_location(LocationUpdate::new(45.0, 5.0, 11 * MINUTE), &current);
        assert_eq!(result.new_status, JourneyStatus::InVehicle);
    }
}
