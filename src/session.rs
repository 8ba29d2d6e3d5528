//! # Journey Session
//!
//! Orchestrates one recorded travel at a time: drives the location tracker,
//! feeds every fix through the [`JourneyDetector`], turns its results into
//! travel steps and persists the travel.
//!
//! ## Lifecycle
//!
//! ```text
//!          start_journey            pause_journey
//!   Idle ─────────────────► Tracking ─────────────► Paused
//!    ▲                        │  ▲                    │
//!    │      stop_journey      │  └────────────────────┘
//!    └────────────────────────┘     resume_journey
//! ```
//!
//! `stop_journey` is accepted from `Paused` as well.
//!
//! ## Concurrency
//!
//! All mutable state (travel, journey state, detector) lives behind a single
//! mutex shared with the tracker callbacks. The session never calls into the
//! tracker or the repository while holding that lock, so a tracker may
//! deliver fixes synchronously from `start_tracking` without deadlocking.

use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::detector::JourneyDetector;
use crate::error::{Error, Result};
use crate::journey::{
    JourneyConfig, JourneyState, JourneyStatus, LocationUpdate, StepType, Travel, TravelStatus, TravelStep, UserId,
};
use crate::repository::TravelRepository;
use crate::spot::{Spot, SpotId};
use crate::{now_ms, Timestamp};

/// Callbacks handed to a [`LocationTracker`] when tracking starts.
pub struct TrackingCallbacks {
    pub on_location_update: Box<dyn Fn(LocationUpdate) + Send + Sync>,
    pub on_error: Box<dyn Fn(Error) + Send + Sync>,
}

impl TrackingCallbacks {
    pub fn new(
        on_location_update: impl Fn(LocationUpdate) + Send + Sync + 'static,
        on_error: impl Fn(Error) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_location_update: Box::new(on_location_update),
            on_error: Box::new(on_error),
        }
    }
}

/// Platform location source.
pub trait LocationTracker: Send + Sync {
    /// Begin delivering fixes to `callbacks`.
    ///
    /// Returns false when tracking cannot start (permission denied, service
    /// disabled), after reporting the cause through `on_error`. Returns true
    /// without replacing the callbacks if tracking is already running.
    fn start_tracking(&self, callbacks: TrackingCallbacks) -> bool;

    /// Replace the callbacks of a tracking run that outlived its previous owner.
    fn attach_callbacks(&self, callbacks: TrackingCallbacks);

    fn stop_tracking(&self) -> Result<()>;

    fn current_location(&self) -> Option<LocationUpdate>;

    /// Must reflect the OS-level background task, which can survive an app restart.
    fn is_tracking(&self) -> bool;
}

impl<T: LocationTracker + ?Sized> LocationTracker for Arc<T> {
    fn start_tracking(&self, callbacks: TrackingCallbacks) -> bool {
        (**self).start_tracking(callbacks)
    }

    fn attach_callbacks(&self, callbacks: TrackingCallbacks) {
        (**self).attach_callbacks(callbacks)
    }

    fn stop_tracking(&self) -> Result<()> {
        (**self).stop_tracking()
    }

    fn current_location(&self) -> Option<LocationUpdate> {
        (**self).current_location()
    }

    fn is_tracking(&self) -> bool {
        (**self).is_tracking()
    }
}

/// Tracker fed by the host: platform code pushes each fix it receives.
#[derive(Default)]
pub struct PushLocationTracker {
    inner: Mutex<PushTrackerState>,
}

#[derive(Default)]
struct PushTrackerState {
    tracking: bool,
    permission_denied: bool,
    callbacks: Option<Arc<TrackingCallbacks>>,
    last_location: Option<LocationUpdate>,
}

impl PushLocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `start_tracking` calls fail as if permission was refused.
    pub fn set_permission_denied(&self, denied: bool) {
        self.state().permission_denied = denied;
    }

    /// Deliver a fix. Ignored while not tracking.
    pub fn push(&self, location: LocationUpdate) {
        let callbacks = {
            let mut state = self.state();
            if !state.tracking {
                return;
            }
            state.last_location = Some(location);
            state.callbacks.clone()
        };
        if let Some(callbacks) = callbacks {
            (callbacks.on_location_update)(location);
        }
    }

    /// Report a platform failure to the current owner.
    pub fn push_error(&self, err: Error) {
        let callbacks = self.state().callbacks.clone();
        if let Some(callbacks) = callbacks {
            (callbacks.on_error)(err);
        }
    }

    fn state(&self) -> MutexGuard<'_, PushTrackerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocationTracker for PushLocationTracker {
    fn start_tracking(&self, callbacks: TrackingCallbacks) -> bool {
        let mut state = self.state();
        if state.tracking {
            warn!("[PushLocationTracker] Tracking already active");
            return true;
        }
        if state.permission_denied {
            drop(state);
            (callbacks.on_error)(Error::Tracking("Location permissions not granted".to_string()));
            return false;
        }
        state.tracking = true;
        state.callbacks = Some(Arc::new(callbacks));
        true
    }

    fn attach_callbacks(&self, callbacks: TrackingCallbacks) {
        self.state().callbacks = Some(Arc::new(callbacks));
    }

    fn stop_tracking(&self) -> Result<()> {
        let mut state = self.state();
        state.tracking = false;
        state.callbacks = None;
        Ok(())
    }

    fn current_location(&self) -> Option<LocationUpdate> {
        self.state().last_location
    }

    fn is_tracking(&self) -> bool {
        self.state().tracking
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Idle,
    Tracking,
    Paused,
}

/// What happens to the open detected step when a manual step is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManualStepPolicy {
    /// Append the manual step and leave the open step untouched.
    #[default]
    Overlap,
    /// Close the open step and make the manual step current.
    CloseActive,
}

/// User-entered step. Unset fields default to a waiting step starting now.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualStep {
    pub step_type: Option<StepType>,
    pub spot_id: Option<SpotId>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub notes: Option<String>,
}

type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

struct SessionState {
    mode: SessionMode,
    travel: Option<Travel>,
    journey: JourneyState,
    detector: JourneyDetector,
    current_location: Option<LocationUpdate>,
}

impl SessionState {
    fn active_travel(&self) -> Option<&Travel> {
        self.travel.as_ref().filter(|t| t.is_in_progress())
    }
}

/// Journey orchestrator around an injected tracker and travel repository.
pub struct JourneySession<T: LocationTracker, R: TravelRepository> {
    tracker: Arc<T>,
    repository: Arc<R>,
    state: Arc<Mutex<SessionState>>,
    policy: ManualStepPolicy,
    clock: Clock,
}

impl<T: LocationTracker + 'static, R: TravelRepository + 'static> JourneySession<T, R> {
    pub fn new(tracker: Arc<T>, repository: Arc<R>, config: JourneyConfig) -> Self {
        let now = now_ms();
        Self {
            tracker,
            repository,
            state: Arc::new(Mutex::new(SessionState {
                mode: SessionMode::Idle,
                travel: None,
                journey: JourneyState::idle(now),
                detector: JourneyDetector::new(config),
                current_location: None,
            })),
            policy: ManualStepPolicy::default(),
            clock: Arc::new(now_ms),
        }
    }

    pub fn with_manual_step_policy(mut self, policy: ManualStepPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the wall clock used for step and travel timestamps.
    pub fn with_clock(mut self, clock: impl Fn() -> Timestamp + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Start recording a new travel.
    ///
    /// Rejected while the tracker is running or a travel is in progress
    /// (paused included). Returns false when tracking cannot start.
    pub fn start_journey(&self, origin: &str, destination: &str, user_id: UserId) -> bool {
        if self.tracker.is_tracking() {
            warn!("[JourneySession] Cannot start journey: tracking already active");
            return false;
        }

        info!("[JourneySession] Starting journey {} -> {} for {}", origin, destination, user_id);

        // Claimed before the tracker runs: a concurrent start is rejected and
        // fixes delivered from inside `start_tracking` land in this travel.
        let now = (self.clock)();
        let travel = Travel::start(user_id, origin, destination, now);
        let (previous_travel, previous_journey) = {
            let mut state = self.lock_state();
            if let Some(active) = state.active_travel() {
                warn!("[JourneySession] Cannot start journey: travel {} in progress", active.id);
                return false;
            }
            let previous_travel = state.travel.replace(travel.clone());
            let previous_journey = std::mem::replace(&mut state.journey, JourneyState::idle(now));
            state.detector.reset();
            state.mode = SessionMode::Tracking;
            (previous_travel, previous_journey)
        };

        if !self.tracker.start_tracking(self.callbacks()) {
            error!("[JourneySession] Failed to start journey: location tracking could not be started");
            let mut state = self.lock_state();
            state.travel = previous_travel;
            state.journey = previous_journey;
            state.detector.reset();
            state.mode = SessionMode::Idle;
            return false;
        }

        info!("[JourneySession] Journey {} created", travel.id);
        let current = self.lock_state().travel.clone().unwrap_or(travel);
        persist(self.repository.as_ref(), &current, "new travel");
        true
    }

    /// Stop tracking but keep the travel and detector state.
    pub fn pause_journey(&self) {
        info!("[JourneySession] Pausing journey");
        self.stop_tracker();

        let mut state = self.lock_state();
        state.mode = if state.active_travel().is_some() { SessionMode::Paused } else { SessionMode::Idle };
    }

    /// Restart tracking for the paused travel. No new travel is created.
    pub fn resume_journey(&self) -> bool {
        let travel_id = match self.lock_state().active_travel() {
            Some(travel) => travel.id.clone(),
            None => {
                warn!("[JourneySession] Cannot resume journey: no journey in progress");
                return false;
            }
        };

        info!("[JourneySession] Resuming journey {}", travel_id);
        if !self.tracker.start_tracking(self.callbacks()) {
            error!("[JourneySession] Failed to resume journey: location tracking could not be started");
            return false;
        }

        self.lock_state().mode = SessionMode::Tracking;
        true
    }

    /// Stop tracking, close open steps and mark the travel completed.
    ///
    /// Returns the completed travel, or `None` when nothing was in progress.
    pub fn stop_journey(&self) -> Option<Travel> {
        info!("[JourneySession] Stopping journey");
        self.stop_tracker();

        let now = (self.clock)();
        let completed = {
            let mut state = self.lock_state();
            state.mode = SessionMode::Idle;
            state.detector.reset();

            let closed_current = state.journey.current_step.as_ref().map(|s| s.closed_at(now));
            state.journey.current_step = closed_current;

            let travel = state.travel.as_mut().filter(|t| t.is_in_progress())?;
            for step in travel.steps.iter_mut().filter(|s| s.is_open()) {
                *step = step.closed_at(now);
            }
            travel.end_date = Some(now);
            travel.status = TravelStatus::Completed;
            travel.total_wait_time = travel.waiting_minutes();
            travel.clone()
        };

        info!(
            "[JourneySession] Journey {} completed with {} steps",
            completed.id,
            completed.steps.len()
        );
        persist(self.repository.as_ref(), &completed, "completed travel");
        Some(completed)
    }

    /// Append a user-entered step to the travel in progress.
    pub fn add_manual_step(&self, manual: ManualStep) -> Option<TravelStep> {
        let now = (self.clock)();
        let (step, travel) = {
            let mut state = self.lock_state();
            let policy = self.policy;
            let state = &mut *state;

            let Some(travel) = state.travel.as_mut().filter(|t| t.is_in_progress()) else {
                warn!("[JourneySession] Cannot add manual step: no journey in progress");
                return None;
            };

            let start = manual.start_time.unwrap_or(now);
            let step = TravelStep {
                end_time: manual.end_time,
                notes: manual.notes,
                ..TravelStep::open(
                    travel.id.clone(),
                    manual.step_type.unwrap_or(StepType::Waiting),
                    manual.spot_id,
                    start,
                )
            };

            if policy == ManualStepPolicy::CloseActive {
                if let Some(current) = state.journey.current_step.take() {
                    let closed = current.closed_at(start);
                    travel.replace_step(&closed);
                    debug!("[JourneySession] Closed step {} for manual step", closed.id);
                }
                state.journey.current_step = Some(step.clone());
            }

            travel.steps.push(step.clone());
            (step, travel.clone())
        };

        info!("[JourneySession] Manual {} step {} added", step.step_type, step.id);
        persist(self.repository.as_ref(), &travel, "manual step");
        Some(step)
    }

    /// Replace the spots the detector checks for "at a spot".
    pub fn update_nearby_spots(&self, spots: Vec<Spot>) {
        debug!("[JourneySession] Updating {} nearby spots", spots.len());
        self.lock_state().detector.set_nearby_spots(spots);
    }

    /// Re-adopt a travel whose tracking survived an app restart.
    ///
    /// Does nothing when the tracker is not running. Stops orphaned tracking
    /// when no active travel exists or the lookup fails. Returns true when a
    /// travel was restored.
    pub fn restore_active_journey(&self, user_id: &UserId) -> bool {
        if !self.tracker.is_tracking() {
            return false;
        }

        info!("[JourneySession] Background tracking active, restoring journey for {}", user_id);
        match self.repository.get_active_travel(user_id) {
            Ok(Some(travel)) => {
                info!(
                    "[JourneySession] Restored journey {} with {} steps",
                    travel.id,
                    travel.steps.len()
                );
                {
                    let mut state = self.lock_state();
                    state.journey = JourneyState {
                        status: JourneyStatus::Idle,
                        current_step: travel.steps.last().cloned(),
                        detected_vehicle_changes: travel.steps.len() as u32,
                        start_time: travel.start_date,
                    };
                    state.travel = Some(travel);
                    state.detector.reset();
                    state.mode = SessionMode::Tracking;
                }
                self.tracker.attach_callbacks(self.callbacks());
                true
            }
            Ok(None) => {
                warn!("[JourneySession] Tracking active but no active journey found, stopping tracking");
                self.stop_tracker();
                false
            }
            Err(e) => {
                error!("[JourneySession] Failed to restore active journey: {}", e);
                self.stop_tracker();
                false
            }
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_tracking()
    }

    pub fn mode(&self) -> SessionMode {
        self.lock_state().mode
    }

    pub fn manual_step_policy(&self) -> ManualStepPolicy {
        self.policy
    }

    pub fn current_travel(&self) -> Option<Travel> {
        self.lock_state().travel.clone()
    }

    pub fn journey_state(&self) -> JourneyState {
        self.lock_state().journey.clone()
    }

    /// Last fix received, falling back to the tracker's own.
    pub fn current_location(&self) -> Option<LocationUpdate> {
        let stored = self.lock_state().current_location;
        stored.or_else(|| self.tracker.current_location())
    }

    fn callbacks(&self) -> TrackingCallbacks {
        let state = Arc::clone(&self.state);
        let repository = Arc::clone(&self.repository);
        let clock = Arc::clone(&self.clock);

        TrackingCallbacks::new(
            move |location| handle_location_update(&state, repository.as_ref(), &clock, location),
            |err| error!("[JourneySession] Location tracking error: {}", err),
        )
    }

    fn stop_tracker(&self) {
        if let Err(e) = self.tracker.stop_tracking() {
            error!("[JourneySession] Failed to stop location tracking: {}", e);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn handle_location_update<R: TravelRepository>(
    state: &Mutex<SessionState>,
    repository: &R,
    clock: &Clock,
    location: LocationUpdate,
) {
    let updated_travel = {
        let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;
        state.current_location = Some(location);

        if state.mode != SessionMode::Tracking || state.active_travel().is_none() {
            return;
        }

        let result = state.detector.process_location(location, &state.journey);
        if result.new_status == state.journey.status {
            return;
        }

        info!(
            "[JourneySession] Journey state changed {:?} -> {:?}",
            state.journey.status, result.new_status
        );
        state.journey.status = result.new_status;

        let (true, Some(step_type)) = (result.should_create_new_step, result.step_type) else {
            return;
        };
        let Some(travel) = state.travel.as_mut() else {
            return;
        };

        let now = clock();
        if let Some(previous) = state.journey.current_step.take() {
            let closed = previous.closed_at(now);
            travel.replace_step(&closed);
            debug!("[JourneySession] Ended step {}", closed.id);
        }

        let step = TravelStep::open(travel.id.clone(), step_type, result.nearby_spot.map(|s| s.id), now);
        info!(
            "[JourneySession] New {} step {} (vehicle changes: {})",
            step.step_type,
            step.id,
            state.journey.detected_vehicle_changes + 1
        );
        travel.steps.push(step.clone());
        state.journey.current_step = Some(step);
        state.journey.detected_vehicle_changes += 1;

        travel.clone()
    };

    persist(repository, &updated_travel, "travel step");
}

fn persist<R: TravelRepository + ?Sized>(repository: &R, travel: &Travel, what: &str) {
    if let Err(e) = repository.save_travel(travel) {
        error!("[JourneySession] Failed to persist {} for {}: {}", what, travel.id, e);
    }
}
