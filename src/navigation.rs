//! # Navigation
//!
//! Destination selection, route computation with spots along the way,
//! arrival detection and an optional comparison with a driver's route.
//!
//! A [`NavigationSession`] is a single-owner value: the host drives it from
//! one task and awaits [`NavigationSession::start_navigation`] and
//! [`NavigationSession::compare_with_driver_direction`] there.

use log::{debug, info, warn};

use crate::repository::SpotRepository;
use crate::route_spots::{
    distance_to_destination, find_min_distance_to_route, find_spots_along_route, sample_route_points,
    NavigationRoute, RouteId, SpotOnRoute, MAX_DISTANCE_FROM_ROUTE_METERS,
};
use crate::routing::{RouteProvider, RoutingErrorKind, RoutingFailure};
use crate::spot::Spot;
use crate::{Bounds, GpsPoint};

/// Distance to the destination under which the user has arrived.
pub const ARRIVAL_THRESHOLD_METERS: f64 = 200.0;

/// Result of an arrival check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrivalStatus {
    /// Rounded to the meter. Infinite without an active route.
    pub distance_meters: f64,
    /// True from the first arrival until the route changes or is cleared
    pub has_arrived: bool,
    /// True only for the fix that triggered arrival
    pub just_arrived: bool,
}

impl ArrivalStatus {
    fn no_route() -> Self {
        Self {
            distance_meters: f64::INFINITY,
            has_arrived: false,
            just_arrived: false,
        }
    }
}

/// Edge-triggered arrival detection, at most one trigger per route.
#[derive(Debug, Clone, Default)]
pub struct ArrivalDetector {
    route_id: Option<RouteId>,
    triggered: bool,
}

impl ArrivalDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `location` against the destination of `route`.
    ///
    /// Passing a different route re-arms the detector; passing `None` clears it.
    pub fn update(&mut self, route: Option<&NavigationRoute>, location: &GpsPoint) -> ArrivalStatus {
        let Some(route) = route else {
            self.clear();
            return ArrivalStatus::no_route();
        };

        if self.route_id.as_ref() != Some(&route.id) {
            self.route_id = Some(route.id.clone());
            self.triggered = false;
        }

        let distance = distance_to_destination(location, &route.destination);
        let just_arrived = distance < ARRIVAL_THRESHOLD_METERS && !self.triggered;
        if just_arrived {
            self.triggered = true;
            info!(
                "[Navigation] Arrival detected at {} ({:.0}m)",
                route.destination_name, distance
            );
        }

        ArrivalStatus {
            distance_meters: distance.round(),
            has_arrived: self.triggered,
            just_arrived,
        }
    }

    pub fn clear(&mut self) {
        self.route_id = None;
        self.triggered = false;
    }

    pub fn has_triggered(&self) -> bool {
        self.triggered
    }
}

/// Destination picked on the map, before navigation starts.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationMarker {
    pub location: GpsPoint,
    pub name: String,
}

/// Observable navigation state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationState {
    pub is_active: bool,
    pub route: Option<NavigationRoute>,
    /// Ordered along `route`
    pub spots_on_route: Vec<SpotOnRoute>,
    pub destination: Option<DestinationMarker>,
    pub driver_route: Option<NavigationRoute>,
    /// Spots of `spots_on_route` also within the corridor of `driver_route`
    pub common_spots_on_route: Vec<SpotOnRoute>,
}

/// Navigation flow over an injected route provider and spot source.
pub struct NavigationSession<P: RouteProvider, S: SpotRepository> {
    provider: P,
    spots: S,
    state: NavigationState,
    arrival: ArrivalDetector,
}

impl<P: RouteProvider, S: SpotRepository> NavigationSession<P, S> {
    pub fn new(provider: P, spots: S) -> Self {
        Self {
            provider,
            spots,
            state: NavigationState::default(),
            arrival: ArrivalDetector::new(),
        }
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn spot_repository(&self) -> &S {
        &self.spots
    }

    pub fn set_destination(&mut self, location: GpsPoint, name: &str) {
        info!(
            "[Navigation] Destination set: {} ({:.5}, {:.5})",
            name, location.latitude, location.longitude
        );
        self.state.destination = Some(DestinationMarker { location, name: name.to_string() });
    }

    /// Drop the destination and any navigation in progress.
    pub fn clear_destination(&mut self) {
        info!("[Navigation] Destination cleared");
        self.reset();
    }

    /// Compute a route to the selected destination and the spots along it.
    ///
    /// The destination marker is consumed on success. On failure the state is
    /// left unchanged.
    pub async fn start_navigation(&mut self, user_location: GpsPoint) -> Result<(), RoutingFailure> {
        let Some(destination) = self.state.destination.clone() else {
            warn!("[Navigation] Cannot start navigation: no destination set");
            return Err(RoutingFailure::new(
                RoutingErrorKind::InvalidCoordinates,
                "No destination selected",
            ));
        };

        info!(
            "[Navigation] Starting navigation to {} from ({:.5}, {:.5})",
            destination.name, user_location.latitude, user_location.longitude
        );

        let route = self
            .provider
            .calculate_route(user_location, destination.location, &destination.name)
            .await?;

        let candidates = self.spots_near_route(&route);
        let spots_on_route = find_spots_along_route(&route, &candidates);

        info!(
            "[Navigation] Navigation started: {} km, {} min, {} spots on route",
            route.distance_km,
            route.duration_minutes,
            spots_on_route.len()
        );

        self.state = NavigationState {
            is_active: true,
            route: Some(route),
            spots_on_route,
            ..NavigationState::default()
        };
        self.arrival.clear();
        Ok(())
    }

    pub fn stop_navigation(&mut self) {
        info!("[Navigation] Navigation stopped");
        self.reset();
    }

    /// Feed a user position to the arrival detector.
    pub fn update_location(&mut self, location: GpsPoint) -> ArrivalStatus {
        self.arrival.update(self.state.route.as_ref(), &location)
    }

    /// Compute the route a driver is taking and keep the spots shared with ours.
    ///
    /// Requires an active navigation. Returns the common spots, in the order
    /// they appear along the main route.
    pub async fn compare_with_driver_direction(
        &mut self,
        from: GpsPoint,
        driver_destination: GpsPoint,
        driver_destination_name: &str,
    ) -> Result<&[SpotOnRoute], RoutingFailure> {
        if !self.state.is_active {
            warn!("[Navigation] Cannot compare driver direction: navigation not active");
            return Err(RoutingFailure::new(
                RoutingErrorKind::InvalidCoordinates,
                "Navigation is not active",
            ));
        }

        let driver_route = self
            .provider
            .calculate_route(from, driver_destination, driver_destination_name)
            .await?;

        let common = common_spots(&self.state.spots_on_route, &driver_route);
        info!(
            "[Navigation] Driver heading to {}: {} of {} spots in common",
            driver_destination_name,
            common.len(),
            self.state.spots_on_route.len()
        );

        self.state.driver_route = Some(driver_route);
        self.state.common_spots_on_route = common;
        Ok(&self.state.common_spots_on_route)
    }

    pub fn clear_driver_comparison(&mut self) {
        debug!("[Navigation] Driver comparison cleared");
        self.state.driver_route = None;
        self.state.common_spots_on_route.clear();
    }

    /// Spots inside the route bounds padded by the corridor width.
    ///
    /// A repository failure degrades to no spots.
    fn spots_near_route(&self, route: &NavigationRoute) -> Vec<Spot> {
        let Some(bounds) = Bounds::from_points(&route.polyline) else {
            return Vec::new();
        };
        let padded = bounds.pad_meters(MAX_DISTANCE_FROM_ROUTE_METERS);

        match self.spots.get_spots_in_bounds(&padded) {
            Ok(spots) => spots,
            Err(e) => {
                warn!("[Navigation] Failed to load spots for route {}: {}", route.id, e);
                Vec::new()
            }
        }
    }

    fn reset(&mut self) {
        self.state = NavigationState::default();
        self.arrival.clear();
    }
}

/// Entries of `on_route` whose spot is also within the corridor of `other`.
fn common_spots(on_route: &[SpotOnRoute], other: &NavigationRoute) -> Vec<SpotOnRoute> {
    if other.polyline.len() < 2 {
        return Vec::new();
    }
    let sampled = sample_route_points(&other.polyline);
    on_route
        .iter()
        .filter(|s| find_min_distance_to_route(&s.spot, &other.polyline, &sampled).is_some())
        .cloned()
        .collect()
}
