//! # Route-Spot Matching
//!
//! Finds the hitchhiking spots that lie within a fixed corridor around a
//! driving route, ordered by where along the route they appear.
//!
//! ## Algorithm
//!
//! 1. Sample the route polyline every ~1 km of accumulated distance, always
//!    keeping the first and last point.
//! 2. For each spot, measure the distance to every sampled segment with
//!    [`distance_to_line_segment`] and keep the minimum.
//! 3. Spots closer than [`MAX_DISTANCE_FROM_ROUTE_METERS`] are kept, annotated
//!    with the rounded distance and the index of the sampled segment start.
//! 4. Results are stable-sorted by that index, so spots sharing a segment keep
//!    their input order.
//!
//! Sampling trades accuracy for speed: on a winding road a spot can be closer
//! to the real road than to the sampled chord. Spots inside the corridor are
//! rarely lost because the chord error is small compared with 500 m.

use serde::{Deserialize, Serialize};

use crate::geo_utils::{distance_to_line_segment, haversine_distance};
use crate::spot::Spot;
use crate::{id_newtype, GpsPoint, Timestamp};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Maximum distance between a spot and the route for the spot to be "on" it.
pub const MAX_DISTANCE_FROM_ROUTE_METERS: f64 = 500.0;

/// Accumulated distance between two sampled route points.
pub const ROUTE_SAMPLING_DISTANCE_METERS: f64 = 1000.0;

id_newtype!(
    /// Identifier of a computed navigation route.
    RouteId
);

/// A computed driving route. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationRoute {
    pub id: RouteId,
    pub origin: GpsPoint,
    pub destination: GpsPoint,
    pub destination_name: String,
    /// Ordered route geometry, origin first
    pub polyline: Vec<GpsPoint>,
    /// Kilometers, one decimal
    pub distance_km: f64,
    /// Whole minutes
    pub duration_minutes: f64,
    pub created_at: Timestamp,
}

impl NavigationRoute {
    /// Build a route from raw provider figures (meters and seconds).
    pub fn new(
        origin: GpsPoint,
        destination: GpsPoint,
        destination_name: &str,
        polyline: Vec<GpsPoint>,
        distance_meters: f64,
        duration_seconds: f64,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: RouteId::generate(),
            origin,
            destination,
            destination_name: destination_name.to_string(),
            polyline,
            distance_km: (distance_meters / 100.0).round() / 10.0,
            duration_minutes: (duration_seconds / 60.0).round(),
            created_at,
        }
    }
}

/// A spot annotated with its position relative to a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotOnRoute {
    pub spot: Spot,
    /// Rounded to the nearest meter
    pub distance_from_route_meters: f64,
    /// Start index of the closest sampled segment
    pub closest_route_point_index: usize,
}

/// Minimum distance from a spot to a sampled route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteDistance {
    pub distance_meters: f64,
    pub closest_index: usize,
}

/// Indices of the polyline points used for matching.
///
/// Routes with two points or fewer are returned whole. Otherwise index 0,
/// every index where the accumulated distance reaches
/// [`ROUTE_SAMPLING_DISTANCE_METERS`] (the accumulator then restarts), and the
/// last index.
pub fn sample_route_points(polyline: &[GpsPoint]) -> Vec<usize> {
    if polyline.len() <= 2 {
        return (0..polyline.len()).collect();
    }

    let mut indices = vec![0];
    let mut accumulated = 0.0;

    for i in 1..polyline.len() {
        accumulated += haversine_distance(&polyline[i - 1], &polyline[i]);
        if accumulated >= ROUTE_SAMPLING_DISTANCE_METERS {
            indices.push(i);
            accumulated = 0.0;
        }
    }

    let last = polyline.len() - 1;
    if indices.last() != Some(&last) {
        indices.push(last);
    }

    indices
}

/// Closest sampled segment to `spot`, or `None` if it lies outside the corridor.
///
/// Ties keep the earliest segment.
pub fn find_min_distance_to_route(spot: &Spot, polyline: &[GpsPoint], sampled: &[usize]) -> Option<RouteDistance> {
    let mut best: Option<RouteDistance> = None;

    for pair in sampled.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        let (Some(a), Some(b)) = (polyline.get(start), polyline.get(end)) else {
            continue;
        };
        let distance = distance_to_line_segment(&spot.coordinates, a, b);

        if best.map_or(true, |b| distance < b.distance_meters) {
            best = Some(RouteDistance { distance_meters: distance, closest_index: start });
        }
    }

    best.filter(|b| b.distance_meters <= MAX_DISTANCE_FROM_ROUTE_METERS)
}

/// Spots within the route corridor, ordered by position along the route.
pub fn find_spots_along_route(route: &NavigationRoute, spots: &[Spot]) -> Vec<SpotOnRoute> {
    if spots.is_empty() || route.polyline.len() < 2 {
        return Vec::new();
    }

    let sampled = sample_route_points(&route.polyline);
    let annotate = |spot: &Spot| {
        find_min_distance_to_route(spot, &route.polyline, &sampled).map(|d| SpotOnRoute {
            spot: spot.clone(),
            distance_from_route_meters: d.distance_meters.round(),
            closest_route_point_index: d.closest_index,
        })
    };

    #[cfg(feature = "parallel")]
    let mut on_route: Vec<SpotOnRoute> = spots.par_iter().filter_map(annotate).collect();

    #[cfg(not(feature = "parallel"))]
    let mut on_route: Vec<SpotOnRoute> = spots.iter().filter_map(annotate).collect();

    log::debug!(
        "[RouteSpots] {} of {} spots within {}m of route {} ({} samples)",
        on_route.len(),
        spots.len(),
        MAX_DISTANCE_FROM_ROUTE_METERS,
        route.id,
        sampled.len()
    );

    on_route.sort_by_key(|s| s.closest_route_point_index);
    on_route
}

/// Straight-line distance to the destination in meters.
pub fn distance_to_destination(current: &GpsPoint, destination: &GpsPoint) -> f64 {
    haversine_distance(current, destination)
}
