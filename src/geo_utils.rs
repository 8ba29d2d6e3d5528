//! # Geographic Utilities
//!
//! Geodesy shared by the journey detector and the route-spot matcher.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`distance_to_line_segment`] | Distance from a point to a polyline segment |
//! | [`polyline_length`] | Total length of a GPS track in meters |
//! | [`compute_bounds`] | Bounding box of a GPS track |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//!
//! ## Example
//!
//! ```rust
//! use hitch_core::{GpsPoint, geo_utils};
//!
//! let lyon = GpsPoint::new(45.7640, 4.8357);
//! let valence = GpsPoint::new(44.9334, 4.8924);
//!
//! let dist = geo_utils::haversine_distance(&lyon, &valence);
//! assert!((dist - 92_500.0).abs() < 1_500.0);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! Every distance in the crate goes through [`haversine_distance`] with the
//! single constant [`EARTH_RADIUS_METERS`], so the detector and the matcher
//! always agree on what "100 meters" means.
//!
//! ### Segment projection
//!
//! [`distance_to_line_segment`] projects on raw latitude/longitude as if they
//! were planar coordinates, then measures the great-circle distance to the
//! projected point. This is not spherically exact but the error is negligible
//! at corridor scale (segments of ~1 km, corridors of 500 m).

use geo::{Closest, ClosestPoint, Coord, Line, Point};
use crate::{Bounds, GpsPoint};

/// Mean Earth radius used by every distance computation in the crate.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Segments shorter than this are treated as a single point.
const DEGENERATE_SEGMENT_METERS: f64 = 1.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface (spherical Earth
/// with radius [`EARTH_RADIUS_METERS`]). Identical points return exactly 0.
///
/// # Example
///
/// ```rust
/// use hitch_core::{GpsPoint, geo_utils};
///
/// let p = GpsPoint::new(48.8566, 2.3522);
/// assert_eq!(geo_utils::haversine_distance(&p, &p), 0.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let delta_lat = (p2.latitude - p1.latitude).to_radians();
    let delta_lng = (p2.longitude - p1.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Distance in meters from `point` to the segment `start`–`end`.
///
/// The projection parameter `t` is computed on raw lat/lon and clamped to
/// `[0, 1]`; the returned value is the Haversine distance from `point` to the
/// clamped projection. Segments shorter than 1 m fall back to the direct
/// distance to `start`.
///
/// # Example
///
/// ```rust
/// use hitch_core::{GpsPoint, geo_utils};
///
/// let start = GpsPoint::new(45.0, 5.0);
/// let end = GpsPoint::new(45.0, 5.1);
/// let on_segment = GpsPoint::new(45.0, 5.05);
///
/// assert!(geo_utils::distance_to_line_segment(&on_segment, &start, &end) < 1.0);
/// ```
pub fn distance_to_line_segment(point: &GpsPoint, start: &GpsPoint, end: &GpsPoint) -> f64 {
    if haversine_distance(start, end) < DEGENERATE_SEGMENT_METERS {
        return haversine_distance(point, start);
    }

    // Planar projection on (lng, lat) with the parameter clamped to the segment
    let line = Line::new(to_coord(start), to_coord(end));
    let target = Point::from(to_coord(point));

    let closest = match line.closest_point(&target) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => p,
        // Only reachable for NaN input; measure to the segment start instead
        Closest::Indeterminate => Point::from(to_coord(start)),
    };

    haversine_distance(point, &GpsPoint::new(closest.y(), closest.x()))
}

/// Calculate the total length of a polyline (GPS track) in meters.
///
/// Sums the haversine distance between consecutive points. Empty or single-point
/// tracks return 0.0.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Convert meters to approximate degrees at a given latitude.
///
/// Uses the longitude scale (the smaller of the two degree lengths), which
/// yields a conservative square padding for bounding boxes.
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    let meters_per_degree = 111_320.0 * lat_rad.cos().max(0.1);
    meters / meters_per_degree
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a GPS track.
///
/// For empty input, returns a bounds with MIN/MAX values that contain nothing.
pub fn compute_bounds(points: &[GpsPoint]) -> Bounds {
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Bounds { min_lat, max_lat, min_lng, max_lng }
}

#[inline]
fn to_coord(p: &GpsPoint) -> Coord {
    Coord { x: p.longitude, y: p.latitude }
}

// =============================================================================
// Unit Tests
// =============================================================================
