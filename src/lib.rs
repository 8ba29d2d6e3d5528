//! # Hitch Core
//!
//! Journey detection and route-spot matching for hitchhiking companions.
//!
//! This library provides:
//! - A journey state detector turning a noisy GPS stream into travel phases
//! - A route-spot matcher finding hitchhiking spots along a driving route
//! - A journey session orchestrating tracking, detection and persistence
//! - Navigation with arrival detection and driver-route comparison
//! - Google encoded polyline decoding and a directions client
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel spot matching with rayon
//! - **`http`** - Enable the HTTP directions client
//! - **`persistence`** - Enable SQLite-backed repositories
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use hitch_core::{
//!     find_spots_along_route, Appreciation, Direction, GpsPoint, NavigationRoute, Spot,
//! };
//!
//! let polyline: Vec<GpsPoint> = (0..20)
//!     .map(|i| GpsPoint::new(45.0 + i as f64 * 0.01, 5.0))
//!     .collect();
//! let route = NavigationRoute::new(
//!     polyline[0],
//!     polyline[19],
//!     "Grenoble",
//!     polyline.clone(),
//!     21_000.0,
//!     1_200.0,
//!     0,
//! );
//!
//! let spot = Spot::new(
//!     GpsPoint::new(45.05, 5.001),
//!     "D1075",
//!     Appreciation::Good,
//!     Direction::North,
//!     vec!["Grenoble".to_string()],
//!     "me",
//!     0,
//! );
//!
//! let on_route = find_spots_along_route(&route, &[spot]);
//! assert_eq!(on_route.len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Declare a string-backed identifier newtype.
macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generate a fresh random (UUID v4) identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}
pub(crate) use id_newtype;

pub mod error;
pub mod geo_utils;
pub mod journey;
pub mod spot;

// Journey state detection
pub mod detector;
pub use detector::{DetectionResult, JourneyDetector};

// Route-spot matching
pub mod route_spots;
pub use route_spots::{
    distance_to_destination, find_spots_along_route, NavigationRoute, RouteId, SpotOnRoute,
    MAX_DISTANCE_FROM_ROUTE_METERS,
};

// Encoded polyline decoding
pub mod polyline;
pub use polyline::{decode_polyline, decode_polyline_with_precision};

// Directions contract and client
pub mod routing;
pub use routing::{RouteProvider, RoutingConfig, RoutingErrorKind, RoutingFailure};

#[cfg(feature = "http")]
pub use routing::OrsClient;

// Collaborator contracts and in-memory stores
pub mod repository;
pub use repository::{
    CacheConfig, CachedSpotRepository, CommentRepository, MemoryCommentStore, MemorySpotStore,
    MemoryTravelStore, SpotRepository, TravelRepository,
};

// Journey orchestration
pub mod session;
pub use session::{
    JourneySession, LocationTracker, ManualStep, ManualStepPolicy, PushLocationTracker, SessionMode,
    TrackingCallbacks,
};

// Navigation
pub mod navigation;
pub use navigation::{ArrivalDetector, ArrivalStatus, DestinationMarker, NavigationSession, NavigationState};

// SQLite persistence
#[cfg(feature = "persistence")]
pub mod persistence;

#[cfg(feature = "persistence")]
pub use persistence::SqliteStore;

pub use error::{Error, Result};
pub use journey::{
    JourneyConfig, JourneyState, JourneyStatus, LocationUpdate, StepType, Travel, TravelId,
    TravelStatus, TravelStep, TravelStepId, UserId,
};
pub use spot::{Appreciation, Comment, CommentAppreciation, CommentId, Direction, Spot, SpotId};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("HitchCoreRust"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// Unix timestamp in milliseconds.
pub type Timestamp = i64;

/// Current wall-clock time as a [`Timestamp`].
pub fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use hitch_core::GpsPoint;
/// let point = GpsPoint::new(45.7640, 4.8357); // Lyon
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Axis-aligned latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(geo_utils::compute_bounds(points))
    }

    /// Bounds of the visible area of a map region.
    pub fn from_region(region: &MapRegion) -> Self {
        let half_lat = region.latitude_delta / 2.0;
        let half_lng = region.longitude_delta / 2.0;
        Self {
            min_lat: region.latitude - half_lat,
            max_lat: region.latitude + half_lat,
            min_lng: region.longitude - half_lng,
            max_lng: region.longitude + half_lng,
        }
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Edges inclusive.
    pub fn contains_point(&self, point: &GpsPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }

    /// True if `other` lies entirely within these bounds.
    pub fn contains(&self, other: &Bounds) -> bool {
        other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
            && other.min_lng >= self.min_lng
            && other.max_lng <= self.max_lng
    }

    /// Grow each side by `factor` times the span on that axis.
    pub fn expand(&self, factor: f64) -> Self {
        let lat_padding = (self.max_lat - self.min_lat) * factor;
        let lng_padding = (self.max_lng - self.min_lng) * factor;
        Self {
            min_lat: self.min_lat - lat_padding,
            max_lat: self.max_lat + lat_padding,
            min_lng: self.min_lng - lng_padding,
            max_lng: self.max_lng + lng_padding,
        }
    }

    /// Grow each side by a fixed distance in meters.
    pub fn pad_meters(&self, meters: f64) -> Self {
        let lat_padding = meters / 111_320.0;
        let lng_padding = geo_utils::meters_to_degrees(meters, self.center().latitude);
        Self {
            min_lat: self.min_lat - lat_padding,
            max_lat: self.max_lat + lat_padding,
            min_lng: self.min_lng - lng_padding,
            max_lng: self.max_lng + lng_padding,
        }
    }
}

/// A visible map area: center plus angular span.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(rename_all = "camelCase")]
pub struct MapRegion {
    pub latitude: f64,
    pub longitude: f64,
    pub latitude_delta: f64,
    pub longitude_delta: f64,
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use log::{debug, info};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    /// Flat spot record for mobile hosts.
    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiSpot {
        pub id: String,
        pub latitude: f64,
        pub longitude: f64,
        pub road_name: String,
        pub appreciation: Appreciation,
        pub direction: Direction,
        pub destinations: Vec<String>,
        pub created_at: i64,
        pub updated_at: i64,
        pub created_by: String,
    }

    impl From<FfiSpot> for Spot {
        fn from(s: FfiSpot) -> Self {
            Spot {
                id: SpotId::new(s.id),
                coordinates: GpsPoint::new(s.latitude, s.longitude),
                road_name: s.road_name,
                appreciation: s.appreciation,
                direction: s.direction,
                destinations: s.destinations,
                created_at: s.created_at,
                updated_at: s.updated_at,
                created_by: s.created_by,
            }
        }
    }

    impl From<Spot> for FfiSpot {
        fn from(s: Spot) -> Self {
            FfiSpot {
                id: s.id.to_string(),
                latitude: s.coordinates.latitude,
                longitude: s.coordinates.longitude,
                road_name: s.road_name,
                appreciation: s.appreciation,
                direction: s.direction,
                destinations: s.destinations,
                created_at: s.created_at,
                updated_at: s.updated_at,
                created_by: s.created_by,
            }
        }
    }

    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiSpotOnRoute {
        pub spot: FfiSpot,
        pub distance_from_route_meters: f64,
        pub closest_route_point_index: u32,
    }

    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiDetectionResult {
        pub new_status: JourneyStatus,
        pub should_create_new_step: bool,
        pub step_type: Option<StepType>,
        pub nearby_spot_id: Option<String>,
    }

    /// Get default detector configuration.
    #[uniffi::export]
    pub fn default_journey_config() -> JourneyConfig {
        init_logging();
        info!("[HitchCoreRust] default_journey_config called");
        JourneyConfig::default()
    }

    /// Decode a Google encoded polyline at 1e-5 precision.
    #[uniffi::export]
    pub fn ffi_decode_polyline(encoded: String) -> Vec<GpsPoint> {
        init_logging();
        let points = decode_polyline(&encoded);
        debug!("[HitchCoreRust] Decoded {} points from {} chars", points.len(), encoded.len());
        points
    }

    /// Find the spots within the corridor of a route polyline, in route order.
    #[uniffi::export]
    pub fn ffi_find_spots_along_route(polyline: Vec<GpsPoint>, spots: Vec<FfiSpot>) -> Vec<FfiSpotOnRoute> {
        init_logging();
        info!(
            "[HitchCoreRust] find_spots_along_route: {} route points, {} spots",
            polyline.len(),
            spots.len()
        );

        let start = std::time::Instant::now();

        let (Some(origin), Some(destination)) = (polyline.first().copied(), polyline.last().copied()) else {
            return Vec::new();
        };
        let route = NavigationRoute::new(origin, destination, "", polyline, 0.0, 0.0, now_ms());
        let spots: Vec<Spot> = spots.into_iter().map(Spot::from).collect();

        let result: Vec<FfiSpotOnRoute> = find_spots_along_route(&route, &spots)
            .into_iter()
            .map(|s| FfiSpotOnRoute {
                spot: s.spot.into(),
                distance_from_route_meters: s.distance_from_route_meters,
                closest_route_point_index: s.closest_route_point_index as u32,
            })
            .collect();

        info!("[HitchCoreRust] Found {} spots on route in {:?}", result.len(), start.elapsed());
        result
    }

    /// Journey detector handle for mobile hosts.
    #[derive(uniffi::Object)]
    pub struct FfiJourneyDetector {
        inner: Mutex<JourneyDetector>,
    }

    #[uniffi::export]
    impl FfiJourneyDetector {
        #[uniffi::constructor]
        pub fn new(config: JourneyConfig) -> Self {
            init_logging();
            Self { inner: Mutex::new(JourneyDetector::new(config)) }
        }

        pub fn process_location(&self, location: LocationUpdate, current_status: JourneyStatus) -> FfiDetectionResult {
            let state = JourneyState { status: current_status, ..JourneyState::idle(location.timestamp) };
            let mut detector = self.detector();
            let result = detector.process_location(location, &state);
            FfiDetectionResult {
                new_status: result.new_status,
                should_create_new_step: result.should_create_new_step,
                step_type: result.step_type,
                nearby_spot_id: result.nearby_spot.map(|s| s.id.to_string()),
            }
        }

        pub fn set_nearby_spots(&self, spots: Vec<FfiSpot>) {
            self.detector().set_nearby_spots(spots.into_iter().map(Spot::from).collect());
        }

        pub fn reset(&self) {
            self.detector().reset();
        }
    }

    impl FfiJourneyDetector {
        /// A panic inside the detector must not disable the handle.
        fn detector(&self) -> MutexGuard<'_, JourneyDetector> {
            self.inner.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    // ========================================================================
    // Directions (requires "http" feature)
    // ========================================================================

    /// Result of a directions request.
    #[cfg(feature = "http")]
    #[derive(Debug, Clone, uniffi::Record)]
    pub struct FfiRouteResult {
        pub success: bool,
        pub route_id: Option<String>,
        pub polyline: Vec<GpsPoint>,
        pub distance_km: f64,
        pub duration_minutes: f64,
        /// One of network_error, rate_limit, invalid_coordinates, no_route
        pub error_kind: Option<String>,
        pub error_message: Option<String>,
    }

    /// Compute a driving route. The API key falls back to `ORS_API_KEY` when empty.
    #[cfg(feature = "http")]
    #[uniffi::export]
    pub fn ffi_calculate_route(
        api_key: String,
        origin: GpsPoint,
        destination: GpsPoint,
        destination_name: String,
    ) -> FfiRouteResult {
        init_logging();
        info!("[HitchCoreRust] calculate_route to {}", destination_name);

        let mut config = RoutingConfig::from_env();
        if !api_key.is_empty() {
            config.api_key = Some(api_key);
        }

        match crate::routing::calculate_route_blocking(config, origin, destination, &destination_name) {
            Ok(route) => FfiRouteResult {
                success: true,
                route_id: Some(route.id.to_string()),
                polyline: route.polyline,
                distance_km: route.distance_km,
                duration_minutes: route.duration_minutes,
                error_kind: None,
                error_message: None,
            },
            Err(failure) => FfiRouteResult {
                success: false,
                route_id: None,
                polyline: Vec::new(),
                distance_km: 0.0,
                duration_minutes: 0.0,
                error_kind: Some(failure.kind.as_str().to_string()),
                error_message: Some(failure.message),
            },
        }
    }

}

// ============================================================================
// Tests
// ============================================================================
