//! Directions contract and OpenRouteService client.
//!
//! Route computation never panics and never returns [`crate::Error`]: every
//! failure becomes a [`RoutingFailure`] carrying a kind the UI can branch on
//! and a message it can show as-is.
//!
//! The HTTP client lives behind the `http` feature. The wire types and
//! [`route_from_response`] are always available so providers other than
//! OpenRouteService (and tests) can reuse the same conversion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use thiserror::Error;

use crate::polyline::decode_polyline;
use crate::route_spots::NavigationRoute;
use crate::{GpsPoint, Timestamp};

/// Default OpenRouteService driving directions endpoint.
pub const DEFAULT_ORS_URL: &str = "https://api.openrouteservice.org/v2/directions/driving-car";

/// Category of a routing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingErrorKind {
    /// Transport failure, non-success status or missing configuration
    NetworkError,
    /// HTTP 429 from the provider. Not retried.
    RateLimit,
    InvalidCoordinates,
    NoRoute,
}

impl RoutingErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingErrorKind::NetworkError => "network_error",
            RoutingErrorKind::RateLimit => "rate_limit",
            RoutingErrorKind::InvalidCoordinates => "invalid_coordinates",
            RoutingErrorKind::NoRoute => "no_route",
        }
    }
}

impl fmt::Display for RoutingErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed routing failure with a user-facing message.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct RoutingFailure {
    pub kind: RoutingErrorKind,
    pub message: String,
}

impl RoutingFailure {
    pub fn new(kind: RoutingErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn not_configured() -> Self {
        Self::new(RoutingErrorKind::NetworkError, "Routing service not configured")
    }

    pub fn rate_limited() -> Self {
        Self::new(RoutingErrorKind::RateLimit, "Too many requests, try again in a minute")
    }

    pub fn no_route() -> Self {
        Self::new(RoutingErrorKind::NoRoute, "No route found")
    }
}

/// Anything able to compute a driving route between two points.
pub trait RouteProvider: Send + Sync {
    fn calculate_route(
        &self,
        origin: GpsPoint,
        destination: GpsPoint,
        destination_name: &str,
    ) -> impl Future<Output = Result<NavigationRoute, RoutingFailure>> + Send;
}

/// Routing client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingConfig {
    /// Directions endpoint.
    /// Default: OpenRouteService driving-car
    pub api_url: String,

    /// API key sent verbatim in the `Authorization` header.
    /// Default: none (every request fails with `network_error`)
    pub api_key: Option<String>,

    /// Whole-request timeout.
    /// Default: 10 seconds
    pub timeout_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_ORS_URL.to_string(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl RoutingConfig {
    /// Defaults overridden by `ORS_API_KEY` and `ORS_API_URL` when set and non-empty.
    pub fn from_env() -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            api_url: non_empty("ORS_API_URL").unwrap_or(defaults.api_url),
            api_key: non_empty("ORS_API_KEY"),
            timeout_secs: defaults.timeout_secs,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

// ============================================================================
// Wire format
// ============================================================================

/// Directions request body: `[lng, lat]` pairs, origin first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionsRequest {
    pub coordinates: Vec<[f64; 2]>,
}

impl DirectionsRequest {
    pub fn new(origin: &GpsPoint, destination: &GpsPoint) -> Self {
        Self {
            coordinates: vec![
                [origin.longitude, origin.latitude],
                [destination.longitude, destination.latitude],
            ],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectionsResponse {
    #[serde(default)]
    pub routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectionsRoute {
    #[serde(default)]
    pub summary: RouteSummary,
    /// Encoded polyline, 1e-5 precision
    pub geometry: String,
}

/// Provider figures. Zero-length routes omit both fields.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RouteSummary {
    /// Meters
    #[serde(default)]
    pub distance: f64,
    /// Seconds
    #[serde(default)]
    pub duration: f64,
}

/// Turn a decoded directions response into a [`NavigationRoute`].
///
/// Only the first route is used. No route, or a geometry that decodes to
/// fewer than two points, is a `no_route` failure.
pub fn route_from_response(
    response: DirectionsResponse,
    origin: GpsPoint,
    destination: GpsPoint,
    destination_name: &str,
    now: Timestamp,
) -> Result<NavigationRoute, RoutingFailure> {
    let Some(first) = response.routes.into_iter().next() else {
        return Err(RoutingFailure::no_route());
    };

    let polyline = decode_polyline(&first.geometry);
    if polyline.len() < 2 {
        return Err(RoutingFailure::no_route());
    }

    Ok(NavigationRoute::new(
        origin,
        destination,
        destination_name,
        polyline,
        first.summary.distance,
        first.summary.duration,
        now,
    ))
}

/// Reject non-finite or out-of-range endpoints.
pub fn validate_coordinates(origin: &GpsPoint, destination: &GpsPoint) -> Result<(), RoutingFailure> {
    if origin.is_valid() && destination.is_valid() {
        Ok(())
    } else {
        Err(RoutingFailure::new(
            RoutingErrorKind::InvalidCoordinates,
            "Origin or destination is not a valid coordinate",
        ))
    }
}

// ============================================================================
// HTTP client
// ============================================================================

#[cfg(feature = "http")]
pub use client::{calculate_route_blocking, OrsClient};

#[cfg(feature = "http")]
mod client {
    use super::*;
    use log::{debug, info, warn};
    use reqwest::{Client, StatusCode};
    use std::time::{Duration, Instant};

    /// OpenRouteService directions client.
    #[derive(Debug, Clone)]
    pub struct OrsClient {
        client: Client,
        config: RoutingConfig,
    }

    impl OrsClient {
        pub fn new(config: RoutingConfig) -> crate::Result<Self> {
            let client = Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .pool_idle_timeout(Duration::from_secs(60))
                .build()
                .map_err(|e| crate::Error::Http {
                    message: format!("Failed to create HTTP client: {}", e),
                    status_code: None,
                })?;

            Ok(Self { client, config })
        }

        pub fn config(&self) -> &RoutingConfig {
            &self.config
        }

        async fn request_route(
            &self,
            origin: GpsPoint,
            destination: GpsPoint,
            destination_name: &str,
        ) -> Result<NavigationRoute, RoutingFailure> {
            let Some(api_key) = self.config.api_key.as_deref() else {
                warn!("[RouteClient] API key not configured");
                return Err(RoutingFailure::not_configured());
            };
            validate_coordinates(&origin, &destination)?;

            let start = Instant::now();
            let response = self
                .client
                .post(&self.config.api_url)
                .header("Authorization", api_key)
                .json(&DirectionsRequest::new(&origin, &destination))
                .send()
                .await
                .map_err(|e| {
                    warn!("[RouteClient] Request failed after {:?}: {}", start.elapsed(), e);
                    RoutingFailure::new(
                        RoutingErrorKind::NetworkError,
                        "Unable to calculate the route (offline?)",
                    )
                })?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!("[RouteClient] 429 Too Many Requests, not retrying");
                return Err(RoutingFailure::rate_limited());
            }
            if !status.is_success() {
                warn!("[RouteClient] HTTP {} from directions API", status);
                return Err(RoutingFailure::new(
                    RoutingErrorKind::NetworkError,
                    "Unable to calculate the route",
                ));
            }

            let body: DirectionsResponse = response.json().await.map_err(|e| {
                warn!("[RouteClient] Invalid directions payload: {}", e);
                RoutingFailure::new(RoutingErrorKind::NetworkError, "Unable to calculate the route")
            })?;

            let route = route_from_response(body, origin, destination, destination_name, crate::now_ms())?;

            info!(
                "[RouteClient] Route to {}: {} km, {} min, {} points in {:?}",
                destination_name,
                route.distance_km,
                route.duration_minutes,
                route.polyline.len(),
                start.elapsed()
            );
            debug!("[RouteClient] Route id {}", route.id);

            Ok(route)
        }
    }

    impl RouteProvider for OrsClient {
        async fn calculate_route(
            &self,
            origin: GpsPoint,
            destination: GpsPoint,
            destination_name: &str,
        ) -> Result<NavigationRoute, RoutingFailure> {
            self.request_route(origin, destination, destination_name).await
        }
    }

    /// Synchronous wrapper for FFI - runs the request on a tokio runtime
    pub fn calculate_route_blocking(
        config: RoutingConfig,
        origin: GpsPoint,
        destination: GpsPoint,
        destination_name: &str,
    ) -> Result<NavigationRoute, RoutingFailure> {
        use tokio::runtime::Builder;

        let rt = Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| {
                warn!("[RouteClient] Failed to create tokio runtime: {}", e);
                RoutingFailure::new(RoutingErrorKind::NetworkError, format!("Runtime error: {}", e))
            })?;

        let client = OrsClient::new(config).map_err(|e| {
            warn!("[RouteClient] {}", e);
            RoutingFailure::new(RoutingErrorKind::NetworkError, e.to_string())
        })?;

        rt.block_on(client.calculate_route(origin, destination, destination_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE_GEOMETRY: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn origin() -> GpsPoint {
        GpsPoint::new(38.5, -120.2)
    }

    fn destination() -> GpsPoint {
        GpsPoint::new(43.252, -126.453)
    }

    #[test]
    fn test_request_is_lng_lat() {
        let body = serde_json::to_value(DirectionsRequest::new(&origin(), &destination())).unwrap();
        assert_eq!(body, serde_json::json!({"coordinates": [[-120.2, 38.5], [-126.453, 43.252]]}));
    }

    #[test]
    fn test_route_from_response() {
        let response: DirectionsResponse = serde_json::from_value(serde_json::json!({
            "routes": [{
                "summary": {"distance": 123_456.0, "duration": 5_430.0},
                "geometry": REFERENCE_GEOMETRY
            }]
        }))
        .unwrap();

        let route = route_from_response(response, origin(), destination(), "Coast", 42).unwrap();
        assert_eq!(route.polyline.len(), 3);
        assert_eq!(route.distance_km, 123.5);
        assert_eq!(route.duration_minutes, 91.0);
        assert_eq!(route.destination_name, "Coast");
        assert_eq!(route.created_at, 42);
    }

    #[test]
    fn test_empty_routes_is_no_route() {
        let response: DirectionsResponse = serde_json::from_str(r#"{"routes": []}"#).unwrap();
        let err = route_from_response(response, origin(), destination(), "X", 0).unwrap_err();
        assert_eq!(err.kind, RoutingErrorKind::NoRoute);

        let missing: DirectionsResponse = serde_json::from_str("{}").unwrap();
        let err = route_from_response(missing, origin(), destination(), "X", 0).unwrap_err();
        assert_eq!(err.kind, RoutingErrorKind::NoRoute);
    }

    #[test]
    fn test_summary_may_be_omitted() {
        let response: DirectionsResponse = serde_json::from_value(serde_json::json!({
            "routes": [{"summary": {}, "geometry": REFERENCE_GEOMETRY}]
        }))
        .unwrap();
        let route = route_from_response(response, origin(), destination(), "X", 0).unwrap();
        assert_eq!(route.distance_km, 0.0);
        assert_eq!(route.duration_minutes, 0.0);
    }

    #[test]
    fn test_error_kind_wire_names() {
        assert_eq!(serde_json::to_string(&RoutingErrorKind::RateLimit).unwrap(), "\"rate_limit\"");
        assert_eq!(
            serde_json::to_string(&RoutingErrorKind::InvalidCoordinates).unwrap(),
            "\"invalid_coordinates\""
        );
        assert_eq!(RoutingFailure::no_route().to_string(), "no_route: No route found");
    }

    #[test]
    fn test_invalid_coordinates() {
        let err = validate_coordinates(&GpsPoint::new(95.0, 0.0), &destination()).unwrap_err();
        assert_eq!(err.kind, RoutingErrorKind::InvalidCoordinates);
        assert!(validate_coordinates(&origin(), &destination()).is_ok());
    }

    #[test]
    fn test_default_config() {
        let config = RoutingConfig::default();
        assert_eq!(config.api_url, DEFAULT_ORS_URL);
        assert_eq!(config.timeout_secs, 10);
        assert!(config.api_key.is_none());
    }

    #[cfg(feature = "http")]
    mod http {
        use super::*;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        /// Serve a single canned HTTP response and return the endpoint URL.
        async fn serve_once(status_line: &'static str, body: &'static str) -> String {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();

            tokio::spawn(async move {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });

            format!("http://{}/v2/directions/driving-car", addr)
        }

        fn client_for(url: String) -> OrsClient {
            let config = RoutingConfig { api_url: url, api_key: Some("test-key".into()), timeout_secs: 5 };
            OrsClient::new(config).unwrap()
        }

        #[tokio::test]
        async fn test_successful_route() {
            let url = serve_once(
                "200 OK",
                r#"{"routes":[{"summary":{"distance":1500.0,"duration":120.0},"geometry":"_p~iF~ps|U_ulLnnqC_mqNvxq`@"}]}"#,
            )
            .await;

            let route = client_for(url).calculate_route(origin(), destination(), "Coast").await.unwrap();
            assert_eq!(route.polyline.len(), 3);
            assert_eq!(route.distance_km, 1.5);
            assert_eq!(route.duration_minutes, 2.0);
        }

        #[tokio::test]
        async fn test_rate_limit_is_not_retried() {
            let url = serve_once("429 Too Many Requests", "{}").await;
            let err = client_for(url).calculate_route(origin(), destination(), "X").await.unwrap_err();
            assert_eq!(err.kind, RoutingErrorKind::RateLimit);
        }

        #[tokio::test]
        async fn test_server_error_is_network_error() {
            let url = serve_once("500 Internal Server Error", "{}").await;
            let err = client_for(url).calculate_route(origin(), destination(), "X").await.unwrap_err();
            assert_eq!(err.kind, RoutingErrorKind::NetworkError);
        }

        #[tokio::test]
        async fn test_no_routes_in_payload() {
            let url = serve_once("200 OK", r#"{"routes":[]}"#).await;
            let err = client_for(url).calculate_route(origin(), destination(), "X").await.unwrap_err();
            assert_eq!(err.kind, RoutingErrorKind::NoRoute);
        }

        #[tokio::test]
        async fn test_missing_api_key() {
            let client = OrsClient::new(RoutingConfig::default()).unwrap();
            let err = client.calculate_route(origin(), destination(), "X").await.unwrap_err();
            assert_eq!(err.kind, RoutingErrorKind::NetworkError);
            assert_eq!(err, RoutingFailure::not_configured());
        }

        #[tokio::test]
        async fn test_unreachable_host_is_network_error() {
            // Bind then drop to get a port nobody listens on
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);

            let client = client_for(format!("http://{}/", addr));
            let err = client.calculate_route(origin(), destination(), "X").await.unwrap_err();
            assert_eq!(err.kind, RoutingErrorKind::NetworkError);
        }
    }
}
