//! Google encoded polyline decoding.
//!
//! Each coordinate is stored as a zig-zag signed delta from the previous one,
//! split into 5-bit chunks offset by 63, with `0x20` marking continuation.
//! Latitude comes first.

use log::warn;

use crate::GpsPoint;

/// Standard Google precision (1e-5 degrees).
pub const DEFAULT_PRECISION: u32 = 5;

const CHUNK_OFFSET: u8 = 63;
const CONTINUATION_BIT: u64 = 0x20;
const CHUNK_MASK: u64 = 0x1f;

/// Decode a polyline at the standard 1e-5 precision.
///
/// Malformed input never panics: decoding stops at the first truncated or
/// invalid value and the points decoded so far are returned.
///
/// # Example
/// ```
/// use hitch_core::decode_polyline;
///
/// let points = decode_polyline("_p~iF~ps|U_ulLnnqC_mqNvxq`@");
/// assert_eq!(points.len(), 3);
/// assert!((points[0].latitude - 38.5).abs() < 1e-9);
/// assert!((points[0].longitude + 120.2).abs() < 1e-9);
/// ```
pub fn decode_polyline(encoded: &str) -> Vec<GpsPoint> {
    decode_polyline_with_precision(encoded, DEFAULT_PRECISION)
}

/// Decode a polyline encoded with `precision` decimal digits (5 for Google, 6 for OSRM-style).
pub fn decode_polyline_with_precision(encoded: &str, precision: u32) -> Vec<GpsPoint> {
    let factor = 10f64.powi(precision as i32);
    let bytes = encoded.as_bytes();
    let mut points = Vec::with_capacity(bytes.len() / 4);

    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;

    while index < bytes.len() {
        let Some(d_lat) = next_value(bytes, &mut index) else {
            warn!("[Polyline] Truncated latitude at byte {}, keeping {} points", index, points.len());
            break;
        };
        let Some(d_lng) = next_value(bytes, &mut index) else {
            warn!("[Polyline] Truncated longitude at byte {}, keeping {} points", index, points.len());
            break;
        };

        lat = lat.wrapping_add(d_lat);
        lng = lng.wrapping_add(d_lng);
        points.push(GpsPoint::new(lat as f64 / factor, lng as f64 / factor));
    }

    points
}

/// Read one zig-zag encoded value, advancing `index`.
fn next_value(bytes: &[u8], index: &mut usize) -> Option<i64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;

    loop {
        let byte = *bytes.get(*index)?;
        if !(CHUNK_OFFSET..=126).contains(&byte) || shift > 60 {
            return None;
        }
        *index += 1;

        let chunk = (byte - CHUNK_OFFSET) as u64;
        result |= (chunk & CHUNK_MASK) << shift;
        shift += 5;

        if chunk < CONTINUATION_BIT {
            break;
        }
    }

    let value = (result >> 1) as i64;
    Some(if result & 1 != 0 { !value } else { value })
}
