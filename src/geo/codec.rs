//! Point codec for the storage wire formats.
//!
//! The storage layer emits geometry as WKT text (`POINT(lng lat)`) on some
//! paths and as hex-encoded little-endian EWKB on others; this module is the
//! single place that absorbs the inconsistency. New writes always use the
//! hex form produced by [`encode`]; the WKT branch of [`decode`] is a
//! compatibility shim kept for data written before the formats converged.

use crate::geo::GeoPoint;

/// Byte-order marker, point-with-SRID geometry type, and SRID 4326, all
/// little-endian. 18 hex characters; a full point record is 50.
const EWKB_POINT_PREFIX: &str = "0101000020E6100000";

const EWKB_POINT_HEX_LEN: usize = 50;

/// Encodes a point as a 25-byte little-endian EWKB record rendered as hex:
/// 1-byte marker, 4-byte geometry type with the SRID flag set, 4-byte SRID,
/// then lng and lat as IEEE-754 doubles.
pub fn encode(point: &GeoPoint) -> String {
    let mut out = String::with_capacity(EWKB_POINT_HEX_LEN);
    out.push_str(EWKB_POINT_PREFIX);
    for b in point.lng.to_le_bytes() {
        out.push_str(&format!("{b:02X}"));
    }
    for b in point.lat.to_le_bytes() {
        out.push_str(&format!("{b:02X}"));
    }
    out
}

/// Decodes either wire shape into a point. Returns `None` for anything
/// else — malformed text, a wrong prefix, truncated hex, or coordinates
/// outside valid ranges. Never panics.
pub fn decode(text: &str) -> Option<GeoPoint> {
    let trimmed = text.trim();
    if let Some(inner) = trimmed
        .strip_prefix("POINT(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return decode_wkt_inner(inner);
    }
    decode_ewkb_hex(trimmed)
}

fn decode_wkt_inner(inner: &str) -> Option<GeoPoint> {
    let mut parts = inner.split_whitespace();
    let lng: f64 = parts.next()?.parse().ok()?;
    let lat: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    GeoPoint::new(lat, lng)
}

fn decode_ewkb_hex(text: &str) -> Option<GeoPoint> {
    if !text.is_ascii() || text.len() < EWKB_POINT_HEX_LEN {
        return None;
    }
    if !text[..EWKB_POINT_PREFIX.len()].eq_ignore_ascii_case(EWKB_POINT_PREFIX) {
        return None;
    }
    let lng = f64::from_le_bytes(parse_hex_f64(&text[18..34])?);
    let lat = f64::from_le_bytes(parse_hex_f64(&text[34..50])?);
    GeoPoint::new(lat, lng)
}

fn parse_hex_f64(hex: &str) -> Option<[u8; 8]> {
    let mut bytes = [0u8; 8];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk).ok()?;
        bytes[i] = u8::from_str_radix(pair, 16).ok()?;
    }
    Some(bytes)
}
