//! Compact Position Reporting.
//!
//! Positions arrive as 17-bit fractions of a latitude/longitude zone, with
//! even and odd frames using slightly different zone sizes. Two ways to
//! resolve them:
//! - global: an even/odd pair received close together, no reference needed
//!   (airborne only, surface pairs are ambiguous to 90 degrees)
//! - local: one frame plus a reference position within half a zone

use crate::types::{CprFields, Position};

/// Latitude zones per hemisphere for even frames.
const NZ: f64 = 15.0;

/// 2^17, the CPR coordinate scale.
const CPR_SCALE: f64 = 131072.0;

/// Oldest partner frame usable for a global decode, in seconds.
pub const MAX_PAIR_AGE: f64 = 10.0;

/// A received CPR frame and its reception time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CprFrame {
    pub fields: CprFields,
    pub time: f64,
}

/// Number of longitude zones at `lat` (1 near the poles, 59 at the equator).
pub fn nl(lat: f64) -> i32 {
    let lat = lat.abs();
    if lat >= 87.0 {
        return 1;
    }
    let a = 1.0 - (std::f64::consts::PI / (2.0 * NZ)).cos();
    let b = lat.to_radians().cos().powi(2);
    let zones = (2.0 * std::f64::consts::PI / (1.0 - a / b).acos()).floor() as i32;
    zones.max(1)
}

/// Euclidean modulo for floats.
fn modulo(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

/// Degrees covered by the whole CPR grid.
fn span(surface: bool) -> f64 {
    if surface {
        90.0
    } else {
        360.0
    }
}

fn dlat(odd: bool, surface: bool) -> f64 {
    span(surface) / (4.0 * NZ - if odd { 1.0 } else { 0.0 })
}

fn dlon(lat: f64, odd: bool, surface: bool) -> f64 {
    let zones = (nl(lat) - odd as i32).max(1);
    span(surface) / zones as f64
}

fn wrap_lon(lon: f64) -> f64 {
    if lon >= 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

/// Resolve an airborne even/odd pair.
///
/// The most recent frame determines the result. Fails if the frames are too
/// far apart in time, or if they straddle a longitude zone boundary.
pub fn global_decode(even: &CprFrame, odd: &CprFrame) -> Option<Position> {
    if even.fields.odd || !odd.fields.odd || even.fields.surface || odd.fields.surface {
        return None;
    }
    if (even.time - odd.time).abs() > MAX_PAIR_AGE {
        return None;
    }

    let lat0 = even.fields.lat as f64 / CPR_SCALE;
    let lon0 = even.fields.lon as f64 / CPR_SCALE;
    let lat1 = odd.fields.lat as f64 / CPR_SCALE;
    let lon1 = odd.fields.lon as f64 / CPR_SCALE;

    let j = (59.0 * lat0 - 60.0 * lat1 + 0.5).floor();
    let mut rlat0 = dlat(false, false) * (modulo(j, 60.0) + lat0);
    let mut rlat1 = dlat(true, false) * (modulo(j, 59.0) + lat1);
    if rlat0 >= 270.0 {
        rlat0 -= 360.0;
    }
    if rlat1 >= 270.0 {
        rlat1 -= 360.0;
    }
    if !(-90.0..=90.0).contains(&rlat0) || !(-90.0..=90.0).contains(&rlat1) {
        return None;
    }
    if nl(rlat0) != nl(rlat1) {
        return None;
    }

    let use_odd = odd.time > even.time;
    let (lat, cpr_lon) = if use_odd { (rlat1, lon1) } else { (rlat0, lon0) };

    let zones = nl(lat);
    let m = (lon0 * (zones - 1) as f64 - lon1 * zones as f64 + 0.5).floor();
    let ni = (zones - use_odd as i32).max(1) as f64;
    let lon = (360.0 / ni) * (modulo(m, ni) + cpr_lon);

    Some(Position {
        lat,
        lon: wrap_lon(lon),
    })
}

/// Resolve a single frame against a reference position.
///
/// The reference must be within half a zone of the aircraft for the result
/// to be right; nothing here can tell if it is not.
pub fn local_decode(fields: &CprFields, reference: Position) -> Option<Position> {
    let cpr_lat = fields.lat as f64 / CPR_SCALE;
    let cpr_lon = fields.lon as f64 / CPR_SCALE;

    let dlat = dlat(fields.odd, fields.surface);
    let j = (reference.lat / dlat).floor()
        + (modulo(reference.lat, dlat) / dlat - cpr_lat + 0.5).floor();
    let lat = dlat * (j + cpr_lat);
    if !(-90.0..=90.0).contains(&lat) {
        return None;
    }

    let dlon = dlon(lat, fields.odd, fields.surface);
    let m = (reference.lon / dlon).floor()
        + (modulo(reference.lon, dlon) / dlon - cpr_lon + 0.5).floor();
    let lon = wrap_lon(dlon * (m + cpr_lon));

    Some(Position { lat, lon })
}

/// Mean Earth radius used for range checks, in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two positions, in metres.
pub fn distance_m(a: Position, b: Position) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
