use rust_decimal::prelude::ToPrimitive;

use crate::types::activity::{Position, TrackPoint};

/// Sphere radius used for every distance in the crate, in meters.
pub const EARTH_RADIUS_M: f64 = 6_378_100.0;

/// Great-circle distance in meters via the spherical law of cosines.
///
/// Loses precision for near-antipodal points and for separations well under a
/// meter; fine at track scale.
pub fn distance(a: &Position, b: &Position) -> f64 {
    if a == b {
        return 0.0;
    }
    let (ax, ay, az) = cartesian(a);
    let (bx, by, bz) = cartesian(b);
    let cos_angle = (ax * bx + ay * by + az * bz) / (EARTH_RADIUS_M * EARTH_RADIUS_M);
    cos_angle.min(1.0).acos() * EARTH_RADIUS_M
}

/// Meters per second between two points; zero when time does not advance.
pub fn speed(origin: &TrackPoint, end: &TrackPoint) -> f64 {
    let elapsed = elapsed_seconds(origin, end);
    if elapsed <= 0.0 {
        return 0.0;
    }
    distance(&origin.position, &end.position) / elapsed
}

/// Seconds from `origin` to `end`, zero when either lacks a timestamp.
pub fn elapsed_seconds(origin: &TrackPoint, end: &TrackPoint) -> f64 {
    match (origin.time(), end.time()) {
        (Some(start), Some(stop)) => (stop - start).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    }
}

fn cartesian(position: &Position) -> (f64, f64, f64) {
    let lat = position.latitude.to_f64().unwrap_or(0.0).to_radians();
    let lng = position.longitude.to_f64().unwrap_or(0.0).to_radians();
    let rho = EARTH_RADIUS_M * lat.cos();
    (rho * lng.cos(), rho * lng.sin(), EARTH_RADIUS_M * lat.sin())
}
