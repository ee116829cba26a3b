//! Great-circle distance.

use crate::types::Coordinate;

/// Mean Earth radius used for distance calculations.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance between two coordinates in meters.
#[must_use]
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let phi_a = a.latitude.to_radians();
    let phi_b = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi_a.cos() * phi_b.cos() * (d_lambda / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Whether `point` lies inside the circle. The boundary counts as inside.
#[must_use]
pub fn is_within(point: Coordinate, center: Coordinate, radius_meters: f64) -> bool {
    distance_meters(point, center) <= radius_meters
}

/// The coordinate `meters` due north of `origin`. Used to place test fixes.
#[must_use]
pub fn offset_north(origin: Coordinate, meters: f64) -> Coordinate {
    Coordinate::new(
        origin.latitude + (meters / EARTH_RADIUS_METERS).to_degrees(),
        origin.longitude,
    )
}
