use serde::Serialize;

use crate::models::location::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Assumed urban travel speed for the pre-routing ETA estimate. Superseded
/// wherever a real directions result is available.
const ASSUMED_SPEED_KMH: f64 = 25.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Linear ETA in whole minutes at the assumed urban speed.
pub fn eta_minutes(distance_km: f64) -> u32 {
    (distance_km / ASSUMED_SPEED_KMH * 60.0).round() as u32
}

/// Straight-line estimate shown before any routing-API result arrives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub eta_min: u32,
}

impl RouteEstimate {
    pub fn between(origin: &GeoPoint, destination: &GeoPoint) -> Self {
        let distance_km = haversine_km(origin, destination);
        Self {
            distance_km,
            eta_min: eta_minutes(distance_km),
        }
    }
}
