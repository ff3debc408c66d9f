use crate::models::position::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

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

/// Whole minutes to cover the great-circle distance at `speed_kmh`, rounded.
pub fn eta_minutes(from: &GeoPoint, to: &GeoPoint, speed_kmh: f64) -> u32 {
    if speed_kmh <= 0.0 {
        return 0;
    }
    let minutes = haversine_km(from, to) / speed_kmh * 60.0;
    minutes.round().max(0.0) as u32
}

/// Linear interpolation between two points, `t` clamped to [0, 1].
/// Good enough for the short hops of a local service route.
pub fn interpolate(a: &GeoPoint, b: &GeoPoint, t: f64) -> GeoPoint {
    let t = t.clamp(0.0, 1.0);
    GeoPoint {
        lat: a.lat + (b.lat - a.lat) * t,
        lng: a.lng + (b.lng - a.lng) * t,
    }
}
