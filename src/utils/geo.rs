use std::f64::consts::PI;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in meters.
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
  let lat1_rad = lat1 * PI / 180.0;
  let lat2_rad = lat2 * PI / 180.0;
  let delta_lat = (lat2 - lat1) * PI / 180.0;
  let delta_lng = (lng2 - lng1) * PI / 180.0;

  let a = (delta_lat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);

  let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

  EARTH_RADIUS_KM * c * 1000.0
}
