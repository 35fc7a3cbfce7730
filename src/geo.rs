const EARTH_RADIUS_NM: f64 = 3440.065;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observer {
    pub lat: f64,
    pub lon: f64,
}

/// Great-circle distance in nautical miles.
pub fn distance_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_NM * c
}

/// Distance from the observer, or `+inf` when the position is unknown.
pub fn distance_from(observer: Observer, position: Option<(f64, f64)>) -> f64 {
    match position {
        Some((lat, lon)) => distance_nm(observer.lat, observer.lon, lat, lon),
        None => f64::INFINITY,
    }
}
