//! Flat-Earth geodetic projector: polar (range, azimuth) offsets from the
//! configured radar anchor into WGS84 latitude/longitude.
//!
//! This approximation is mandated by the legacy tooling it feeds (error
//! stays within a meter at the radar's 150 m range) — do not substitute an
//! ellipsoidal model.

const METERS_PER_DEGREE_LAT: f64 = 111_139.0;

/// A projected fix plus the intermediate Cartesian offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// East-component offset in meters.
    pub x_m: f64,
    /// North-component offset in meters.
    pub y_m: f64,
    /// Projected latitude, degrees.
    pub latitude_deg: f64,
    /// Projected longitude, degrees.
    pub longitude_deg: f64,
}

/// Projects a `(range_m, azimuth_deg)` polar detection from the anchor
/// `(anchor_lat_deg, anchor_lon_deg)` into a geodetic fix.
pub fn project(range_m: f64, azimuth_deg: f64, anchor_lat_deg: f64, anchor_lon_deg: f64) -> Projection {
    let az_rad = azimuth_deg.to_radians();
    let x_m = range_m * az_rad.cos();
    let y_m = range_m * az_rad.sin();

    let delta_lat = y_m / METERS_PER_DEGREE_LAT;
    let delta_lon = x_m / (METERS_PER_DEGREE_LAT * anchor_lat_deg.to_radians().cos());

    Projection {
        x_m,
        y_m,
        latitude_deg: anchor_lat_deg + delta_lat,
        longitude_deg: anchor_lon_deg + delta_lon,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_east_detection() {
        let p = project(100.0, 0.0, 45.0, -93.0);
        assert!((p.x_m - 100.0).abs() < 1e-6);
        assert!(p.y_m.abs() < 1e-6);
        assert!((p.latitude_deg - 45.0).abs() < 1e-6);
    }

    #[test]
    fn x_y_match_range_azimuth_formula() {
        let range = 50.0;
        let azimuth = 10.0;
        let p = project(range, azimuth, 45.0, -93.0);
        let expected_x = range * azimuth.to_radians().cos();
        let expected_y = range * azimuth.to_radians().sin();
        assert!((p.x_m - expected_x).abs() < 1e-6);
        assert!((p.y_m - expected_y).abs() < 1e-6);
    }

    #[test]
    fn offset_from_anchor_within_microdegree() {
        let anchor_lat = 45.0;
        let anchor_lon = -93.0;
        let p = project(50.0, 10.0, anchor_lat, anchor_lon);
        let expected_lat = anchor_lat + (50.0 * 10f64.to_radians().sin()) / METERS_PER_DEGREE_LAT;
        let expected_lon = anchor_lon
            + (50.0 * 10f64.to_radians().cos()) / (METERS_PER_DEGREE_LAT * anchor_lat.to_radians().cos());
        assert!((p.latitude_deg - expected_lat).abs() < 1e-6);
        assert!((p.longitude_deg - expected_lon).abs() < 1e-6);
    }
}
