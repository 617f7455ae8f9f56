//! Geographic coordinates and the degree-to-grid wire encoding.

use geo::{HaversineDistance, Point};

/// Scale for mapping decimal degrees onto the unsigned 32-bit wire grid.
/// 1e7 gives roughly centimeter resolution at the equator.
pub const CONVERSION_FACTOR: f64 = 10_000_000.0;

/// A position in decimal degrees, latitude in [-90, 90] and longitude in
/// [-180, 180].
///
/// The wire form is a pair of unsigned 32-bit grid values; conversion is
/// lossy but deterministic, and equality is defined over the encoded form
/// so that values compare the same in memory and on disk.
#[derive(Debug, Clone, Copy)]
pub struct GeoCoord {
    pub lat: f64,
    pub lon: f64,
}

impl GeoCoord {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoCoord { lat, lon }
    }

    /// The sentinel written as `(0xFFFFFFFF, 0xFFFFFFFF)`.
    pub fn invalid() -> Self {
        GeoCoord {
            lat: f64::NAN,
            lon: f64::NAN,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Grid form: `round((lat + 90) * C)` and `round((lon + 180) * C)`.
    pub fn encode(&self) -> (u32, u32) {
        if !self.is_valid() {
            return (u32::MAX, u32::MAX);
        }

        let lat = ((self.lat + 90.0) * CONVERSION_FACTOR).round() as u32;
        let lon = ((self.lon + 180.0) * CONVERSION_FACTOR).round() as u32;
        (lat, lon)
    }

    pub fn decode(lat_value: u32, lon_value: u32) -> Self {
        GeoCoord {
            lat: f64::from(lat_value) / CONVERSION_FACTOR - 90.0,
            lon: f64::from(lon_value) / CONVERSION_FACTOR - 180.0,
        }
    }
}

impl PartialEq for GeoCoord {
    fn eq(&self, other: &Self) -> bool {
        self.encode() == other.encode()
    }
}

/// Great-circle distance between two coordinates in kilometers.
pub fn spherical_distance_km(a: &GeoCoord, b: &GeoCoord) -> f64 {
    let p1 = Point::new(a.lon, a.lat);
    let p2 = Point::new(b.lon, b.lat);
    p1.haversine_distance(&p2) / 1000.0
}
