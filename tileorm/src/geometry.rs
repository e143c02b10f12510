//! Geometry value types stored in a model's geometry field.
//!
//! All three types are immutable once built and validate their invariants in their
//! constructors. Their serde forms are plain arrays/strings so that a model may declare
//! the field as the value type itself or as the equivalent tuple.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::GeometryError;

/// Base32 alphabet used by geohashes.
const GEOHASH_ALPHABET: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";
/// Longest geohash Tile38 will produce.
pub const MAX_GEOHASH_PRECISION: usize = 12;
/// Precision used when a geohash field does not declare one.
pub const DEFAULT_GEOHASH_PRECISION: u8 = 9;

/// A longitude/latitude coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f64, f64)", into = "(f64, f64)")]
pub struct Point {
    lon: f64,
    lat: f64,
}

impl Point {
    pub fn new(lon: f64, lat: f64) -> Result<Self, GeometryError> {
        if !(-180.0..=180.0).contains(&lon) {
            return Err(GeometryError::LongitudeOutOfRange(lon));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(GeometryError::LatitudeOutOfRange(lat));
        }
        Ok(Self { lon, lat })
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// GeoJSON position, `[lon, lat]`.
    pub fn position(&self) -> [f64; 2] {
        [self.lon, self.lat]
    }
}

impl TryFrom<(f64, f64)> for Point {
    type Error = GeometryError;

    fn try_from((lon, lat): (f64, f64)) -> Result<Self, Self::Error> {
        Point::new(lon, lat)
    }
}

impl From<Point> for (f64, f64) {
    fn from(point: Point) -> Self {
        (point.lon, point.lat)
    }
}

impl PartialEq<(f64, f64)> for Point {
    fn eq(&self, other: &(f64, f64)) -> bool {
        self.lon == other.0 && self.lat == other.1
    }
}

/// A geohash cell identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GeoHash(String);

impl GeoHash {
    pub fn new(value: impl Into<String>) -> Result<Self, GeometryError> {
        let value = value.into();
        if value.is_empty() {
            return Err(GeometryError::EmptyGeoHash);
        }
        if value.len() > MAX_GEOHASH_PRECISION || !value.bytes().all(|b| alphabet_index(b).is_some()) {
            return Err(GeometryError::InvalidGeoHash(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn precision(&self) -> usize {
        self.0.len()
    }

    /// Centre of the cell described by this geohash.
    pub fn decode(&self) -> Point {
        let mut lon = (-180.0_f64, 180.0_f64);
        let mut lat = (-90.0_f64, 90.0_f64);
        let mut even = true;
        for byte in self.0.bytes() {
            // Validated in `new`.
            let bits = alphabet_index(byte).unwrap_or(0);
            for shift in (0..5).rev() {
                let range = if even { &mut lon } else { &mut lat };
                let mid = (range.0 + range.1) / 2.0;
                if bits >> shift & 1 == 1 {
                    range.0 = mid;
                } else {
                    range.1 = mid;
                }
                even = !even;
            }
        }
        Point {
            lon: (lon.0 + lon.1) / 2.0,
            lat: (lat.0 + lat.1) / 2.0,
        }
    }

    /// Encode `point` into a geohash of `precision` characters.
    pub fn encode(point: Point, precision: usize) -> Result<Self, GeometryError> {
        if precision == 0 || precision > MAX_GEOHASH_PRECISION {
            return Err(GeometryError::InvalidPrecision(precision));
        }
        let mut lon = (-180.0_f64, 180.0_f64);
        let mut lat = (-90.0_f64, 90.0_f64);
        let mut even = true;
        let mut out = String::with_capacity(precision);
        while out.len() < precision {
            let mut bits = 0usize;
            for _ in 0..5 {
                let (range, value) = if even { (&mut lon, point.lon) } else { (&mut lat, point.lat) };
                let mid = (range.0 + range.1) / 2.0;
                bits <<= 1;
                if value >= mid {
                    bits |= 1;
                    range.0 = mid;
                } else {
                    range.1 = mid;
                }
                even = !even;
            }
            out.push(GEOHASH_ALPHABET[bits] as char);
        }
        Ok(Self(out))
    }
}

fn alphabet_index(byte: u8) -> Option<usize> {
    GEOHASH_ALPHABET.iter().position(|candidate| *candidate == byte)
}

impl TryFrom<String> for GeoHash {
    type Error = GeometryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        GeoHash::new(value)
    }
}

impl From<GeoHash> for String {
    fn from(hash: GeoHash) -> Self {
        hash.0
    }
}

impl PartialEq<&str> for GeoHash {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for GeoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f64, f64, f64, f64)", into = "(f64, f64, f64, f64)")]
pub struct Bounds {
    min: Point,
    max: Point,
}

impl Bounds {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, GeometryError> {
        let min = Point::new(min_lon, min_lat)?;
        let max = Point::new(max_lon, max_lat)?;
        if min_lon > max_lon {
            return Err(GeometryError::InvertedBounds {
                axis: "longitude",
                min: min_lon,
                max: max_lon,
            });
        }
        if min_lat > max_lat {
            return Err(GeometryError::InvertedBounds {
                axis: "latitude",
                min: min_lat,
                max: max_lat,
            });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> Point {
        self.min
    }

    pub fn max(&self) -> Point {
        self.max
    }

    /// Closed polygon ring: the four corners counter-clockwise, first corner repeated.
    pub fn ring(&self) -> [[f64; 2]; 5] {
        let (min_lon, min_lat, max_lon, max_lat): (f64, f64, f64, f64) = (*self).into();
        [
            [min_lon, min_lat],
            [max_lon, min_lat],
            [max_lon, max_lat],
            [min_lon, max_lat],
            [min_lon, min_lat],
        ]
    }
}

impl TryFrom<(f64, f64, f64, f64)> for Bounds {
    type Error = GeometryError;

    fn try_from((min_lon, min_lat, max_lon, max_lat): (f64, f64, f64, f64)) -> Result<Self, Self::Error> {
        Bounds::new(min_lon, min_lat, max_lon, max_lat)
    }
}

impl From<Bounds> for (f64, f64, f64, f64) {
    fn from(bounds: Bounds) -> Self {
        (bounds.min.lon, bounds.min.lat, bounds.max.lon, bounds.max.lat)
    }
}

impl PartialEq<(f64, f64, f64, f64)> for Bounds {
    fn eq(&self, other: &(f64, f64, f64, f64)) -> bool {
        <(f64, f64, f64, f64)>::from(*self) == *other
    }
}
