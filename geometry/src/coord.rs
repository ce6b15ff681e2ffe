use geom::Distance;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Tolerance in degrees used when deciding two points are "the same place".
pub const DEFAULT_TOLERANCE: f64 = 1e-5;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

/// Ordered in travel direction
pub type Path = Vec<Coordinate>;

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// None if either axis isn't finite
    pub fn checked(lat: f64, lng: f64) -> Option<Self> {
        if lat.is_finite() && lng.is_finite() {
            Some(Self { lat, lng })
        } else {
            None
        }
    }

    /// 6 decimal places is about 11cm, plenty for hand-drawn routes
    pub fn rounded(self) -> Self {
        Self {
            lat: trim_lat_lng(self.lat),
            lng: trim_lat_lng(self.lng),
        }
    }

    pub fn dist_to(self, other: Coordinate) -> Distance {
        Distance::meters(distance_meters(self, other))
    }

    /// A hashable key, rounded to the given number of decimal places.
    pub fn key(self, decimals: i32) -> (i64, i64) {
        let scale = 10f64.powi(decimals);
        (
            (self.lat * scale).round() as i64,
            (self.lng * scale).round() as i64,
        )
    }
}

pub fn trim_lat_lng(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

/// Parses one raw `{lat, lng}` object. Numbers and numeric strings are accepted; anything missing,
/// non-numeric, or non-finite gives None, and callers just skip it.
pub fn sanitize_coordinate(value: &Value) -> Option<Coordinate> {
    let lat = parse_axis(value.get("lat")?)?;
    let lng = parse_axis(value.get("lng")?)?;
    Coordinate::checked(lat, lng)
}

fn parse_axis(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Drops invalid points, rounds the rest, and collapses consecutive duplicates.
pub fn sanitize_list(values: &[Value]) -> Path {
    let mut path: Path = values
        .iter()
        .filter_map(sanitize_coordinate)
        .map(Coordinate::rounded)
        .collect();
    path.dedup();
    path
}

/// Like `sanitize_list`, for points that're already typed.
pub fn sanitize_path(pts: &[Coordinate]) -> Path {
    let mut path: Path = pts
        .iter()
        .filter_map(|pt| Coordinate::checked(pt.lat, pt.lng))
        .map(Coordinate::rounded)
        .collect();
    path.dedup();
    path
}

/// Per-axis absolute difference, in degrees
pub fn approx_eq(a: Coordinate, b: Coordinate, tolerance: f64) -> bool {
    (a.lat - b.lat).abs() <= tolerance && (a.lng - b.lng).abs() <= tolerance
}

/// Haversine great-circle distance
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    // Rounding can push h just past 1 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_METERS * c
}

/// For `#[serde(deserialize_with)]` on stored paths. Garbage points are dropped instead of failing
/// the whole record.
pub fn deserialize_path<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Path, D::Error> {
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(sanitize_list(&raw))
}
