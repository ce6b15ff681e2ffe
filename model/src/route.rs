use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use geometry::{deserialize_path, sanitize_coordinate, Path};

/// Assigned by the store, starting from 1
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteID(pub usize);

/// A stored route
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub route_id: RouteID,
    #[serde(flatten)]
    pub draft: RouteDraft,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Everything about a route except what the store assigns
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDraft {
    #[serde(flatten)]
    pub details: RouteDetails,
    /// As drawn by the contributor
    #[serde(default, deserialize_with = "deserialize_path")]
    pub path: Path,
    /// Aligned to roads. The same as `path` if snapping never happened.
    #[serde(default, deserialize_with = "deserialize_path")]
    pub snapped_path: Path,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub city: String,
}

/// The parts of a route that contributors type in
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDetails {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub point_a_name: String,
    #[serde(default)]
    pub point_b_name: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub fare: Option<Fare>,
    /// The hand signal riders use to hail a taxi going this way
    #[serde(default)]
    pub gesture: String,
    #[serde(default, deserialize_with = "deserialize_stops")]
    pub stops: Vec<Stop>,
    #[serde(default)]
    pub frequency_per_hour: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fare {
    pub min: f64,
    pub max: f64,
    pub currency: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

// Like paths, one garbage stop shouldn't make the whole route unreadable
fn deserialize_stops<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Stop>, D::Error> {
    let raw = Vec::<Value>::deserialize(deserializer)?;
    let mut stops = Vec::new();
    for value in &raw {
        match sanitize_coordinate(value) {
            Some(pt) => {
                let pt = pt.rounded();
                stops.push(Stop {
                    name: value
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    lat: pt.lat,
                    lng: pt.lng,
                });
            }
            None => warn!("Skipping stop with bad coordinates: {}", value),
        }
    }
    Ok(stops)
}

impl Route {
    pub fn describe(&self) -> String {
        let name = if self.draft.details.name.is_empty() {
            format!("{:?}", self.route_id)
        } else {
            self.draft.details.name.clone()
        };
        let region = match (
            self.draft.city.is_empty(),
            self.draft.province.is_empty(),
        ) {
            (false, false) => format!(" ({}, {})", self.draft.city, self.draft.province),
            (false, true) => format!(" ({})", self.draft.city),
            (true, false) => format!(" ({})", self.draft.province),
            (true, true) => String::new(),
        };
        format!(
            "#{} {name}{region}: {} points drawn, {} snapped",
            self.route_id.0,
            self.draft.path.len(),
            self.draft.snapped_path.len()
        )
    }
}
