//! Google Roads and Geocoding, plugged into the snapping and region inference in `geometry`.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;

use geometry::{AddressParts, Coordinate, GeocodeClient, Path, SnapClient};

pub const ROADS_URL: &str = "https://roads.googleapis.com/v1/snapToRoads";
pub const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("building HTTP client")
}

fn require_key(key: &Option<String>) -> Result<&str> {
    match key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key),
        _ => bail!("No Google Maps API key; pass --api-key or set GOOGLE_MAPS_API_KEY"),
    }
}

/// Snaps one window of points with the Roads API. Cheap to clone, so snapping can happen on a
/// worker thread.
#[derive(Clone)]
pub struct RoadsClient {
    client: Client,
    url: String,
    key: Option<String>,
}

impl RoadsClient {
    pub fn new(client: Client, url: String, key: Option<String>) -> Self {
        Self { client, url, key }
    }
}

impl SnapClient for RoadsClient {
    fn snap(&self, pts: &[Coordinate]) -> Result<Path> {
        let key = require_key(&self.key)?;
        let path = pts
            .iter()
            .map(|pt| format!("{:.6},{:.6}", pt.lat, pt.lng))
            .collect::<Vec<_>>()
            .join("|");
        debug!("Snapping {} points", pts.len());
        let body = self
            .client
            .get(&self.url)
            .query(&[("path", path.as_str()), ("interpolate", "true"), ("key", key)])
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())
            .context("calling the Roads API")?;
        parse_snap_response(&body)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapResponse {
    #[serde(default)]
    snapped_points: Vec<SnappedPoint>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct SnappedPoint {
    location: LatLng,
}

#[derive(Deserialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

fn parse_snap_response(body: &str) -> Result<Path> {
    let resp: SnapResponse =
        serde_json::from_str(body).context("unexpected Roads API response")?;
    if let Some(err) = resp.error {
        bail!("Roads API failed: {} {}", err.status, err.message);
    }
    Ok(resp
        .snapped_points
        .into_iter()
        .filter_map(|pt| Coordinate::checked(pt.location.latitude, pt.location.longitude))
        .collect())
}

/// Reverse-geocodes single points. Wrap it in a `CachedGeocoder` to avoid repeating lookups.
pub struct GeocodingClient {
    client: Client,
    url: String,
    key: Option<String>,
}

impl GeocodingClient {
    pub fn new(client: Client, url: String, key: Option<String>) -> Self {
        Self { client, url, key }
    }
}

impl GeocodeClient for GeocodingClient {
    fn reverse_geocode(&self, pt: Coordinate) -> Result<Option<AddressParts>> {
        let key = require_key(&self.key)?;
        let latlng = format!("{:.6},{:.6}", pt.lat, pt.lng);
        let body = self
            .client
            .get(&self.url)
            .query(&[("latlng", latlng.as_str()), ("key", key)])
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())
            .with_context(|| format!("reverse geocoding {latlng}"))?;
        parse_geocode_response(&body)
    }
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Deserialize)]
struct AddressComponent {
    long_name: String,
    #[serde(default)]
    types: Vec<String>,
}

fn parse_geocode_response(body: &str) -> Result<Option<AddressParts>> {
    let resp: GeocodeResponse =
        serde_json::from_str(body).context("unexpected Geocoding API response")?;
    match resp.status.as_str() {
        "OK" => {}
        "ZERO_RESULTS" => return Ok(None),
        status => bail!(
            "Geocoding API returned {status}: {}",
            resp.error_message.unwrap_or_default()
        ),
    }

    // Results are ordered most specific first; take the first name of each kind
    let mut parts = AddressParts::default();
    for component in resp.results.iter().flat_map(|r| &r.address_components) {
        if component.long_name.trim().is_empty() {
            continue;
        }
        for kind in &component.types {
            let slot = match kind.as_str() {
                "administrative_area_level_1" => &mut parts.province,
                "locality" => &mut parts.locality,
                "postal_town" => &mut parts.postal_town,
                "administrative_area_level_2" => &mut parts.admin_area,
                "sublocality" | "sublocality_level_1" => &mut parts.sublocality,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(component.long_name.clone());
            }
        }
    }
    if parts == AddressParts::default() {
        return Ok(None);
    }
    Ok(Some(parts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapped_points() {
        let body = r#"{
            "snappedPoints": [
                {"location": {"latitude": -26.2041, "longitude": 28.0473}, "originalIndex": 0, "placeId": "a"},
                {"location": {"latitude": -26.2050, "longitude": 28.0481}, "placeId": "b"}
            ],
            "warningMessage": "Input path is too sparse."
        }"#;
        assert_eq!(
            parse_snap_response(body).unwrap(),
            vec![
                Coordinate::new(-26.2041, 28.0473),
                Coordinate::new(-26.2050, 28.0481)
            ]
        );
        assert_eq!(parse_snap_response("{}").unwrap(), Vec::new());
    }

    #[test]
    fn snap_error_body() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}}"#;
        let err = parse_snap_response(body).unwrap_err();
        assert!(err.to_string().contains("API key not valid"));
    }

    #[test]
    fn address_components() {
        let body = r#"{
            "status": "OK",
            "results": [
                {"address_components": [
                    {"long_name": "Braamfontein", "short_name": "Braamfontein", "types": ["sublocality", "political"]},
                    {"long_name": "Johannesburg", "short_name": "JHB", "types": ["locality", "political"]},
                    {"long_name": "City of Johannesburg Metropolitan Municipality", "types": ["administrative_area_level_2", "political"]},
                    {"long_name": "Gauteng", "short_name": "GP", "types": ["administrative_area_level_1", "political"]}
                ]},
                {"address_components": [
                    {"long_name": "Sandton", "types": ["locality", "political"]}
                ]}
            ]
        }"#;
        let parts = parse_geocode_response(body).unwrap().unwrap();
        assert_eq!(parts.province.as_deref(), Some("Gauteng"));
        assert_eq!(parts.locality.as_deref(), Some("Johannesburg"));
        assert_eq!(parts.sublocality.as_deref(), Some("Braamfontein"));
        assert_eq!(parts.postal_town, None);
    }

    #[test]
    fn geocode_statuses() {
        assert_eq!(
            parse_geocode_response(r#"{"status": "ZERO_RESULTS", "results": []}"#).unwrap(),
            None
        );
        let err = parse_geocode_response(
            r#"{"status": "REQUEST_DENIED", "error_message": "The provided API key is invalid."}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("REQUEST_DENIED"));
        assert!(parse_geocode_response("<html>").is_err());
    }

    #[test]
    fn missing_key() {
        let client = http_client(Duration::from_secs(1)).unwrap();
        let roads = RoadsClient::new(client.clone(), ROADS_URL.to_string(), None);
        assert!(roads
            .snap(&[Coordinate::new(-26.2, 28.05), Coordinate::new(-26.21, 28.06)])
            .is_err());
        let geocoder = GeocodingClient::new(client, GEOCODE_URL.to_string(), Some(" ".to_string()));
        assert!(geocoder
            .reverse_geocode(Coordinate::new(-26.2, 28.05))
            .is_err());
    }
}
