use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::Coordinate;

/// How many points along a path get reverse-geocoded
pub const MAX_SAMPLES: usize = 5;

// 5 decimal places is about 1m
const KEY_DECIMALS: i32 = 5;

/// The pieces of a reverse-geocoded address that matter for labelling a route
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressParts {
    pub province: Option<String>,
    pub locality: Option<String>,
    pub postal_town: Option<String>,
    pub admin_area: Option<String>,
    pub sublocality: Option<String>,
}

impl AddressParts {
    fn province(&self) -> Option<&str> {
        non_empty(&self.province)
    }

    // Not every place has a locality; fall back to progressively coarser (or finer) names
    fn city(&self) -> Option<&str> {
        non_empty(&self.locality)
            .or_else(|| non_empty(&self.postal_town))
            .or_else(|| non_empty(&self.admin_area))
            .or_else(|| non_empty(&self.sublocality))
    }
}

fn non_empty(x: &Option<String>) -> Option<&str> {
    x.as_deref().map(str::trim).filter(|x| !x.is_empty())
}

/// Empty strings mean unknown
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionLabel {
    pub province: String,
    pub city: String,
}

/// Wraps one call to an external reverse-geocoding service. `None` means the service had nothing
/// for this point.
pub trait GeocodeClient {
    fn reverse_geocode(&self, pt: Coordinate) -> Result<Option<AddressParts>>;
}

impl<F: Fn(Coordinate) -> Result<Option<AddressParts>>> GeocodeClient for F {
    fn reverse_geocode(&self, pt: Coordinate) -> Result<Option<AddressParts>> {
        self(pt)
    }
}

/// Labels a path by majority vote over a few points along it. A path can easily cross into another
/// suburb, so just looking up one endpoint isn't good enough. Individual lookups are allowed to
/// fail.
pub fn infer_region(path: &[Coordinate], geocoder: &dyn GeocodeClient) -> RegionLabel {
    let mut provinces = Votes::new();
    let mut cities = Votes::new();

    let samples = sample_points(path, MAX_SAMPLES);
    let mut failures = 0;
    for pt in &samples {
        match geocoder.reverse_geocode(*pt) {
            Ok(Some(address)) => {
                if let Some(x) = address.province() {
                    provinces.add(x);
                }
                if let Some(x) = address.city() {
                    cities.add(x);
                }
            }
            Ok(None) => {
                debug!("No address for {:?}", pt);
            }
            Err(err) => {
                failures += 1;
                warn!("Reverse geocoding {:?} failed: {:#}", pt, err);
            }
        }
    }
    if failures > 0 && failures == samples.len() {
        warn!("All {} reverse geocoding lookups failed", failures);
    }

    RegionLabel {
        province: provinces.winner(),
        city: cities.winner(),
    }
}

/// Picks up to `max` representative points, spread evenly by index. The first and last point are
/// always included. Points that round to the same place are only used once.
pub fn sample_points(path: &[Coordinate], max: usize) -> Vec<Coordinate> {
    if path.len() <= max {
        return path.to_vec();
    }
    if max < 2 {
        return vec![path[0], path[path.len() - 1]];
    }

    let last_idx = path.len() - 1;
    let mut indices: Vec<usize> = (0..max)
        .map(|i| ((i * last_idx) as f64 / (max - 1) as f64).round() as usize)
        .collect();
    if indices[0] != 0 {
        indices.insert(0, 0);
    }
    if indices[indices.len() - 1] != last_idx {
        indices.push(last_idx);
    }

    let mut seen = BTreeSet::new();
    let mut samples = Vec::new();
    for idx in indices {
        let pt = path[idx];
        if seen.insert(pt.key(KEY_DECIMALS)) {
            samples.push(pt);
        }
    }
    samples
}

// Remembers first-seen order, so ties go to whatever showed up first
struct Votes {
    counts: Vec<(String, usize)>,
}

impl Votes {
    fn new() -> Self {
        Self { counts: Vec::new() }
    }

    fn add(&mut self, label: &str) {
        if let Some((_, count)) = self.counts.iter_mut().find(|(x, _)| x == label) {
            *count += 1;
        } else {
            self.counts.push((label.to_string(), 1));
        }
    }

    fn winner(self) -> String {
        let mut best: Option<(String, usize)> = None;
        for (label, count) in self.counts {
            if best.as_ref().map(|(_, x)| count > *x).unwrap_or(true) {
                best = Some((label, count));
            }
        }
        best.map(|(label, _)| label).unwrap_or_default()
    }
}

/// Memoizes successful lookups by rounded coordinate. Failures aren't cached, so they're retried.
pub struct CachedGeocoder<G> {
    inner: G,
    cache: RefCell<HashMap<(i64, i64), Option<AddressParts>>>,
}

impl<G: GeocodeClient> CachedGeocoder<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }
}

impl<G: GeocodeClient> GeocodeClient for CachedGeocoder<G> {
    fn reverse_geocode(&self, pt: Coordinate) -> Result<Option<AddressParts>> {
        let key = pt.key(KEY_DECIMALS);
        if let Some(hit) = self.cache.borrow().get(&key) {
            return Ok(hit.clone());
        }
        let result = self.inner.reverse_geocode(pt)?;
        self.cache.borrow_mut().insert(key, result.clone());
        Ok(result)
    }
}
