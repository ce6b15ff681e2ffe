//! Geometry for hand-drawn minibus taxi routes: cleaning up points, densifying sparse paths,
//! snapping them to roads through an external service, and labelling them with a region.
//!
//! Nothing in here does I/O directly. External services are passed in as `SnapClient` and
//! `GeocodeClient`.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod coord;
mod densify;
mod region;
mod snap;

pub use coord::{
    approx_eq, deserialize_path, distance_meters, sanitize_coordinate, sanitize_list,
    sanitize_path, trim_lat_lng, Coordinate, Path, DEFAULT_TOLERANCE,
};
pub use densify::{densify, DEFAULT_MAX_SEGMENT};
pub use region::{
    infer_region, sample_points, AddressParts, CachedGeocoder, GeocodeClient, RegionLabel,
    MAX_SAMPLES,
};
pub use snap::{snap_path_to_roads, SnapClient, CHUNK_SIZE, DEDUPE_TOLERANCE};
