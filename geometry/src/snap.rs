use anyhow::{Context, Result};

use crate::{approx_eq, densify, Coordinate, Path, DEFAULT_MAX_SEGMENT, DEFAULT_TOLERANCE};

/// The most points the snapping service accepts per request
pub const CHUNK_SIZE: usize = 100;

/// Consecutive output points closer than this (in degrees) are treated as one. This catches the
/// shared point between chunks and no-op snaps. The service can legitimately shift points by more
/// than this, so revisit it if CHUNK_SIZE changes.
pub const DEDUPE_TOLERANCE: f64 = 1e-6;

/// Wraps one call to an external road-snapping service. Input has at most CHUNK_SIZE points;
/// output is in the same travel order.
pub trait SnapClient {
    fn snap(&self, points: &[Coordinate]) -> Result<Path>;
}

impl<F: Fn(&[Coordinate]) -> Result<Path>> SnapClient for F {
    fn snap(&self, points: &[Coordinate]) -> Result<Path> {
        self(points)
    }
}

/// Snaps a hand-drawn path to roads. An empty result means snapping isn't available for this path;
/// callers shouldn't treat it as a degenerate route. If any request fails, the whole thing fails;
/// there's no partially snapped result.
pub fn snap_path_to_roads(path: &[Coordinate], client: &dyn SnapClient) -> Result<Path> {
    let dense = densify(path, DEFAULT_MAX_SEGMENT);
    if dense.len() < 2 {
        return Ok(Vec::new());
    }

    let windows = chunk_windows(dense.len(), CHUNK_SIZE);
    debug!(
        "Snapping {} points ({} after densifying) in {} requests",
        path.len(),
        dense.len(),
        windows.len()
    );

    // Requests happen in order, one at a time, so failures are easy to pin down
    let mut result: Path = Vec::new();
    for (idx, (start, end)) in windows.iter().enumerate() {
        let snapped = client
            .snap(&dense[*start..*end])
            .with_context(|| format!("snapping chunk {}/{}", idx + 1, windows.len()))?;
        for pt in snapped {
            if let Some(last) = result.last() {
                if approx_eq(*last, pt, DEDUPE_TOLERANCE) {
                    continue;
                }
            }
            result.push(pt);
        }
    }

    if result.is_empty() {
        warn!("Snapping service returned nothing for a path with {} points", dense.len());
        return Ok(result);
    }

    // The service sometimes trims or shifts the ends. Always start and end where the contributor
    // drew.
    let first = path[0];
    let last = path[path.len() - 1];
    if !approx_eq(result[0], first, DEFAULT_TOLERANCE) {
        result.insert(0, first);
    }
    if !approx_eq(result[result.len() - 1], last, DEFAULT_TOLERANCE) {
        result.push(last);
    }
    Ok(result)
}

// [start, end) ranges. Consecutive windows share one point, so the stitched path stays continuous.
fn chunk_windows(len: usize, size: usize) -> Vec<(usize, usize)> {
    let mut windows = Vec::new();
    if len == 0 {
        return windows;
    }
    let size = size.max(2);
    let mut start = 0;
    loop {
        let end = (start + size).min(len);
        windows.push((start, end));
        if end == len {
            break;
        }
        start = end - 1;
    }
    windows
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use proptest::prelude::*;

    use super::*;

    // Evenly spaced about 10m apart, so densifying doesn't add anything
    fn straight_line(len: usize) -> Path {
        (0..len)
            .map(|i| Coordinate::new(-26.2 - 0.00009 * (i as f64), 28.05))
            .collect()
    }

    #[test]
    fn windows_share_boundaries() {
        assert_eq!(chunk_windows(199, 100), vec![(0, 100), (99, 199)]);
        assert_eq!(chunk_windows(100, 100), vec![(0, 100)]);
        assert_eq!(chunk_windows(101, 100), vec![(0, 100), (99, 101)]);
        assert_eq!(chunk_windows(2, 100), vec![(0, 2)]);
        assert!(chunk_windows(0, 100).is_empty());
    }

    #[test]
    fn chunking_199_points() {
        let path = straight_line(199);
        assert_eq!(densify(&path, DEFAULT_MAX_SEGMENT), path);

        let calls = RefCell::new(Vec::new());
        let echo = |pts: &[Coordinate]| -> Result<Path> {
            calls.borrow_mut().push(pts.len());
            Ok(pts.to_vec())
        };
        let snapped = snap_path_to_roads(&path, &echo).unwrap();

        assert_eq!(*calls.borrow(), vec![100, 100]);
        assert_eq!(snapped.len(), 199);
        assert_eq!(snapped, path);
        for pair in snapped.windows(2) {
            assert!(!approx_eq(pair[0], pair[1], DEDUPE_TOLERANCE));
        }
    }

    #[test]
    fn endpoints_anchored() {
        let path = straight_line(20);
        // Pretend the service trims both ends and shifts everything slightly east
        let shifty = |pts: &[Coordinate]| -> Result<Path> {
            Ok(pts[2..pts.len() - 2]
                .iter()
                .map(|pt| Coordinate::new(pt.lat, pt.lng + 0.00003))
                .collect())
        };
        let snapped = snap_path_to_roads(&path, &shifty).unwrap();
        assert_eq!(snapped[0], path[0]);
        assert_eq!(*snapped.last().unwrap(), *path.last().unwrap());
        assert_eq!(snapped.len(), 16 + 2);
    }

    #[test]
    fn close_endpoints_not_duplicated() {
        let path = straight_line(10);
        let nudge = |pts: &[Coordinate]| -> Result<Path> {
            Ok(pts
                .iter()
                .map(|pt| Coordinate::new(pt.lat + 0.000002, pt.lng))
                .collect())
        };
        let snapped = snap_path_to_roads(&path, &nudge).unwrap();
        assert_eq!(snapped.len(), 10);
        assert!(approx_eq(snapped[0], path[0], DEFAULT_TOLERANCE));
    }

    #[test]
    fn nothing_returned() {
        let path = straight_line(10);
        let nothing = |_: &[Coordinate]| -> Result<Path> { Ok(Vec::new()) };
        assert!(snap_path_to_roads(&path, &nothing).unwrap().is_empty());
    }

    #[test]
    fn degenerate_input_skips_the_service() {
        let called = Cell::new(false);
        let client = |pts: &[Coordinate]| -> Result<Path> {
            called.set(true);
            Ok(pts.to_vec())
        };
        let pt = Coordinate::new(-26.2, 28.05);
        assert!(snap_path_to_roads(&[pt, pt], &client).unwrap().is_empty());
        assert!(snap_path_to_roads(&[], &client).unwrap().is_empty());
        assert!(!called.get());
    }

    #[test]
    fn failure_aborts_everything() {
        let path = straight_line(250);
        let calls = Cell::new(0);
        let flaky = |pts: &[Coordinate]| -> Result<Path> {
            calls.set(calls.get() + 1);
            if calls.get() == 2 {
                bail!("quota exceeded");
            }
            Ok(pts.to_vec())
        };
        let err = snap_path_to_roads(&path, &flaky).unwrap_err();
        assert_eq!(calls.get(), 2);
        assert!(format!("{err:#}").contains("quota exceeded"));
        assert!(format!("{err:#}").contains("chunk 2/3"));
    }

    proptest! {
        #[test]
        fn stitched_endpoints_match_input(
            raw in prop::collection::vec((-26.3f64..-26.1, 27.9f64..28.1), 2..6),
            trim in 0usize..4,
            shift in -0.0005f64..0.0005,
        ) {
            let path: Vec<Coordinate> = raw.into_iter().map(|(lat, lng)| Coordinate::new(lat, lng)).collect();
            // Drops a few points from both ends of each window and moves the rest
            let client = |pts: &[Coordinate]| -> Result<Path> {
                if pts.len() <= 2 * trim {
                    return Ok(Vec::new());
                }
                Ok(pts[trim..pts.len() - trim]
                    .iter()
                    .map(|pt| Coordinate::new(pt.lat + shift, pt.lng - shift))
                    .collect())
            };
            let snapped = snap_path_to_roads(&path, &client).unwrap();
            if !snapped.is_empty() {
                prop_assert!(approx_eq(snapped[0], path[0], DEFAULT_TOLERANCE));
                prop_assert!(approx_eq(*snapped.last().unwrap(), *path.last().unwrap(), DEFAULT_TOLERANCE));
            }
        }
    }
}
