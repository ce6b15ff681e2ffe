use geom::Distance;

use crate::{Coordinate, Path};

/// The snapping service gets noticeably worse when input points are farther apart than this.
pub const DEFAULT_MAX_SEGMENT: Distance = Distance::const_meters(15.0);

/// Inserts points along a sparse path, so that no two consecutive points are farther apart than
/// `max_segment`. The first and last points are always preserved, and zero-length segments are
/// skipped.
pub fn densify(path: &[Coordinate], max_segment: Distance) -> Path {
    if path.len() < 2 || max_segment <= Distance::ZERO {
        return path.to_vec();
    }

    let mut result = vec![path[0]];
    for pair in path.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        if from == to {
            continue;
        }
        // Interpolating in lat/lng space is fine at this spacing
        result.extend(split_segment(from, to, max_segment));
    }
    result
}

// Returns the points after `from`, ending with `to`
fn split_segment(from: Coordinate, to: Coordinate, max_segment: Distance) -> Vec<Coordinate> {
    let length = from.dist_to(to);
    if length <= max_segment {
        return vec![to];
    }

    let mut pieces = (length / max_segment).ceil() as usize;
    loop {
        let pts = interpolate(from, to, pieces);
        // Distances along a straight lat/lng line aren't perfectly uniform, so one piece might still
        // be a hair too long.
        let mut last = from;
        let mut ok = true;
        for pt in &pts {
            if last.dist_to(*pt) > max_segment {
                ok = false;
                break;
            }
            last = *pt;
        }
        if ok {
            return pts;
        }
        pieces += 1;
    }
}

fn interpolate(from: Coordinate, to: Coordinate, pieces: usize) -> Vec<Coordinate> {
    let mut pts = Vec::with_capacity(pieces);
    for step in 1..pieces {
        let pct = (step as f64) / (pieces as f64);
        pts.push(Coordinate::new(
            from.lat + pct * (to.lat - from.lat),
            from.lng + pct * (to.lng - from.lng),
        ));
    }
    pts.push(to);
    pts
}
