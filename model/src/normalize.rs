use anyhow::Result;

use geometry::{
    infer_region, sanitize_path, snap_path_to_roads, Coordinate, GeocodeClient, SnapClient,
};

use crate::RouteDraft;

/// Cleans up a route before it's stored: geometry is rounded and deduplicated, the snapped path
/// falls back to the drawn one, and the province and city are inferred from the geometry. Labels
/// are only overwritten when inference finds something.
pub fn normalize_route(draft: &mut RouteDraft, geocoder: &dyn GeocodeClient) -> Result<()> {
    draft.path = sanitize_path(&draft.path);
    if draft.path.len() < 2 {
        bail!(
            "A route needs at least 2 points, but this one has {}",
            draft.path.len()
        );
    }
    draft.snapped_path = sanitize_path(&draft.snapped_path);
    if draft.snapped_path.len() < 2 {
        draft.snapped_path = draft.path.clone();
    }

    if let Some(ref fare) = draft.details.fare {
        if !fare.min.is_finite() || !fare.max.is_finite() || fare.min < 0.0 {
            bail!("Fare {} - {} isn't valid", fare.min, fare.max);
        }
        if fare.min > fare.max {
            bail!("Minimum fare {} is more than the maximum {}", fare.min, fare.max);
        }
    }

    let before = draft.details.stops.len();
    draft.details.stops.retain(|stop| {
        if let Some(pt) = Coordinate::checked(stop.lat, stop.lng) {
            pt.lat.abs() <= 90.0 && pt.lng.abs() <= 180.0
        } else {
            false
        }
    });
    if draft.details.stops.len() != before {
        warn!(
            "Dropped {} stops with bad coordinates",
            before - draft.details.stops.len()
        );
    }
    for stop in &mut draft.details.stops {
        let pt = Coordinate::new(stop.lat, stop.lng).rounded();
        stop.lat = pt.lat;
        stop.lng = pt.lng;
    }

    let label = infer_region(&draft.snapped_path, geocoder);
    if !label.province.is_empty() {
        draft.province = label.province;
    }
    if !label.city.is_empty() {
        draft.city = label.city;
    }
    Ok(())
}

/// Replaces the snapped path by snapping the drawn path again.
pub fn resnap_route(draft: &mut RouteDraft, snapper: &dyn SnapClient) -> Result<()> {
    let snapped = sanitize_path(&snap_path_to_roads(&draft.path, snapper)?);
    if snapped.len() < 2 {
        bail!("Snapping isn't available for this route right now; try again later");
    }
    info!(
        "Snapped {} drawn points to {} points",
        draft.path.len(),
        snapped.len()
    );
    draft.snapped_path = snapped;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use geometry::{AddressParts, Path};

    use super::*;
    use crate::{Fare, Stop};

    fn gauteng(_: Coordinate) -> Result<Option<AddressParts>> {
        Ok(Some(AddressParts {
            province: Some("Gauteng".to_string()),
            locality: Some("Johannesburg".to_string()),
            ..Default::default()
        }))
    }

    fn offline(_: Coordinate) -> Result<Option<AddressParts>> {
        bail!("offline")
    }

    fn drawn() -> RouteDraft {
        RouteDraft {
            path: vec![
                Coordinate::new(-26.2000001, 28.05),
                Coordinate::new(-26.2, 28.05),
                Coordinate::new(-26.21, 28.06),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn fills_in_snapped_path_and_region() {
        let mut draft = drawn();
        normalize_route(&mut draft, &gauteng).unwrap();
        assert_eq!(
            draft.path,
            vec![Coordinate::new(-26.2, 28.05), Coordinate::new(-26.21, 28.06)]
        );
        assert_eq!(draft.snapped_path, draft.path);
        assert_eq!(draft.province, "Gauteng");
        assert_eq!(draft.city, "Johannesburg");
    }

    #[test]
    fn keeps_old_labels_when_lookups_fail() {
        let mut draft = drawn();
        draft.province = "Free State".to_string();
        draft.city = "Bloemfontein".to_string();
        normalize_route(&mut draft, &offline).unwrap();
        assert_eq!(draft.province, "Free State");
        assert_eq!(draft.city, "Bloemfontein");
    }

    #[test]
    fn region_comes_from_snapped_path() {
        let seen = RefCell::new(Vec::new());
        let geocoder = |pt: Coordinate| -> Result<Option<AddressParts>> {
            seen.borrow_mut().push(pt);
            Ok(None)
        };
        let mut draft = drawn();
        draft.snapped_path = vec![Coordinate::new(-26.3, 28.1), Coordinate::new(-26.31, 28.11)];
        normalize_route(&mut draft, &geocoder).unwrap();
        assert_eq!(*seen.borrow(), draft.snapped_path);
    }

    #[test]
    fn rejects_bad_input_before_geocoding() {
        let calls = RefCell::new(0);
        let geocoder = |_: Coordinate| -> Result<Option<AddressParts>> {
            *calls.borrow_mut() += 1;
            Ok(None)
        };

        let mut draft = RouteDraft {
            path: vec![Coordinate::new(-26.2, 28.05), Coordinate::new(f64::NAN, 28.05)],
            ..Default::default()
        };
        assert!(normalize_route(&mut draft, &geocoder).is_err());

        let mut draft = drawn();
        draft.details.fare = Some(Fare {
            min: 20.0,
            max: 15.0,
            currency: "ZAR".to_string(),
        });
        assert!(normalize_route(&mut draft, &geocoder).is_err());
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn stops_cleaned_up() {
        let mut draft = drawn();
        draft.details.stops = vec![
            Stop {
                name: "Stop A".to_string(),
                lat: -26.20412345,
                lng: 28.0473,
            },
            Stop {
                name: "Nowhere".to_string(),
                lat: 123.0,
                lng: 28.0,
            },
        ];
        normalize_route(&mut draft, &offline).unwrap();
        assert_eq!(draft.details.stops.len(), 1);
        assert_eq!(draft.details.stops[0].lat, -26.204123);
    }

    #[test]
    fn resnap() {
        let mut draft = drawn();
        normalize_route(&mut draft, &offline).unwrap();

        let road = |pts: &[Coordinate]| -> Result<Path> {
            Ok(pts
                .iter()
                .map(|pt| Coordinate::new(pt.lat, pt.lng + 0.00002))
                .collect())
        };
        resnap_route(&mut draft, &road).unwrap();
        assert!(draft.snapped_path.len() > 2);
        assert_eq!(draft.snapped_path[0], draft.path[0]);
        assert_eq!(draft.snapped_path.last(), draft.path.last());

        let nothing = |_: &[Coordinate]| -> Result<Path> { Ok(Vec::new()) };
        let before = draft.snapped_path.clone();
        assert!(resnap_route(&mut draft, &nothing).is_err());
        assert_eq!(draft.snapped_path, before);
    }
}
