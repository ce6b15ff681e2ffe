use anyhow::Result;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use serde_json::json;

use geometry::{Coordinate, Path};

use super::Mode;

/// Everything a renderer needs to draw the editor. The draft and snapped paths are separate
/// layers, so contributors can compare them.
#[derive(Clone, Debug, PartialEq)]
pub struct Overlays {
    pub mode: Mode,
    pub draft: Path,
    pub snapped: Path,
    pub undo_length: usize,
    pub redo_length: usize,
    pub busy: bool,
}

impl Overlays {
    pub fn to_geojson(&self) -> FeatureCollection {
        let mut features = Vec::new();
        if self.draft.len() >= 2 {
            features.push(line_feature(&self.draft, "draft"));
        }
        if self.snapped.len() >= 2 {
            features.push(line_feature(&self.snapped, "snapped"));
        }
        // Vertex handles only make sense for the draft. Draw them last, so they're on top.
        for (idx, pt) in self.draft.iter().enumerate() {
            let mut f = feature(Value::Point(to_position(*pt)));
            set_property(&mut f, "layer", json!("vertex"));
            set_property(&mut f, "vertex_idx", json!(idx));
            features.push(f);
        }

        FeatureCollection {
            features,
            bbox: None,
            foreign_members: json!({
                "mode": self.mode.as_str(),
                "undo_length": self.undo_length,
                "redo_length": self.redo_length,
                "busy": self.busy,
            })
            .as_object()
            .cloned(),
        }
    }

    pub fn to_geojson_string(&self) -> Result<String> {
        let gj = GeoJson::FeatureCollection(self.to_geojson());
        Ok(serde_json::to_string_pretty(&gj)?)
    }
}

fn line_feature(path: &[Coordinate], layer: &str) -> Feature {
    let mut f = feature(Value::LineString(
        path.iter().map(|pt| to_position(*pt)).collect(),
    ));
    set_property(&mut f, "layer", json!(layer));
    f
}

fn feature(value: Value) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: None,
        foreign_members: None,
    }
}

fn set_property(f: &mut Feature, key: &str, value: serde_json::Value) {
    f.properties
        .get_or_insert_with(serde_json::Map::new)
        .insert(key.to_string(), value);
}

// GeoJSON wants x, y
fn to_position(pt: Coordinate) -> Vec<f64> {
    vec![pt.lng, pt.lat]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers() {
        let overlays = Overlays {
            mode: Mode::Edit,
            draft: vec![
                Coordinate::new(-26.2, 28.05),
                Coordinate::new(-26.21, 28.06),
                Coordinate::new(-26.22, 28.07),
            ],
            snapped: vec![Coordinate::new(-26.2, 28.05), Coordinate::new(-26.22, 28.07)],
            undo_length: 3,
            redo_length: 0,
            busy: false,
        };
        let gj: serde_json::Value =
            serde_json::from_str(&overlays.to_geojson_string().unwrap()).unwrap();
        let features = gj["features"].as_array().unwrap();
        assert_eq!(features.len(), 2 + 3);
        assert_eq!(features[0]["properties"]["layer"], "draft");
        assert_eq!(features[0]["geometry"]["coordinates"][0][0], 28.05);
        assert_eq!(features[0]["geometry"]["coordinates"][0][1], -26.2);
        assert_eq!(features[1]["properties"]["layer"], "snapped");
        assert_eq!(features[4]["properties"]["vertex_idx"], 2);
        assert_eq!(gj["mode"], "edit");
        assert_eq!(gj["undo_length"], 3);
    }

    #[test]
    fn single_point_has_no_lines() {
        let overlays = Overlays {
            mode: Mode::Draw,
            draft: vec![Coordinate::new(-26.2, 28.05)],
            snapped: Vec::new(),
            undo_length: 1,
            redo_length: 0,
            busy: true,
        };
        let fc = overlays.to_geojson();
        assert_eq!(fc.features.len(), 1);
        assert_eq!(
            fc.foreign_members.unwrap()["busy"],
            serde_json::Value::Bool(true)
        );
    }
}
