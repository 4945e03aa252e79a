use dashmap::DashSet;
use log::error;
use rayon::prelude::*;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{AnnotationError, Result};
use crate::labelme::{find_json_files, LabelmeShape};

/// A Labelme annotation without its `imageData` payload
#[derive(Debug, Clone)]
pub struct LabelmeSummary {
    pub image_path: String,
    pub image_height: u32,
    pub image_width: u32,
    pub shapes: Vec<LabelmeShape>,
    pub has_image_data: bool,
}

/// A custom deserializer for Labelme annotations that skips over the image_data field
pub fn deserialize_labelme_summary<'de, D>(deserializer: D) -> std::result::Result<LabelmeSummary, D::Error>
where
    D: Deserializer<'de>,
{
    struct SummaryVisitor;

    impl<'de> Visitor<'de> for SummaryVisitor {
        type Value = LabelmeSummary;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a Labelme annotation object")
        }

        fn visit_map<V>(self, mut map: V) -> std::result::Result<LabelmeSummary, V::Error>
        where
            V: MapAccess<'de>,
        {
            let mut shapes = None;
            let mut image_path = None;
            let mut has_image_data = false;
            let mut image_height = None;
            let mut image_width = None;

            while let Some(key) = map.next_key::<String>()? {
                match key.as_str() {
                    "shapes" => {
                        shapes = Some(map.next_value()?);
                    }
                    "imagePath" => {
                        image_path = Some(map.next_value()?);
                    }
                    "imageData" => {
                        // Scan past the payload without allocating it
                        let data: Option<de::IgnoredAny> = map.next_value()?;
                        has_image_data = data.is_some();
                    }
                    "imageHeight" => {
                        image_height = Some(map.next_value()?);
                    }
                    "imageWidth" => {
                        image_width = Some(map.next_value()?);
                    }
                    _ => {
                        map.next_value::<de::IgnoredAny>()?;
                    }
                }
            }

            let image_path = image_path.ok_or_else(|| de::Error::missing_field("imagePath"))?;
            let image_height =
                image_height.ok_or_else(|| de::Error::missing_field("imageHeight"))?;
            let image_width = image_width.ok_or_else(|| de::Error::missing_field("imageWidth"))?;

            Ok(LabelmeSummary {
                image_path,
                image_height,
                image_width,
                shapes: shapes.unwrap_or_default(),
                has_image_data,
            })
        }
    }

    const FIELDS: &[&str] = &[
        "version",
        "flags",
        "shapes",
        "imagePath",
        "imageData",
        "imageHeight",
        "imageWidth",
    ];
    deserializer.deserialize_struct("LabelmeAnnotation", FIELDS, SummaryVisitor)
}

/// Parse a Labelme JSON stream, skipping `imageData`
pub fn read_labelme_summary<R: Read>(reader: R) -> Result<LabelmeSummary> {
    let deserializer = &mut serde_json::Deserializer::from_reader(reader);
    deserialize_labelme_summary(deserializer).map_err(AnnotationError::from)
}

pub fn read_labelme_summary_from_path(path: &Path) -> Result<LabelmeSummary> {
    read_labelme_summary(BufReader::new(File::open(path)?))
}

/// Sorted labels of every polygon and rectangle found in the Labelme files below `dir`
pub fn gather_labels(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(AnnotationError::dir_not_found(dir));
    }
    let all_labels: DashSet<String> = DashSet::new();

    find_json_files(dir).par_iter().for_each(|json_path| {
        match read_labelme_summary_from_path(json_path) {
            Ok(summary) => {
                let bounding = summary
                    .shapes
                    .iter()
                    .filter(|s| matches!(s.shape_type.as_str(), "polygon" | "rectangle"));
                for shape in bounding {
                    if !all_labels.contains(&shape.label) {
                        all_labels.insert(shape.label.clone());
                    }
                }
            }
            Err(e) => error!("Failed to parse JSON ({}): {}", json_path.display(), e),
        }
    });

    let mut labels: Vec<String> = all_labels.into_iter().collect();
    labels.sort();
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_skips_image_data() {
        let json = r#"{
            "version": "5.0.1",
            "flags": {},
            "shapes": [{"label": "dog", "points": [[0, 0], [4, 4]], "shape_type": "rectangle"}],
            "imagePath": "dog.jpg",
            "imageData": "aGVsbG8=",
            "imageHeight": 4,
            "imageWidth": 8
        }"#;
        let summary = read_labelme_summary(json.as_bytes()).unwrap();
        assert_eq!(summary.image_path, "dog.jpg");
        assert_eq!(summary.image_width, 8);
        assert_eq!(summary.shapes.len(), 1);
        assert!(summary.has_image_data);
    }

    #[test]
    fn test_summary_null_image_data_and_missing_field() {
        let json = r#"{"imagePath": "a.png", "imageData": null, "imageHeight": 1, "imageWidth": 1}"#;
        let summary = read_labelme_summary(json.as_bytes()).unwrap();
        assert!(!summary.has_image_data);
        assert!(summary.shapes.is_empty());

        let missing = r#"{"imagePath": "a.png", "imageHeight": 1}"#;
        assert!(read_labelme_summary(missing.as_bytes()).is_err());
    }

    #[test]
    fn test_gather_labels_only_polygons_and_rectangles() {
        let dir = tempfile::tempdir().unwrap();
        let street = r#"{
            "shapes": [
                {"label": "wheel", "points": [[5, 5], [6, 6]], "shape_type": "circle"},
                {"label": "lane", "points": [[0, 0], [9, 9]], "shape_type": "line"},
                {"label": "car", "points": [[0, 0], [4, 4]], "shape_type": "rectangle"},
                {"label": "head", "points": [[1, 1]], "shape_type": "point"}
            ],
            "imagePath": "street.jpg", "imageData": null, "imageHeight": 10, "imageWidth": 10
        }"#;
        let depot = r#"{
            "shapes": [
                {"label": "bus", "points": [[0, 0], [4, 0], [4, 4]], "shape_type": "polygon"},
                {"label": "car", "points": [[0, 0], [2, 2]], "shape_type": "rectangle"}
            ],
            "imagePath": "depot.jpg", "imageHeight": 10, "imageWidth": 10
        }"#;
        std::fs::create_dir_all(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("street.json"), street).unwrap();
        std::fs::write(dir.path().join("nested/depot.json"), depot).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        assert_eq!(gather_labels(dir.path()).unwrap(), vec!["bus", "car"]);
        assert!(gather_labels(&dir.path().join("missing")).is_err());
    }
}
