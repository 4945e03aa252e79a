//! COCO format data structures
//!
//! Record types for the five top-level sections of a COCO annotation file,
//! plus the conversions between COCO's flat arrays and the geometry types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::geometry::{BBox, Keypoint2D, Polygon};

/// COCO dataset information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Info {
    pub description: String,
    pub url: String,
    pub version: String,
    pub year: i32,
    pub contributor: String,
    pub date_created: String,
}

impl Default for Info {
    fn default() -> Self {
        let now = chrono::Local::now();
        Self {
            description: String::new(),
            url: String::new(),
            version: "1.0".to_string(),
            year: chrono::Datelike::year(&now),
            contributor: String::new(),
            date_created: now.format("%Y/%m/%d").to_string(),
        }
    }
}

impl Info {
    pub fn with_description(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Default::default()
        }
    }
}

/// COCO license information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub url: String,
    pub name: String,
    pub id: u64,
}

impl License {
    pub fn new(url: impl Into<String>, name: impl Into<String>, id: u64) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            id,
        }
    }

    /// Equality on everything except `id`
    pub fn same_content(&self, other: &Self) -> bool {
        self.url == other.url && self.name == other.name
    }
}

/// COCO image information
///
/// `coco_url` holds the path the image is read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(rename = "license")]
    pub license_id: u64,
    pub file_name: String,
    #[serde(default)]
    pub coco_url: String,
    pub height: u32,
    pub width: u32,
    #[serde(default)]
    pub date_captured: String,
    #[serde(default)]
    pub flickr_url: Option<String>,
    pub id: u64,
}

impl Image {
    pub fn new(id: u64, file_name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            license_id: 0,
            file_name: file_name.into(),
            coco_url: String::new(),
            height,
            width,
            date_captured: String::new(),
            flickr_url: None,
            id,
        }
    }

    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.coco_url)
    }

    /// Equality on everything except `id`
    pub fn same_content(&self, other: &Self) -> bool {
        self.license_id == other.license_id
            && self.file_name == other.file_name
            && self.coco_url == other.coco_url
            && self.height == other.height
            && self.width == other.width
            && self.date_captured == other.date_captured
            && self.flickr_url == other.flickr_url
    }
}

/// Run-length encoded mask, kept opaque
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rle {
    pub counts: serde_json::Value,
    pub size: Vec<u32>,
}

/// COCO segmentation: flat polygons, or RLE for crowd regions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    Polygons(Vec<Vec<f64>>),
    Rle(Rle),
}

impl Default for Segmentation {
    fn default() -> Self {
        Segmentation::Polygons(Vec::new())
    }
}

impl Segmentation {
    pub fn from_polygons(polygons: &[Polygon]) -> Self {
        Segmentation::Polygons(polygons.iter().map(Polygon::to_flat).collect())
    }

    /// Polygon view of the segmentation. RLE masks yield no polygons.
    pub fn polygons(&self) -> Vec<Polygon> {
        match self {
            Segmentation::Polygons(flat) => flat.iter().map(|p| Polygon::from_flat(p)).collect(),
            Segmentation::Rle(_) => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Segmentation::Polygons(flat) => flat.iter().all(|p| p.is_empty()),
            Segmentation::Rle(_) => false,
        }
    }

    /// True when there is at least one polygon and every polygon lies inside `bbox`.
    ///
    /// The box is padded by a small epsilon to absorb `[x, y, w, h]` rounding.
    pub fn within(&self, bbox: &BBox) -> bool {
        const EPS: f64 = 1e-6;
        let padded = BBox::new(
            bbox.xmin - EPS,
            bbox.ymin - EPS,
            bbox.xmax + EPS,
            bbox.ymax + EPS,
        );
        let polygons = self.polygons();
        !polygons.is_empty() && polygons.iter().all(|p| p.within_bbox(&padded))
    }
}

/// COCO annotation information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub segmentation: Segmentation,
    #[serde(default)]
    pub num_keypoints: u32,
    pub area: f64,
    #[serde(default)]
    pub iscrowd: u8,
    #[serde(default)]
    pub keypoints: Vec<f64>,
    pub image_id: u64,
    pub bbox: [f64; 4], // [x, y, width, height]
    pub category_id: u64,
    pub id: u64,
}

impl Annotation {
    pub fn bbox(&self) -> BBox {
        BBox::from_xywh(self.bbox)
    }

    pub fn keypoints(&self) -> Vec<Keypoint2D> {
        Keypoint2D::list_from_flat(&self.keypoints)
    }
}

/// COCO category information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub supercategory: String,
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub keypoints: Vec<String>,
    #[serde(default)]
    pub skeleton: Vec<[u32; 2]>,
}

impl Category {
    pub fn new(id: u64, name: impl Into<String>, supercategory: impl Into<String>) -> Self {
        Self {
            supercategory: supercategory.into(),
            id,
            name: name.into(),
            keypoints: Vec::new(),
            skeleton: Vec::new(),
        }
    }

    pub fn with_keypoints(mut self, keypoints: Vec<String>, skeleton: Vec<[u32; 2]>) -> Self {
        self.keypoints = keypoints;
        self.skeleton = skeleton;
        self
    }

    /// Equality on everything except `id`
    pub fn same_content(&self, other: &Self) -> bool {
        self.supercategory == other.supercategory
            && self.name == other.name
            && self.keypoints == other.keypoints
            && self.skeleton == other.skeleton
    }

    /// Categories built from a plain label list, ids starting at 1
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Vec<Self> {
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| Self::new(i as u64 + 1, label.as_ref(), "none"))
            .collect()
    }
}

/// Clamp coordinates to image bounds
pub fn clamp_coords(x: f64, y: f64, width: u32, height: u32) -> (f64, f64) {
    let x = x.max(0.0).min(width as f64);
    let y = y.max(0.0).min(height as f64);
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segmentation_accepts_rle() {
        let json = r#"{"counts": [1, 2, 3], "size": [10, 20]}"#;
        let seg: Segmentation = serde_json::from_str(json).unwrap();
        assert!(matches!(seg, Segmentation::Rle(_)));
        assert!(seg.polygons().is_empty());
        assert!(!seg.within(&BBox::new(0.0, 0.0, 100.0, 100.0)));
    }

    #[test]
    fn test_segmentation_within() {
        let seg = Segmentation::Polygons(vec![vec![1.0, 1.0, 5.0, 1.0, 5.0, 5.0]]);
        assert!(seg.within(&BBox::new(0.0, 0.0, 5.0, 5.0)));
        assert!(!seg.within(&BBox::new(0.0, 0.0, 4.0, 4.0)));
        assert!(!Segmentation::default().within(&BBox::new(0.0, 0.0, 4.0, 4.0)));
        assert!(Segmentation::default().is_empty());
    }

    #[test]
    fn test_image_license_key() {
        let image = Image::new(3, "a.jpg", 640, 480);
        let value = serde_json::to_value(&image).unwrap();
        assert_eq!(value["license"], 0);
        assert_eq!(value["file_name"], "a.jpg");
        assert!(value.get("license_id").is_none());
    }

    #[test]
    fn test_category_defaults() {
        let cat: Category = serde_json::from_str(r#"{"id": 1, "name": "dog"}"#).unwrap();
        assert!(cat.keypoints.is_empty());
        assert!(cat.skeleton.is_empty());
        assert!(cat.same_content(&Category::new(7, "dog", "")));
    }

    #[test]
    fn test_clamp_coords() {
        assert_eq!(clamp_coords(-5.0, 700.0, 640, 480), (0.0, 480.0));
    }
}
