//! COCO and Labelme annotation utilities
//!
//! This library converts between Labelme JSON annotations and COCO datasets,
//! and combines, splits, re-locates and visualizes COCO datasets.

pub mod coco;
pub mod coco_dataset;
pub mod config;
pub mod dataset_config;
pub mod error;
pub mod geometry;
pub mod labelme;
pub mod mapper;
pub mod streaming_json;
pub mod types;
pub mod utils;
pub mod visualize;

// Re-export commonly used types and functions
pub use coco::{Annotation, Category, Image, Info, License, Rle, Segmentation};
pub use coco_dataset::{CocoDataset, CombineImgDirsOptions, FromLabelmeOptions, SplitDatasets};
pub use dataset_config::DatasetPathConfig;
pub use error::{AnnotationError, Result};
pub use geometry::{BBox, Keypoint2D, Point2D, Polygon};
pub use labelme::{LabelmeAnnotation, LabelmeAnnotationHandler, LabelmeShape};
pub use mapper::{CocoMapper, IdMapper};
pub use streaming_json::gather_labels;
pub use types::{ConversionStats, Priority};
pub use visualize::{DrawTarget, VisualizationOptions};
