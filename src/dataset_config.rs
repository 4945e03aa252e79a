//! Path configuration for working with a collection of datasets at once.
//!
//! A config file is a JSON list of groups. Each group names a collection
//! directory, the dataset directories inside it, and where each dataset keeps
//! its images and annotation file:
//!
//! ```json
//! [
//!   {
//!     "collection_dir": "/data/collection",
//!     "dataset_names": ["day", "night"],
//!     "dataset_specific": {"img_dir": "images", "ann_path": "coco.json", "ann_format": "coco"}
//!   }
//! ]
//! ```
//!
//! `dataset_specific` may also be a list with one entry per dataset name.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::error::{AnnotationError, Result};

/// Where one dataset keeps its images and annotation file, relative to its directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpecific {
    pub img_dir: PathBuf,
    pub ann_path: PathBuf,
    #[serde(default = "default_ann_format")]
    pub ann_format: String,
}

fn default_ann_format() -> String {
    "coco".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatasetSpecifics {
    Shared(DatasetSpecific),
    PerDataset(Vec<DatasetSpecific>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetGroup {
    pub collection_dir: PathBuf,
    pub dataset_names: Vec<String>,
    pub dataset_specific: DatasetSpecifics,
}

/// Resolved paths of one dataset
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetPaths {
    pub dataset_dir: PathBuf,
    pub img_dir: PathBuf,
    pub ann_path: PathBuf,
    pub ann_format: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetPathConfig {
    pub groups: Vec<DatasetGroup>,
}

impl DatasetPathConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(AnnotationError::file_not_found(path));
        }
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        Ok(())
    }

    /// Every dataset's paths, in config order
    pub fn get_paths(&self) -> Result<Vec<DatasetPaths>> {
        let mut paths = Vec::new();
        for group in &self.groups {
            let specifics: Vec<&DatasetSpecific> = match &group.dataset_specific {
                DatasetSpecifics::Shared(specific) => {
                    vec![specific; group.dataset_names.len()]
                }
                DatasetSpecifics::PerDataset(list) => {
                    if list.len() != group.dataset_names.len() {
                        return Err(AnnotationError::LengthMismatch {
                            what: "dataset_specific",
                            expected: group.dataset_names.len(),
                            found: list.len(),
                        });
                    }
                    list.iter().collect()
                }
            };
            for (name, specific) in group.dataset_names.iter().zip(specifics) {
                let dataset_dir = group.collection_dir.join(name);
                paths.push(DatasetPaths {
                    img_dir: dataset_dir.join(&specific.img_dir),
                    ann_path: dataset_dir.join(&specific.ann_path),
                    ann_format: specific.ann_format.clone(),
                    dataset_dir,
                });
            }
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_and_per_dataset_specifics() {
        let json = r#"[
            {
                "collection_dir": "/c",
                "dataset_names": ["a", "b"],
                "dataset_specific": {"img_dir": "img", "ann_path": "ann.json"}
            },
            {
                "collection_dir": "/d",
                "dataset_names": ["x"],
                "dataset_specific": [{"img_dir": "i", "ann_path": "j.json", "ann_format": "labelme"}]
            }
        ]"#;
        let config: DatasetPathConfig = serde_json::from_str(json).unwrap();
        let paths = config.get_paths().unwrap();
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[1].dataset_dir, PathBuf::from("/c/b"));
        assert_eq!(paths[1].img_dir, PathBuf::from("/c/b/img"));
        assert_eq!(paths[1].ann_format, "coco");
        assert_eq!(paths[2].ann_path, PathBuf::from("/d/x/j.json"));
        assert_eq!(paths[2].ann_format, "labelme");
    }

    #[test]
    fn test_per_dataset_length_mismatch() {
        let config = DatasetPathConfig {
            groups: vec![DatasetGroup {
                collection_dir: PathBuf::from("/c"),
                dataset_names: vec!["a".into(), "b".into()],
                dataset_specific: DatasetSpecifics::PerDataset(vec![DatasetSpecific {
                    img_dir: "img".into(),
                    ann_path: "ann.json".into(),
                    ann_format: "coco".into(),
                }]),
            }],
        };
        assert!(matches!(
            config.get_paths(),
            Err(AnnotationError::LengthMismatch { expected: 2, found: 1, .. })
        ));
    }
}
