//! Labelme format data structures and directory handling
//!
//! Labelme stores one JSON file per image. `imagePath` inside the file is
//! usually relative to the JSON file's own directory.

use jwalk::WalkDir;
use log::{debug, error, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor};
use std::path::{Path, PathBuf};

use crate::error::{AnnotationError, Result};
use crate::geometry::Point2D;
use crate::utils::{create_free_file, infer_image_format};

pub const LABELME_VERSION: &str = "4.5.6";

fn default_version() -> String {
    LABELME_VERSION.to_string()
}

fn default_shape_type() -> String {
    "polygon".to_string()
}

/// A single labelled shape inside a Labelme annotation
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LabelmeShape {
    pub label: String,
    pub points: Vec<(f64, f64)>,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default = "default_shape_type")]
    pub shape_type: String,
    #[serde(default)]
    pub flags: Option<HashMap<String, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
}

impl LabelmeShape {
    pub fn new(label: impl Into<String>, points: &[Point2D], shape_type: &str) -> Self {
        Self {
            label: label.into(),
            points: points.iter().map(|&p| p.into()).collect(),
            group_id: None,
            shape_type: shape_type.to_string(),
            flags: Some(HashMap::new()),
            description: None,
            mask: None,
        }
    }

    pub fn points(&self) -> Vec<Point2D> {
        self.points.iter().map(|&p| p.into()).collect()
    }
}

/// The annotation information of one image
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelmeAnnotation {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub flags: Option<HashMap<String, bool>>,
    #[serde(default)]
    pub shapes: Vec<LabelmeShape>,
    pub image_path: String,
    #[serde(default)]
    pub image_data: Option<String>,
    pub image_height: u32,
    pub image_width: u32,
    /// The JSON file this annotation was read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl LabelmeAnnotation {
    pub fn new(image_path: impl Into<String>, image_height: u32, image_width: u32) -> Self {
        Self {
            version: default_version(),
            flags: Some(HashMap::new()),
            shapes: Vec::new(),
            image_path: image_path.into(),
            image_data: None,
            image_height,
            image_width,
            source: None,
        }
    }

    /// Read and parse a single JSON file, streaming from disk
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(AnnotationError::file_not_found(path));
        }
        let reader = BufReader::new(File::open(path)?);
        let mut annotation: Self = serde_json::from_reader(reader)?;
        annotation.source = Some(path.to_path_buf());
        Ok(annotation)
    }

    pub fn save(&self, path: &Path, overwrite: bool) -> Result<()> {
        if path.exists() && !overwrite {
            return Err(AnnotationError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        Ok(())
    }

    /// `imagePath` resolved against the directory of the source JSON file
    pub fn resolved_image_path(&self) -> PathBuf {
        let image_path = Path::new(&self.image_path);
        if image_path.is_absolute() {
            return image_path.to_path_buf();
        }
        match self.source.as_deref().and_then(Path::parent) {
            Some(parent) => parent.join(image_path),
            None => image_path.to_path_buf(),
        }
    }

    pub fn has_image_data(&self) -> bool {
        self.image_data.as_deref().is_some_and(|d| !d.is_empty())
    }

    pub fn embedded_image_bytes(&self) -> Result<Option<Vec<u8>>> {
        match self.image_data.as_deref() {
            Some(data) if !data.is_empty() => Ok(Some(base64::decode(data)?)),
            _ => Ok(None),
        }
    }

    /// Decode the embedded `imageData` into `dir`, returning the written path.
    ///
    /// The extension is inferred from the decoded header and defaults to png.
    pub fn write_embedded_image(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let image_data = match self.image_data.as_deref() {
            Some(data) if !data.is_empty() => data,
            _ => return Ok(None),
        };

        let image_extension = {
            let mut cursor = Cursor::new(image_data);
            let mut decoder = base64::read::DecoderReader::new(&mut cursor, base64::STANDARD);
            let mut header_buffer = [0u8; 16];
            let bytes_read = std::io::Read::read(&mut decoder, &mut header_buffer)?;
            infer_image_format(&header_buffer[..bytes_read]).unwrap_or("png")
        };

        let stem = Path::new(&self.image_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");
        fs::create_dir_all(dir)?;
        let (dest_path, file) =
            create_free_file(dir, &sanitize_filename::sanitize(stem), image_extension)?;

        let mut cursor = Cursor::new(image_data);
        let mut decoder = base64::read::DecoderReader::new(&mut cursor, base64::STANDARD);
        let mut file = BufWriter::new(file);
        std::io::copy(&mut decoder, &mut file)?;
        std::io::Write::flush(&mut file)?;
        Ok(Some(dest_path))
    }
}

/// An ordered collection of Labelme annotations
#[derive(Debug, Clone, Default)]
pub struct LabelmeAnnotationHandler {
    pub annotations: Vec<LabelmeAnnotation>,
}

impl LabelmeAnnotationHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, annotation: LabelmeAnnotation) {
        self.annotations.push(annotation);
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LabelmeAnnotation> {
        self.annotations.iter()
    }

    /// Parse every `*.json` file below `dir` in parallel.
    ///
    /// Files that fail to parse are logged and skipped. The result is ordered by path.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(AnnotationError::dir_not_found(dir));
        }
        let json_paths = find_json_files(dir);
        let annotations: Vec<LabelmeAnnotation> = json_paths
            .par_iter()
            .filter_map(|json_path| match LabelmeAnnotation::load(json_path) {
                Ok(annotation) => Some(annotation),
                Err(e) => {
                    error!("Failed to parse JSON ({}): {}", json_path.display(), e);
                    None
                }
            })
            .collect();
        info!(
            "Loaded {} Labelme annotations from {}",
            annotations.len(),
            dir.display()
        );
        Ok(Self { annotations })
    }

    /// Write one `<image stem>.json` per annotation into `dir`.
    pub fn save_to_dir(&self, dir: &Path, overwrite: bool, embed_image_data: bool) -> Result<()> {
        fs::create_dir_all(dir)?;
        let mut used_names = HashSet::new();
        for annotation in &self.annotations {
            let image_path = annotation.resolved_image_path();
            let stem = image_path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| {
                    AnnotationError::invalid_value(format!("Invalid image path: {:?}", image_path))
                })?;
            let file_name = format!("{}.json", sanitize_filename::sanitize(stem));
            if !used_names.insert(file_name.clone()) {
                return Err(AnnotationError::DuplicateFilename {
                    file_name,
                    dir: dir.to_path_buf(),
                });
            }

            let mut output = annotation.clone();
            output.image_path = relative_image_path(&image_path, dir);
            if embed_image_data {
                if image_path.is_file() {
                    output.image_data = Some(base64::encode(fs::read(&image_path)?));
                } else if !annotation.has_image_data() {
                    return Err(AnnotationError::file_not_found(image_path));
                }
            } else {
                output.image_data = None;
            }
            output.save(&dir.join(&file_name), overwrite)?;
            debug!("Wrote {}", dir.join(&file_name).display());
        }
        info!(
            "Saved {} Labelme annotations to {}",
            self.annotations.len(),
            dir.display()
        );
        Ok(())
    }
}

impl<'a> IntoIterator for &'a LabelmeAnnotationHandler {
    type Item = &'a LabelmeAnnotation;
    type IntoIter = std::slice::Iter<'a, LabelmeAnnotation>;

    fn into_iter(self) -> Self::IntoIter {
        self.annotations.iter()
    }
}

impl FromIterator<LabelmeAnnotation> for LabelmeAnnotationHandler {
    fn from_iter<I: IntoIterator<Item = LabelmeAnnotation>>(iter: I) -> Self {
        Self {
            annotations: iter.into_iter().collect(),
        }
    }
}

/// All `*.json` files under `dir`, sorted
pub(crate) fn find_json_files(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .skip_hidden(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "json")
        })
        .map(|e| e.path())
        .collect();
    paths.sort();
    paths
}

/// Path of `image` as written into a JSON file stored in `json_dir`
fn relative_image_path(image: &Path, json_dir: &Path) -> String {
    let image_abs = fs::canonicalize(image).unwrap_or_else(|_| image.to_path_buf());
    let dir_abs = fs::canonicalize(json_dir).unwrap_or_else(|_| json_dir.to_path_buf());
    let path = image_abs.strip_prefix(&dir_abs).unwrap_or(&image_abs);
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_image_path() {
        let mut annotation = LabelmeAnnotation::new("img/a.jpg", 10, 10);
        assert_eq!(annotation.resolved_image_path(), PathBuf::from("img/a.jpg"));
        annotation.source = Some(PathBuf::from("/data/json/a.json"));
        assert_eq!(
            annotation.resolved_image_path(),
            PathBuf::from("/data/json/img/a.jpg")
        );
    }

    #[test]
    fn test_parse_minimal_shape() {
        let json = r#"{"label": "cat", "points": [[1, 2], [3, 4]], "shape_type": "rectangle"}"#;
        let shape: LabelmeShape = serde_json::from_str(json).unwrap();
        assert_eq!(shape.points(), vec![Point2D::new(1.0, 2.0), Point2D::new(3.0, 4.0)]);
        assert_eq!(shape.group_id, None);
    }

    #[test]
    fn test_embedded_image_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let png_header = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        let mut annotation = LabelmeAnnotation::new("photos/frame.jpg", 1, 1);
        annotation.image_data = Some(base64::encode(&png_header));

        let written = annotation.write_embedded_image(dir.path()).unwrap().unwrap();
        assert_eq!(written, dir.path().join("frame.png"));
        assert_eq!(fs::read(&written).unwrap(), png_header);
        assert_eq!(annotation.embedded_image_bytes().unwrap(), Some(png_header));
    }

    #[test]
    fn test_embedded_images_with_same_stem_get_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let png = |tail: &[u8]| {
            let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
            bytes.extend_from_slice(tail);
            bytes
        };
        let mut first = LabelmeAnnotation::new("/gone/a/img.jpg", 1, 1);
        first.image_data = Some(base64::encode(png(b"FIRST")));
        let mut second = LabelmeAnnotation::new("/gone/b/img.jpg", 1, 1);
        second.image_data = Some(base64::encode(png(b"SECOND")));

        let first_path = first.write_embedded_image(dir.path()).unwrap().unwrap();
        let second_path = second.write_embedded_image(dir.path()).unwrap().unwrap();
        assert_ne!(first_path, second_path);
        assert_eq!(fs::read(&first_path).unwrap(), png(b"FIRST"));
        assert_eq!(fs::read(&second_path).unwrap(), png(b"SECOND"));
    }
}
