//! COCO dataset management
//!
//! `CocoDataset` owns the five COCO sections and implements the conversions
//! to and from Labelme as well as the bookkeeping operations that span
//! several datasets or move image files around.

use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Component, Path, PathBuf};

use crate::coco::{Annotation, Category, Image, Info, License, Segmentation};
use crate::dataset_config::DatasetPathConfig;
use crate::error::{AnnotationError, Result};
use crate::geometry::{BBox, Keypoint2D, Point2D, Polygon};
use crate::labelme::{LabelmeAnnotation, LabelmeAnnotationHandler, LabelmeShape};
use crate::mapper::CocoMapper;
use crate::types::{ConversionStats, Priority};
use crate::utils::{
    check_dir_exists, check_file_exists, extension_of, file_ctime, file_name_of,
    maybe_progress_bar, next_dump_path, prepare_empty_dir,
};

/// Shape types accepted when converting from Labelme
pub const VALID_SHAPE_TYPES: &[&str] = &["point", "polygon", "rectangle"];

pub const DEFAULT_LICENSE_URL: &str = "https://github.com/cm107/annotation_utils/blob/master/LICENSE";
pub const DEFAULT_LICENSE_NAME: &str = "MIT License";

/// Complete COCO dataset structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CocoDataset {
    pub info: Info,
    pub licenses: Vec<License>,
    pub images: Vec<Image>,
    pub annotations: Vec<Annotation>,
    pub categories: Vec<Category>,
}

/// Options for [`CocoDataset::from_labelme`]
#[derive(Debug, Clone)]
pub struct FromLabelmeOptions {
    /// Look images up by file name in this directory instead of using `imagePath`
    pub img_dir: Option<PathBuf>,
    /// Drop rectangles inside polygons, then polygons inside the remaining rectangles
    pub remove_redundant: bool,
    /// Fail when a point shape lies outside every polygon and rectangle
    pub ensure_no_unbounded_kpts: bool,
    /// Fail on shape types other than point, polygon and rectangle
    pub ensure_valid_shape_type: bool,
    /// Skip shapes whose label is not a category instead of failing
    pub ignore_unspecified_categories: bool,
    pub license_url: String,
    pub license_name: String,
    /// Where to decode embedded `imageData` when the image file is missing
    pub embedded_image_dir: Option<PathBuf>,
    /// Polygon annotation area is the polygon's own area instead of its bbox area
    pub shoelace_area: bool,
}

impl Default for FromLabelmeOptions {
    fn default() -> Self {
        Self {
            img_dir: None,
            remove_redundant: true,
            ensure_no_unbounded_kpts: true,
            ensure_valid_shape_type: true,
            ignore_unspecified_categories: false,
            license_url: DEFAULT_LICENSE_URL.to_string(),
            license_name: DEFAULT_LICENSE_NAME.to_string(),
            embedded_image_dir: None,
            shoelace_area: false,
        }
    }
}

/// Options for [`CocoDataset::combine_img_dirs`]
#[derive(Debug, Clone)]
pub struct CombineImgDirsOptions {
    pub preserve_filenames: bool,
    pub update_img_paths: bool,
    pub overwrite: bool,
    pub show_pbar: bool,
}

impl Default for CombineImgDirsOptions {
    fn default() -> Self {
        Self {
            preserve_filenames: false,
            update_img_paths: true,
            overwrite: false,
            show_pbar: true,
        }
    }
}

/// Train/val/test parts produced by [`CocoDataset::split`]
#[derive(Debug, Clone)]
pub struct SplitDatasets {
    pub train: CocoDataset,
    pub val: CocoDataset,
    pub test: CocoDataset,
}

impl SplitDatasets {
    /// Write `instances_{train,val,test}.json`. The test file is only written when it has images.
    pub fn save_to_dir(&self, dir: &Path, overwrite: bool) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for (name, dataset) in [("train", &self.train), ("val", &self.val), ("test", &self.test)] {
            if name == "test" && dataset.images.is_empty() {
                continue;
            }
            let path = dir.join(format!("instances_{}.json", name));
            dataset.save_to_path(&path, overwrite)?;
            info!(
                "Wrote {} ({} images, {} annotations)",
                path.display(),
                dataset.images.len(),
                dataset.annotations.len()
            );
            written.push(path);
        }
        Ok(written)
    }
}

/// A polygon or rectangle that keypoints get grouped into
#[derive(Debug, Clone)]
enum Bound {
    Polygon(Polygon),
    BBox(BBox),
}

impl Bound {
    fn contains_point(&self, p: &Point2D) -> bool {
        match self {
            Bound::Polygon(poly) => poly.contains_point(p),
            Bound::BBox(bbox) => bbox.contains_point(p),
        }
    }
}

/// Keypoints registered to one bound, keyed by keypoint label
#[derive(Debug)]
struct KeypointGroup {
    bound: Bound,
    category: Category,
    registered: Vec<(String, Keypoint2D)>,
}

impl KeypointGroup {
    fn new(bound: Bound, category: Category) -> Self {
        Self {
            bound,
            category,
            registered: Vec::new(),
        }
    }

    /// Claim, per label, the first still-unclaimed point inside the bound
    fn claim(&mut self, pending: &mut Vec<(String, Vec<Point2D>)>) {
        for (label, points) in pending.iter_mut() {
            if let Some(i) = points.iter().position(|p| self.bound.contains_point(p)) {
                let point = points.remove(i);
                self.registered
                    .push((label.clone(), Keypoint2D::new(point, 2)));
            }
        }
        pending.retain(|(_, points)| !points.is_empty());
    }

    /// Keypoints laid out in category order, unlabeled where nothing was claimed
    fn keypoints(&self) -> Vec<Keypoint2D> {
        self.category
            .keypoints
            .iter()
            .map(|name| {
                self.registered
                    .iter()
                    .find(|(label, _)| label == name)
                    .map(|(_, kpt)| *kpt)
                    .unwrap_or_else(Keypoint2D::unlabeled)
            })
            .collect()
    }
}

impl CocoDataset {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            info: Info::with_description(description),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a COCO annotation file.
    ///
    /// With `img_dir`, every image's `coco_url` becomes `img_dir/file_name`.
    /// With `check_paths`, every image file must exist.
    pub fn load_from_path(json_path: &Path, img_dir: Option<&Path>, check_paths: bool) -> Result<Self> {
        check_file_exists(json_path)?;
        let reader = BufReader::new(File::open(json_path)?);
        let mut dataset: Self = serde_json::from_reader(reader)?;
        if let Some(img_dir) = img_dir {
            check_dir_exists(img_dir)?;
            dataset.update_img_dir(img_dir, false)?;
        }
        if check_paths {
            for image in &dataset.images {
                check_file_exists(&image.path())?;
            }
        }
        debug!(
            "Loaded {} ({} images, {} annotations, {} categories)",
            json_path.display(),
            dataset.images.len(),
            dataset.annotations.len(),
            dataset.categories.len()
        );
        Ok(dataset)
    }

    pub fn save_to_path(&self, save_path: &Path, overwrite: bool) -> Result<()> {
        if save_path.exists() && !overwrite {
            return Err(AnnotationError::AlreadyExists {
                path: save_path.to_path_buf(),
            });
        }
        if let Some(parent) = save_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(save_path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        Ok(())
    }

    pub fn image(&self, id: u64) -> Result<&Image> {
        self.images
            .iter()
            .find(|image| image.id == id)
            .ok_or(AnnotationError::RecordNotFound { kind: "image", id })
    }

    pub fn annotation(&self, id: u64) -> Result<&Annotation> {
        self.annotations
            .iter()
            .find(|ann| ann.id == id)
            .ok_or(AnnotationError::RecordNotFound {
                kind: "annotation",
                id,
            })
    }

    pub fn category(&self, id: u64) -> Result<&Category> {
        self.categories
            .iter()
            .find(|cat| cat.id == id)
            .ok_or(AnnotationError::RecordNotFound {
                kind: "category",
                id,
            })
    }

    /// The single category called `name`
    pub fn unique_category_by_name(&self, name: &str) -> Result<&Category> {
        let matches: Vec<&Category> = self.categories.iter().filter(|c| c.name == name).collect();
        match matches.as_slice() {
            [category] => Ok(category),
            _ => Err(AnnotationError::AmbiguousName {
                name: name.to_string(),
                count: matches.len(),
            }),
        }
    }

    pub fn annotations_for_images(&self, image_ids: &[u64]) -> Vec<&Annotation> {
        let ids: HashSet<u64> = image_ids.iter().copied().collect();
        self.annotations
            .iter()
            .filter(|ann| ids.contains(&ann.image_id))
            .collect()
    }

    fn annotations_by_image(&self) -> HashMap<u64, Vec<&Annotation>> {
        let mut by_image: HashMap<u64, Vec<&Annotation>> = HashMap::new();
        for ann in &self.annotations {
            by_image.entry(ann.image_id).or_default().push(ann);
        }
        by_image
    }

    /// Point every image at `new_img_dir/file_name`
    pub fn update_img_dir(&mut self, new_img_dir: &Path, check_paths: bool) -> Result<()> {
        if check_paths {
            check_dir_exists(new_img_dir)?;
        }
        for image in &mut self.images {
            let path = new_img_dir.join(&image.file_name);
            if check_paths {
                check_file_exists(&path)?;
            }
            image.coco_url = path.to_string_lossy().into_owned();
        }
        Ok(())
    }

    /// Convert every image into a Labelme annotation.
    pub fn to_labelme(&self, priority: Priority) -> Result<LabelmeAnnotationHandler> {
        let by_image = self.annotations_by_image();
        let mut handler = LabelmeAnnotationHandler::new();

        for image in &self.images {
            let mut labelme_ann = LabelmeAnnotation::new(&image.coco_url, image.height, image.width);
            for ann in by_image.get(&image.id).into_iter().flatten() {
                let category = self.category(ann.category_id)?;
                let bbox = ann.bbox();

                if priority == Priority::Seg && ann.segmentation.within(&bbox) {
                    for polygon in ann.segmentation.polygons() {
                        if polygon.len() < 3 {
                            continue;
                        }
                        labelme_ann.shapes.push(LabelmeShape::new(
                            &category.name,
                            &polygon.points,
                            "polygon",
                        ));
                    }
                } else {
                    labelme_ann.shapes.push(LabelmeShape::new(
                        &category.name,
                        &bbox.to_points(),
                        "rectangle",
                    ));
                }

                for (i, kpt) in ann.keypoints().iter().enumerate() {
                    if !kpt.is_labeled() {
                        continue;
                    }
                    let label = category.keypoints.get(i).ok_or_else(|| {
                        AnnotationError::invalid_value(format!(
                            "Annotation {} has keypoint #{} but category '{}' only names {}",
                            ann.id,
                            i,
                            category.name,
                            category.keypoints.len()
                        ))
                    })?;
                    labelme_ann
                        .shapes
                        .push(LabelmeShape::new(label, &[kpt.point], "point"));
                }
            }
            handler.push(labelme_ann);
        }

        Ok(handler)
    }

    /// Build a COCO dataset from Labelme annotations.
    ///
    /// Polygons and rectangles become annotations. Point shapes become
    /// keypoints of the polygon or rectangle that contains them.
    pub fn from_labelme(
        labelme_handler: &LabelmeAnnotationHandler,
        categories: Vec<Category>,
        options: &FromLabelmeOptions,
    ) -> Result<(Self, ConversionStats)> {
        if categories.is_empty() {
            return Err(AnnotationError::NoCategories);
        }

        let mut dataset = Self::new("COCO Dataset converted from Labelme using annotation_utils");
        dataset.licenses.push(License::new(
            &options.license_url,
            &options.license_name,
            0,
        ));
        dataset.categories = categories;
        let category_names: Vec<String> =
            dataset.categories.iter().map(|c| c.name.clone()).collect();
        let mut stats = ConversionStats::new();

        for labelme_ann in labelme_handler {
            stats.total_annotations += 1;
            let img_path = resolve_labelme_image(labelme_ann, options, &mut stats)?;
            let img_filename = file_name_of(&img_path)?;

            if options.ensure_valid_shape_type {
                if let Some(shape) = labelme_ann
                    .shapes
                    .iter()
                    .find(|s| !VALID_SHAPE_TYPES.contains(&s.shape_type.as_str()))
                {
                    return Err(AnnotationError::InvalidShapeType {
                        shape_type: shape.shape_type.clone(),
                        expected: VALID_SHAPE_TYPES,
                    });
                }
            }

            let mut polygons: Vec<(Polygon, String)> = Vec::new();
            let mut bboxes: Vec<(BBox, String)> = Vec::new();
            let mut pending_kpts: Vec<(String, Vec<Point2D>)> = Vec::new();

            for shape in &labelme_ann.shapes {
                match shape.shape_type.as_str() {
                    "polygon" | "rectangle" => {
                        if !category_names.contains(&shape.label) {
                            if options.ignore_unspecified_categories {
                                debug!("Skipping shape with unknown label: {}", shape.label);
                                stats.skipped_shapes += 1;
                                continue;
                            }
                            return Err(AnnotationError::UnknownLabel {
                                label: shape.label.clone(),
                                known: category_names.clone(),
                            });
                        }
                        let points = shape.points();
                        if shape.shape_type == "polygon" {
                            if points.len() < 3 {
                                warn!(
                                    "Skipping polygon '{}' with {} point(s) in {}",
                                    shape.label,
                                    points.len(),
                                    img_filename
                                );
                                stats.skipped_shapes += 1;
                                continue;
                            }
                            polygons.push((Polygon::new(points), shape.label.clone()));
                        } else if let Some(bbox) = BBox::from_points(&points) {
                            bboxes.push((bbox, shape.label.clone()));
                        } else {
                            stats.skipped_shapes += 1;
                        }
                    }
                    "point" => match shape.points().first() {
                        Some(&point) => {
                            match pending_kpts.iter_mut().find(|(label, _)| *label == shape.label) {
                                Some((_, points)) => points.push(point),
                                None => pending_kpts.push((shape.label.clone(), vec![point])),
                            }
                        }
                        None => stats.skipped_shapes += 1,
                    },
                    other => {
                        debug!("Ignoring shape type '{}' in {}", other, img_filename);
                        stats.skipped_shapes += 1;
                    }
                }
            }

            if options.remove_redundant {
                bboxes.retain(|(bbox, _)| !polygons.iter().any(|(poly, _)| poly.contains_bbox(bbox)));
                polygons
                    .retain(|(poly, _)| !bboxes.iter().any(|(bbox, _)| bbox.contains_polygon(poly)));
            }

            let mut groups = Vec::with_capacity(polygons.len() + bboxes.len());
            let bounds = polygons
                .into_iter()
                .map(|(poly, label)| (Bound::Polygon(poly), label))
                .chain(bboxes.into_iter().map(|(bbox, label)| (Bound::BBox(bbox), label)));
            for (bound, label) in bounds {
                let category = dataset.unique_category_by_name(&label)?.clone();
                let mut group = KeypointGroup::new(bound, category);
                group.claim(&mut pending_kpts);
                groups.push(group);
            }

            if !pending_kpts.is_empty() {
                let labels: Vec<String> = pending_kpts
                    .iter()
                    .flat_map(|(label, points)| points.iter().map(move |_| label.clone()))
                    .collect();
                if options.ensure_no_unbounded_kpts {
                    error!("The following keypoints were left unbounded: {:?}", labels);
                    return Err(AnnotationError::UnboundedKeypoints {
                        image: img_filename,
                        labels,
                    });
                }
                warn!("Dropping unbounded keypoints {:?} in {}", labels, img_filename);
            }

            if groups.is_empty() {
                debug!("No polygon or rectangle in {}, skipping image", img_filename);
                stats.skipped_no_bounds += 1;
                continue;
            }

            let image_id = dataset.images.len() as u64;
            dataset.images.push(Image {
                license_id: 0,
                file_name: img_filename,
                coco_url: img_path.to_string_lossy().into_owned(),
                height: labelme_ann.image_height,
                width: labelme_ann.image_width,
                date_captured: file_ctime(&img_path)?,
                flickr_url: None,
                id: image_id,
            });
            stats.images_added += 1;

            for group in groups {
                let keypoints = group.keypoints();
                let num_keypoints = group.category.keypoints.len() as u32;
                let (segmentation, bbox, area) = match &group.bound {
                    Bound::Polygon(poly) => {
                        let Some(bbox) = poly.to_bbox() else {
                            continue;
                        };
                        let area = if options.shoelace_area { poly.area() } else { bbox.area() };
                        (Segmentation::from_polygons(std::slice::from_ref(poly)), bbox, area)
                    }
                    Bound::BBox(bbox) => (Segmentation::default(), *bbox, bbox.area()),
                };
                let id = dataset.annotations.len() as u64;
                dataset.annotations.push(Annotation {
                    segmentation,
                    num_keypoints,
                    area,
                    iscrowd: 0,
                    keypoints: Keypoint2D::list_to_flat(&keypoints),
                    image_id,
                    bbox: bbox.to_xywh(),
                    category_id: group.category.id,
                    id,
                });
                stats.annotations_created += 1;
            }
        }

        Ok((dataset, stats))
    }

    /// Merge datasets into one, de-duplicating licenses, images and categories.
    ///
    /// When `img_dirs` is given, each dataset is first re-pointed at its directory.
    pub fn combine(mut datasets: Vec<CocoDataset>, img_dirs: Option<&[PathBuf]>) -> Result<Self> {
        if let Some(img_dirs) = img_dirs {
            if img_dirs.len() != datasets.len() {
                return Err(AnnotationError::LengthMismatch {
                    what: "img_dirs",
                    expected: datasets.len(),
                    found: img_dirs.len(),
                });
            }
            for (dataset, img_dir) in datasets.iter_mut().zip(img_dirs) {
                dataset.update_img_dir(img_dir, true)?;
            }
        }

        let mut result = Self::new("A combination of many COCO datasets using annotation_utils");
        let mut mapper = CocoMapper::default();
        let mut image_index: HashMap<ImageKey, u64> = HashMap::new();

        for (i, dataset) in datasets.iter().enumerate() {
            for license in &dataset.licenses {
                let new_id = match result.licenses.iter().find(|l| l.same_content(license)) {
                    Some(existing) => existing.id,
                    None => {
                        let mut new_license = license.clone();
                        new_license.id = result.licenses.len() as u64;
                        result.licenses.push(new_license);
                        result.licenses.len() as u64 - 1
                    }
                };
                mapper.licenses.add(i, license.id, new_id);
            }

            for image in &dataset.images {
                check_file_exists(&image.path())?;
                let license_id = mapper.licenses.get(i, image.license_id).ok_or(
                    AnnotationError::MissingMapping {
                        kind: "license",
                        dataset: i,
                        old_id: image.license_id,
                    },
                )?;
                let mut new_image = image.clone();
                new_image.license_id = license_id;
                let key = ImageKey::of(&new_image);
                let new_id = match image_index.get(&key) {
                    Some(&existing) => existing,
                    None => {
                        new_image.id = result.images.len() as u64;
                        image_index.insert(key, new_image.id);
                        result.images.push(new_image);
                        result.images.len() as u64 - 1
                    }
                };
                mapper.images.add(i, image.id, new_id);
            }

            for category in &dataset.categories {
                let new_id = match result.categories.iter().find(|c| c.same_content(category)) {
                    Some(existing) => existing.id,
                    None => {
                        let mut new_category = category.clone();
                        new_category.id = result.categories.len() as u64;
                        result.categories.push(new_category);
                        result.categories.len() as u64 - 1
                    }
                };
                mapper.categories.add(i, category.id, new_id);
            }

            for ann in &dataset.annotations {
                let mut new_ann = ann.clone();
                new_ann.id = result.annotations.len() as u64;
                new_ann.image_id = mapper.images.get(i, ann.image_id).ok_or(
                    AnnotationError::MissingMapping {
                        kind: "image",
                        dataset: i,
                        old_id: ann.image_id,
                    },
                )?;
                new_ann.category_id = mapper.categories.get(i, ann.category_id).ok_or(
                    AnnotationError::MissingMapping {
                        kind: "category",
                        dataset: i,
                        old_id: ann.category_id,
                    },
                )?;
                result.annotations.push(new_ann);
            }
        }

        info!(
            "Combined {} datasets into {} images, {} annotations, {} categories",
            datasets.len(),
            result.images.len(),
            result.annotations.len(),
            result.categories.len()
        );
        Ok(result)
    }

    /// Load and combine every dataset listed in a [`DatasetPathConfig`] file.
    pub fn combine_from_config(config_path: &Path) -> Result<Self> {
        let config = DatasetPathConfig::load(config_path)?;
        let paths = config.get_paths()?;
        if let Some(unsupported) = paths.iter().find(|p| p.ann_format != "coco") {
            return Err(AnnotationError::UnsupportedFormat(
                unsupported.ann_format.clone(),
            ));
        }
        let datasets = paths
            .iter()
            .map(|p| Self::load_from_path(&p.ann_path, Some(&p.img_dir), true))
            .collect::<Result<Vec<_>>>()?;
        Self::combine(datasets, None)
    }

    /// Copy every image into `dst_img_dir`.
    pub fn combine_img_dirs(&mut self, dst_img_dir: &Path, options: &CombineImgDirsOptions) -> Result<()> {
        let mut used_img_dirs: Vec<PathBuf> = Vec::new();
        for image in &self.images {
            let used_img_dir = match image.path().parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            if !used_img_dirs.contains(&used_img_dir) {
                check_dir_exists(&used_img_dir)?;
                used_img_dirs.push(used_img_dir);
            }
        }
        if used_img_dirs.is_empty() {
            return Err(AnnotationError::invalid_value(
                "No image directories found; are the coco_url paths in the dataset correct?",
            ));
        }

        if dst_img_dir.is_dir() {
            let dst_abs = fs::canonicalize(dst_img_dir)?;
            for used in &used_img_dirs {
                if fs::canonicalize(used)? == dst_abs {
                    return Err(AnnotationError::invalid_value(format!(
                        "Destination {:?} is also a source image directory",
                        dst_img_dir
                    )));
                }
            }
        }
        prepare_empty_dir(dst_img_dir, options.overwrite)?;

        let pb = maybe_progress_bar(self.images.len() as u64, "Copy", options.show_pbar);
        for image in &mut self.images {
            let src_path = image.path();
            let dst_path = if options.preserve_filenames {
                let file_name = file_name_of(&src_path)?;
                let dst_path = dst_img_dir.join(&file_name);
                if dst_path.exists() {
                    error!("Failed to copy {} to {}", src_path.display(), dst_img_dir.display());
                    return Err(AnnotationError::DuplicateFilename {
                        file_name,
                        dir: dst_img_dir.to_path_buf(),
                    });
                }
                dst_path
            } else {
                next_dump_path(dst_img_dir, &extension_of(&src_path))?
            };
            fs::copy(&src_path, &dst_path)?;
            if options.update_img_paths {
                let dst_path = fs::canonicalize(&dst_path)?;
                image.file_name = file_name_of(&dst_path)?;
                image.coco_url = dst_path.to_string_lossy().into_owned();
            }
            pb.inc(1);
        }
        pb.finish_with_message("Copy complete");
        Ok(())
    }

    /// Re-locate images whose files moved somewhere below `src_container_dir`.
    ///
    /// Returns the number of images whose path changed.
    pub fn auto_fix_img_paths(&mut self, src_container_dir: &Path, ignore_old_matches: bool) -> Result<usize> {
        check_dir_exists(src_container_dir)?;
        let mut fixed = 0;
        for image in &mut self.images {
            let old_path = image.path();
            if old_path.is_file() && !ignore_old_matches {
                continue;
            }
            match find_moved_path(&old_path, src_container_dir) {
                Some(new_path) => {
                    if new_path != old_path {
                        fixed += 1;
                    }
                    image.coco_url = new_path.to_string_lossy().into_owned();
                }
                None => {
                    error!(
                        "Couldn't find any relative path of {} inside of {}",
                        old_path.display(),
                        src_container_dir.display()
                    );
                    return Err(AnnotationError::file_not_found(old_path));
                }
            }
        }
        info!("Fixed {} image path(s)", fixed);
        Ok(fixed)
    }

    /// Randomly split by image into train, val and test parts.
    ///
    /// Test and val take `ceil(n * size)` images each, in that order. Ids are kept.
    pub fn split(&self, val_size: f64, test_size: f64, seed: u64) -> Result<SplitDatasets> {
        for (name, size) in [("val_size", val_size), ("test_size", test_size)] {
            if !(0.0..=1.0).contains(&size) {
                return Err(AnnotationError::invalid_value(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, size
                )));
            }
        }

        let mut image_ids: Vec<u64> = self.images.iter().map(|image| image.id).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        image_ids.shuffle(&mut rng);

        let n = image_ids.len();
        let test_n = ((n as f64 * test_size).ceil() as usize).min(n);
        let val_n = ((n as f64 * val_size).ceil() as usize).min(n - test_n);
        let (test_ids, rest) = image_ids.split_at(test_n);
        let (val_ids, train_ids) = rest.split_at(val_n);

        Ok(SplitDatasets {
            train: self.subset(train_ids),
            val: self.subset(val_ids),
            test: self.subset(test_ids),
        })
    }

    /// The images with the given ids and their annotations, in dataset order
    pub fn subset(&self, image_ids: &[u64]) -> Self {
        let ids: HashSet<u64> = image_ids.iter().copied().collect();
        Self {
            info: self.info.clone(),
            licenses: self.licenses.clone(),
            images: self
                .images
                .iter()
                .filter(|image| ids.contains(&image.id))
                .cloned()
                .collect(),
            annotations: self
                .annotations
                .iter()
                .filter(|ann| ids.contains(&ann.image_id))
                .cloned()
                .collect(),
            categories: self.categories.clone(),
        }
    }
}

/// Image content without its id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ImageKey {
    license_id: u64,
    file_name: String,
    coco_url: String,
    height: u32,
    width: u32,
    date_captured: String,
    flickr_url: Option<String>,
}

impl ImageKey {
    fn of(image: &Image) -> Self {
        Self {
            license_id: image.license_id,
            file_name: image.file_name.clone(),
            coco_url: image.coco_url.clone(),
            height: image.height,
            width: image.width,
            date_captured: image.date_captured.clone(),
            flickr_url: image.flickr_url.clone(),
        }
    }
}

/// Image path for a Labelme annotation, restoring embedded data when the file is gone
fn resolve_labelme_image(
    labelme_ann: &LabelmeAnnotation,
    options: &FromLabelmeOptions,
    stats: &mut ConversionStats,
) -> Result<PathBuf> {
    let resolved = labelme_ann.resolved_image_path();
    let img_path = match &options.img_dir {
        Some(img_dir) => img_dir.join(file_name_of(&resolved)?),
        None => resolved,
    };
    if img_path.is_file() {
        return Ok(img_path);
    }
    if let Some(embedded_dir) = &options.embedded_image_dir {
        if let Some(written) = labelme_ann.write_embedded_image(embedded_dir)? {
            debug!(
                "Restored {} from embedded image data to {}",
                img_path.display(),
                written.display()
            );
            stats.images_from_embedded_data += 1;
            return Ok(written);
        }
    }
    Err(AnnotationError::file_not_found(img_path))
}

/// The longest trailing part of `old_path` that exists below `container_dir`
fn find_moved_path(old_path: &Path, container_dir: &Path) -> Option<PathBuf> {
    let parts: Vec<&std::ffi::OsStr> = old_path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    (0..parts.len())
        .map(|start| container_dir.join(parts[start..].iter().collect::<PathBuf>()))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dataset_is_empty() {
        let dataset = CocoDataset::default();
        assert!(dataset.licenses.is_empty());
        assert!(dataset.images.is_empty());
        assert!(dataset.annotations.is_empty());
        assert!(dataset.categories.is_empty());
        assert_eq!(dataset, CocoDataset::from_json(&dataset.to_json().unwrap()).unwrap());
    }

    #[test]
    fn test_find_moved_path_prefers_longest_suffix() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/c")).unwrap();
        fs::write(dir.path().join("b/c/img.jpg"), b"x").unwrap();
        fs::write(dir.path().join("img.jpg"), b"x").unwrap();

        let found = find_moved_path(Path::new("/old/a/b/c/img.jpg"), dir.path()).unwrap();
        assert_eq!(found, dir.path().join("b/c/img.jpg"));
        assert!(find_moved_path(Path::new("/old/missing.jpg"), dir.path()).is_none());
    }

    #[test]
    fn test_keypoint_group_claims_one_point_per_label() {
        let category = Category::new(1, "person", "human")
            .with_keypoints(vec!["head".into(), "foot".into()], vec![[1, 2]]);
        let mut group = KeypointGroup::new(Bound::BBox(BBox::new(0.0, 0.0, 10.0, 10.0)), category);
        let mut pending = vec![
            (
                "head".to_string(),
                vec![Point2D::new(50.0, 50.0), Point2D::new(1.0, 1.0), Point2D::new(2.0, 2.0)],
            ),
            ("tail".to_string(), vec![Point2D::new(3.0, 3.0)]),
        ];
        group.claim(&mut pending);

        // one head claimed, two left; the tail was claimed but is not a category keypoint
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1, vec![Point2D::new(50.0, 50.0), Point2D::new(2.0, 2.0)]);
        let keypoints = group.keypoints();
        assert_eq!(keypoints[0], Keypoint2D::new(Point2D::new(1.0, 1.0), 2));
        assert_eq!(keypoints[1], Keypoint2D::unlabeled());
    }

    #[test]
    fn test_unique_category_by_name() {
        let mut dataset = CocoDataset::new("test");
        dataset.categories = vec![
            Category::new(1, "cat", "animal"),
            Category::new(2, "dog", "animal"),
            Category::new(3, "dog", "toy"),
        ];
        assert_eq!(dataset.unique_category_by_name("cat").unwrap().id, 1);
        assert!(matches!(
            dataset.unique_category_by_name("dog"),
            Err(AnnotationError::AmbiguousName { count: 2, .. })
        ));
        assert!(matches!(
            dataset.unique_category_by_name("bird"),
            Err(AnnotationError::AmbiguousName { count: 0, .. })
        ));
    }
}
