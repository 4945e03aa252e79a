//! Rendering annotations onto their images.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use log::{error, info};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::coco::{clamp_coords, Annotation, Category, Image};
use crate::coco_dataset::CocoDataset;
use crate::error::{AnnotationError, Result};
use crate::utils::{extension_of, file_name_of, maybe_progress_bar, next_dump_path, prepare_empty_dir};

const BBOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const SEG_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const SKELETON_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const KPT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const KPT_RADIUS: i32 = 3;

/// One layer of an annotation drawing
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DrawTarget {
    Seg,
    Bbox,
    Skeleton,
    Kpt,
}

impl DrawTarget {
    pub fn default_order() -> Vec<DrawTarget> {
        vec![DrawTarget::Seg, DrawTarget::Bbox, DrawTarget::Skeleton, DrawTarget::Kpt]
    }
}

impl FromStr for DrawTarget {
    type Err = AnnotationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "seg" => Ok(DrawTarget::Seg),
            "bbox" => Ok(DrawTarget::Bbox),
            "skeleton" => Ok(DrawTarget::Skeleton),
            "kpt" => Ok(DrawTarget::Kpt),
            other => Err(AnnotationError::invalid_value(format!(
                "Invalid draw target '{}', expected one of seg, bbox, skeleton, kpt",
                other
            ))),
        }
    }
}

/// Options for [`CocoDataset::save_visualization`]
#[derive(Debug, Clone)]
pub struct VisualizationOptions {
    pub preserve_filenames: bool,
    pub overwrite: bool,
    pub start: usize,
    pub end: Option<usize>,
    pub draw_order: Vec<DrawTarget>,
    pub show_annotations: bool,
    pub show_pbar: bool,
}

impl Default for VisualizationOptions {
    fn default() -> Self {
        Self {
            preserve_filenames: false,
            overwrite: false,
            start: 0,
            end: None,
            draw_order: DrawTarget::default_order(),
            show_annotations: true,
            show_pbar: true,
        }
    }
}

/// Draw one annotation's layers in `draw_order`
pub fn draw_annotation(
    img: &mut RgbImage,
    ann: &Annotation,
    category: &Category,
    draw_order: &[DrawTarget],
) {
    let (width, height) = img.dimensions();
    let keypoints = ann.keypoints();

    for target in draw_order {
        match target {
            DrawTarget::Bbox => {
                let bbox = ann.bbox();
                let (x0, y0) = clamp_coords(bbox.xmin, bbox.ymin, width, height);
                let (x1, y1) = clamp_coords(bbox.xmax, bbox.ymax, width, height);
                let (w, h) = ((x1 - x0).round() as u32, (y1 - y0).round() as u32);
                if w > 0 && h > 0 {
                    let rect = Rect::at(x0.round() as i32, y0.round() as i32).of_size(w, h);
                    draw_hollow_rect_mut(img, rect, BBOX_COLOR);
                }
            }
            DrawTarget::Seg => {
                for polygon in ann.segmentation.polygons() {
                    let n = polygon.len();
                    if n < 2 {
                        continue;
                    }
                    for i in 0..n {
                        let a = polygon.points[i];
                        let b = polygon.points[(i + 1) % n];
                        draw_line_segment_mut(
                            img,
                            (a.x as f32, a.y as f32),
                            (b.x as f32, b.y as f32),
                            SEG_COLOR,
                        );
                    }
                }
            }
            DrawTarget::Skeleton => {
                // skeleton indices are 1-based
                for [a, b] in &category.skeleton {
                    let pair = (a.checked_sub(1), b.checked_sub(1));
                    let (Some(a), Some(b)) = pair else { continue };
                    let (Some(ka), Some(kb)) = (keypoints.get(a as usize), keypoints.get(b as usize))
                    else {
                        continue;
                    };
                    if !ka.is_labeled() || !kb.is_labeled() {
                        continue;
                    }
                    draw_line_segment_mut(
                        img,
                        (ka.point.x as f32, ka.point.y as f32),
                        (kb.point.x as f32, kb.point.y as f32),
                        SKELETON_COLOR,
                    );
                }
            }
            DrawTarget::Kpt => {
                for kpt in keypoints.iter().filter(|k| k.is_labeled()) {
                    let (x, y) = clamp_coords(kpt.point.x, kpt.point.y, width, height);
                    draw_filled_circle_mut(img, (x.round() as i32, y.round() as i32), KPT_RADIUS, KPT_COLOR);
                }
            }
        }
    }
}

impl CocoDataset {
    /// The image with its annotations drawn on it
    pub fn get_preview(
        &self,
        image: &Image,
        draw_order: &[DrawTarget],
        show_annotations: bool,
    ) -> Result<RgbImage> {
        let mut img = image::open(image.path())?.to_rgb8();
        if show_annotations {
            for ann in self.annotations.iter().filter(|a| a.image_id == image.id) {
                let category = self.category(ann.category_id)?;
                draw_annotation(&mut img, ann, category, draw_order);
            }
        }
        Ok(img)
    }

    /// Render the images in `[start, end)` into `save_dir`.
    pub fn save_visualization(&self, save_dir: &Path, options: &VisualizationOptions) -> Result<Vec<PathBuf>> {
        let unique: HashSet<&DrawTarget> = options.draw_order.iter().collect();
        if unique.len() != options.draw_order.len() {
            return Err(AnnotationError::invalid_value(format!(
                "Duplicate entries in draw order {:?}",
                options.draw_order
            )));
        }
        prepare_empty_dir(save_dir, options.overwrite)?;

        let end = options.end.unwrap_or(self.images.len()).min(self.images.len());
        let start = options.start.min(end);
        let images = &self.images[start..end];

        let pb = maybe_progress_bar(images.len() as u64, "Visualize", options.show_pbar);
        let mut written = Vec::with_capacity(images.len());
        for image in images {
            let img = self.get_preview(image, &options.draw_order, options.show_annotations)?;
            let save_path = if options.preserve_filenames {
                let save_path = save_dir.join(file_name_of(&image.path())?);
                if save_path.exists() {
                    error!("Duplicate filename {} in {}", image.file_name, save_dir.display());
                    return Err(AnnotationError::DuplicateFilename {
                        file_name: image.file_name.clone(),
                        dir: save_dir.to_path_buf(),
                    });
                }
                save_path
            } else {
                next_dump_path(save_dir, &extension_of(&image.path()))?
            };
            img.save(&save_path)?;
            written.push(save_path);
            pb.inc(1);
        }
        pb.finish_with_message("Visualization complete");
        info!("Saved {} visualization(s) to {}", written.len(), save_dir.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coco::Segmentation;

    fn annotation() -> Annotation {
        Annotation {
            segmentation: Segmentation::Polygons(vec![vec![2.0, 2.0, 8.0, 2.0, 8.0, 8.0]]),
            num_keypoints: 1,
            area: 18.0,
            iscrowd: 0,
            keypoints: vec![5.0, 5.0, 2.0, 1.0, 1.0, 0.0],
            image_id: 0,
            bbox: [1.0, 1.0, 8.0, 8.0],
            category_id: 1,
            id: 0,
        }
    }

    #[test]
    fn test_draw_target_parsing() {
        assert_eq!("kpt".parse::<DrawTarget>().unwrap(), DrawTarget::Kpt);
        assert!("mask".parse::<DrawTarget>().is_err());
    }

    #[test]
    fn test_draw_annotation_skips_invisible_keypoints() {
        let category = Category::new(1, "thing", "none")
            .with_keypoints(vec!["a".into(), "b".into()], vec![[1, 2]]);
        let mut img = RgbImage::new(12, 12);
        draw_annotation(&mut img, &annotation(), &category, &[DrawTarget::Kpt, DrawTarget::Skeleton]);

        assert_eq!(*img.get_pixel(5, 5), KPT_COLOR);
        // the second keypoint is unlabeled, so no circle and no skeleton edge
        assert_eq!(*img.get_pixel(1, 1), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_annotation_bbox() {
        let category = Category::new(1, "thing", "none");
        let mut img = RgbImage::new(12, 12);
        draw_annotation(&mut img, &annotation(), &category, &[DrawTarget::Bbox]);
        assert_eq!(*img.get_pixel(1, 1), BBOX_COLOR);
        assert_eq!(*img.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_save_visualization_writes_images() {
        let dir = tempfile::tempdir().unwrap();
        let img_path = dir.path().join("a.png");
        RgbImage::new(12, 12).save(&img_path).unwrap();

        let mut dataset = CocoDataset::new("vis");
        let mut image = Image::new(0, "a.png", 12, 12);
        image.coco_url = img_path.to_string_lossy().into_owned();
        dataset.images.push(image);
        dataset.categories.push(Category::new(1, "thing", "none"));
        dataset.annotations.push(annotation());

        let save_dir = dir.path().join("vis");
        let options = VisualizationOptions {
            preserve_filenames: true,
            show_pbar: false,
            ..Default::default()
        };
        let written = dataset.save_visualization(&save_dir, &options).unwrap();
        assert_eq!(written, vec![save_dir.join("a.png")]);
        assert!(dataset.save_visualization(&save_dir, &options).is_err());
    }
}
