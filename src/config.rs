use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

use crate::types::Priority;
use crate::visualize::DrawTarget;

/// Utilities for converting, combining and splitting COCO and Labelme annotations.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Hide progress bars
    #[arg(long = "no_progress", global = true)]
    pub no_progress: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Convert a directory of Labelme JSON files into a COCO dataset
    Labelme2coco(Labelme2CocoArgs),
    /// Convert a COCO dataset into Labelme JSON files
    Coco2labelme(Coco2LabelmeArgs),
    /// Merge several COCO datasets into one
    Combine(CombineArgs),
    /// Merge the COCO datasets listed in a dataset path config
    CombineConfig(CombineConfigArgs),
    /// Split a COCO dataset into train, val and test parts
    Split(SplitArgs),
    /// Copy every image of a COCO dataset into one directory
    CopyImages(CopyImagesArgs),
    /// Re-locate images that moved below a container directory
    FixPaths(FixPathsArgs),
    /// Draw annotations onto their images
    Visualize(VisualizeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct Labelme2CocoArgs {
    /// Directory containing Labelme JSON files
    #[arg(short = 'd', long = "json_dir")]
    pub json_dir: PathBuf,

    /// Output COCO JSON file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// JSON file holding a list of COCO categories
    #[arg(long = "categories", conflicts_with = "label_list")]
    pub categories: Option<PathBuf>,

    /// Look images up by file name in this directory
    #[arg(long = "img_dir")]
    pub img_dir: Option<PathBuf>,

    /// Where to write images restored from embedded imageData
    #[arg(long = "embedded_image_dir")]
    pub embedded_image_dir: Option<PathBuf>,

    /// Keep rectangles inside polygons and polygons inside rectangles
    #[arg(long = "keep_redundant")]
    pub keep_redundant: bool,

    /// Drop keypoints outside every polygon and rectangle instead of failing
    #[arg(long = "allow_unbounded_keypoints")]
    pub allow_unbounded_keypoints: bool,

    /// Skip shapes whose label is not a category
    #[arg(long = "ignore_unknown")]
    pub ignore_unknown: bool,

    /// Ignore shape types other than point, polygon and rectangle
    #[arg(long = "lenient_shapes")]
    pub lenient_shapes: bool,

    /// Use the polygon's own area for polygon annotations instead of its bbox area
    #[arg(long = "shoelace_area")]
    pub shoelace_area: bool,

    #[arg(long = "overwrite")]
    pub overwrite: bool,

    /// Ordered label list, category ids start at 1
    #[arg(use_value_delimiter = true)]
    pub label_list: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct Coco2LabelmeArgs {
    #[arg(short = 'c', long = "coco_json")]
    pub coco_json: PathBuf,

    /// Image directory, overriding the paths stored in the dataset
    #[arg(long = "img_dir")]
    pub img_dir: Option<PathBuf>,

    #[arg(short = 'o', long = "output_dir")]
    pub output_dir: PathBuf,

    /// Prefer segmentation polygons or bounding boxes
    #[arg(long = "priority", value_enum, default_value = "seg")]
    pub priority: PriorityArg,

    /// Embed the image bytes in each Labelme file
    #[arg(long = "embed_image_data")]
    pub embed_image_data: bool,

    #[arg(long = "overwrite")]
    pub overwrite: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CombineArgs {
    /// COCO JSON files to combine
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Image directory of each input, in order
    #[arg(long = "img_dir")]
    pub img_dirs: Vec<PathBuf>,

    #[arg(long = "overwrite")]
    pub overwrite: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CombineConfigArgs {
    /// Dataset path config JSON
    #[arg(long = "config")]
    pub config: PathBuf,

    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    #[arg(long = "overwrite")]
    pub overwrite: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SplitArgs {
    #[arg(short = 'c', long = "coco_json")]
    pub coco_json: PathBuf,

    #[arg(long = "img_dir")]
    pub img_dir: Option<PathBuf>,

    /// Directory receiving instances_{train,val,test}.json
    #[arg(short = 'o', long = "output_dir")]
    pub output_dir: PathBuf,

    /// Proportion of the dataset to use for validation
    #[arg(long = "val_size", default_value_t = 0.2, value_parser = validate_size)]
    pub val_size: f64,

    /// Proportion of the dataset to use for testing
    #[arg(long = "test_size", default_value_t = 0.0, value_parser = validate_size)]
    pub test_size: f64,

    /// Seed for random shuffling
    #[arg(long = "seed", default_value_t = 42)]
    pub seed: u64,

    #[arg(long = "overwrite")]
    pub overwrite: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CopyImagesArgs {
    #[arg(short = 'c', long = "coco_json")]
    pub coco_json: PathBuf,

    #[arg(long = "dst_img_dir")]
    pub dst_img_dir: PathBuf,

    /// Where to save the dataset with updated image paths
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Keep file names instead of numbering the copies
    #[arg(long = "preserve_filenames")]
    pub preserve_filenames: bool,

    #[arg(long = "overwrite")]
    pub overwrite: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FixPathsArgs {
    #[arg(short = 'c', long = "coco_json")]
    pub coco_json: PathBuf,

    /// Directory to search for moved images
    #[arg(long = "container_dir")]
    pub container_dir: PathBuf,

    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Re-locate every image, not only the missing ones
    #[arg(long = "all")]
    pub all: bool,

    #[arg(long = "overwrite")]
    pub overwrite: bool,
}

#[derive(Args, Debug, Clone)]
pub struct VisualizeArgs {
    #[arg(short = 'c', long = "coco_json")]
    pub coco_json: PathBuf,

    #[arg(long = "img_dir")]
    pub img_dir: Option<PathBuf>,

    #[arg(long = "save_dir")]
    pub save_dir: PathBuf,

    #[arg(long = "preserve_filenames")]
    pub preserve_filenames: bool,

    #[arg(long = "overwrite")]
    pub overwrite: bool,

    #[arg(long = "start", default_value_t = 0)]
    pub start: usize,

    #[arg(long = "end")]
    pub end: Option<usize>,

    /// Layers to draw, in order
    #[arg(
        long = "draw_order",
        use_value_delimiter = true,
        default_values = ["seg", "bbox", "skeleton", "kpt"],
        value_parser = parse_draw_target
    )]
    pub draw_order: Vec<DrawTarget>,

    /// Copy the images without drawing anything
    #[arg(long = "no_annotations")]
    pub no_annotations: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum PriorityArg {
    Seg,
    Bbox,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Seg => Priority::Seg,
            PriorityArg::Bbox => Priority::Bbox,
        }
    }
}

// Validate that the size is between 0.0 and 1.0
pub fn validate_size(s: &str) -> Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if (0.0..=1.0).contains(&val) => Ok(val),
        _ => Err("SIZE must be between 0.0 and 1.0".to_string()),
    }
}

fn parse_draw_target(s: &str) -> Result<DrawTarget, String> {
    DrawTarget::from_str(s).map_err(|e| e.to_string())
}
