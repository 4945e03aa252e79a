use clap::Parser;
use log::{error, info};
use std::fs::File;
use std::io::BufReader;
use std::process::ExitCode;

use annotation_utils::config::{
    Cli, Coco2LabelmeArgs, CombineArgs, CombineConfigArgs, Command, CopyImagesArgs, FixPathsArgs,
    Labelme2CocoArgs, SplitArgs, VisualizeArgs,
};
use annotation_utils::{
    gather_labels, Category, CocoDataset, CombineImgDirsOptions, FromLabelmeOptions,
    LabelmeAnnotationHandler, Result, VisualizationOptions,
};

fn main() -> ExitCode {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let show_pbar = !cli.no_progress;

    let result = match cli.command {
        Command::Labelme2coco(args) => labelme2coco(args),
        Command::Coco2labelme(args) => coco2labelme(args),
        Command::Combine(args) => combine(args),
        Command::CombineConfig(args) => combine_config(args),
        Command::Split(args) => split(args),
        Command::CopyImages(args) => copy_images(args, show_pbar),
        Command::FixPaths(args) => fix_paths(args),
        Command::Visualize(args) => visualize(args, show_pbar),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn labelme2coco(args: Labelme2CocoArgs) -> Result<()> {
    info!("Starting Labelme to COCO conversion...");
    let categories = match &args.categories {
        Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?))?,
        None if !args.label_list.is_empty() => Category::from_labels(&args.label_list),
        None => {
            let labels = gather_labels(&args.json_dir)?;
            info!("Gathered {} label(s) from {}", labels.len(), args.json_dir.display());
            Category::from_labels(&labels)
        }
    };

    let handler = LabelmeAnnotationHandler::load_from_dir(&args.json_dir)?;
    let options = FromLabelmeOptions {
        img_dir: args.img_dir,
        remove_redundant: !args.keep_redundant,
        ensure_no_unbounded_kpts: !args.allow_unbounded_keypoints,
        ensure_valid_shape_type: !args.lenient_shapes,
        ignore_unspecified_categories: args.ignore_unknown,
        embedded_image_dir: args.embedded_image_dir,
        shoelace_area: args.shoelace_area,
        ..Default::default()
    };
    let (dataset, stats) = CocoDataset::from_labelme(&handler, categories, &options)?;
    dataset.save_to_path(&args.output, args.overwrite)?;
    stats.print_summary();
    info!("Saved COCO dataset to {}", args.output.display());
    Ok(())
}

fn coco2labelme(args: Coco2LabelmeArgs) -> Result<()> {
    let dataset = CocoDataset::load_from_path(&args.coco_json, args.img_dir.as_deref(), true)?;
    let handler = dataset.to_labelme(args.priority.into())?;
    handler.save_to_dir(&args.output_dir, args.overwrite, args.embed_image_data)?;
    info!(
        "Wrote {} Labelme annotation(s) to {}",
        handler.len(),
        args.output_dir.display()
    );
    Ok(())
}

fn combine(args: CombineArgs) -> Result<()> {
    let datasets = args
        .inputs
        .iter()
        .map(|path| CocoDataset::load_from_path(path, None, false))
        .collect::<Result<Vec<_>>>()?;
    let img_dirs = (!args.img_dirs.is_empty()).then_some(args.img_dirs.as_slice());
    let combined = CocoDataset::combine(datasets, img_dirs)?;
    combined.save_to_path(&args.output, args.overwrite)?;
    info!("Saved combined dataset to {}", args.output.display());
    Ok(())
}

fn combine_config(args: CombineConfigArgs) -> Result<()> {
    let combined = CocoDataset::combine_from_config(&args.config)?;
    combined.save_to_path(&args.output, args.overwrite)?;
    info!("Saved combined dataset to {}", args.output.display());
    Ok(())
}

fn split(args: SplitArgs) -> Result<()> {
    let dataset = CocoDataset::load_from_path(&args.coco_json, args.img_dir.as_deref(), false)?;
    let parts = dataset.split(args.val_size, args.test_size, args.seed)?;
    parts.save_to_dir(&args.output_dir, args.overwrite)?;
    Ok(())
}

fn copy_images(args: CopyImagesArgs, show_pbar: bool) -> Result<()> {
    let mut dataset = CocoDataset::load_from_path(&args.coco_json, None, true)?;
    let options = CombineImgDirsOptions {
        preserve_filenames: args.preserve_filenames,
        update_img_paths: args.output.is_some(),
        overwrite: args.overwrite,
        show_pbar,
    };
    dataset.combine_img_dirs(&args.dst_img_dir, &options)?;
    if let Some(output) = &args.output {
        dataset.save_to_path(output, args.overwrite)?;
        info!("Saved dataset with updated image paths to {}", output.display());
    }
    Ok(())
}

fn fix_paths(args: FixPathsArgs) -> Result<()> {
    let mut dataset = CocoDataset::load_from_path(&args.coco_json, None, false)?;
    dataset.auto_fix_img_paths(&args.container_dir, args.all)?;
    dataset.save_to_path(&args.output, args.overwrite)?;
    Ok(())
}

fn visualize(args: VisualizeArgs, show_pbar: bool) -> Result<()> {
    let dataset = CocoDataset::load_from_path(&args.coco_json, args.img_dir.as_deref(), true)?;
    let options = VisualizationOptions {
        preserve_filenames: args.preserve_filenames,
        overwrite: args.overwrite,
        start: args.start,
        end: args.end,
        draw_order: args.draw_order,
        show_annotations: !args.no_annotations,
        show_pbar,
    };
    dataset.save_visualization(&args.save_dir, &options)?;
    Ok(())
}
