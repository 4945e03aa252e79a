/// Which Labelme shape a COCO annotation turns into
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Priority {
    /// Polygons when the segmentation fits inside the bbox, the bbox otherwise
    #[default]
    Seg,
    /// Always a rectangle
    Bbox,
}

// Struct to hold conversion statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConversionStats {
    pub total_annotations: usize,
    pub images_added: usize,
    pub skipped_no_bounds: usize,
    pub skipped_shapes: usize,
    pub images_from_embedded_data: usize,
    pub annotations_created: usize,
}

impl ConversionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_summary(&self) {
        log::info!("=== Conversion Summary ===");
        log::info!("Labelme annotations processed: {}", self.total_annotations);
        log::info!("Images added: {}", self.images_added);
        log::info!("COCO annotations created: {}", self.annotations_created);
        if self.images_from_embedded_data > 0 {
            log::info!(
                "Images restored from embedded data: {}",
                self.images_from_embedded_data
            );
        }
        if self.skipped_no_bounds > 0 {
            log::warn!(
                "Skipped (no polygon or rectangle): {}",
                self.skipped_no_bounds
            );
        }
        if self.skipped_shapes > 0 {
            log::warn!("Ignored shapes: {}", self.skipped_shapes);
        }
    }
}
