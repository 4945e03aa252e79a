use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{AnnotationError, Result};

/// Helper function to infer image format from image bytes
pub fn infer_image_format(image_bytes: &[u8]) -> Option<&'static str> {
    if image_bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if image_bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("png")
    } else if image_bytes.starts_with(b"BM") {
        Some("bmp")
    } else if image_bytes.starts_with(&[0x47, 0x49, 0x46]) {
        Some("gif")
    } else {
        None
    }
}

/// Create a progress bar with the given length and label
pub fn create_progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
                label
            ))
            .progress_chars("#>-"),
    );
    pb
}

/// A hidden bar when progress output is disabled
pub fn maybe_progress_bar(len: u64, label: &str, show: bool) -> ProgressBar {
    if show {
        create_progress_bar(len, label)
    } else {
        ProgressBar::hidden()
    }
}

pub fn check_file_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(AnnotationError::file_not_found(path))
    }
}

pub fn check_dir_exists(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(AnnotationError::dir_not_found(path))
    }
}

pub fn dir_contents_len(dir: &Path) -> std::io::Result<usize> {
    Ok(fs::read_dir(dir)?.count())
}

/// Make sure `dir` exists and is empty.
///
/// A populated directory is cleared when `overwrite` is set, and is an error otherwise.
pub fn prepare_empty_dir(dir: &Path, overwrite: bool) -> Result<()> {
    fs::create_dir_all(dir)?;
    if dir_contents_len(dir)? == 0 {
        return Ok(());
    }
    if !overwrite {
        return Err(AnnotationError::DirNotEmpty {
            path: dir.to_path_buf(),
        });
    }
    warn!("Directory {:?} is not empty. Deleting its contents.", dir);
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// The next free sequentially numbered path in `dump_dir`, e.g. `000003.jpg`
pub fn next_dump_path(dump_dir: &Path, file_extension: &str) -> std::io::Result<PathBuf> {
    let extension = file_extension.trim_start_matches('.');
    let mut index = dir_contents_len(dump_dir)?;
    loop {
        let candidate = if extension.is_empty() {
            dump_dir.join(format!("{:06}", index))
        } else {
            dump_dir.join(format!("{:06}.{}", index, extension))
        };
        if !candidate.exists() {
            return Ok(candidate);
        }
        index += 1;
    }
}

/// Create `dir/stem.ext`, or `dir/stem_N.ext` for the first free `N`, without touching existing files
pub fn create_free_file(dir: &Path, stem: &str, extension: &str) -> std::io::Result<(PathBuf, fs::File)> {
    let mut index = 0;
    loop {
        let name = if index == 0 {
            format!("{}.{}", stem, extension)
        } else {
            format!("{}_{}.{}", stem, index, extension)
        };
        let candidate = dir.join(name);
        match fs::OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => index += 1,
            Err(e) => return Err(e),
        }
    }
}

pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string()
}

pub fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| AnnotationError::invalid_value(format!("Invalid file name: {:?}", path)))
}

/// The file's creation time in ctime format, falling back to its modification time
pub fn file_ctime(path: &Path) -> Result<String> {
    let metadata = fs::metadata(path)?;
    let time: SystemTime = metadata.created().or_else(|_| metadata.modified())?;
    let local: chrono::DateTime<chrono::Local> = time.into();
    Ok(local.format("%a %b %e %H:%M:%S %Y").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_free_file_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("img.png"), b"old").unwrap();

        let (first, _) = create_free_file(dir.path(), "img", "png").unwrap();
        let (second, _) = create_free_file(dir.path(), "img", "png").unwrap();
        assert_eq!(first, dir.path().join("img_1.png"));
        assert_eq!(second, dir.path().join("img_2.png"));
        assert_eq!(fs::read(dir.path().join("img.png")).unwrap(), b"old");
    }

    #[test]
    fn test_infer_image_format() {
        let jpg_bytes = vec![0xFF, 0xD8, 0xFF];
        let png_bytes = vec![0x89, b'P', b'N', b'G'];
        let bmp_bytes = vec![b'B', b'M'];
        let gif_bytes = vec![0x47, 0x49, 0x46];
        let unknown_bytes = vec![0x00, 0x00, 0x00];

        assert_eq!(infer_image_format(&jpg_bytes), Some("jpg"));
        assert_eq!(infer_image_format(&png_bytes), Some("png"));
        assert_eq!(infer_image_format(&bmp_bytes), Some("bmp"));
        assert_eq!(infer_image_format(&gif_bytes), Some("gif"));
        assert_eq!(infer_image_format(&unknown_bytes), None);
    }

    #[test]
    fn test_next_dump_path() {
        let dir = tempfile::tempdir().unwrap();
        let first = next_dump_path(dir.path(), ".jpg").unwrap();
        assert_eq!(first, dir.path().join("000000.jpg"));
        fs::write(&first, b"x").unwrap();
        fs::write(dir.path().join("000001.jpg"), b"x").unwrap();
        // two entries, and 000002 is free
        assert_eq!(
            next_dump_path(dir.path(), "jpg").unwrap(),
            dir.path().join("000002.jpg")
        );
    }

    #[test]
    fn test_prepare_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        prepare_empty_dir(&target, false).unwrap();
        fs::write(target.join("a.txt"), b"x").unwrap();
        assert!(matches!(
            prepare_empty_dir(&target, false),
            Err(AnnotationError::DirNotEmpty { .. })
        ));
        prepare_empty_dir(&target, true).unwrap();
        assert_eq!(dir_contents_len(&target).unwrap(), 0);
    }
}
