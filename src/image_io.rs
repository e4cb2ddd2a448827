use std::path::{Path, PathBuf};
use std::fs;
use image::{DynamicImage, ImageFormat};
use log::debug;

use crate::errors::{RootTraitError, Result};

/// Extensions accepted as input images (compared case-insensitively)
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Represents an input image with its metadata
pub struct InputImage {
    pub image: DynamicImage,
    pub path: PathBuf,
    /// File stem, used to name saved images
    pub filename: String,
}

impl InputImage {
    /// File name with extension, as written to the feature table
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.filename)
            .to_string()
    }
}

/// Whether a path has one of the supported image extensions
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Collect the images to process from a file or directory path
///
/// Directory listings are sorted so batch output is stable.
pub fn collect_image_files<P: AsRef<Path>>(path: P, recursive: bool) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(RootTraitError::InvalidPath(path.to_path_buf()));
    }

    if path.is_file() {
        if !is_supported_image(path) {
            return Err(RootTraitError::Config(format!(
                "{} is not a supported image type",
                path.display()
            )));
        }
        return Ok(vec![path.to_path_buf()]);
    }

    let mut image_files = Vec::new();
    find_image_files(path, recursive, &mut image_files)?;
    image_files.sort();

    debug!("Found {} images under {}", image_files.len(), path.display());
    Ok(image_files)
}

/// Helper function to search a directory for images
fn find_image_files(dir_path: &Path, recursive: bool, result: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();

        if path.is_dir() {
            if recursive {
                find_image_files(&path, recursive, result)?;
            }
        } else if path.is_file() && is_supported_image(&path) {
            result.push(path);
        }
    }

    Ok(())
}

/// Load an image in whatever colour layout it was stored
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<InputImage> {
    let path = path.as_ref();

    // Get filename without extension
    let filename = path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| RootTraitError::InvalidPath(path.to_path_buf()))?
        .to_string();

    let image = image::open(path)?;

    Ok(InputImage {
        image,
        path: path.to_path_buf(),
        filename,
    })
}

/// Save an image as PNG, creating the parent directory if needed
pub fn save_image<P: AsRef<Path>>(image: &DynamicImage, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    image.save_with_format(path, ImageFormat::Png)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_check_ignores_case() {
        assert!(is_supported_image(Path::new("scan.PNG")));
        assert!(is_supported_image(Path::new("a/b/crown.Tiff")));
        assert!(!is_supported_image(Path::new("notes.txt")));
        assert!(!is_supported_image(Path::new("no_extension")));
    }

    #[test]
    fn missing_path_is_an_error() {
        let result = collect_image_files("/definitely/not/here", false);
        assert!(matches!(result, Err(RootTraitError::InvalidPath(_))));
    }
}
