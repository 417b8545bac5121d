// ============================================================
// Layer 4 — Image Folder Loader
// ============================================================
// Lists training scans from a directory laid out as:
//
//   train/
//     mild_demented/        ← label 0
//       001.jpg
//       ...
//     moderate_demented/    ← label 1
//     no_demented/          ← label 2
//     very_mild_demented/   ← label 3
//
// Labels are inferred: every immediate sub-directory is a class
// and its label is its index in the alphabetically sorted list.
// Class folders are walked recursively; only files with an
// image extension are kept.
//
// Only the image HEADER is read here (to skip corrupt files).
// Pixels are decoded later, one sample at a time, by ScanDataset.

use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::dataset::ScanSample;
use crate::domain::traits::ScanSource;

/// File extensions accepted as training images (lower-case).
pub const IMAGE_EXTENSIONS: [&str; 5] = ["bmp", "gif", "jpeg", "jpg", "png"];

/// Loads labelled scans from a class-per-folder directory.
/// Implements the ScanSource trait from Layer 3.
pub struct ImageFolderLoader {
    /// Root directory containing one sub-directory per class
    dir: PathBuf,
}

impl ImageFolderLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.is_dir() {
            bail!("Training directory '{}' not found", self.dir.display());
        }
        Ok(())
    }
}

impl ScanSource for ImageFolderLoader {
    fn class_names(&self) -> Result<Vec<String>> {
        self.ensure_dir()?;

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }

        // Label index == position in the sorted list
        names.sort();

        if names.is_empty() {
            bail!(
                "No class sub-directories found in '{}'",
                self.dir.display()
            );
        }
        Ok(names)
    }

    fn load_all(&self) -> Result<Vec<ScanSample>> {
        let class_names = self.class_names()?;
        let mut samples = Vec::new();

        for (label, class) in class_names.iter().enumerate() {
            let class_dir = self.dir.join(class);
            let mut files = Vec::new();
            collect_image_files(&class_dir, &mut files)?;
            files.sort();

            let mut kept = 0usize;
            for path in files {
                // Header-only check catches truncated/corrupt files
                match image::image_dimensions(&path) {
                    Ok(_) => {
                        samples.push(ScanSample::new(path, label));
                        kept += 1;
                    }
                    Err(e) => {
                        tracing::warn!("Skipping '{}': {}", path.display(), e);
                    }
                }
            }
            tracing::debug!("Class {} '{}': {} images", label, class, kept);
        }

        if samples.is_empty() {
            bail!("No readable images found under '{}'", self.dir.display());
        }

        tracing::info!(
            "Found {} images belonging to {} classes",
            samples.len(),
            class_names.len()
        );
        Ok(samples)
    }
}

/// True when the path has one of the accepted image extensions.
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recursively collect image files below `dir`.
fn collect_image_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
    {
        let entry = entry?;
        let path  = entry.path();
        let ty    = entry.file_type()?;

        if ty.is_dir() {
            collect_image_files(&path, out)?;
        } else if ty.is_file() && is_image_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}
