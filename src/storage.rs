//! Image persistence for detection results.
//!
//! This module is responsible for:
//! - creating a fresh, timestamped results folder per run
//! - writing the background image and, per result, the annotated frame,
//!   the dilated threshold mask, and the delta image
//! - recording the effective configuration and command line of the run
//!
//! This module MUST NOT alter results: it only encodes what the detection
//! loop hands it.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{MotiondConfig, OutputSettings};
use crate::detect::FrameResult;
use crate::frame::Frame;
use crate::pipeline::ResultSink;

const RESULTS_FOLDER_SUFFIX: &str = "image_results";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpg,
    Jpeg,
}

impl ImageFormat {
    /// Accepts `png`, `jpg` and `jpeg`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "png" => Some(ImageFormat::Png),
            "jpg" => Some(ImageFormat::Jpg),
            "jpeg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    fn encoding(self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpg | ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

/// The three per-frame image sets, each saved in its own subfolder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSet {
    SecurityFeed,
    Thresh,
    FrameDelta,
}

impl ImageSet {
    pub const ALL: [ImageSet; 3] = [ImageSet::SecurityFeed, ImageSet::Thresh, ImageSet::FrameDelta];

    pub fn name(self) -> &'static str {
        match self {
            ImageSet::SecurityFeed => "security_feed",
            ImageSet::Thresh => "thresh",
            ImageSet::FrameDelta => "frame_delta",
        }
    }

    fn enabled(self, settings: &OutputSettings) -> bool {
        match self {
            ImageSet::SecurityFeed => settings.save_security_feed_images,
            ImageSet::Thresh => settings.save_thresh_images,
            ImageSet::FrameDelta => settings.save_frame_delta_images,
        }
    }

    fn image(self, result: &FrameResult) -> &Frame {
        match self {
            ImageSet::SecurityFeed => &result.annotated_image,
            ImageSet::Thresh => &result.threshold_image,
            ImageSet::FrameDelta => &result.delta_image,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub images_written: u64,
    pub images_skipped: u64,
}

/// Result sink that writes images under a per-run results folder.
pub struct ImageSink {
    root: PathBuf,
    settings: OutputSettings,
    stats: SinkStats,
}

impl ImageSink {
    /// Create `<base_saved_directory>/<timestamp>-image_results` and the
    /// subfolders of the enabled image sets.
    pub fn create(settings: &OutputSettings) -> Result<Self> {
        let base = settings
            .base_saved_directory
            .as_deref()
            .ok_or_else(|| anyhow!("base_saved_directory is not set; images will not be saved"))?;
        Self::create_in(base, &timestamped(RESULTS_FOLDER_SUFFIX), settings)
    }

    /// Like [`ImageSink::create`], with an explicit folder name under `base`.
    pub fn create_in(base: &Path, folder_name: &str, settings: &OutputSettings) -> Result<Self> {
        let root = unique_foldername(&base.join(folder_name));
        log::debug!("Creating folder {}", root.display());
        std::fs::create_dir_all(&root)
            .with_context(|| format!("create results folder {}", root.display()))?;

        for set in ImageSet::ALL {
            if set.enabled(settings) {
                let folder = root.join(set.name());
                log::debug!("Creating folder {}", folder.display());
                std::fs::create_dir(&folder)
                    .with_context(|| format!("create image folder {}", folder.display()))?;
            } else {
                log::debug!("Folder for {} images not created", set.name());
            }
        }

        Ok(Self {
            root,
            settings: settings.clone(),
            stats: SinkStats::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    /// Path of the image saved for `set` at `frame_number`.
    pub fn image_path(&self, set: ImageSet, frame_number: u64) -> PathBuf {
        self.root.join(set.name()).join(format!(
            "{}_{:06}.{}",
            set.name(),
            frame_number,
            self.settings.image_format.extension()
        ))
    }

    pub fn background_path(&self) -> PathBuf {
        self.root
            .join(format!("background_image.{}", self.settings.image_format.extension()))
    }

    /// Write `conf.json` (effective configuration) and `command.txt`.
    pub fn write_run_metadata(&self, conf: &MotiondConfig, command_line: &str) -> Result<()> {
        let conf_path = self.root.join("conf.json");
        std::fs::write(&conf_path, conf.to_json_pretty()?)
            .with_context(|| format!("write {}", conf_path.display()))?;
        let command_path = self.root.join("command.txt");
        std::fs::write(&command_path, format!("{}\n", command_line))
            .with_context(|| format!("write {}", command_path.display()))?;
        log::debug!("Saved run metadata in {}", self.root.display());
        Ok(())
    }

    fn write(&mut self, path: &Path, frame: &Frame) -> Result<()> {
        if write_image(path, frame, self.settings.image_format, self.settings.overwrite_image)? {
            self.stats.images_written += 1;
        } else {
            self.stats.images_skipped += 1;
        }
        Ok(())
    }
}

impl ResultSink for ImageSink {
    fn background_initialized(&mut self, _frame_number: u64, frame: &Frame) -> Result<()> {
        let path = self.background_path();
        self.write(&path, frame)
    }

    fn frame_result(&mut self, result: FrameResult) -> Result<()> {
        for set in ImageSet::ALL {
            if !set.enabled(&self.settings) {
                log::debug!("{} image not saved: frame # {}", set.name(), result.frame_number);
                continue;
            }
            let path = self.image_path(set, result.frame_number);
            self.write(&path, set.image(&result))?;
        }
        Ok(())
    }
}

/// `<YYYYmmdd-HHMMSS>-<name>` in local time.
pub fn timestamped(name: &str) -> String {
    format!("{}-{}", chrono::Local::now().format("%Y%m%d-%H%M%S"), name)
}

/// `path` if no folder exists there, otherwise the first free `path_N`.
pub fn unique_foldername(path: &Path) -> PathBuf {
    let mut candidate = path.to_path_buf();
    let mut counter = 0u32;
    while candidate.is_dir() {
        counter += 1;
        log::info!(
            "Folder {} already exists, trying with counter {}!",
            candidate.display(),
            counter
        );
        candidate = PathBuf::from(format!("{}_{}", path.display(), counter));
    }
    candidate
}

/// Encode `frame` to `path`. Returns `false` when an existing file was kept.
pub fn write_image(path: &Path, frame: &Frame, format: ImageFormat, overwrite: bool) -> Result<bool> {
    if path.is_file() {
        log::debug!("File {} already exist", path.display());
        if !overwrite {
            log::debug!(
                "File {} already exists and overwrite is switched off",
                path.display()
            );
            return Ok(false);
        }
    } else {
        log::debug!("File {} doesn't exist", path.display());
    }
    log::debug!("Writing file {}", path.display());
    frame
        .to_dynamic_image()
        .save_with_format(path, format.encoding())
        .with_context(|| format!("write image {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    #[test]
    fn parses_supported_formats_only() {
        assert_eq!(ImageFormat::parse("png"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::parse("jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::parse("tiff"), None);
        assert_eq!(ImageFormat::Jpg.extension(), "jpg");
    }

    #[test]
    fn unique_foldername_appends_counter() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let base = dir.path().join("run");
        assert_eq!(unique_foldername(&base), base);
        std::fs::create_dir(&base)?;
        std::fs::create_dir(dir.path().join("run_1"))?;
        assert_eq!(unique_foldername(&base), dir.path().join("run_2"));
        Ok(())
    }

    #[test]
    fn write_image_respects_overwrite_flag() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("img.png");
        let frame = Frame::filled(4, 3, PixelFormat::Gray8, 7);
        assert!(write_image(&path, &frame, ImageFormat::Png, false)?);
        assert!(!write_image(&path, &frame, ImageFormat::Png, false)?);
        assert!(write_image(&path, &frame, ImageFormat::Png, true)?);
        let decoded = image::open(&path)?.into_luma8();
        assert_eq!(decoded.dimensions(), (4, 3));
        Ok(())
    }

    #[test]
    fn timestamped_names_end_with_suffix() {
        let name = timestamped("image_results");
        assert!(name.ends_with("-image_results"));
        assert_eq!(name.len(), "YYYYmmdd-HHMMSS-image_results".len());
    }
}
