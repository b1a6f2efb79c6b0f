use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::detect::{BackgroundStrategy, KernelSize};
use crate::error::ConfigError;
use crate::pipeline::{DetectionWindow, DetectorConfig};
use crate::storage::ImageFormat;

const DEFAULT_RESIZE_WIDTH: i64 = 500;
const DEFAULT_KERNEL_SIZE: i64 = 21;
const DEFAULT_DELTA_THRESH: i64 = 25;
const DEFAULT_MIN_AREA: i64 = 500;
const DEFAULT_BACKGROUND_MODEL: &str = "first_frame";

/// On-disk configuration. Every key is optional; `conf.json` written next to
/// saved images uses the same shape with every key filled in.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MotiondConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    pub resize_image_width: Option<i64>,
    pub gaussian_kernel_size: Option<KernelSizeFile>,
    pub delta_thresh: Option<i64>,
    pub min_area: Option<i64>,
    pub background_model: Option<String>,
    pub start_frame: Option<i64>,
    pub end_frame: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_saved_directory: Option<String>,
    pub save_security_feed_images: Option<bool>,
    pub save_thresh_images: Option<bool>,
    pub save_frame_delta_images: Option<bool>,
    pub image_format: Option<String>,
    pub overwrite_image: Option<bool>,
    pub show_datetime: Option<bool>,
    pub disable_logging: Option<bool>,
}

impl MotiondConfigFile {
    /// Read `path` (or the file named by `MOTION_CONFIG`) and apply
    /// environment overrides, without validating.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("MOTION_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let config_path = path.map(Path::to_path_buf).or(env_path);
        let mut file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(path)?,
            None => MotiondConfigFile::default(),
        };
        apply_env(&mut file_cfg)?;
        Ok(file_cfg)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct KernelSizeFile {
    pub width: i64,
    pub height: i64,
}

/// Validated configuration for one `motiond` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotiondConfig {
    pub source: SourceSettings,
    pub detector: DetectorConfig,
    pub output: OutputSettings,
    pub disable_logging: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSettings {
    pub video_path: Option<String>,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSettings {
    /// Image persistence is enabled only when this is set.
    pub base_saved_directory: Option<PathBuf>,
    pub save_security_feed_images: bool,
    pub save_thresh_images: bool,
    pub save_frame_delta_images: bool,
    pub image_format: ImageFormat,
    pub overwrite_image: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            base_saved_directory: None,
            save_security_feed_images: true,
            save_thresh_images: true,
            save_frame_delta_images: true,
            image_format: ImageFormat::Png,
            overwrite_image: true,
        }
    }
}

impl Default for MotiondConfig {
    fn default() -> Self {
        Self {
            source: SourceSettings::default(),
            detector: DetectorConfig::default(),
            output: OutputSettings::default(),
            disable_logging: false,
        }
    }
}

impl MotiondConfig {
    /// Load from `path`, or from the file named by `MOTION_CONFIG`, or from
    /// defaults when neither is given. Environment overrides apply last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_file(MotiondConfigFile::load(path)?)
    }

    /// Normalize and validate a parsed configuration file.
    pub fn from_file(file: MotiondConfigFile) -> Result<Self> {
        let detector = validate_detector(&file)?;
        let source = SourceSettings {
            video_path: non_empty(file.video_path),
            image_path: non_empty(file.image_path),
        };

        let image_format = match file.image_format.as_deref() {
            None => ImageFormat::Png,
            Some(name) => ImageFormat::parse(name).unwrap_or_else(|| {
                log::error!("Image format ({}) is not supported. png will be used", name);
                ImageFormat::Png
            }),
        };
        let output = OutputSettings {
            base_saved_directory: non_empty(file.base_saved_directory).map(PathBuf::from),
            save_security_feed_images: file.save_security_feed_images.unwrap_or(true),
            save_thresh_images: file.save_thresh_images.unwrap_or(true),
            save_frame_delta_images: file.save_frame_delta_images.unwrap_or(true),
            image_format,
            overwrite_image: file.overwrite_image.unwrap_or(true),
        };

        Ok(Self {
            source,
            detector,
            output,
            disable_logging: file.disable_logging.unwrap_or(false),
        })
    }

    /// Effective configuration in file form, every key filled in.
    pub fn to_file(&self) -> MotiondConfigFile {
        let detector = &self.detector;
        MotiondConfigFile {
            video_path: self.source.video_path.clone(),
            image_path: self.source.image_path.clone(),
            resize_image_width: Some(i64::from(detector.resize_width)),
            gaussian_kernel_size: Some(KernelSizeFile {
                width: i64::from(detector.kernel_size.width()),
                height: i64::from(detector.kernel_size.height()),
            }),
            delta_thresh: Some(i64::from(detector.delta_threshold)),
            min_area: Some(detector.min_area as i64),
            background_model: Some(detector.background_model.as_str().to_string()),
            start_frame: Some(detector.window.start() as i64),
            end_frame: Some(detector.window.end().unwrap_or(0) as i64),
            base_saved_directory: self
                .output
                .base_saved_directory
                .as_ref()
                .map(|dir| dir.display().to_string()),
            save_security_feed_images: Some(self.output.save_security_feed_images),
            save_thresh_images: Some(self.output.save_thresh_images),
            save_frame_delta_images: Some(self.output.save_frame_delta_images),
            image_format: Some(self.output.image_format.extension().to_string()),
            overwrite_image: Some(self.output.overwrite_image),
            show_datetime: Some(detector.show_datetime),
            disable_logging: Some(self.disable_logging),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_file())?)
    }
}

fn validate_detector(file: &MotiondConfigFile) -> Result<DetectorConfig, ConfigError> {
    let background_model = BackgroundStrategy::parse(
        file.background_model
            .as_deref()
            .unwrap_or(DEFAULT_BACKGROUND_MODEL),
    )?;
    log::info!("Background model used: {}", background_model.as_str());

    let kernel = file.gaussian_kernel_size.unwrap_or(KernelSizeFile {
        width: DEFAULT_KERNEL_SIZE,
        height: DEFAULT_KERNEL_SIZE,
    });
    let kernel_size = KernelSize::new(kernel.width, kernel.height)?;

    let resize_width = non_negative(
        "resize_image_width",
        file.resize_image_width.unwrap_or(DEFAULT_RESIZE_WIDTH),
    )?;
    if resize_width == 0 {
        log::info!("Images will not be resized");
    }
    let resize_width = u32::try_from(resize_width).map_err(|_| ConfigError::OutOfRange {
        field: "resize_image_width",
        value: resize_width as i64,
        max: u64::from(u32::MAX),
    })?;

    let delta_threshold =
        DetectorConfig::threshold(file.delta_thresh.unwrap_or(DEFAULT_DELTA_THRESH))?;
    let min_area = non_negative("min_area", file.min_area.unwrap_or(DEFAULT_MIN_AREA))?;

    let start = match file.start_frame {
        None | Some(0) => {
            log::warn!(
                "start_frame will be changed from {} to 1",
                file.start_frame.map_or("null".to_string(), |v| v.to_string())
            );
            1
        }
        Some(value) => non_negative("start_frame", value)?,
    };
    let end = match file.end_frame {
        None | Some(0) => {
            log::info!("end_frame is not set, motion detection will run until the last frame");
            None
        }
        Some(value) => Some(non_negative("end_frame", value)?),
    };
    let window = DetectionWindow::new(start, end)?;

    Ok(DetectorConfig {
        resize_width,
        kernel_size,
        delta_threshold,
        min_area,
        background_model,
        window,
        show_datetime: file.show_datetime.unwrap_or(false),
    })
}

fn apply_env(file: &mut MotiondConfigFile) -> Result<()> {
    if let Some(path) = env_value("MOTION_VIDEO_PATH") {
        file.video_path = Some(path);
    }
    if let Some(path) = env_value("MOTION_IMAGE_PATH") {
        file.image_path = Some(path);
    }
    if let Some(dir) = env_value("MOTION_SAVED_DIR") {
        file.base_saved_directory = Some(dir);
    }
    if let Some(start) = env_value("MOTION_START_FRAME") {
        file.start_frame = Some(
            start
                .trim()
                .parse()
                .map_err(|_| anyhow!("MOTION_START_FRAME must be an integer frame number"))?,
        );
    }
    if let Some(end) = env_value("MOTION_END_FRAME") {
        file.end_frame = Some(
            end.trim()
                .parse()
                .map_err(|_| anyhow!("MOTION_END_FRAME must be an integer frame number"))?,
        );
    }
    Ok(())
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, ConfigError> {
    u64::try_from(value).map_err(|_| ConfigError::Negative { field, value })
}

fn read_config_file(path: &Path) -> Result<MotiondConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() -> Result<()> {
        let cfg = MotiondConfig::from_file(MotiondConfigFile::default())?;
        assert_eq!(cfg, MotiondConfig::default());
        assert_eq!(cfg.detector.window.start(), 1);
        assert_eq!(cfg.detector.window.end(), None);
        Ok(())
    }

    #[test]
    fn zero_window_bounds_are_normalized() -> Result<()> {
        let cfg = MotiondConfig::from_file(MotiondConfigFile {
            start_frame: Some(0),
            end_frame: Some(0),
            ..Default::default()
        })?;
        assert_eq!(cfg.detector.window, DetectionWindow::unbounded());
        Ok(())
    }

    #[test]
    fn rejects_even_kernels_and_bad_thresholds() {
        let even = MotiondConfig::from_file(MotiondConfigFile {
            gaussian_kernel_size: Some(KernelSizeFile {
                width: 20,
                height: 21,
            }),
            ..Default::default()
        });
        let err = even.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidKernelSize { axis: "width", .. })
        ));

        let thresh = MotiondConfig::from_file(MotiondConfigFile {
            delta_thresh: Some(255),
            ..Default::default()
        });
        assert!(matches!(
            thresh.unwrap_err().downcast_ref::<ConfigError>(),
            Some(ConfigError::ThresholdOutOfRange(255))
        ));
    }

    #[test]
    fn rejects_resize_width_beyond_u32() {
        let err = MotiondConfig::from_file(MotiondConfigFile {
            resize_image_width: Some(10_000_000_000),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::OutOfRange {
                field: "resize_image_width",
                value: 10_000_000_000,
                max: 4_294_967_295,
            })
        );

        let cfg = MotiondConfig::from_file(MotiondConfigFile {
            resize_image_width: Some(i64::from(u32::MAX)),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.detector.resize_width, u32::MAX);
    }

    #[test]
    fn unsupported_image_format_falls_back_to_png() -> Result<()> {
        let cfg = MotiondConfig::from_file(MotiondConfigFile {
            image_format: Some("tiff".to_string()),
            ..Default::default()
        })?;
        assert_eq!(cfg.output.image_format, ImageFormat::Png);
        Ok(())
    }

    #[test]
    fn effective_config_reloads_to_the_same_value() -> Result<()> {
        let cfg = MotiondConfig::from_file(MotiondConfigFile {
            image_path: Some("frames/img_%04d.png".to_string()),
            background_model: Some("weighted_average".to_string()),
            start_frame: Some(3),
            end_frame: Some(40),
            image_format: Some("jpg".to_string()),
            overwrite_image: Some(false),
            show_datetime: Some(true),
            ..Default::default()
        })?;
        assert!(cfg.detector.show_datetime);
        let json = cfg.to_json_pretty()?;
        let reparsed: MotiondConfigFile = serde_json::from_str(&json)?;
        assert_eq!(MotiondConfig::from_file(reparsed)?, cfg);
        Ok(())
    }
}
