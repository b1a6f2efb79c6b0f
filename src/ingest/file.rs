//! Local file frame source.
//!
//! This module provides `FileSource` for reading frames from local files:
//! - Image sequences: a printf-style pattern with one integer field
//!   (`frames/img_%04d.png`) or a directory of images read in name order
//! - Video files, decoded in-memory with FFmpeg (feature: ingest-file-ffmpeg)
//!
//! `stub://` paths select the synthetic source instead.
//!
//! Frames are delivered as RGB. Remote URLs are rejected.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use super::synthetic::SyntheticSource;
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{decoded_to_frame, FrameSource, SourceStats};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Video,
    ImageSequence,
}

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local path, image pattern, or directory.
    pub path: String,
    pub kind: FileKind,
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    Images(ImageSequenceSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if config.path.starts_with("stub://") {
            return Ok(Self {
                backend: FileBackend::Synthetic(SyntheticSource::stub(&config.path)),
            });
        }
        match config.kind {
            FileKind::ImageSequence => Ok(Self {
                backend: FileBackend::Images(ImageSequenceSource::new(config)?),
            }),
            FileKind::Video => {
                #[cfg(feature = "ingest-file-ffmpeg")]
                {
                    Ok(Self {
                        backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)?),
                    })
                }
                #[cfg(not(feature = "ingest-file-ffmpeg"))]
                {
                    Err(anyhow!(
                        "video file ingestion requires the ingest-file-ffmpeg feature"
                    ))
                }
            }
        }
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            FileBackend::Images(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            FileBackend::Images(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(source) => source.is_healthy(),
            FileBackend::Images(source) => source.last_error.is_none(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            FileBackend::Images(source) => SourceStats {
                frames_captured: source.frame_count,
                origin: source.config.path.clone(),
            },
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Image sequences
// ----------------------------------------------------------------------------

/// `prefix` + index (zero-padded to `width` when `zero_pad`) + `suffix`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct IndexPattern {
    prefix: String,
    width: usize,
    zero_pad: bool,
    suffix: String,
}

impl IndexPattern {
    /// Parse the first `%d` / `%Nd` / `%0Nd` field of `path`.
    pub(crate) fn parse(path: &str) -> Option<Self> {
        let start = path.find('%')?;
        let rest = &path[start + 1..];
        let field_len = rest.find('d')?;
        let field = &rest[..field_len];
        if !field.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let zero_pad = field.starts_with('0');
        let width = if field.is_empty() {
            0
        } else {
            field.parse().ok()?
        };
        Some(Self {
            prefix: path[..start].to_string(),
            width,
            zero_pad,
            suffix: rest[field_len + 1..].to_string(),
        })
    }

    pub(crate) fn path_for(&self, index: u64) -> PathBuf {
        let number = if self.zero_pad {
            format!("{:0width$}", index, width = self.width)
        } else {
            format!("{:width$}", index, width = self.width)
        };
        PathBuf::from(format!("{}{}{}", self.prefix, number, self.suffix))
    }
}

enum Sequence {
    Pattern { pattern: IndexPattern, next: u64 },
    Listing { files: Vec<PathBuf>, next: usize },
}

struct ImageSequenceSource {
    config: FileConfig,
    sequence: Option<Sequence>,
    frame_count: u64,
    last_error: Option<String>,
}

impl ImageSequenceSource {
    fn new(config: FileConfig) -> Result<Self> {
        Ok(Self {
            config,
            sequence: None,
            frame_count: 0,
            last_error: None,
        })
    }

    fn connect(&mut self) -> Result<()> {
        let path = self.config.path.clone();
        let sequence = if let Some(pattern) = IndexPattern::parse(&path) {
            let first = (0..=1)
                .find(|&i| pattern.path_for(i).is_file())
                .ok_or_else(|| anyhow!("no images match pattern {}", path))?;
            Sequence::Pattern {
                pattern,
                next: first,
            }
        } else if Path::new(&path).is_dir() {
            let files = list_images(Path::new(&path))?;
            if files.is_empty() {
                return Err(anyhow!("no images found in directory {}", path));
            }
            Sequence::Listing { files, next: 0 }
        } else if Path::new(&path).is_file() {
            Sequence::Listing {
                files: vec![PathBuf::from(&path)],
                next: 0,
            }
        } else {
            return Err(anyhow!("image path {} does not exist", path));
        };
        self.sequence = Some(sequence);
        log::info!("FileSource: connected to {} (images)", path);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.sequence.is_none() {
            self.connect()?;
        }
        let next_path = match self.sequence.as_mut() {
            Some(Sequence::Pattern { pattern, next }) => {
                let path = pattern.path_for(*next);
                if !path.is_file() {
                    return Ok(None);
                }
                *next += 1;
                path
            }
            Some(Sequence::Listing { files, next }) => {
                let Some(path) = files.get(*next).cloned() else {
                    return Ok(None);
                };
                *next += 1;
                path
            }
            None => return Ok(None),
        };

        let decoded = image::open(&next_path)
            .with_context(|| format!("decode image {}", next_path.display()));
        let decoded = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        };
        self.frame_count += 1;
        Ok(Some(decoded_to_frame(decoded)))
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("read image directory {}", dir.display()))?
    {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_zero_padded_patterns() {
        let pattern = IndexPattern::parse("frames/img_%04d.png").unwrap();
        assert_eq!(pattern.path_for(7), PathBuf::from("frames/img_0007.png"));
        assert_eq!(pattern.path_for(12345), PathBuf::from("frames/img_12345.png"));
    }

    #[test]
    fn parses_plain_patterns() {
        let pattern = IndexPattern::parse("shot%d.jpg").unwrap();
        assert_eq!(pattern.path_for(42), PathBuf::from("shot42.jpg"));
        assert!(IndexPattern::parse("no_pattern.png").is_none());
        assert!(IndexPattern::parse("bad_%x.png").is_none());
    }

    #[test]
    fn rejects_remote_urls() {
        let err = FileSource::new(FileConfig {
            path: "rtsp://camera/stream".to_string(),
            kind: FileKind::Video,
        });
        assert!(err.is_err());
        assert!(FileSource::new(FileConfig {
            path: "  ".to_string(),
            kind: FileKind::ImageSequence,
        })
        .is_err());
    }

    #[test]
    fn stub_paths_use_the_synthetic_source() {
        let mut source = FileSource::new(FileConfig {
            path: "stub://hallway".to_string(),
            kind: FileKind::ImageSequence,
        })
        .unwrap();
        source.connect().unwrap();
        assert!(source.next_frame().unwrap().is_some());
        assert_eq!(source.stats().frames_captured, 1);
    }

    fn write_png(path: &Path, level: u8) {
        image::GrayImage::from_pixel(6, 4, image::Luma([level]))
            .save(path)
            .expect("write png");
    }

    #[test]
    fn pattern_starts_at_one_and_stops_at_first_gap() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for (index, level) in [(1, 10u8), (2, 20), (3, 30), (5, 50)] {
            write_png(&dir.path().join(format!("img_{:03}.png", index)), level);
        }
        let pattern = dir.path().join("img_%03d.png");
        let mut source = FileSource::new(FileConfig {
            path: pattern.display().to_string(),
            kind: FileKind::ImageSequence,
        })?;
        source.connect()?;

        let mut levels = Vec::new();
        while let Some(frame) = source.next_frame()? {
            assert_eq!(frame.dimensions(), (6, 4));
            levels.push(frame.pixel(0, 0)[0]);
        }
        assert_eq!(levels, vec![10, 20, 30]);
        assert_eq!(source.stats().frames_captured, 3);
        assert!(source.is_healthy());
        Ok(())
    }

    #[test]
    fn directory_is_read_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_png(&dir.path().join("b.png"), 2);
        write_png(&dir.path().join("a.png"), 1);
        write_png(&dir.path().join("c.png"), 3);
        std::fs::write(dir.path().join("notes.txt"), b"ignored")?;

        let mut source = FileSource::new(FileConfig {
            path: dir.path().display().to_string(),
            kind: FileKind::ImageSequence,
        })?;
        source.connect()?;

        let mut levels = Vec::new();
        while let Some(frame) = source.next_frame()? {
            levels.push(frame.pixel(0, 0)[0]);
        }
        assert_eq!(levels, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn missing_image_path_fails_to_connect() {
        let mut source = FileSource::new(FileConfig {
            path: "/definitely/not/here_%03d.png".to_string(),
            kind: FileKind::ImageSequence,
        })
        .unwrap();
        assert!(source.connect().is_err());
    }
}
