//! Synthetic scripted frame source.
//!
//! Produces RGB frames from a list of scenes: a flat background level with an
//! optional bright square. Used by `stub://` paths, the demo binary, and tests
//! that need deterministic motion without media files on disk.

use anyhow::Result;

use super::{rgb24_frame, FrameSource, SourceStats};
use crate::frame::Frame;

const STUB_WIDTH: u32 = 640;
const STUB_HEIGHT: u32 = 480;

/// Axis-aligned filled square drawn on top of a scene background.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Square {
    pub x: u32,
    pub y: u32,
    pub size: u32,
    pub value: u8,
}

/// A run of `repeat` frames sharing the same content.
///
/// With a non-zero `drift` the square moves `drift` pixels to the right on
/// every frame of the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scene {
    pub background: u8,
    pub square: Option<Square>,
    pub drift: u32,
    pub repeat: u64,
}

pub struct SyntheticSource {
    origin: String,
    width: u32,
    height: u32,
    scenes: Vec<Scene>,
    scene_index: usize,
    emitted_in_scene: u64,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            origin: format!("synthetic://{}x{}", width, height),
            width,
            height,
            scenes: Vec::new(),
            scene_index: 0,
            emitted_in_scene: 0,
            frame_count: 0,
        }
    }

    /// Default script for `stub://` paths: a static scene, a square crossing
    /// the frame, then the static scene again.
    pub fn stub(url: &str) -> Self {
        let square = Square {
            x: 120,
            y: 160,
            size: 80,
            value: 220,
        };
        let mut source = Self::new(STUB_WIDTH, STUB_HEIGHT)
            .solid(40, 3)
            .push(Scene {
                background: 40,
                square: Some(square),
                drift: 24,
                repeat: 8,
            })
            .solid(40, 3);
        source.origin = url.to_string();
        source
    }

    pub fn solid(self, level: u8, count: u64) -> Self {
        self.push(Scene {
            background: level,
            square: None,
            drift: 0,
            repeat: count,
        })
    }

    pub fn with_square(self, level: u8, square: Square, count: u64) -> Self {
        self.push(Scene {
            background: level,
            square: Some(square),
            drift: 0,
            repeat: count,
        })
    }

    pub fn push(mut self, scene: Scene) -> Self {
        self.scenes.push(scene);
        self
    }

    /// Total number of frames the script produces.
    pub fn len(&self) -> u64 {
        self.scenes.iter().map(|scene| scene.repeat).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn render(&self, scene: &Scene, step: u64) -> Result<Frame> {
        let width = self.width as usize;
        let mut pixels = vec![scene.background; width * self.height as usize * 3];
        if let Some(square) = scene.square {
            let offset = u64::from(scene.drift).saturating_mul(step);
            let x0 = u64::from(square.x).saturating_add(offset);
            let x1 = x0.saturating_add(u64::from(square.size)).min(u64::from(self.width));
            let y0 = u64::from(square.y);
            let y1 = y0.saturating_add(u64::from(square.size)).min(u64::from(self.height));
            for y in y0..y1 {
                for x in x0..x1 {
                    let base = (y as usize * width + x as usize) * 3;
                    pixels[base..base + 3].fill(square.value);
                }
            }
        }
        rgb24_frame(pixels, self.width, self.height)
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: connected to {} ({} frames)",
            self.origin,
            self.len()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        while let Some(scene) = self.scenes.get(self.scene_index) {
            if self.emitted_in_scene < scene.repeat {
                let frame = self.render(scene, self.emitted_in_scene)?;
                self.emitted_in_scene += 1;
                self.frame_count += 1;
                return Ok(Some(frame));
            }
            self.scene_index += 1;
            self.emitted_in_scene = 0;
        }
        Ok(None)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            origin: self.origin.clone(),
        }
    }
}
