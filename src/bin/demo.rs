//! demo - end-to-end synthetic run of the motion detector
//!
//! Plays a scripted scene (static background, a square crossing the frame,
//! static background again) through the detection loop and prints the run
//! summary as JSON. With `--out`, images are saved the same way `motiond`
//! saves them.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use motion_kernel::ingest::{Scene, Square};
use motion_kernel::{
    BackgroundStrategy, DetectionLoop, DetectorConfig, Frame, FrameResult, FrameSource, ImageSink,
    NeverCancel, OutputSettings, ResultSink, SyntheticSource,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Frames of static background before and after the moving square.
    #[arg(long, default_value_t = 3)]
    still_frames: u64,
    /// Frames during which the square moves.
    #[arg(long, default_value_t = 10)]
    moving_frames: u64,
    /// Use the weighted-average background model.
    #[arg(long)]
    weighted: bool,
    /// Minimum region area in pixels.
    #[arg(long, default_value_t = 500)]
    min_area: u64,
    /// Save images under this directory.
    #[arg(long)]
    out: Option<PathBuf>,
}

/// Collects results and forwards them to an optional image sink.
struct DemoSink {
    images: Option<ImageSink>,
    results: Vec<FrameResult>,
}

impl ResultSink for DemoSink {
    fn background_initialized(&mut self, frame_number: u64, frame: &Frame) -> Result<()> {
        log::info!("background model seeded from frame # {}", frame_number);
        match self.images.as_mut() {
            Some(images) => images.background_initialized(frame_number, frame),
            None => Ok(()),
        }
    }

    fn frame_result(&mut self, result: FrameResult) -> Result<()> {
        log::info!(
            "frame # {}: {} {:?}",
            result.frame_number,
            result.status(),
            result.regions
        );
        if let Some(images) = self.images.as_mut() {
            images.frame_result(result.clone())?;
        }
        self.results.push(result);
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut source = SyntheticSource::new(640, 480)
        .solid(40, args.still_frames)
        .push(Scene {
            background: 40,
            square: Some(Square {
                x: 60,
                y: 180,
                size: 90,
                value: 230,
            }),
            drift: 40,
            repeat: args.moving_frames,
        })
        .solid(40, args.still_frames);
    source.connect()?;

    let config = DetectorConfig {
        min_area: args.min_area,
        background_model: if args.weighted {
            BackgroundStrategy::WeightedAverage
        } else {
            BackgroundStrategy::FirstFrame
        },
        ..DetectorConfig::default()
    };

    let images = match args.out {
        Some(dir) => {
            let settings = OutputSettings {
                base_saved_directory: Some(dir),
                ..OutputSettings::default()
            };
            let sink = ImageSink::create(&settings)?;
            log::info!("saving images in {}", sink.root().display());
            Some(sink)
        }
        None => None,
    };
    let mut sink = DemoSink {
        images,
        results: Vec::new(),
    };

    let mut detection = DetectionLoop::new(config);
    let summary = detection.run(&mut source, &mut sink, &NeverCancel)?;

    let occupied: Vec<u64> = sink
        .results
        .iter()
        .filter(|r| r.occupied)
        .map(|r| r.frame_number)
        .collect();
    log::info!("occupied frames: {:?}", occupied);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
