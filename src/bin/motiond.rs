//! motiond - motion detection daemon
//!
//! This daemon:
//! 1. Loads the JSON configuration (`--conf` or `MOTION_CONFIG`) and env overrides
//! 2. Opens the configured video file or image sequence
//! 3. Runs the detection loop until end of stream, end of window, or Ctrl-C
//! 4. Optionally saves background, annotated, threshold, and delta images

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use motion_kernel::config::MotiondConfigFile;
use motion_kernel::{open_source, DetectionLoop, ImageSink, MotiondConfig, ResultSink, NullSink};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long, env = "MOTION_CONFIG")]
    conf: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let file_cfg = MotiondConfigFile::load(args.conf.as_deref())?;
    let default_level = if file_cfg.disable_logging.unwrap_or(false) {
        "info"
    } else {
        "debug"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
    log::info!("Starting application ...");

    let cfg = MotiondConfig::from_file(file_cfg)?;

    let mut sink: Box<dyn ResultSink> = match cfg.output.base_saved_directory {
        Some(_) => {
            let sink = ImageSink::create(&cfg.output)?;
            let command_line = std::env::args().collect::<Vec<_>>().join(" ");
            sink.write_run_metadata(&cfg, &command_line)?;
            log::info!("Saving images in {}", sink.root().display());
            Box::new(sink)
        }
        None => {
            log::info!("Images will not be saved");
            Box::new(NullSink)
        }
    };

    let mut source = open_source(&cfg.source)?;
    source.connect().context("connect frame source")?;

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let mut detection = DetectionLoop::new(cfg.detector.clone());
    let summary = detection.run(&mut source, sink.as_mut(), cancel.as_ref())?;

    let stats = source.stats();
    log::info!(
        "{} frames read from {}: {} results, {} occupied ({:?})",
        summary.frames_read,
        stats.origin,
        summary.results_emitted,
        summary.occupied_frames,
        summary.termination
    );
    if !source.is_healthy() {
        log::warn!("frame source {} reported errors", stats.origin);
    }
    log::info!("End of application");
    Ok(())
}
