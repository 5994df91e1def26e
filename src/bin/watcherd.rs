//! watcherd - sighting watcher daemon
//!
//! This daemon:
//! 1. Loads the watcher configuration (file + environment)
//! 2. Reads per-frame detections from a replay file or stdin on a reader thread
//! 3. Runs them through the watcher (debounce, accumulate, finalize), skipping
//!    detections outside the daylight period when DAYTIME_ONLY is set
//! 4. Writes kept events under the output directory
//! 5. Runs transcoding and alerts on a background task queue
//! 6. On Ctrl-C or end of input, finalizes any open event and drains tasks

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use sighting_kernel::{
    DaylightGate, DetectionSource, FfmpegRecorder, FilesystemEventStore, FrameInput,
    FrameReader, ReaderEvent, ReplaySource, SessionOutcome, TaskHandlers, TaskQueue, Watcher,
    WatcherConfig,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
const READ_AHEAD_FRAMES: usize = 32;

#[derive(Parser, Debug)]
#[command(author, version, about = "Debounce object detections into sighting events")]
struct Args {
    /// Watcher config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "WATCHER_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// JSON-lines detection replay. Reads stdin when omitted.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Pace replayed frames at the configured frame rate.
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = WatcherConfig::load_from(args.config.as_deref())?;
    log::info!(
        "watching for {} (start after {} frames, stop after {}s, confidence > {:.2})",
        cfg.class_to_track,
        cfg.detect_threshold,
        cfg.gone_seconds,
        cfg.match_confidence
    );

    let queue = TaskQueue::spawn(TaskHandlers::from_config(&cfg)?)?;
    let mut watcher = Watcher::from_config(
        &cfg,
        Box::new(FilesystemEventStore::new(&cfg.output_directory)),
        Box::new(FfmpegRecorder::new(&cfg.ffmpeg_path)),
        Box::new(queue.sender()),
    );
    if cfg.secondary_tracking.is_some() {
        watcher = watcher.with_vehicle_recorder(Box::new(FfmpegRecorder::new(&cfg.ffmpeg_path)));
    }
    log::info!("policies: {:?}", watcher.policy_names());
    log::info!("writing events to {}", cfg.output_directory.display());

    let replay = match &args.replay {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open replay {}", path.display()))?;
            Some((path.clone(), file))
        }
        None => None,
    };

    let origin = chrono::Local::now().naive_local();
    let frame_rate = cfg.frame_rate;
    let pace = args
        .realtime
        .then(|| Duration::from_secs_f64(1.0 / f64::from(frame_rate)));
    let reader = FrameReader::spawn(
        move || -> Box<dyn DetectionSource> {
            match replay {
                Some((path, file)) => {
                    let mut source = ReplaySource::new(
                        path.display().to_string(),
                        BufReader::new(file),
                        origin,
                        frame_rate,
                    );
                    if let Some(dir) = path.parent() {
                        source = source.with_base_dir(dir);
                    }
                    Box::new(source)
                }
                None => Box::new(ReplaySource::new(
                    "stdin",
                    std::io::stdin().lock(),
                    origin,
                    frame_rate,
                )),
            }
        },
        pace,
        READ_AHEAD_FRAMES,
    )?;

    let stop = reader.stop_handle();
    ctrlc::set_handler(move || stop.stop()).context("error setting Ctrl-C handler")?;

    let mut daylight = cfg
        .daytime_only
        .then(|| DaylightGate::new(cfg.daylight.clone()));
    let mut last_health_log = Instant::now();
    let mut last_frame_at = None;

    loop {
        let frame = match reader.next_event() {
            ReaderEvent::Frame(frame) => frame,
            ReaderEvent::Stop => {
                log::info!("shutdown signal received");
                break;
            }
            ReaderEvent::End => break,
            ReaderEvent::Failed(err) => {
                log::error!("{:#}", err);
                break;
            }
        };
        last_frame_at = Some(frame.captured_at);

        // Outside the active period the watcher still sees the clock tick,
        // with no detections and no pixels, so an open event winds down.
        let active = daylight
            .as_mut()
            .map_or(true, |gate| gate.admit(frame.captured_at));
        let input = if active {
            FrameInput::from(&frame)
        } else {
            FrameInput::new(frame.captured_at, frame.width, frame.height, &[])
        };

        let report = watcher.process_frame(&input);
        match &report.outcome {
            Some(SessionOutcome::Finalized(record)) => {
                log::info!("event kept: {}", record.filename)
            }
            Some(SessionOutcome::Aborted(record)) => {
                log::info!("event aborted: {}", record.filename)
            }
            None => {}
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            log::info!(
                "health: frames={} tracking={} kept={} aborted={} active={}",
                watcher.frames_processed(),
                watcher.is_tracking(),
                watcher.events_finalized(),
                watcher.events_aborted(),
                active
            );
            last_health_log = Instant::now();
        }
    }

    let end = last_frame_at.unwrap_or_else(|| chrono::Local::now().naive_local());
    if let Some(outcome) = watcher.end_of_stream(end) {
        log::info!("final event: {}", outcome.record().filename);
    }
    drop(watcher);

    log::info!("waiting for background tasks");
    queue.shutdown()?;
    Ok(())
}
