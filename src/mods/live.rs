use anyhow::Result;
use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use crossbeam_channel::{ bounded, Receiver, RecvTimeoutError };
use std::{
    sync::{ atomic::{ AtomicBool, Ordering }, Arc },
    thread,
    time::{ Duration, Instant },
};

use score_follower::analyzer::FrameAnalyzer;
use score_follower::audio::{ build_input_stream, maybe_rate_supported, to_pcm16, HopAssembler };
use score_follower::config::Parameters;
use score_follower::feature::FeatureVector;
use score_follower::gate::Status;
use score_follower::logger::Logger;
use score_follower::matcher::PositionMatcher;
use score_follower::pager::PositionPager;
use score_follower::score::ScoreFile;

/// Capture blocks buffered between the audio callback and the worker.
const CAPTURE_QUEUE: usize = 64;
const POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct LiveSummary {
    vectors: u64,
    active: u64,
    marker_changes: u64,
    recoveries: u64,
    overruns: u64,
}

/// Owns the whole analysis chain; runs on its own thread so calls into the
/// matcher happen one at a time and in capture order.
fn analysis_worker(
    rx: Receiver<Vec<f32>>,
    params: Parameters,
    mut matcher: PositionMatcher,
    mut pager: PositionPager,
    quit: Arc<AtomicBool>,
    logger: Arc<Logger>
) -> Result<LiveSummary> {
    let mut analyzer = FrameAnalyzer::new(&params)?.with_logger(logger.clone());
    let mut assembler = HopAssembler::new(analyzer.hop_frame_size());
    let mut produced: Vec<FeatureVector> = Vec::new();
    let mut summary = LiveSummary::default();
    let mut was_playing = false;

    while !quit.load(Ordering::SeqCst) {
        let block = match rx.recv_timeout(POLL) {
            Ok(block) => block,
            Err(RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                break;
            }
        };

        assembler.push(&to_pcm16(&block), |hop| {
            analyzer.on_new_data(hop, &mut |v: FeatureVector| produced.push(v))
        })?;

        for v in produced.drain(..) {
            summary.vectors += 1;
            let estimate = matcher.get_position(&v);
            if estimate.recovered {
                summary.recoveries += 1;
            }

            let playing = estimate.status == Status::Active;
            if playing != was_playing {
                logger.info(
                    if playing {
                        "Performance active"
                    } else {
                        "Performance paused"
                    }
                )?;
                was_playing = playing;
            }
            if !playing {
                continue;
            }
            summary.active += 1;

            let _ = score_follower::log_debug!(
                logger,
                "position {} of {}, transition mean {:.2}",
                estimate.position,
                matcher.reference_len(),
                matcher.transition().mean
            );
            if pager.set_estimate(estimate.position) {
                summary.marker_changes += 1;
                let m = pager.marker();
                logger.info(
                    &format!(
                        "Marker {} (page {}, x {:.2}, y {:.2}) at position {}",
                        pager.current_index(),
                        m.page,
                        m.x,
                        m.y,
                        estimate.position
                    )
                )?;
            }
        }
    }

    summary.overruns = analyzer.overruns();
    Ok(summary)
}

/// Live mode: follow the default input device until Ctrl+C or `--duration`.
pub fn run_live(cli: &crate::Config, logger: Arc<Logger>) -> Result<()> {
    if cli.reference_path.is_empty() {
        anyhow::bail!("--reference <PATH> is required in live mode");
    }
    let score = ScoreFile::open(&cli.reference_path, cli.params.feature)?;
    let want_rate = score
        .sample_rate()
        .map(|r| r.round() as u32)
        .unwrap_or(cli.capture_rate_hz);
    let mut params = score.parameters(&cli.params)?;
    logger.info(
        &format!(
            "Loaded {}: {} vectors, {} markers, {} page(s)",
            cli.reference_path,
            score.reference().len(),
            score.markers().len(),
            score.pages().len()
        )
    )?;

    // ctrl+c to quit
    let quit = Arc::new(AtomicBool::new(false));
    {
        let q = quit.clone();
        let _ = ctrlc::set_handler(move || {
            q.store(true, Ordering::SeqCst);
        });
    }

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow::anyhow!("No default input device (microphone) found"))?;
    let mut stream_config = device.default_input_config()?.config();
    if let Some(sr) = maybe_rate_supported(&device, want_rate) {
        stream_config.sample_rate.0 = sr;
    }
    params.sample_rate = stream_config.sample_rate.0 as f64;
    params.validate()?;

    logger.info(&format!("Input device: {}", device.name().unwrap_or_default()))?;
    logger.info(
        &format!(
            "Input: sample rate {} Hz, channels {}",
            stream_config.sample_rate.0,
            stream_config.channels
        )
    )?;

    let (matcher, pager) = score.into_parts(&params)?;
    let mut matcher = matcher.with_logger(logger.clone());
    if let Some(start) = cli.start_index {
        matcher.restart_at(start);
    }

    let (tx, rx) = bounded::<Vec<f32>>(CAPTURE_QUEUE);
    let channels = stream_config.channels.max(1) as usize;
    let stream = build_input_stream(&device, &stream_config, channels, tx, logger.clone())?;
    stream.play()?;

    let worker = {
        let quit = quit.clone();
        let logger = logger.clone();
        thread::spawn(move || analysis_worker(rx, params, matcher, pager, quit, logger))
    };

    logger.info("Listening… press Ctrl+C to stop")?;
    let started = Instant::now();
    while !quit.load(Ordering::SeqCst) && !worker.is_finished() {
        if cli.duration_s > 0.0 && started.elapsed().as_secs_f64() >= cli.duration_s {
            quit.store(true, Ordering::SeqCst);
            break;
        }
        thread::sleep(POLL);
    }
    quit.store(true, Ordering::SeqCst);
    drop(stream);

    let summary = match worker.join() {
        Ok(res) => res?,
        Err(_) => anyhow::bail!("analysis worker panicked"),
    };
    logger.info(
        &format!(
            "Stopped after {:.1} s: {} vectors, {} active, {} marker changes, {} recoveries, {} over-budget hops",
            started.elapsed().as_secs_f64(),
            summary.vectors,
            summary.active,
            summary.marker_changes,
            summary.recoveries,
            summary.overruns
        )
    )?;
    Ok(())
}
