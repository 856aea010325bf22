use anyhow::Result;
use std::{ fs::File, io::BufWriter, path::Path, sync::Arc };

use score_follower::analyzer::FrameAnalyzer;
use score_follower::audio::{ decode_mono, to_pcm16 };
use score_follower::config::Parameters;
use score_follower::feature::FeatureVector;
use score_follower::logger::Logger;
use score_follower::pager::Marker;
use score_follower::score::ReferenceRecorder;

/// Markers laid out per page when placing them on a timer.
const MARKERS_PER_PAGE: u32 = 8;

/// Evenly spaced rows, top to bottom, then the next page.
fn grid_marker(k: u32) -> Marker {
    Marker {
        page: k / MARKERS_PER_PAGE,
        x: 0.5,
        y: ((k % MARKERS_PER_PAGE) as f64 + 0.5) / (MARKERS_PER_PAGE as f64),
    }
}

/// Record mode: analyze an audio file and write it out as a reference.
pub fn run_record(cli: &crate::Config, logger: Arc<Logger>) -> Result<()> {
    if cli.input_path.is_empty() {
        anyhow::bail!("--input <PATH> is required in record mode");
    }
    if cli.reference_path.is_empty() {
        anyhow::bail!("--reference <PATH> is required in record mode");
    }
    let path = Path::new(&cli.input_path);
    if !path.exists() {
        anyhow::bail!("Input file not found: {}", path.display());
    }

    logger.info(&format!("Decoding: {}", path.display()))?;
    let audio = decode_mono(path)?;
    logger.info(
        &format!(
            "Decoded: sr={} Hz, channels={}, {:.1} s",
            audio.sample_rate,
            audio.channels,
            audio.duration_seconds()
        )
    )?;

    let params = Parameters {
        sample_rate: audio.sample_rate as f64,
        ..cli.params.clone()
    };
    let mut analyzer = FrameAnalyzer::new(&params)?.with_logger(logger.clone());
    let mut recorder = ReferenceRecorder::new(params.activity_threshold_db)
        .with_logger(logger.clone())
        .record_times();
    // a file has no lead-in to learn the noise floor from; only digital silence is skipped
    recorder.gate_mut().force_start();

    let marker_hops = if cli.marker_every_s > 0.0 {
        Some(((cli.marker_every_s / analyzer.hop_seconds()).round() as usize).max(1))
    } else {
        None
    };

    let pcm = to_pcm16(&audio.samples);
    let mut placed = 0u32;
    for (n, hop) in pcm.chunks_exact(analyzer.hop_frame_size()).enumerate() {
        analyzer.on_new_data(hop, &mut |v: FeatureVector| {
            recorder.add_data(v);
        })?;

        let due = marker_hops.map_or(false, |every| (n + 1) % every == 0);
        if due && !recorder.reference().is_empty() {
            let index = recorder.add_marker(grid_marker(placed));
            let _ = score_follower::log_debug!(logger, "marker {} at reference index {}", placed, index);
            placed += 1;
        }
    }

    logger.info(
        &format!(
            "Analyzed {} windows, kept {} active vectors, placed {} markers, {} over-budget hops",
            analyzer.produced(),
            recorder.reference().len(),
            recorder.markers().len(),
            analyzer.overruns()
        )
    )?;
    if recorder.reference().is_empty() {
        anyhow::bail!("No active audio found in {}", path.display());
    }

    let out = BufWriter::new(File::create(&cli.reference_path)?);
    recorder.write(out, &cli.pages, analyzer.window_seconds(), analyzer.hop_seconds(), params.sample_rate)?;
    logger.info(&format!("Wrote reference to {}", cli.reference_path))?;
    Ok(())
}
