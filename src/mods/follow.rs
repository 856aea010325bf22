use anyhow::Result;
use std::{ fs::File, io::{ BufWriter, Write }, path::{ Path, PathBuf }, sync::Arc };

use score_follower::analyzer::FrameAnalyzer;
use score_follower::audio::{ decode_mono, resample_linear, to_pcm16 };
use score_follower::feature::FeatureVector;
use score_follower::gate::Status;
use score_follower::logger::Logger;
use score_follower::score::ScoreFile;
use score_follower::stats::RunningStat;

/// Alignment error against a 1:1 timeline, for hops where the matcher was active.
#[derive(Debug)]
pub struct FollowStats {
    tolerance_s: f64,
    errors: RunningStat,
    hits: usize,
    waiting: usize,
    recoveries: usize,
    max_error_s: f64,
}

impl FollowStats {
    pub fn new(tolerance_s: f64) -> Self {
        Self {
            tolerance_s,
            errors: RunningStat::new(),
            hits: 0,
            waiting: 0,
            recoveries: 0,
            max_error_s: 0.0,
        }
    }

    pub fn record(&mut self, live_s: f64, reference_s: Option<f64>, status: Status, recovered: bool) {
        if recovered {
            self.recoveries += 1;
        }
        let Some(reference_s) = reference_s.filter(|_| status == Status::Active) else {
            self.waiting += 1;
            return;
        };
        let err = (reference_s - live_s).abs();
        self.errors.push(err);
        if err <= self.tolerance_s {
            self.hits += 1;
        }
        self.max_error_s = self.max_error_s.max(err);
    }

    /// Share of active hops within tolerance.
    pub fn hit_rate(&self) -> f64 {
        if self.errors.count() == 0 {
            0.0
        } else {
            (self.hits as f64) / (self.errors.count() as f64)
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "active hops {}, waiting {}, recoveries {}, within {:.2} s: {:.1}%, error mean {:.3} s std {:.3} s max {:.3} s",
            self.errors.count(),
            self.waiting,
            self.recoveries,
            self.tolerance_s,
            self.hit_rate() * 100.0,
            self.errors.mean(),
            self.errors.std_dev(),
            self.max_error_s
        )
    }
}

fn csv_path(cli: &crate::Config) -> PathBuf {
    if !cli.output_path.is_empty() {
        return PathBuf::from(&cli.output_path);
    }
    match Path::new(&cli.log_path).parent() {
        Some(dir) => dir.join("follow.csv"),
        None => PathBuf::from("follow.csv"),
    }
}

/// Follow mode: run a recorded performance through the matcher as fast as
/// it decodes, and compare against the reference timeline.
pub fn run_follow(cli: &crate::Config, logger: Arc<Logger>) -> Result<()> {
    if cli.reference_path.is_empty() {
        anyhow::bail!("--reference <PATH> is required in follow mode");
    }
    if cli.input_path.is_empty() {
        anyhow::bail!("--input <PATH> is required in follow mode");
    }

    let score = ScoreFile::open(&cli.reference_path, cli.params.feature)?;
    let mut params = score.parameters(&cli.params)?;
    if let Some(rate) = score.sample_rate() {
        params.sample_rate = rate;
    }
    logger.info(
        &format!(
            "Reference {}: {} vectors, {} markers, window {} s, hop {} s, {} features",
            cli.reference_path,
            score.reference().len(),
            score.markers().len(),
            params.window_seconds,
            params.hop_seconds,
            params.feature
        )
    )?;

    let hop_s = params.hop_seconds;
    let reference_times: Vec<f64> = score
        .times()
        .iter()
        .enumerate()
        .map(|(i, t)| t.unwrap_or((i as f64) * hop_s))
        .collect();
    let (matcher, mut pager) = score.into_parts(&params)?;
    let mut matcher = matcher.with_logger(logger.clone());
    if let Some(start) = cli.start_index {
        matcher.restart_at(start);
    }
    matcher.gate_mut().force_start();

    let audio = decode_mono(&cli.input_path)?;
    let target_rate = params.sample_rate.round() as u32;
    let samples = if audio.sample_rate != target_rate {
        logger.info(&format!("Resampling {} Hz -> {} Hz", audio.sample_rate, target_rate))?;
        resample_linear(&audio.samples, audio.sample_rate, target_rate)
    } else {
        audio.samples
    };
    let pcm = to_pcm16(&samples);

    let mut analyzer = FrameAnalyzer::new(&params)?.with_logger(logger.clone());
    let out_path = csv_path(cli);
    let mut csv = BufWriter::new(File::create(&out_path)?);
    writeln!(csv, "time_s,position,status,ref_time_s,marker")?;

    let mut stats = FollowStats::new(cli.tolerance_s);
    let mut produced: Vec<FeatureVector> = Vec::new();
    let mut live_index = 0usize;

    for hop in pcm.chunks_exact(analyzer.hop_frame_size()) {
        analyzer.on_new_data(hop, &mut |v: FeatureVector| produced.push(v))?;

        for v in produced.drain(..) {
            let live_s = (live_index as f64) * analyzer.hop_seconds();
            live_index += 1;

            let estimate = matcher.get_position(&v);
            let reference_s = usize
                ::try_from(estimate.position)
                .ok()
                .and_then(|i| reference_times.get(i).copied());

            if estimate.status == Status::Active && pager.set_estimate(estimate.position) {
                let m = pager.marker();
                logger.info(
                    &format!(
                        "{:.2} s: marker {} (page {}, y {:.2})",
                        live_s,
                        pager.current_index(),
                        m.page,
                        m.y
                    )
                )?;
            }
            stats.record(live_s, reference_s, estimate.status, estimate.recovered);

            writeln!(
                csv,
                "{:.3},{},{},{},{}",
                live_s,
                estimate.position,
                if estimate.status == Status::Active { "active" } else { "waiting" },
                reference_s.map(|t| format!("{:.3}", t)).unwrap_or_default(),
                pager.current_index()
            )?;
        }
    }
    csv.flush()?;

    logger.info(&format!("Wrote {} rows to {}", live_index, out_path.display()))?;
    logger.info(&format!("Follow: {}", stats.summary()))?;
    if analyzer.overruns() > 0 {
        logger.warn(&format!("{} hops exceeded the real-time budget", analyzer.overruns()))?;
    }
    Ok(())
}
