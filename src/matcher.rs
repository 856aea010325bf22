//! Online alignment of live feature vectors against a reference recording.
//!
//! The matcher keeps a sparse belief over reference indices. Every live
//! vector advances each candidate by the expected hop, scores the targets
//! around it by `emission * transition`, and keeps only the best path into
//! each target (max-product, as in Viterbi decoding). The hop model is a
//! Gaussian whose mean and deviation are re-estimated from the hops the
//! matcher has actually taken.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;

use crate::config::Parameters;
use crate::error::{ Error, Result };
use crate::feature::{ FeatureKind, FeatureVector };
use crate::gate::{ ActivityGate, Status };
use crate::logger::Logger;
use crate::stats::RunningStat;

/// Normalized path mass under which a candidate is dropped.
pub const EPSILON: f64 = 1e-6;
/// Position reported before the first match.
pub const UNSEEDED: i64 = -1;
/// Observed hops needed before the transition model adapts.
pub const ADAPT_AFTER: usize = 20;
/// Adapted deviation is this multiple of the observed one.
const STD_MARGIN: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Estimate {
    /// Best matching reference index, `UNSEEDED` before any match.
    pub position: i64,
    pub status: Status,
    /// The step left no candidate with positive mass; the belief was
    /// re-seeded at `position`.
    pub recovered: bool,
}

/// Current hop model, in reference-index units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transition {
    pub mean: f64,
    pub std: f64,
}

pub struct PositionMatcher {
    reference: Vec<FeatureVector>,
    kind: FeatureKind,
    window_seconds: f64,
    hop_seconds: f64,
    search_window_seconds: f64,
    retention_window_seconds: f64,
    start_std_seconds: f64,
    min_std_seconds: f64,

    search_half_width: i64,
    retention_window: f64,
    transition: Transition,
    std_min: f64,
    hops: RunningStat,

    belief: BTreeMap<i64, f64>,
    next: BTreeMap<i64, f64>,
    position: i64,
    playing: bool,
    gate: ActivityGate,
    logger: Arc<Logger>,
}

impl PositionMatcher {
    /// `reference` must have been built with `params.feature` and the same
    /// window/hop timing as `params`.
    pub fn new(reference: Vec<FeatureVector>, params: &Parameters) -> Result<Self> {
        params.validate()?;
        if reference.is_empty() {
            return Err(Error::InvalidConfig("reference sequence is empty".to_string()));
        }
        let mut matcher = Self {
            reference,
            kind: params.feature,
            window_seconds: params.window_seconds,
            hop_seconds: params.hop_seconds,
            search_window_seconds: params.search_window_seconds,
            retention_window_seconds: params.retention_window_seconds,
            start_std_seconds: params.start_std_seconds,
            min_std_seconds: params.min_std_seconds,
            search_half_width: 0,
            retention_window: 0.0,
            transition: Transition { mean: 1.0, std: 1.0 },
            std_min: 1.0,
            hops: RunningStat::new(),
            belief: BTreeMap::new(),
            next: BTreeMap::new(),
            position: UNSEEDED,
            playing: false,
            gate: ActivityGate::new(params.activity_threshold_db),
            logger: Arc::new(Logger::disabled()),
        };
        matcher.restart();
        Ok(matcher)
    }

    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        self.gate = self.gate.with_logger(logger.clone());
        self.logger = logger;
        self
    }

    /// Forgets everything; the next active vector is matched from the start.
    pub fn restart(&mut self) {
        self.restart_at(UNSEEDED);
    }

    /// Restarts with all belief on `position`.
    pub fn restart_at(&mut self, position: i64) {
        self.hops.reset();
        self.belief.clear();
        self.next.clear();
        self.belief.insert(position, 1.0);

        self.search_half_width = (0.5 * (self.search_window_seconds / self.hop_seconds)).round() as i64;
        self.retention_window = self.retention_window_seconds / self.hop_seconds;
        self.transition = Transition {
            mean: 1.0,
            std: self.start_std_seconds / self.hop_seconds,
        };
        self.std_min = self.min_std_seconds / self.hop_seconds;

        self.gate.reset();
        self.playing = false;
        self.position = position;
    }

    /// Advances the belief by one live vector and returns the best position.
    ///
    /// Must be called once per produced vector, in arrival order, from one
    /// caller at a time: the hop model is learned from consecutive calls.
    pub fn get_position(&mut self, v: &FeatureVector) -> Estimate {
        let status = self.gate.observe(v.rms());
        if status == Status::Waiting {
            // the performer paused; keep belief and hop model untouched
            if self.playing {
                let _ = crate::log_debug!(self.logger, "performance waiting at {}", self.position);
            }
            self.playing = false;
            return Estimate {
                position: self.position,
                status,
                recovered: false,
            };
        }
        self.playing = true;

        let len = self.reference.len() as i64;
        let half = self.search_half_width as f64;
        let Transition { mean, std } = self.transition;
        let mut best = self.position;
        let mut p_best = 0.0;

        self.next.clear();
        for (&l, &p_path) in self.belief.iter() {
            let center = (l as f64) + mean;
            let start = ((center - half).round() as i64).max(0);
            let end = ((center + half).round() as i64).min(len);
            for t in start..end {
                let emission = self.kind.match_probability(v, &self.reference[t as usize]).max(0.0);
                let mass = p_path * emission * gaussian_pdf((t as f64) - center, std);
                match self.next.entry(t) {
                    Entry::Vacant(e) => {
                        e.insert(mass);
                    }
                    Entry::Occupied(mut e) => {
                        if *e.get() < mass {
                            e.insert(mass);
                        }
                    }
                }
                if mass > p_best {
                    best = t;
                    p_best = mass;
                }
            }
        }

        if !(p_best > 0.0) {
            let _ = crate::log_warn!(
                self.logger,
                "no candidate survived around {}; re-seeding belief there",
                self.position
            );
            self.next.clear();
            self.belief.clear();
            self.belief.insert(self.position, 1.0);
            return Estimate {
                position: self.position,
                status,
                recovered: true,
            };
        }

        std::mem::swap(&mut self.belief, &mut self.next);
        self.next.clear();
        self.normalize(best, p_best);
        self.set_position(best);

        Estimate {
            position: best,
            status,
            recovered: false,
        }
    }

    /// Scales the best path to 1.0 and drops weak or distant candidates.
    fn normalize(&mut self, best: i64, p_best: f64) {
        let retention = self.retention_window;
        let before = self.belief.len();
        self.belief.retain(|&i, p| {
            *p /= p_best;
            *p >= EPSILON && (((i - best).abs() as f64) <= retention)
        });
        let _ = crate::log_debug!(
            self.logger,
            "kept {}/{} candidates around {}",
            self.belief.len(),
            before,
            best
        );
    }

    fn set_position(&mut self, position: i64) {
        self.hops.push((position - self.position) as f64);
        if self.hops.count() >= ADAPT_AFTER {
            self.transition = Transition {
                mean: self.hops.mean(),
                std: (self.hops.std_dev() * STD_MARGIN).max(self.std_min),
            };
        }
        self.position = position;
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    /// Whether the last vector was judged as active playing.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Current candidates and their normalized mass. Read-only view.
    pub fn belief(&self) -> &BTreeMap<i64, f64> {
        &self.belief
    }

    pub fn transition(&self) -> Transition {
        self.transition
    }

    pub fn retention_window(&self) -> f64 {
        self.retention_window
    }

    pub fn search_half_width(&self) -> i64 {
        self.search_half_width
    }

    pub fn gate_mut(&mut self) -> &mut ActivityGate {
        &mut self.gate
    }

    pub fn reference(&self) -> &[FeatureVector] {
        &self.reference
    }

    pub fn reference_len(&self) -> usize {
        self.reference.len()
    }

    pub fn hop_seconds(&self) -> f64 {
        self.hop_seconds
    }

    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
    }
}

/// Unnormalized over the discrete window; the belief is rescaled every step anyway.
fn gaussian_pdf(x: f64, std: f64) -> f64 {
    (-(x * x) / (2.0 * std * std)).exp() / (std * (2.0 * PI).sqrt())
}
