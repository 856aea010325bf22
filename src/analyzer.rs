//! Turns a stream of fixed-size sample hops into feature vectors.
//!
//! The analyzer keeps the most recent `frame_size` samples in a ring. Each
//! hop is appended; once the ring has been filled at least once, every hop
//! produces one vector for the whole window, oldest sample first.
//!
//! With window 4 and hop 1 the first vector appears on the fourth hop and
//! then on every hop. With window 4 and hop 3 the second hop already fills
//! the ring (the first two samples of it are lost), after that every hop
//! yields a vector whose window overlaps the previous one by one sample.
//!
//! Extraction runs synchronously on the caller's thread: capture does not
//! continue until the vector is produced. Nothing is dropped; if analysis
//! gets slow the caller falls behind, and an over-budget warning is logged.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Parameters;
use crate::error::{ Error, Result };
use crate::feature::{ FeatureKind, FeatureVector, Spectrum };
use crate::logger::Logger;
use crate::ring::SampleRing;

/// Share of the window duration analysis may take before it is reported.
const BUDGET_FRACTION: f64 = 0.8;

/// Receives every vector the analyzer produces, in order.
pub trait FeatureSink {
    fn on_feature(&mut self, vector: FeatureVector);
}

impl<F: FnMut(FeatureVector)> FeatureSink for F {
    fn on_feature(&mut self, vector: FeatureVector) {
        self(vector)
    }
}

pub struct FrameAnalyzer {
    ring: SampleRing,
    spectrum: Spectrum,
    kind: FeatureKind,
    sample_rate: f64,
    hop_frame_size: usize,
    budget_secs: f64,
    produced: u64,
    overruns: u64,
    logger: Arc<Logger>,
}

impl FrameAnalyzer {
    pub fn new(params: &Parameters) -> Result<Self> {
        params.validate()?;
        let frame_size = params.frame_size();
        let hop_frame_size = params.hop_frame_size();
        if hop_frame_size > frame_size {
            return Err(
                Error::InvalidConfig(
                    format!("hop of {} samples exceeds window of {}", hop_frame_size, frame_size)
                )
            );
        }
        Ok(Self {
            ring: SampleRing::new(frame_size),
            spectrum: Spectrum::new(frame_size, params.sample_rate, params.window),
            kind: params.feature,
            sample_rate: params.sample_rate,
            hop_frame_size,
            budget_secs: params.window_seconds * BUDGET_FRACTION,
            produced: 0,
            overruns: 0,
            logger: Arc::new(Logger::disabled()),
        })
    }

    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        let _ = crate::log_debug!(
            logger,
            "analyzer frame size {} samples, hop {} samples",
            self.frame_size(),
            self.hop_frame_size
        );
        self.logger = logger;
        self
    }

    #[cfg(test)]
    fn with_budget_secs(mut self, secs: f64) -> Self {
        self.budget_secs = secs;
        self
    }

    /// Starts a new session; the next vector needs a fully refilled window.
    pub fn reset(&mut self) {
        self.ring.clear();
    }

    /// Appends one hop of exactly `hop_frame_size()` samples and, once the
    /// window is full, hands the resulting vector to `sink`.
    pub fn on_new_data<S: FeatureSink + ?Sized>(&mut self, hop: &[i16], sink: &mut S) -> Result<()> {
        if hop.len() != self.hop_frame_size {
            return Err(Error::HopLength {
                expected: self.hop_frame_size,
                actual: hop.len(),
            });
        }
        let started = Instant::now();

        self.ring.put(hop);
        if self.ring.full() {
            let vector = self.kind.extract(&self.ring, &mut self.spectrum)?;
            self.produced += 1;
            sink.on_feature(vector);
        }

        let elapsed = started.elapsed().as_secs_f64();
        if elapsed > self.budget_secs {
            self.overruns += 1;
            let _ = crate::log_warn!(
                self.logger,
                "analysis took {:.1} ms, over {:.0}% of the {:.1} ms window",
                elapsed * 1000.0,
                BUDGET_FRACTION * 100.0,
                self.window_seconds() * 1000.0
            );
        }
        Ok(())
    }

    pub fn frame_size(&self) -> usize {
        self.ring.capacity()
    }

    /// Samples the analyzer wants per call.
    pub fn hop_frame_size(&self) -> usize {
        self.hop_frame_size
    }

    /// Effective hop after rounding to whole samples.
    pub fn hop_seconds(&self) -> f64 {
        (self.hop_frame_size as f64) / self.sample_rate
    }

    /// Effective window after rounding to whole samples.
    pub fn window_seconds(&self) -> f64 {
        (self.frame_size() as f64) / self.sample_rate
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    /// Hops whose processing exceeded the real-time budget.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(window: f64, hop: f64) -> Parameters {
        Parameters {
            sample_rate: 1000.0,
            window_seconds: window,
            hop_seconds: hop,
            ..Parameters::default()
        }
    }

    fn count_vectors(window: f64, hop: f64, hops: usize) -> Vec<usize> {
        let mut analyzer = FrameAnalyzer::new(&params(window, hop)).unwrap();
        let data = vec![1000i16; analyzer.hop_frame_size()];
        let mut emitted = Vec::new();
        for i in 0..hops {
            let mut got = 0usize;
            analyzer.on_new_data(&data, &mut |_v: FeatureVector| got += 1).unwrap();
            if got > 0 {
                emitted.push(i);
            }
        }
        emitted
    }

    #[test]
    fn first_vector_waits_for_a_full_window() {
        // window 100 samples, hop 25: hops 0..=2 fill, hop 3 completes
        assert_eq!(count_vectors(0.1, 0.025, 6), vec![3, 4, 5]);
    }

    #[test]
    fn uneven_hop_loses_the_head_of_the_first_window() {
        // window 100, hop 75: second hop overfills and yields
        assert_eq!(count_vectors(0.1, 0.075, 4), vec![1, 2, 3]);
    }

    #[test]
    fn hop_equal_to_window_yields_every_hop() {
        assert_eq!(count_vectors(0.1, 0.1, 3), vec![0, 1, 2]);
    }

    #[test]
    fn reset_requires_refill() {
        let mut analyzer = FrameAnalyzer::new(&params(0.1, 0.05)).unwrap();
        let hop = vec![500i16; analyzer.hop_frame_size()];
        let mut out = Vec::new();
        analyzer.on_new_data(&hop, &mut |v: FeatureVector| out.push(v)).unwrap();
        analyzer.on_new_data(&hop, &mut |v: FeatureVector| out.push(v)).unwrap();
        assert_eq!(out.len(), 1);
        analyzer.reset();
        analyzer.on_new_data(&hop, &mut |v: FeatureVector| out.push(v)).unwrap();
        assert_eq!(out.len(), 1);
        analyzer.on_new_data(&hop, &mut |v: FeatureVector| out.push(v)).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(analyzer.produced(), 2);
    }

    #[test]
    fn wrong_hop_length_is_rejected() {
        let mut analyzer = FrameAnalyzer::new(&params(0.1, 0.05)).unwrap();
        let err = analyzer.on_new_data(&[0i16; 10], &mut |_v: FeatureVector| {}).unwrap_err();
        assert!(matches!(err, Error::HopLength { expected: 50, actual: 10 }));
    }

    #[test]
    fn slow_hops_are_counted_as_overruns() {
        let mut analyzer = FrameAnalyzer::new(&params(0.1, 0.1)).unwrap().with_budget_secs(-1.0);
        let hop = vec![800i16; analyzer.hop_frame_size()];
        assert_eq!(analyzer.overruns(), 0);
        let mut out = Vec::new();
        analyzer.on_new_data(&hop, &mut |v: FeatureVector| out.push(v)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(analyzer.overruns(), 1);
    }

    #[test]
    fn default_budget_is_a_share_of_the_window() {
        let mut analyzer = FrameAnalyzer::new(&params(0.1, 0.1)).unwrap();
        assert!((analyzer.budget_secs - 0.08).abs() < 1e-12);
        let hop = vec![800i16; analyzer.hop_frame_size()];
        analyzer.on_new_data(&hop, &mut |_v: FeatureVector| {}).unwrap();
        assert_eq!(analyzer.produced(), 1);
    }

    #[test]
    fn invalid_timing_fails_construction() {
        assert!(FrameAnalyzer::new(&params(0.1, 0.2)).is_err());
        assert!(FrameAnalyzer::new(&params(0.1, 0.0)).is_err());
    }

    #[test]
    fn effective_timing_reflects_rounding() {
        let p = Parameters {
            sample_rate: 44_100.0,
            window_seconds: 0.1,
            hop_seconds: 0.0333,
            ..Parameters::default()
        };
        let analyzer = FrameAnalyzer::new(&p).unwrap();
        assert_eq!(analyzer.frame_size(), 4410);
        assert_eq!(analyzer.hop_frame_size(), 1469);
        assert!((analyzer.hop_seconds() - 1469.0 / 44_100.0).abs() < 1e-12);
    }
}
