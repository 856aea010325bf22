use crate::error::{ Error, Result };
use crate::feature::FeatureKind;
use crate::window::WindowFunction;

/// Algorithm knobs for one analysis/matching session.
///
/// Read once when a session starts and never mutated afterwards; every
/// component that needs a value receives `&Parameters` at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameters {
    /// Recorder sample rate in Hz.
    pub sample_rate: f64,
    /// Seconds of audio in one analysis window.
    pub window_seconds: f64,
    /// Seconds between the starts of consecutive windows, `0 < hop <= window`.
    pub hop_seconds: f64,
    /// Width in seconds of the area searched around each candidate position,
    /// backward and forward together.
    pub search_window_seconds: f64,
    /// Candidates farther than this from the best position are dropped.
    pub retention_window_seconds: f64,
    /// Initial standard deviation of the hop model, seconds.
    pub start_std_seconds: f64,
    /// Lower bound for the adapted standard deviation, seconds.
    pub min_std_seconds: f64,
    /// Level above the learned noise floor that counts as playing.
    pub activity_threshold_db: f64,
    pub window: WindowFunction,
    pub feature: FeatureKind,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            window_seconds: 0.25,
            hop_seconds: 0.25,
            search_window_seconds: 6.0,
            retention_window_seconds: 10.0,
            start_std_seconds: 2.0,
            min_std_seconds: 1.0,
            activity_threshold_db: 8.0,
            window: WindowFunction::Hann,
            feature: FeatureKind::LogSumChroma,
        }
    }
}

impl Parameters {
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate > 0.0) {
            return Err(Error::InvalidConfig(format!("sample rate must be > 0, got {}", self.sample_rate)));
        }
        if !(self.hop_seconds > 0.0) || self.hop_seconds > self.window_seconds {
            return Err(
                Error::InvalidConfig(
                    format!(
                        "0 < hop <= window not met (hop {}s, window {}s)",
                        self.hop_seconds,
                        self.window_seconds
                    )
                )
            );
        }
        if self.frame_size() < 2 || self.hop_frame_size() < 1 {
            return Err(
                Error::InvalidConfig(
                    format!(
                        "window of {}s at {} Hz leaves no samples to analyze",
                        self.window_seconds,
                        self.sample_rate
                    )
                )
            );
        }
        if !(self.search_window_seconds > 0.0) || !(self.retention_window_seconds > 0.0) {
            return Err(Error::InvalidConfig("search and retention windows must be > 0".to_string()));
        }
        if !(self.start_std_seconds > 0.0) || !(self.min_std_seconds > 0.0) {
            return Err(Error::InvalidConfig("transition deviations must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn frame_size(&self) -> usize {
        (self.window_seconds * self.sample_rate).round() as usize
    }

    pub fn hop_frame_size(&self) -> usize {
        (self.hop_seconds * self.sample_rate).round() as usize
    }

    /// Same parameters with window and hop taken from a reference file.
    pub fn with_timing(&self, window_seconds: f64, hop_seconds: f64) -> Self {
        Self {
            window_seconds,
            hop_seconds,
            ..self.clone()
        }
    }
}
