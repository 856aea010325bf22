//! Chroma feature vectors.
//!
//! Every analysis window becomes a 12-bin pitch-class profile plus the RMS
//! loudness of the window. How the per-bin intensities are computed,
//! normalized and compared is chosen once per process by [`FeatureKind`];
//! the FFT and bin mapping are shared by all kinds.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ RealFftPlanner, RealToComplex };

use crate::error::{ Error, Result };
use crate::ring::SampleRing;
use crate::window::WindowFunction;

pub const CHROMA_BINS: usize = 12;

/// Spectrum bins outside this band are ignored.
pub const MIN_FREQUENCY: f64 = 20.0;
pub const MAX_FREQUENCY: f64 = 2000.0;

/// Stand-in for log10(0).
const LOG_FLOOR: f64 = 1e-12;

/// Pitch class of `frequency`, 0 = A (440 Hz, equal temperament).
pub fn frequency_bin(frequency: f64) -> usize {
    let semitones = (12.0 * (frequency / 440.0).log2()).round() as i64;
    semitones.rem_euclid(CHROMA_BINS as i64) as usize
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FeatureKind {
    /// Per-bin mean magnitude, zero mean / unit variance, L1 similarity.
    LinearChroma,
    /// Per-bin mean log magnitude, zero mean, Pearson similarity.
    LogChroma,
    /// Per-bin summed magnitude rescaled by bin population, min-max to [0, 1], L2 similarity.
    LinearSumChroma,
    /// Like `LinearSumChroma` but log10 of the rescaled sums before min-max.
    #[default]
    LogSumChroma,
    /// Built like `LogSumChroma`, matches everything with probability 1.
    /// Only useful to load the matcher with equal-likelihood paths.
    Strain,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 5] = [
        FeatureKind::LinearChroma,
        FeatureKind::LogChroma,
        FeatureKind::LinearSumChroma,
        FeatureKind::LogSumChroma,
        FeatureKind::Strain,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureKind::LinearChroma => "linear",
            FeatureKind::LogChroma => "log",
            FeatureKind::LinearSumChroma => "linear-sum",
            FeatureKind::LogSumChroma => "log-sum",
            FeatureKind::Strain => "strain",
        }
    }

    fn uses_log_intensity(&self) -> bool {
        matches!(self, FeatureKind::LogChroma)
    }

    /// Builds a vector from the current contents of a full ring.
    pub fn extract(&self, ring: &SampleRing, spectrum: &mut Spectrum) -> Result<FeatureVector> {
        let (bins, rms) = spectrum.analyze(ring, self.uses_log_intensity())?;
        let chroma = match self {
            FeatureKind::LinearChroma => standardize(bins.means()),
            FeatureKind::LogChroma => center(bins.means()),
            FeatureKind::LinearSumChroma => min_max(bins.rescaled_sums()),
            FeatureKind::LogSumChroma | FeatureKind::Strain => {
                let mut c = bins.rescaled_sums();
                for v in c.iter_mut() {
                    *v = v.max(LOG_FLOOR).log10();
                }
                min_max(c)
            }
        };
        Ok(FeatureVector::from_parts(chroma, rms))
    }

    /// Builds a vector from persisted numbers: 12 chroma values, then RMS.
    ///
    /// Stored chroma already went through this kind's normalization when it
    /// was recorded, so it is taken as-is; anything past the RMS is ignored.
    pub fn from_values(&self, values: &[f64]) -> Result<FeatureVector> {
        if values.len() < CHROMA_BINS {
            return Err(
                Error::InvalidConfig(
                    format!("feature record needs {} values, got {}", CHROMA_BINS, values.len())
                )
            );
        }
        let mut chroma = [0.0; CHROMA_BINS];
        chroma.copy_from_slice(&values[..CHROMA_BINS]);
        let rms = values.get(CHROMA_BINS).copied().unwrap_or(0.0);
        Ok(FeatureVector::from_parts(chroma, rms))
    }

    /// Similarity of two vectors; 1.0 is a perfect match for every kind.
    pub fn match_probability(&self, a: &FeatureVector, b: &FeatureVector) -> f64 {
        match self {
            FeatureKind::LinearChroma => 1.0 - l1_distance(a, b) / 24.0,
            FeatureKind::LogChroma => (pearson(a, b) + 1.0) * 0.5,
            FeatureKind::LinearSumChroma | FeatureKind::LogSumChroma =>
                1.0 - l2_distance(a, b) / 20.0,
            FeatureKind::Strain => 1.0,
        }
    }
}

impl FromStr for FeatureKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" | "linear-chroma" => Ok(FeatureKind::LinearChroma),
            "log" | "log-chroma" => Ok(FeatureKind::LogChroma),
            "linear-sum" | "linear-sum-chroma" => Ok(FeatureKind::LinearSumChroma),
            "log-sum" | "log-sum-chroma" => Ok(FeatureKind::LogSumChroma),
            "strain" => Ok(FeatureKind::Strain),
            other => Err(format!("Unknown feature kind: {}", other)),
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A normalized chroma profile and the loudness of the window it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector {
    chroma: [f64; CHROMA_BINS],
    rms: f64,
    mean: f64,
    std: f64,
}

impl FeatureVector {
    fn from_parts(chroma: [f64; CHROMA_BINS], rms: f64) -> Self {
        let mean = chroma.iter().sum::<f64>() / (CHROMA_BINS as f64);
        let var =
            chroma
                .iter()
                .map(|c| (c - mean) * (c - mean))
                .sum::<f64>() / (CHROMA_BINS as f64);
        Self {
            chroma,
            rms,
            mean,
            std: var.sqrt(),
        }
    }

    pub fn chroma(&self) -> &[f64; CHROMA_BINS] {
        &self.chroma
    }

    /// RMS of the un-windowed window, samples scaled to [-1, 1).
    pub fn rms(&self) -> f64 {
        self.rms
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation of the chroma bins.
    pub fn std(&self) -> f64 {
        self.std
    }

    /// The 13 numbers a reference file stores for this vector.
    pub fn to_values(&self) -> [f64; CHROMA_BINS + 1] {
        let mut out = [0.0; CHROMA_BINS + 1];
        out[..CHROMA_BINS].copy_from_slice(&self.chroma);
        out[CHROMA_BINS] = self.rms;
        out
    }
}

impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.chroma {
            write!(f, "{} ", c)?;
        }
        write!(f, "{}", self.rms)
    }
}

fn l1_distance(a: &FeatureVector, b: &FeatureVector) -> f64 {
    a.chroma
        .iter()
        .zip(b.chroma.iter())
        .map(|(x, y)| (x - y).abs())
        .sum()
}

fn l2_distance(a: &FeatureVector, b: &FeatureVector) -> f64 {
    a.chroma
        .iter()
        .zip(b.chroma.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Pearson correlation of the chroma arrays; flat profiles correlate with nothing.
fn pearson(a: &FeatureVector, b: &FeatureVector) -> f64 {
    if a.std == 0.0 || b.std == 0.0 {
        return 0.0;
    }
    let r: f64 = a.chroma
        .iter()
        .zip(b.chroma.iter())
        .map(|(x, y)| ((x - a.mean) / a.std) * ((y - b.mean) / b.std))
        .sum();
    r / (CHROMA_BINS as f64)
}

fn center(mut c: [f64; CHROMA_BINS]) -> [f64; CHROMA_BINS] {
    let mean = c.iter().sum::<f64>() / (CHROMA_BINS as f64);
    for v in c.iter_mut() {
        *v -= mean;
    }
    c
}

fn standardize(c: [f64; CHROMA_BINS]) -> [f64; CHROMA_BINS] {
    let mut c = center(c);
    let std = (
        c
            .iter()
            .map(|v| v * v)
            .sum::<f64>() / (CHROMA_BINS as f64)
    ).sqrt();
    if std > 0.0 {
        for v in c.iter_mut() {
            *v /= std;
        }
    }
    c
}

/// Rescales to [0, 1]; a flat profile (min == max) is noise and becomes all zeros.
fn min_max(mut c: [f64; CHROMA_BINS]) -> [f64; CHROMA_BINS] {
    let min = c.iter().copied().fold(f64::INFINITY, f64::min);
    let max = c.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    for v in c.iter_mut() {
        *v = if span > 0.0 { (*v - min) / span } else { 0.0 };
    }
    c
}

/// Per pitch-class accumulation of spectrum intensities.
#[derive(Clone, Debug, Default)]
struct BinAccumulator {
    sums: [f64; CHROMA_BINS],
    counts: [u32; CHROMA_BINS],
}

impl BinAccumulator {
    fn add(&mut self, frequency: f64, intensity: f64) {
        if !(MIN_FREQUENCY..=MAX_FREQUENCY).contains(&frequency) {
            return;
        }
        let bin = frequency_bin(frequency);
        self.sums[bin] += intensity;
        self.counts[bin] += 1;
    }

    fn means(&self) -> [f64; CHROMA_BINS] {
        let mut out = [0.0; CHROMA_BINS];
        for (b, v) in out.iter_mut().enumerate() {
            if self.counts[b] > 0 {
                *v = self.sums[b] / (self.counts[b] as f64);
            }
        }
        out
    }

    /// Sums scaled up as if every bin had as many contributors as the fullest one.
    fn rescaled_sums(&self) -> [f64; CHROMA_BINS] {
        let max_n = self.counts.iter().copied().max().unwrap_or(0) as f64;
        let mut out = [0.0; CHROMA_BINS];
        for (b, v) in out.iter_mut().enumerate() {
            if self.counts[b] > 0 {
                *v = self.sums[b] * (max_n / (self.counts[b] as f64));
            }
        }
        out
    }
}

/// FFT plan, window table and scratch buffers for one frame size.
///
/// Built once per analysis session and reused for every window so the
/// per-hop path does not allocate.
pub struct Spectrum {
    fft: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
    input: Vec<f64>,
    output: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    sample_rate: f64,
}

impl Spectrum {
    pub fn new(frame_size: usize, sample_rate: f64, window: WindowFunction) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(frame_size);
        let input = fft.make_input_vec();
        let output = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();
        Self {
            fft,
            window: window.table(frame_size),
            input,
            output,
            scratch,
            sample_rate,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.window.len()
    }

    /// Windowed forward transform of the ring; returns the pitch-class
    /// accumulation and the RMS of the un-windowed samples.
    fn analyze(&mut self, ring: &SampleRing, log_intensity: bool) -> Result<(BinAccumulator, f64)> {
        let n = self.frame_size();
        if ring.capacity() != n {
            return Err(
                Error::InvalidConfig(
                    format!("ring holds {} samples, spectrum expects {}", ring.capacity(), n)
                )
            );
        }

        ring.copy_chronological(&mut self.input);
        let mut energy = 0.0;
        for (x, w) in self.input.iter_mut().zip(self.window.iter()) {
            energy += *x * *x;
            *x *= *w;
        }
        let rms = (energy / (n as f64)).sqrt();

        self.fft
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
            .map_err(|e| Error::Fft(e.to_string()))?;

        let intensity = |re: f64, im: f64| {
            let mag = (re * re + im * im).sqrt();
            if log_intensity { mag.max(LOG_FLOOR).log10() } else { mag }
        };

        let mut bins = BinAccumulator::default();
        let bin_hz = self.sample_rate / (n as f64);
        // k = 0 is DC; the last full complex bin is (n - 1) / 2
        for k in 1..=(n - 1) / 2 {
            let c = self.output[k];
            bins.add((k as f64) * bin_hz, intensity(c.re, c.im));
        }
        if n % 2 == 0 {
            // nyquist carries no phase
            let c = self.output[n / 2];
            bins.add(self.sample_rate * 0.5, intensity(c.re, 0.0));
        }
        Ok((bins, rms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 8000.0;

    fn tone_ring(freq: f64, n: usize, amplitude: f64) -> SampleRing {
        let samples: Vec<i16> = (0..n)
            .map(|i| {
                let t = (i as f64) / SR;
                (amplitude * 32767.0 * (2.0 * std::f64::consts::PI * freq * t).sin()) as i16
            })
            .collect();
        let mut ring = SampleRing::new(n);
        ring.put(&samples);
        ring
    }

    fn argmax(c: &[f64; CHROMA_BINS]) -> usize {
        let mut best = 0;
        for b in 1..CHROMA_BINS {
            if c[b] > c[best] {
                best = b;
            }
        }
        best
    }

    #[test]
    fn frequency_bins_follow_equal_temperament() {
        assert_eq!(frequency_bin(440.0), 0);
        assert_eq!(frequency_bin(220.0), 0);
        assert_eq!(frequency_bin(880.0), 0);
        // C5, three semitones above A4
        assert_eq!(frequency_bin(523.25), 3);
        // G#4, one semitone below A4
        assert_eq!(frequency_bin(415.3), 11);
        assert_eq!(frequency_bin(27.5), 0);
    }

    #[test]
    fn pure_tone_peaks_in_its_pitch_class() {
        let n = 2000;
        for kind in [
            FeatureKind::LinearChroma,
            FeatureKind::LogChroma,
            FeatureKind::LinearSumChroma,
            FeatureKind::LogSumChroma,
        ] {
            let ring = tone_ring(440.0, n, 0.5);
            let mut spectrum = Spectrum::new(n, SR, WindowFunction::Hann);
            let v = kind.extract(&ring, &mut spectrum).unwrap();
            assert_eq!(argmax(v.chroma()), 0, "{} missed A", kind);

            let ring = tone_ring(523.25, n, 0.5);
            let v = kind.extract(&ring, &mut spectrum).unwrap();
            assert_eq!(argmax(v.chroma()), 3, "{} missed C", kind);
        }
    }

    #[test]
    fn rms_ignores_the_window() {
        let n = 1600;
        let ring = tone_ring(500.0, n, 0.5);
        let mut spectrum = Spectrum::new(n, SR, WindowFunction::Blackman);
        let v = FeatureKind::LinearChroma.extract(&ring, &mut spectrum).unwrap();
        // sine of amplitude a has rms a / sqrt(2)
        assert!((v.rms() - 0.5 / (2.0f64).sqrt()).abs() < 1e-3);
    }

    #[test]
    fn normalizations_hold() {
        let n = 2001;
        let ring = tone_ring(330.0, n, 0.3);
        let mut spectrum = Spectrum::new(n, SR, WindowFunction::Hamming);

        let lin = FeatureKind::LinearChroma.extract(&ring, &mut spectrum).unwrap();
        assert!(lin.mean().abs() < 1e-9);
        assert!((lin.std() - 1.0).abs() < 1e-9);

        let log = FeatureKind::LogChroma.extract(&ring, &mut spectrum).unwrap();
        assert!(log.mean().abs() < 1e-9);

        for kind in [FeatureKind::LinearSumChroma, FeatureKind::LogSumChroma] {
            let v = kind.extract(&ring, &mut spectrum).unwrap();
            let min = v.chroma().iter().copied().fold(f64::INFINITY, f64::min);
            let max = v.chroma().iter().copied().fold(f64::NEG_INFINITY, f64::max);
            assert!(min.abs() < 1e-12, "{} min {}", kind, min);
            assert!((max - 1.0).abs() < 1e-12, "{} max {}", kind, max);
        }
    }

    #[test]
    fn self_match_is_maximal() {
        let n = 2000;
        let a = tone_ring(440.0, n, 0.4);
        let b = tone_ring(587.33, n, 0.4);
        let mut spectrum = Spectrum::new(n, SR, WindowFunction::Hann);
        for kind in FeatureKind::ALL {
            let va = kind.extract(&a, &mut spectrum).unwrap();
            let vb = kind.extract(&b, &mut spectrum).unwrap();
            let same = kind.match_probability(&va, &va);
            assert!((same - 1.0).abs() < 1e-9, "{} self match {}", kind, same);
            assert!(kind.match_probability(&va, &vb) <= same + 1e-12);
        }
    }

    #[test]
    fn persisted_values_round_trip_for_every_kind() {
        let n = 1999;
        let ring = tone_ring(392.0, n, 0.25);
        let mut spectrum = Spectrum::new(n, SR, WindowFunction::BlackmanHarris);
        for kind in FeatureKind::ALL {
            let live = kind.extract(&ring, &mut spectrum).unwrap();
            let text = live.to_string();
            let values: Vec<f64> = text
                .split_whitespace()
                .map(|s| s.parse().unwrap())
                .collect();
            assert_eq!(values.len(), 13);
            let stored = kind.from_values(&values).unwrap();
            for (x, y) in live.chroma().iter().zip(stored.chroma().iter()) {
                assert!((x - y).abs() < 1e-12);
            }
            assert!((live.rms() - stored.rms()).abs() < 1e-12);
            assert!((kind.match_probability(&live, &stored) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn short_records_are_rejected() {
        assert!(FeatureKind::LogSumChroma.from_values(&[0.0; 11]).is_err());
        let v = FeatureKind::LogSumChroma.from_values(&[0.5; 12]).unwrap();
        assert_eq!(v.rms(), 0.0);
    }

    #[test]
    fn silence_stays_finite() {
        let n = 800;
        let ring = tone_ring(440.0, n, 0.0);
        let mut spectrum = Spectrum::new(n, SR, WindowFunction::Hann);
        for kind in FeatureKind::ALL {
            let v = kind.extract(&ring, &mut spectrum).unwrap();
            assert!(v.chroma().iter().all(|c| c.is_finite()), "{}", kind);
            assert_eq!(v.rms(), 0.0);
        }
    }

    #[test]
    fn mismatched_ring_is_an_error() {
        let ring = SampleRing::new(100);
        let mut spectrum = Spectrum::new(128, SR, WindowFunction::Hann);
        assert!(FeatureKind::LinearChroma.extract(&ring, &mut spectrum).is_err());
    }
}
