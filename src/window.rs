use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Taper applied to the time-domain frame before the forward transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WindowFunction {
    Rectangular,
    #[default]
    Hann,
    Hamming,
    Blackman,
    BlackmanHarris,
}

const BLACKMAN_ALPHA: f64 = 0.16;
const BLACKMAN_A0: f64 = (1.0 - BLACKMAN_ALPHA) / 2.0;
const BLACKMAN_A1: f64 = 0.5;
const BLACKMAN_A2: f64 = BLACKMAN_ALPHA / 2.0;

impl WindowFunction {
    /// Weight for sample `index` of an `n`-sample frame.
    pub fn weight(&self, index: usize, n: usize) -> f64 {
        if n <= 1 {
            return 1.0;
        }
        let f = (2.0 * PI * (index as f64)) / ((n - 1) as f64);
        match self {
            WindowFunction::Rectangular => 1.0,
            WindowFunction::Hann => 0.5 * (1.0 - f.cos()),
            WindowFunction::Hamming => 0.54 - 0.46 * f.cos(),
            WindowFunction::Blackman =>
                BLACKMAN_A0 - BLACKMAN_A1 * f.cos() + BLACKMAN_A2 * (2.0 * f).cos(),
            WindowFunction::BlackmanHarris =>
                0.35875 - 0.48829 * f.cos() + 0.14128 * (2.0 * f).cos() -
                    0.01168 * (3.0 * f).cos(),
        }
    }

    /// Precomputes all `n` weights; the analyzer does this once per session.
    pub fn table(&self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.weight(i, n)).collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            WindowFunction::Rectangular => "rectangular",
            WindowFunction::Hann => "hann",
            WindowFunction::Hamming => "hamming",
            WindowFunction::Blackman => "blackman",
            WindowFunction::BlackmanHarris => "blackman-harris",
        }
    }
}

impl FromStr for WindowFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rectangular" | "rect" | "none" => Ok(WindowFunction::Rectangular),
            "hann" | "hanning" => Ok(WindowFunction::Hann),
            "hamming" => Ok(WindowFunction::Hamming),
            "blackman" => Ok(WindowFunction::Blackman),
            "blackman-harris" | "blackmanharris" => Ok(WindowFunction::BlackmanHarris),
            other => Err(format!("Unknown window function: {}", other)),
        }
    }
}

impl fmt::Display for WindowFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [WindowFunction; 5] = [
        WindowFunction::Rectangular,
        WindowFunction::Hann,
        WindowFunction::Hamming,
        WindowFunction::Blackman,
        WindowFunction::BlackmanHarris,
    ];

    #[test]
    fn endpoints_and_center() {
        let n = 101;
        assert!(WindowFunction::Hann.weight(0, n).abs() < 1e-12);
        assert!((WindowFunction::Hann.weight(50, n) - 1.0).abs() < 1e-12);
        assert!((WindowFunction::Hamming.weight(0, n) - 0.08).abs() < 1e-12);
        assert!(WindowFunction::Blackman.weight(0, n).abs() < 1e-12);
        assert!((WindowFunction::Blackman.weight(50, n) - 1.0).abs() < 1e-12);
        assert!((WindowFunction::BlackmanHarris.weight(0, n) - 6e-5).abs() < 1e-9);
        assert_eq!(WindowFunction::Rectangular.weight(17, n), 1.0);
    }

    #[test]
    fn windows_are_symmetric() {
        let n = 64;
        for w in ALL {
            for i in 0..n {
                let a = w.weight(i, n);
                let b = w.weight(n - 1 - i, n);
                assert!((a - b).abs() < 1e-12, "{} asymmetric at {}", w, i);
            }
        }
    }

    #[test]
    fn names_round_trip() {
        for w in ALL {
            assert_eq!(w.name().parse::<WindowFunction>().unwrap(), w);
        }
        assert!("triangle".parse::<WindowFunction>().is_err());
    }

    #[test]
    fn degenerate_frame_is_flat() {
        assert_eq!(WindowFunction::Hann.weight(0, 1), 1.0);
    }
}
