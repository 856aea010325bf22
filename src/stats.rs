//! Running mean / variance (Welford).

#[derive(Clone, Debug, Default)]
pub struct RunningStat {
    count: usize,
    mean: f64,
    m2: f64,
}

impl RunningStat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.mean = 0.0;
        self.m2 = 0.0;
    }

    pub fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / (self.count as f64);
        // mean moved, so this second factor differs from `delta`
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (n - 1 denominator); zero until two values are in.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / ((self.count - 1) as f64)
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_form(xs: &[f64]) -> (f64, f64) {
        let n = xs.len() as f64;
        let mean = xs.iter().sum::<f64>() / n;
        let var =
            xs
                .iter()
                .map(|x| (x - mean).powi(2))
                .sum::<f64>() / (n - 1.0);
        (mean, var)
    }

    #[test]
    fn matches_closed_form() {
        let xs = [1.0, 2.0, 2.0, 3.0, 7.5, -4.0, 0.25, 11.0];
        let mut s = RunningStat::new();
        for &x in &xs {
            s.push(x);
        }
        let (mean, var) = closed_form(&xs);
        assert_eq!(s.count(), xs.len());
        assert!((s.mean() - mean).abs() < 1e-12);
        assert!((s.variance() - var).abs() < 1e-12);
        assert!((s.std_dev() - var.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn two_values_are_enough() {
        let mut s = RunningStat::new();
        s.push(1.0);
        assert_eq!(s.variance(), 0.0);
        s.push(3.0);
        assert!((s.mean() - 2.0).abs() < 1e-12);
        assert!((s.variance() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn reset_clears_everything() {
        let mut s = RunningStat::new();
        s.push(5.0);
        s.push(7.0);
        s.reset();
        assert_eq!(s.count(), 0);
        assert_eq!(s.mean(), 0.0);
        assert_eq!(s.variance(), 0.0);
        s.push(2.0);
        assert_eq!(s.mean(), 2.0);
    }
}
