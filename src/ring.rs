/// Fixed-capacity circular buffer holding the current analysis window.
///
/// `get(0)` is the newest sample, `get(capacity - 1)` the oldest. Before
/// `full()` the logical content is undefined; `clear()` only rewinds the
/// cursor, stale samples stay in storage and are never read.
#[derive(Clone, Debug)]
pub struct SampleRing {
    data: Vec<i16>,
    cursor: usize,
    len: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(1)],
            cursor: 0,
            len: 0,
        }
    }

    /// Appends `samples`; callers never pass more than `capacity()` at once.
    pub fn put(&mut self, samples: &[i16]) {
        let cap = self.data.len();
        for &s in samples {
            self.data[self.cursor] = s;
            self.cursor = (self.cursor + 1) % cap;
        }
        self.len = (self.len + samples.len()).min(cap);
    }

    pub fn get(&self, index: usize) -> i16 {
        let cap = self.data.len();
        self.data[(self.cursor + cap - 1 - (index % cap)) % cap]
    }

    pub fn full(&self) -> bool {
        self.len >= self.data.len()
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn clear(&mut self) {
        self.cursor = 0;
        self.len = 0;
    }

    /// Writes the window oldest-first into `out` as `sample / 32768`.
    pub fn copy_chronological(&self, out: &mut [f64]) {
        let cap = self.data.len();
        for (j, slot) in out.iter_mut().take(cap).enumerate() {
            *slot = (self.data[(self.cursor + j) % cap] as f64) / 32768.0;
        }
    }
}
