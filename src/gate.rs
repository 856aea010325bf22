use std::sync::Arc;

use crate::logger::Logger;
use crate::stats::RunningStat;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Waiting,
    Active,
}

/// Observations spent seeding the noise floor before any decision is made.
const SEED_OBSERVATIONS: usize = 2;
/// Quiet frames tolerated after a loud one before falling back to Waiting.
const COOL_DOWN_INIT: u32 = 1;
const INITIAL_MIN_RMS: f64 = f64::MAX;
const FORCED_MIN_RMS: f64 = 1e-8;

/// Decides whether the performer is playing, from window loudness relative
/// to the quietest window heard so far.
pub struct ActivityGate {
    threshold_db: f64,
    min_rms: f64,
    seed: RunningStat,
    cool_down: u32,
    status: Status,
    logger: Arc<Logger>,
}

impl ActivityGate {
    pub fn new(threshold_db: f64) -> Self {
        Self {
            threshold_db,
            min_rms: INITIAL_MIN_RMS,
            seed: RunningStat::new(),
            cool_down: 0,
            status: Status::Waiting,
            logger: Arc::new(Logger::disabled()),
        }
    }

    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn reset(&mut self) {
        self.min_rms = INITIAL_MIN_RMS;
        self.seed.reset();
        self.cool_down = 0;
        self.status = Status::Waiting;
    }

    /// Feeds one window's RMS and returns the latched status.
    pub fn observe(&mut self, rms: f64) -> Status {
        if rms > 0.0 && rms < self.min_rms {
            self.min_rms = rms;
        }

        if self.seed.count() < SEED_OBSERVATIONS {
            self.seed.push(rms);
            return self.status;
        }

        let db = if rms < self.min_rms { 0.0 } else { 10.0 * (rms / self.min_rms).log10() };
        let _ = crate::log_debug!(self.logger, "rms {:.6} floor {:.6} level {:.2} dB", rms, self.min_rms, db);

        if db < self.threshold_db {
            if self.cool_down > 0 {
                self.cool_down -= 1;
            } else {
                self.status = Status::Waiting;
            }
        } else {
            // the warm-up budget is spent by the seeding observations,
            // so every loud window re-arms the cool-down
            self.status = Status::Active;
            self.cool_down = COOL_DOWN_INIT;
        }
        self.status
    }

    /// Skips the seeding phase with a near-silent floor, so the next loud
    /// window is Active right away. For non-interactive drivers only.
    pub fn force_start(&mut self) {
        self.min_rms = FORCED_MIN_RMS;
        while self.seed.count() < SEED_OBSERVATIONS {
            self.seed.push(FORCED_MIN_RMS);
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn min_rms(&self) -> Option<f64> {
        (self.min_rms < INITIAL_MIN_RMS).then_some(self.min_rms)
    }
}
