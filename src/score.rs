//! Reference ("score") files: reading them into a matcher and pager, and
//! recording new ones from live vectors.
//!
//! The format is line based. `key=value` lines carry settings, `page=` may
//! repeat and lists display pages in order. Blank lines and lines starting
//! with `#` are skipped. Every other line is one reference vector:
//!
//! ```text
//! windowSize=0.25
//! hopSize=0.25
//! framerate=44100
//! page=first.png
//!
//! 0:0.1 0.9 ... 0.3 0.021
//! 0.25:0.2 0.8 ... 0.4 0.024 0 0.5 0.12
//! ```
//!
//! An optional `<seconds>:` prefix gives the vector's time in the recording.
//! Twelve chroma values and the RMS follow; three more numbers attach a
//! marker (page, x, y) to that vector's index.

use std::collections::{ BTreeMap, HashMap };
use std::fmt;
use std::fs::File;
use std::io::{ BufRead, BufReader, Write };
use std::path::Path;
use std::sync::Arc;

use crate::config::Parameters;
use crate::error::{ Error, Result };
use crate::feature::{ FeatureKind, FeatureVector, CHROMA_BINS };
use crate::gate::{ ActivityGate, Status };
use crate::logger::Logger;
use crate::matcher::PositionMatcher;
use crate::pager::{ Marker, PositionPager };

pub const WINDOW_KEY: &str = "windowSize";
pub const HOP_KEY: &str = "hopSize";
pub const RATE_KEY: &str = "framerate";
const PAGE_KEY: &str = "page";

/// Chroma plus RMS.
const VECTOR_VALUES: usize = CHROMA_BINS + 1;
/// Chroma, RMS and a marker.
const MARKED_VALUES: usize = VECTOR_VALUES + 3;

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.page, self.x, self.y)
    }
}

/// A parsed reference file.
#[derive(Debug)]
pub struct ScoreFile {
    reference: Vec<FeatureVector>,
    markers: BTreeMap<usize, Marker>,
    pages: Vec<String>,
    times: Vec<Option<f64>>,
    settings: HashMap<String, String>,
}

impl ScoreFile {
    pub fn open<P: AsRef<Path>>(path: P, kind: FeatureKind) -> Result<Self> {
        let file = File::open(path)?;
        Self::parse(BufReader::new(file), kind)
    }

    /// Vector lines with fewer than 13 numbers are skipped; a number that
    /// does not parse fails the whole file.
    pub fn parse<R: BufRead>(reader: R, kind: FeatureKind) -> Result<Self> {
        let mut score = Self {
            reference: Vec::new(),
            markers: BTreeMap::new(),
            pages: Vec::new(),
            times: Vec::new(),
            settings: HashMap::new(),
        };

        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = n + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(eq) = line.find('=').filter(|&i| i > 0) {
                let key = line[..eq].trim();
                let value = line[eq + 1..].trim();
                if key == PAGE_KEY {
                    score.pages.push(value.to_string());
                } else {
                    score.settings.insert(key.to_string(), value.to_string());
                }
                continue;
            }

            let (time, body) = match line.find(':').filter(|&i| i > 0) {
                Some(colon) => (Some(parse_number(&line[..colon], line_no)?), &line[colon + 1..]),
                None => (None, line),
            };

            let items: Vec<&str> = body.split_whitespace().collect();
            if items.len() < VECTOR_VALUES {
                continue;
            }
            let values = items
                .iter()
                .map(|s| parse_number(s, line_no))
                .collect::<Result<Vec<f64>>>()?;

            let index = score.reference.len();
            score.reference.push(kind.from_values(&values)?);
            if values.len() >= MARKED_VALUES {
                score.markers.insert(index, Marker {
                    page: values[VECTOR_VALUES].max(0.0) as u32,
                    x: values[VECTOR_VALUES + 1],
                    y: values[VECTOR_VALUES + 2],
                });
            }
            score.times.push(time);
        }

        score.window_seconds()?;
        score.hop_seconds()?;
        Ok(score)
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    fn required_seconds(&self, key: &str) -> Result<f64> {
        let raw = self.setting(key).ok_or_else(|| Error::Score {
            line: 0,
            message: format!("missing {} setting", key),
        })?;
        raw.parse::<f64>().map_err(|_| Error::Score {
            line: 0,
            message: format!("{}={} is not a number", key, raw),
        })
    }

    pub fn window_seconds(&self) -> Result<f64> {
        self.required_seconds(WINDOW_KEY)
    }

    pub fn hop_seconds(&self) -> Result<f64> {
        self.required_seconds(HOP_KEY)
    }

    /// Sample rate the reference was recorded at, if the file says.
    pub fn sample_rate(&self) -> Option<f64> {
        self.setting(RATE_KEY).and_then(|s| s.parse().ok())
    }

    pub fn reference(&self) -> &[FeatureVector] {
        &self.reference
    }

    pub fn markers(&self) -> &BTreeMap<usize, Marker> {
        &self.markers
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    /// Per-vector recording time in seconds, `None` where the line had no prefix.
    pub fn times(&self) -> &[Option<f64>] {
        &self.times
    }

    /// `base` with the window and hop this reference was built with.
    pub fn parameters(&self, base: &Parameters) -> Result<Parameters> {
        let params = base.with_timing(self.window_seconds()?, self.hop_seconds()?);
        params.validate()?;
        Ok(params)
    }

    /// Hands the reference to a new matcher and the markers to a new pager.
    pub fn into_parts(self, base: &Parameters) -> Result<(PositionMatcher, PositionPager)> {
        let params = self.parameters(base)?;
        let matcher = PositionMatcher::new(self.reference, &params)?;
        Ok((matcher, PositionPager::new(self.markers)))
    }
}

fn parse_number(s: &str, line: usize) -> Result<f64> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| Error::Score {
            line,
            message: format!("{:?} is not a number", s),
        })
}

/// Collects live vectors into a new reference, skipping silence.
pub struct ReferenceRecorder {
    reference: Vec<FeatureVector>,
    markers: BTreeMap<usize, Marker>,
    gate: ActivityGate,
    /// Received-vector ordinal of each recorded vector, when times are kept.
    times: Option<Vec<u64>>,
    received: u64,
    playing: bool,
    logger: Arc<Logger>,
}

impl ReferenceRecorder {
    pub fn new(activity_threshold_db: f64) -> Self {
        Self {
            reference: Vec::new(),
            markers: BTreeMap::new(),
            gate: ActivityGate::new(activity_threshold_db),
            times: None,
            received: 0,
            playing: false,
            logger: Arc::new(Logger::disabled()),
        }
    }

    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        self.gate = self.gate.with_logger(logger.clone());
        self.logger = logger;
        self
    }

    /// Also write each vector's time in the recording.
    pub fn record_times(mut self) -> Self {
        self.times = Some(Vec::new());
        self
    }

    pub fn reset(&mut self) {
        self.reference.clear();
        self.markers.clear();
        self.gate.reset();
        if let Some(times) = self.times.as_mut() {
            times.clear();
        }
        self.received = 0;
        self.playing = false;
    }

    /// Feeds one live vector; it is kept only while the gate says Active.
    pub fn add_data(&mut self, v: FeatureVector) -> Status {
        let status = self.gate.observe(v.rms());
        self.received += 1;
        if status == Status::Waiting {
            if self.playing {
                let _ = crate::log_debug!(self.logger, "no active input, recording paused");
            }
            self.playing = false;
            return status;
        }
        self.playing = true;
        if let Some(times) = self.times.as_mut() {
            times.push(self.received);
        }
        self.reference.push(v);
        status
    }

    /// Attaches `marker` to the last recorded vector and returns its index.
    pub fn add_marker(&mut self, marker: Marker) -> usize {
        let index = self.reference.len().saturating_sub(1);
        let _ = crate::log_debug!(self.logger, "marker {} at index {}", marker, index);
        self.markers.insert(index, marker);
        index
    }

    pub fn reference(&self) -> &[FeatureVector] {
        &self.reference
    }

    pub fn markers(&self) -> &BTreeMap<usize, Marker> {
        &self.markers
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn gate_mut(&mut self) -> &mut ActivityGate {
        &mut self.gate
    }

    pub fn write<W: Write>(
        &self,
        mut out: W,
        pages: &[String],
        window_seconds: f64,
        hop_seconds: f64,
        sample_rate: f64
    ) -> Result<()> {
        writeln!(out, "{}={}", WINDOW_KEY, window_seconds)?;
        writeln!(out, "{}={}", HOP_KEY, hop_seconds)?;
        writeln!(out, "{}={}", RATE_KEY, sample_rate)?;
        writeln!(out)?;
        for page in pages {
            writeln!(out, "{}={}", PAGE_KEY, page)?;
        }
        writeln!(out)?;

        for (i, v) in self.reference.iter().enumerate() {
            if let Some(times) = &self.times {
                let ordinal = times.get(i).copied().unwrap_or(1);
                write!(out, "{}:", ((ordinal - 1) as f64) * hop_seconds)?;
            }
            write!(out, "{}", v)?;
            if let Some(marker) = self.markers.get(&i) {
                write!(out, " {}", marker)?;
            }
            writeln!(out)?;
        }
        out.flush()?;
        let _ = crate::log_info!(
            self.logger,
            "wrote {} reference vectors, {} markers",
            self.reference.len(),
            self.markers.len()
        );
        Ok(())
    }
}
