use thiserror::Error;

/// Errors surfaced by the analysis and matching core.
///
/// Over-budget analysis and an emptied belief are deliberately absent: the
/// first is only logged, the second is recovered from inside the matcher.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("hop has {actual} samples, analyzer expects {expected}")]
    HopLength {
        expected: usize,
        actual: usize,
    },

    #[error("reference line {line}: {message}")]
    Score {
        line: usize,
        message: String,
    },

    #[error("fft failed: {0}")]
    Fft(String),

    #[error("audio: {0}")]
    Audio(String),

    #[error(transparent)] Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
