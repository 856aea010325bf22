use std::fs::OpenOptions;
use std::io::{ self, Write };
use std::str::FromStr;
use std::sync::Mutex;
use chrono::Utc;

//  order of log (Debug < Info < Warning < Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
}

impl LogLevel {
    fn as_str(&self) -> &str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other =>
                Err(
                    format!("Invalid log level: {}. Valid options: debug, info, warning, error", other)
                ),
        }
    }
}

/// Where log lines go: an append-only file, stderr, both, or nowhere.
pub struct Logger {
    file_path: Option<String>,
    write_mutex: Mutex<()>,
    echo_stderr: bool,
    min_level: LogLevel,
}

impl Logger {
    pub fn new(file_path: &str, min_level: LogLevel) -> Result<Self, io::Error> {
        // ensure file exists
        OpenOptions::new().create(true).append(true).open(file_path)?;
        Ok(Logger {
            file_path: Some(file_path.to_string()),
            write_mutex: Mutex::new(()),
            echo_stderr: false,
            min_level,
        })
    }

    pub fn stderr(min_level: LogLevel) -> Self {
        Logger {
            file_path: None,
            write_mutex: Mutex::new(()),
            echo_stderr: true,
            min_level,
        }
    }

    /// Drops everything. Used by library components nobody attached a logger to.
    pub fn disabled() -> Self {
        Logger {
            file_path: None,
            write_mutex: Mutex::new(()),
            echo_stderr: false,
            min_level: LogLevel::Error,
        }
    }

    pub fn with_stderr_echo(mut self, echo: bool) -> Self {
        self.echo_stderr = echo;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.file_path.is_some() || self.echo_stderr
    }

    fn should_log(&self, level: LogLevel) -> bool {
        self.is_enabled() && level >= self.min_level
    }

    pub fn log(&self, level: LogLevel, message: &str) -> Result<(), io::Error> {
        if !self.should_log(level) {
            return Ok(());
        }

        let _guard = self.write_mutex.lock().unwrap_or_else(|p| p.into_inner());

        let timestamp = Utc::now();
        let formatted_message = format!(
            "[{}] [{}] {}\n",
            timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            level.as_str(),
            message
        );

        if self.echo_stderr {
            eprint!("{}", formatted_message);
        }
        if let Some(path) = &self.file_path {
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(formatted_message.as_bytes())?;
            file.flush()?;
        }
        Ok(())
    }

    pub fn log_fmt(&self, level: LogLevel, args: std::fmt::Arguments) -> Result<(), io::Error> {
        if !self.should_log(level) {
            return Ok(());
        }
        self.log(level, &format!("{}", args))
    }

    pub fn info(&self, message: &str) -> Result<(), io::Error> {
        self.log(LogLevel::Info, message)
    }
    pub fn warn(&self, message: &str) -> Result<(), io::Error> {
        self.log(LogLevel::Warning, message)
    }
    pub fn error(&self, message: &str) -> Result<(), io::Error> {
        self.log(LogLevel::Error, message)
    }
    pub fn debug(&self, message: &str) -> Result<(), io::Error> {
        self.log(LogLevel::Debug, message)
    }

    pub fn info_fmt(&self, args: std::fmt::Arguments) -> Result<(), io::Error> {
        self.log_fmt(LogLevel::Info, args)
    }
    pub fn warn_fmt(&self, args: std::fmt::Arguments) -> Result<(), io::Error> {
        self.log_fmt(LogLevel::Warning, args)
    }
    pub fn error_fmt(&self, args: std::fmt::Arguments) -> Result<(), io::Error> {
        self.log_fmt(LogLevel::Error, args)
    }
    pub fn debug_fmt(&self, args: std::fmt::Arguments) -> Result<(), io::Error> {
        self.log_fmt(LogLevel::Debug, args)
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }
    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[macro_export]
macro_rules! log_info {
    (
        $logger:expr,
        $($arg:tt)*
    ) => {
        $logger.info_fmt(format_args!($($arg)*))
    };
}
#[macro_export]
macro_rules! log_warn {
    (
        $logger:expr,
        $($arg:tt)*
    ) => {
        $logger.warn_fmt(format_args!($($arg)*))
    };
}
#[macro_export]
macro_rules! log_error {
    (
        $logger:expr,
        $($arg:tt)*
    ) => {
        $logger.error_fmt(format_args!($($arg)*))
    };
}
#[macro_export]
macro_rules! log_debug {
    (
        $logger:expr,
        $($arg:tt)*
    ) => {
        $logger.debug_fmt(format_args!($($arg)*))
    };
}
