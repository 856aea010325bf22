//! src/main.rs

use anyhow::Result;
use std::{ env, str::FromStr, sync::Arc };

use score_follower::config::Parameters;
use score_follower::feature::FeatureKind;
use score_follower::logger::{ LogLevel, Logger };
use score_follower::window::WindowFunction;

// expose the split mode files in src/mods/
mod mods;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Build a reference file from a recording.
    Record,
    /// Follow a recorded performance against a reference, offline.
    Follow,
    /// Follow the default input device in real time.
    Live,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mode: Mode,
    pub log_path: String,
    pub log_level: LogLevel,
    pub quiet: bool,

    pub params: Parameters,

    /// Audio file to analyze (record, follow).
    pub input_path: String,
    /// Reference file to read (follow, live) or write (record).
    pub reference_path: String,
    /// Per-hop CSV written by follow mode; empty = beside the log.
    pub output_path: String,

    /// Page names written into a new reference.
    pub pages: Vec<String>,
    /// Place a marker every this many seconds while recording, 0 = none.
    pub marker_every_s: f64,
    /// Start matching at this reference index instead of unseeded.
    pub start_index: Option<i64>,
    /// Follow-mode error tolerance for the hit rate, seconds.
    pub tolerance_s: f64,
    /// Live-mode run time, 0 = until Ctrl+C.
    pub duration_s: f64,
    /// Preferred capture rate for live mode.
    pub capture_rate_hz: u32,
}

impl Default for Config {
    fn default() -> Self {
        let default_log = env
            ::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join("score-follower.log")
            .to_string_lossy()
            .into_owned();

        Self {
            mode: Mode::Live,
            log_path: default_log,
            log_level: LogLevel::Info,
            quiet: false,
            params: Parameters::default(),
            input_path: String::new(),
            reference_path: String::new(),
            output_path: String::new(),
            pages: Vec::new(),
            marker_every_s: 0.0,
            start_index: None,
            tolerance_s: 0.5,
            duration_s: 0.0,
            capture_rate_hz: 44_100,
        }
    }
}

fn print_usage(cfg: &Config) {
    let p = &cfg.params;
    println!("Usage: score-follower --mode <record|follow|live> [OPTIONS]\n");
    println!("General:");
    println!("  --log-path <PATH>             Log file (default: {})", cfg.log_path);
    println!("  --log-level <LEVEL>           debug, info, warning, error (default: info)");
    println!("  --quiet                       Do not echo log lines to stderr");
    println!();
    println!("Files:");
    println!("  --input <PATH>                Audio file (.wav/.mp3/.m4a/.ogg/.flac)");
    println!("  --reference <PATH>            Reference file to read, or to write in record mode");
    println!("  --output <PATH>               Follow-mode CSV (default: follow.csv beside the log)");
    println!();
    println!("Analysis:");
    println!("  --window <SECONDS>            Analysis window (default: {})", p.window_seconds);
    println!("  --hop <SECONDS>               Hop between windows (default: {})", p.hop_seconds);
    println!("  --window-fn <NAME>            rectangular, hann, hamming, blackman, blackman-harris (default: {})", p.window);
    println!("  --feature <NAME>              linear, log, linear-sum, log-sum, strain (default: {})", p.feature);
    println!("  --threshold-db <DB>           Activity threshold over the noise floor (default: {})", p.activity_threshold_db);
    println!();
    println!("Matching:");
    println!("  --search-window <SECONDS>     Search width around each candidate (default: {})", p.search_window_seconds);
    println!("  --retention-window <SECONDS>  Candidates kept around the best (default: {})", p.retention_window_seconds);
    println!("  --start-std <SECONDS>         Initial hop deviation (default: {})", p.start_std_seconds);
    println!("  --min-std <SECONDS>           Floor of the adapted deviation (default: {})", p.min_std_seconds);
    println!("  --start-index <N>             Seed the matcher at reference index N");
    println!();
    println!("Record mode:");
    println!("  --page <NAME>                 Page asset name, repeatable");
    println!("  --marker-every <SECONDS>      Marker interval, 0 = none (default: {})", cfg.marker_every_s);
    println!();
    println!("Follow / live mode:");
    println!("  --tolerance <SECONDS>         Hit-rate tolerance in follow mode (default: {})", cfg.tolerance_s);
    println!("  --duration <SECONDS>          Live run time, 0 = until Ctrl+C (default: {})", cfg.duration_s);
    println!("  --sample-rate <HZ>            Preferred live capture rate (default: {})", cfg.capture_rate_hz);
    println!();
    println!("Examples:");
    println!("  score-follower --mode record --input take1.wav --reference take1.score --marker-every 4");
    println!("  score-follower --mode follow --reference take1.score --input take2.wav");
    println!("  score-follower --mode live --reference take1.score --log-level debug");
}

fn value_of<'a>(args: &'a [String], i: usize, flag: &str) -> std::result::Result<&'a str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("Missing value for {}", flag))
}

fn parse_value<T: FromStr>(args: &[String], i: usize, flag: &str) -> std::result::Result<T, String> {
    let raw = value_of(args, i, flag)?;
    raw.parse::<T>().map_err(|_| format!("Invalid {} value: {}", flag, raw))
}

fn parse_arguments(args: &[String]) -> std::result::Result<Option<Config>, String> {
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "-h" | "--help" => {
                return Ok(None);
            }
            "--quiet" => {
                config.quiet = true;
                i += 1;
                continue;
            }
            "--mode" => {
                config.mode = match value_of(args, i, flag)?.to_lowercase().as_str() {
                    "record" => Mode::Record,
                    "follow" => Mode::Follow,
                    "live" => Mode::Live,
                    other => {
                        return Err(format!("Unknown mode: {}", other));
                    }
                };
            }
            "--log-path" => {
                config.log_path = value_of(args, i, flag)?.to_string();
            }
            "--log-level" => {
                config.log_level = value_of(args, i, flag)?.parse()?;
            }
            "--input" => {
                config.input_path = value_of(args, i, flag)?.to_string();
            }
            "--reference" => {
                config.reference_path = value_of(args, i, flag)?.to_string();
            }
            "--output" => {
                config.output_path = value_of(args, i, flag)?.to_string();
            }
            "--page" => {
                config.pages.push(value_of(args, i, flag)?.to_string());
            }
            "--window" => {
                config.params.window_seconds = parse_value(args, i, flag)?;
            }
            "--hop" => {
                config.params.hop_seconds = parse_value(args, i, flag)?;
            }
            "--window-fn" => {
                config.params.window = value_of(args, i, flag)?.parse::<WindowFunction>()?;
            }
            "--feature" => {
                config.params.feature = value_of(args, i, flag)?.parse::<FeatureKind>()?;
            }
            "--threshold-db" => {
                config.params.activity_threshold_db = parse_value(args, i, flag)?;
            }
            "--search-window" => {
                config.params.search_window_seconds = parse_value(args, i, flag)?;
            }
            "--retention-window" => {
                config.params.retention_window_seconds = parse_value(args, i, flag)?;
            }
            "--start-std" => {
                config.params.start_std_seconds = parse_value(args, i, flag)?;
            }
            "--min-std" => {
                config.params.min_std_seconds = parse_value(args, i, flag)?;
            }
            "--start-index" => {
                config.start_index = Some(parse_value::<i64>(args, i, flag)?.max(0));
            }
            "--marker-every" => {
                config.marker_every_s = parse_value::<f64>(args, i, flag)?.max(0.0);
            }
            "--tolerance" => {
                config.tolerance_s = parse_value::<f64>(args, i, flag)?.max(0.0);
            }
            "--duration" => {
                config.duration_s = parse_value::<f64>(args, i, flag)?.max(0.0);
            }
            "--sample-rate" => {
                config.capture_rate_hz = parse_value::<u32>(args, i, flag)?.max(1);
            }
            other => {
                return Err(format!("Unknown argument: {}", other));
            }
        }
        i += 2;
    }

    config.params.validate().map_err(|e| e.to_string())?;
    Ok(Some(config))
}

// ───────────────────────────────────────────────────────────────────────────────
// main
// ───────────────────────────────────────────────────────────────────────────────
fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let cli = match parse_arguments(&args) {
        Ok(Some(c)) => c,
        Ok(None) => {
            print_usage(&Config::default());
            return Ok(());
        }
        Err(e) => {
            eprintln!("error: {}\n", e);
            print_usage(&Config::default());
            std::process::exit(1);
        }
    };

    let logger = Arc::new(Logger::new(&cli.log_path, cli.log_level)?.with_stderr_echo(!cli.quiet));

    match cli.mode {
        Mode::Record => mods::record::run_record(&cli, logger),
        Mode::Follow => mods::follow::run_follow(&cli, logger),
        Mode::Live => mods::live::run_live(&cli, logger),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("score-follower")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parses_mode_paths_and_knobs() {
        let cfg = parse_arguments(
            &args(&[
                "--mode",
                "follow",
                "--reference",
                "a.score",
                "--input",
                "b.wav",
                "--hop",
                "0.125",
                "--feature",
                "linear",
                "--window-fn",
                "hamming",
                "--quiet",
                "--start-index",
                "12",
            ])
        )
            .unwrap()
            .unwrap();
        assert_eq!(cfg.mode, Mode::Follow);
        assert_eq!(cfg.reference_path, "a.score");
        assert_eq!(cfg.input_path, "b.wav");
        assert_eq!(cfg.params.hop_seconds, 0.125);
        assert_eq!(cfg.params.feature, FeatureKind::LinearChroma);
        assert_eq!(cfg.params.window, WindowFunction::Hamming);
        assert!(cfg.quiet);
        assert_eq!(cfg.start_index, Some(12));
    }

    #[test]
    fn pages_accumulate() {
        let cfg = parse_arguments(&args(&["--page", "p1.png", "--page", "p2.png"])).unwrap().unwrap();
        assert_eq!(cfg.pages, vec!["p1.png".to_string(), "p2.png".to_string()]);
    }

    #[test]
    fn help_and_errors() {
        assert!(parse_arguments(&args(&["--help"])).unwrap().is_none());
        assert!(parse_arguments(&args(&["--mode", "dance"])).is_err());
        assert!(parse_arguments(&args(&["--hop"])).is_err());
        assert!(parse_arguments(&args(&["--hop", "0.5"])).is_err());
        assert!(parse_arguments(&args(&["--bogus"])).is_err());
    }
}
