use std::fs;
use std::io::Cursor;

use score_follower::config::Parameters;
use score_follower::error::Error;
use score_follower::feature::FeatureKind;
use score_follower::gate::Status;
use score_follower::pager::Marker;
use score_follower::score::{ ReferenceRecorder, ScoreFile };

fn vector_line(seed: usize) -> String {
    let values: Vec<String> = (0..12)
        .map(|b| format!("{}", (((b * 7 + seed) % 12) as f64) / 11.0))
        .collect();
    format!("{} 0.{}", values.join(" "), seed + 1)
}

#[test]
fn open_reads_a_file_from_disk() {
    let path = std::env::temp_dir().join(format!("score-follower-{}.score", std::process::id()));
    let text = format!(
        "windowSize=0.2\nhopSize=0.1\n\n{}\n{} 2 0.5 0.5\n",
        vector_line(0),
        vector_line(1)
    );
    fs::write(&path, text).unwrap();

    let score = ScoreFile::open(&path, FeatureKind::LinearSumChroma).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(score.reference().len(), 2);
    assert_eq!(score.reference()[1].rms(), 0.2);
    assert_eq!(score.markers().get(&1), Some(&Marker { page: 2, x: 0.5, y: 0.5 }));
    assert_eq!(score.sample_rate(), None);
    assert_eq!(score.times(), &[None, None]);

    let p = score.parameters(&Parameters::default()).unwrap();
    assert_eq!((p.window_seconds, p.hop_seconds), (0.2, 0.1));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = ScoreFile::open("/nonexistent/ref.score", FeatureKind::LogSumChroma).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn settings_tolerate_spaces_and_comments() {
    let text = format!("# take 3\n  windowSize = 0.25 \nhopSize=0.25\n# page=skipped.png\n{}\n", vector_line(3));
    let score = ScoreFile::parse(Cursor::new(text), FeatureKind::LogChroma).unwrap();
    assert_eq!(score.window_seconds().unwrap(), 0.25);
    assert!(score.pages().is_empty());
    assert_eq!(score.reference().len(), 1);
}

#[test]
fn hop_longer_than_window_fails_at_matcher_construction() {
    let text = format!("windowSize=0.1\nhopSize=0.2\n{}\n", vector_line(0));
    let score = ScoreFile::parse(Cursor::new(text), FeatureKind::LogSumChroma).unwrap();
    assert!(matches!(score.into_parts(&Parameters::default()), Err(Error::InvalidConfig(_))));
}

#[test]
fn written_file_parses_back_identically() {
    let kind = FeatureKind::LinearChroma;
    let mut recorder = ReferenceRecorder::new(8.0);
    recorder.gate_mut().force_start();
    for seed in 0..5 {
        let values: Vec<f64> = vector_line(seed)
            .split_whitespace()
            .map(|s| s.parse().unwrap())
            .collect();
        assert_eq!(recorder.add_data(kind.from_values(&values).unwrap()), Status::Active);
    }
    recorder.add_marker(Marker { page: 0, x: 0.125, y: 0.875 });

    let pages = vec!["a.png".to_string(), "b.png".to_string()];
    let mut out = Vec::new();
    recorder.write(&mut out, &pages, 0.25, 0.125, 48000.0).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("windowSize=0.25\nhopSize=0.125\nframerate=48000\n"));

    let score = ScoreFile::parse(Cursor::new(text), kind).unwrap();
    assert_eq!(score.reference(), recorder.reference());
    assert_eq!(score.pages(), pages.as_slice());
    assert_eq!(score.markers().len(), 1);
    assert_eq!(score.markers()[&4], Marker { page: 0, x: 0.125, y: 0.875 });
    // times were not requested
    assert!(score.times().iter().all(Option::is_none));
}
