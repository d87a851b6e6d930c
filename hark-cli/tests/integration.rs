//! Integration tests for the hark CLI.

use std::path::PathBuf;

use clap::Parser;
use hark_cli::cli::{transcribe_all, Cli};

/// 16 kHz mono WAV of `(amplitude, milliseconds)` pieces.
fn write_wav(name: &str, pieces: &[(i16, usize)]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("hark-cli-{}-{name}", std::process::id()));
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
    for &(amplitude, ms) in pieces {
        for _ in 0..16 * ms {
            writer.write_sample(amplitude).expect("write sample");
        }
    }
    writer.finalize().expect("finalize wav");
    path
}

#[test]
fn transcribes_files_in_input_order() {
    let first = write_wav("first.wav", &[(2_000, 300), (3_000, 300)]);
    let second = write_wav("second.wav", &[(0, 200), (9_000, 300)]);
    let cli = Cli::parse_from([
        "hark".as_ref(),
        "--jobs".as_ref(),
        "2".as_ref(),
        first.as_os_str(),
        second.as_os_str(),
    ]);

    let lines = transcribe_all(&cli).expect("transcribe");
    std::fs::remove_file(&first).ok();
    std::fs::remove_file(&second).ok();

    assert_eq!(lines, [r#"{"text":"two three"}"#, r#"{"text":"nine"}"#]);
}

#[test]
fn metadata_flag_prints_word_timings() {
    let path = write_wav("metadata.wav", &[(1_000, 300)]);
    let cli = Cli::parse_from(["hark".as_ref(), "--metadata".as_ref(), path.as_os_str()]);

    let lines = transcribe_all(&cli).expect("transcribe");
    std::fs::remove_file(&path).ok();

    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with(r#"{"text":"one","words":[{"word":"one","start":0.0,"#));
}

#[test]
fn grammar_limits_the_output() {
    let path = write_wav("grammar.wav", &[(2_000, 300), (3_000, 300)]);
    let cli = Cli::parse_from([
        "hark".as_ref(),
        "--grammar".as_ref(),
        "three".as_ref(),
        path.as_os_str(),
    ]);

    let lines = transcribe_all(&cli).expect("transcribe");
    std::fs::remove_file(&path).ok();

    assert_eq!(lines, [r#"{"text":"three"}"#]);
}

#[test]
fn missing_file_is_an_error() {
    let cli = Cli::parse_from(["hark", "/nonexistent/hark-cli-missing.wav"]);
    let err = transcribe_all(&cli).expect_err("missing file");
    assert!(err.to_string().contains("1 file(s) failed"));
}
