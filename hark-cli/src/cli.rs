//! CLI argument definitions and the batch transcription driver.
//!
//! Each file is streamed in fixed-size chunks through its own recognizer.
//! Files are spread over a pool of worker threads that share one model.
//! One JSON line is printed per result: every detected endpoint yields a
//! `result`, the end of the file a `final_result`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use hark_core::audio::wav::read_wav_mono;
use hark_core::fst::{FstArc, VectorFst};
use hark_core::inference::stub::{StubConfig, StubEngine};
use hark_core::symbols::EPSILON;
use hark_core::{AudioData, Model, ModelBuilder, Recognizer, RecognizerConfig, SymbolTable};
use parking_lot::Mutex;
use tracing::{info, warn};

const DEFAULT_WORDS: [&str; 9] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];

#[derive(Debug, Parser)]
#[command(name = "hark")]
#[command(about = "Streaming speech recognition over WAV files")]
#[command(version)]
pub struct Cli {
    /// Recognizer config (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Symbol table in `words.txt` format (default: the digits one..nine)
    #[arg(short, long)]
    pub words: Option<PathBuf>,

    /// Restrict recognition to these whitespace-separated words
    #[arg(short, long)]
    pub grammar: Option<String>,

    /// Audio chunk fed per call, in milliseconds
    #[arg(long, default_value_t = 200, value_parser = clap::value_parser!(u64).range(10..=60_000))]
    pub chunk_ms: u64,

    /// Worker threads
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..=64))]
    pub jobs: u64,

    /// Log verbosity: negative for warnings only, 0 info, 1 debug, 2 trace
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub log_level: i32,

    /// Print word timings and confidences instead of the plain text
    #[arg(long)]
    pub metadata: bool,

    /// WAV files to transcribe
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

/// Word loop over every word in the table.
fn vocabulary_loop(words: &SymbolTable) -> VectorFst {
    let mut fst = VectorFst::new();
    let s = fst.add_state();
    fst.set_start(s);
    fst.set_final(s, 0.0);
    for id in words.ids().into_iter().filter(|&id| id != EPSILON) {
        fst.add_arc(s, FstArc::new(id, id, 0.0, s));
    }
    fst
}

fn load_model(cli: &Cli) -> Result<Arc<Model>> {
    let config = match &cli.config {
        Some(path) => RecognizerConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RecognizerConfig::default(),
    };

    let words = match &cli.words {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            SymbolTable::from_text(&text)?
        }
        None => SymbolTable::from_words(DEFAULT_WORDS)?,
    };

    let grammar = vocabulary_loop(&words);
    let engine = StubEngine::new(StubConfig {
        subsampling: config.frame_subsampling_factor,
        ..StubConfig::default()
    });
    let model = ModelBuilder::new(engine, words)
        .config(config)
        .lookahead(VectorFst::new(), grammar, Vec::new())
        .build()?;
    Ok(model)
}

fn transcribe_file(model: &Arc<Model>, cli: &Cli, path: &Path) -> Result<Vec<String>> {
    let audio = read_wav_mono(path).with_context(|| format!("failed to read {}", path.display()))?;
    let sample_rate = audio.sample_rate as f32;
    let mut rec = match &cli.grammar {
        Some(grammar) => Recognizer::with_grammar(Arc::clone(model), sample_rate, grammar, true)?,
        None => Recognizer::new(Arc::clone(model), sample_rate, true)?,
    };

    let chunk = (u64::from(audio.sample_rate) * cli.chunk_ms / 1000).max(1) as usize;
    let mut lines = Vec::new();
    for samples in audio.samples.chunks(chunk) {
        if rec.ingest(AudioData::Float(samples))? {
            let result = rec.result();
            lines.push(result.to_json()?);
        }
    }
    let result = rec.final_result();
    if cli.metadata {
        lines.push(rec.metadata().to_json()?);
    } else {
        lines.push(result.to_json()?);
    }

    info!(
        file = %path.display(),
        seconds = audio.duration_secs(),
        results = lines.len(),
        "file transcribed"
    );
    Ok(lines)
}

/// Transcribe every file and return the JSON lines in input order.
///
/// # Errors
/// Model loading failures, or any file that could not be transcribed
/// (the others are still attempted).
pub fn transcribe_all(cli: &Cli) -> Result<Vec<String>> {
    let model = load_model(cli)?;

    let (job_tx, job_rx) = unbounded::<(usize, &Path)>();
    for (index, path) in cli.files.iter().enumerate() {
        job_tx.send((index, path.as_path())).ok().context("job queue closed")?;
    }
    drop(job_tx);

    let results: Mutex<Vec<(usize, Vec<String>)>> = Mutex::new(Vec::new());
    let failures = Mutex::new(0usize);

    let workers = usize::try_from(cli.jobs).unwrap_or(1).min(cli.files.len());
    thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let job_rx = job_rx.clone();
            let (model, results, failures) = (&model, &results, &failures);
            let handle = thread::Builder::new()
                .name(format!("hark-worker-{worker}"))
                .spawn_scoped(scope, move || {
                    for (index, path) in job_rx.iter() {
                        match transcribe_file(model, cli, path) {
                            Ok(lines) => results.lock().push((index, lines)),
                            Err(e) => {
                                warn!(file = %path.display(), "transcription failed: {e:#}");
                                *failures.lock() += 1;
                            }
                        }
                    }
                })
                .context("failed to spawn worker thread")?;
            handles.push(handle);
        }
        for handle in handles {
            if handle.join().is_err() {
                bail!("worker thread panicked");
            }
        }
        Ok(())
    })?;

    let failures = failures.into_inner();
    if failures > 0 {
        bail!("{failures} file(s) failed");
    }
    let mut results = results.into_inner();
    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().flat_map(|(_, lines)| lines).collect())
}

/// Execute CLI command - separated for testing.
pub fn run_cli(cli: Cli) -> Result<()> {
    hark_core::init_logging(cli.log_level);
    tracing::debug!(?cli, "parsed arguments");

    for line in transcribe_all(&cli)? {
        println!("{line}");
    }
    Ok(())
}
