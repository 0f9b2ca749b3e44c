//! Long-form transcription benchmark.
//!
//! For every `*.wav` under `--fixtures` with a sibling `.txt` reference:
//! transcribe through `Transcriber` + `HttpRecognizer`, score with WER and
//! time the job. Reports pooled WER per category and overall, plus mean
//! real-time factor, as JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cuttle_core::{
    calculate_wer, AlignmentResult, HttpRecognizer, HttpRecognizerConfig,
    RecognizerHandle, Strategy, Transcriber, TranscriberConfig, WavSource,
};

#[derive(Debug)]
struct Args {
    fixtures_dir: PathBuf,
    server: String,
    language: Option<String>,
    strategy: Strategy,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CaseResult {
    file: String,
    category: String,
    audio_seconds: f64,
    processing_seconds: f64,
    rtf: f64,
    segments: usize,
    hypothesis: String,
    wer: AlignmentResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CategorySummary {
    category: String,
    samples: usize,
    wer: AlignmentResult,
    mean_rtf: f64,
    p50_processing_seconds: f64,
    p95_processing_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    fixtures_dir: String,
    server: String,
    strategy: Strategy,
    total_files: usize,
    skipped_files: usize,
    failed_files: usize,
    wer: AlignmentResult,
    mean_rtf: f64,
    categories: Vec<CategorySummary>,
    cases: Vec<CaseResult>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("benchmark failed: {e:#}");
        std::process::exit(1);
    }
}

fn parse_args() -> Result<Args> {
    let mut fixtures_dir: Option<PathBuf> = None;
    let mut server = HttpRecognizerConfig::default().base_url;
    let mut language: Option<String> = None;
    let mut strategy = Strategy::Streaming;
    let mut config: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |name: &str| {
            it.next()
                .with_context(|| format!("missing value for {name}"))
        };
        match arg.as_str() {
            "--fixtures" => fixtures_dir = Some(PathBuf::from(value("--fixtures")?)),
            "--server" => server = value("--server")?,
            "--language" => language = Some(value("--language")?),
            "--strategy" => {
                strategy = match value("--strategy")?.as_str() {
                    "streaming" => Strategy::Streaming,
                    "silence" => Strategy::SilenceCuts,
                    other => bail!("unknown strategy: {other} (expected streaming|silence)"),
                }
            }
            "--config" => config = Some(PathBuf::from(value("--config")?)),
            "--output" => output = Some(PathBuf::from(value("--output")?)),
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p cuttle-core --features http --bin benchmark -- \\
  --fixtures <dir> [--server <url>] [--language <code>] \\
  [--strategy streaming|silence] [--config <transcriber.json>] [--output <report.json>]"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    Ok(Args {
        fixtures_dir: fixtures_dir.unwrap_or_else(|| PathBuf::from("benchmarks/fixtures")),
        server,
        language,
        strategy,
        config,
        output,
    })
}

fn collect_wavs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_wavs(&path, out)?;
            continue;
        }
        let is_wav = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.eq_ignore_ascii_case("wav"));
        if is_wav {
            out.push(path);
        }
    }
    Ok(())
}

/// `fleurs-<lang>-*` files group by language; everything else is "other".
fn category_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    stem.strip_prefix("fleurs-")
        .and_then(|rest| rest.split('-').next())
        .filter(|lang| !lang.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "other".into())
}

fn reference_for(path: &Path) -> Option<String> {
    std::fs::read_to_string(path.with_extension("txt"))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn wav_seconds(path: &Path) -> Result<f64> {
    let reader = hound::WavReader::open(path)?;
    let rate = reader.spec().sample_rate.max(1);
    Ok(f64::from(reader.duration()) / f64::from(rate))
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn pooled(rows: &[&CaseResult]) -> AlignmentResult {
    rows.iter()
        .fold(AlignmentResult::from_counts(0, 0, 0, 0, 0), |acc, r| {
            acc.merge(&r.wer)
        })
}

fn summarize(category: String, rows: &[&CaseResult]) -> CategorySummary {
    let processing = rows.iter().map(|r| r.processing_seconds).collect::<Vec<_>>();
    CategorySummary {
        category,
        samples: rows.len(),
        wer: pooled(rows),
        mean_rtf: mean(rows.iter().map(|r| r.rtf)),
        p50_processing_seconds: percentile(&processing, 0.50),
        p95_processing_seconds: percentile(&processing, 0.95),
    }
}

fn build_transcriber(args: &Args) -> Result<Transcriber> {
    let recognizer = HttpRecognizer::new(HttpRecognizerConfig {
        base_url: args.server.clone(),
        language: args.language.clone(),
        ..HttpRecognizerConfig::default()
    })?;
    let handle = RecognizerHandle::new(recognizer);
    let window = handle.max_duration_secs();

    let mut config = match &args.config {
        Some(path) => TranscriberConfig::load(path)?,
        None => {
            let mut config = TranscriberConfig::default();
            // Keep target + tolerance inside the served model's window.
            config.chooser.max_chunk_duration =
                (window - config.chooser.tolerance).min(config.chooser.max_chunk_duration);
            config
        }
    };
    config.strategy = args.strategy;

    let transcriber = Transcriber::new(config, handle)?;
    transcriber
        .warm_up()
        .with_context(|| format!("ASR server at {} is not ready", args.server))?;
    Ok(transcriber)
}

fn run() -> Result<()> {
    let args = parse_args()?;
    if !args.fixtures_dir.exists() {
        bail!("fixtures directory not found: {}", args.fixtures_dir.display());
    }

    let mut wav_files = Vec::new();
    collect_wavs(&args.fixtures_dir, &mut wav_files)?;
    wav_files.sort();
    if wav_files.is_empty() {
        bail!("no .wav fixtures found in {}", args.fixtures_dir.display());
    }

    info!(
        fixtures = wav_files.len(),
        server = %args.server,
        strategy = ?args.strategy,
        "running benchmark"
    );

    let transcriber = build_transcriber(&args)?;
    let source = WavSource::new(transcriber.config().target_sample_rate);
    let cancel = AtomicBool::new(false);

    let mut cases = Vec::new();
    let mut skipped = 0usize;
    let mut failed = 0usize;
    for wav in &wav_files {
        let file = wav
            .strip_prefix(&args.fixtures_dir)
            .unwrap_or(wav)
            .display()
            .to_string();
        let Some(reference) = reference_for(wav) else {
            warn!(%file, "no reference transcript; skipping");
            skipped += 1;
            continue;
        };

        let audio_seconds = match wav_seconds(wav) {
            Ok(secs) => secs,
            Err(e) => {
                warn!(%file, error = %e, "decode failed; skipping");
                failed += 1;
                continue;
            }
        };

        let started = Instant::now();
        let transcript = match transcriber.transcribe_file(&source, wav, &cancel) {
            Ok(t) => t,
            Err(e) => {
                warn!(%file, error = %e, "transcription failed");
                failed += 1;
                continue;
            }
        };
        let processing_seconds = started.elapsed().as_secs_f64();
        let rtf = if audio_seconds > 0.0 {
            processing_seconds / audio_seconds
        } else {
            0.0
        };
        let wer = calculate_wer(&reference, &transcript.full_text);

        info!(
            %file,
            wer = wer.error_rate,
            rtf,
            segments = transcript.segments.len(),
            "scored"
        );

        cases.push(CaseResult {
            category: category_for(wav),
            file,
            audio_seconds,
            processing_seconds,
            rtf,
            segments: transcript.segments.len(),
            hypothesis: transcript.full_text,
            wer,
        });
    }

    let mut grouped: BTreeMap<String, Vec<&CaseResult>> = BTreeMap::new();
    for row in &cases {
        grouped.entry(row.category.clone()).or_default().push(row);
    }
    let categories = grouped
        .into_iter()
        .map(|(name, rows)| summarize(name, &rows))
        .collect::<Vec<_>>();

    let overall = pooled(&cases.iter().collect::<Vec<_>>());
    let mean_rtf = mean(cases.iter().map(|r| r.rtf));
    let summary = Summary {
        fixtures_dir: args.fixtures_dir.display().to_string(),
        server: args.server.clone(),
        strategy: args.strategy,
        total_files: wav_files.len(),
        skipped_files: skipped,
        failed_files: failed,
        wer: overall,
        mean_rtf,
        categories,
        cases,
    };

    info!(
        scored = summary.cases.len(),
        wer = summary.wer.error_rate,
        mean_rtf = summary.mean_rtf,
        "benchmark finished"
    );

    let json = serde_json::to_string_pretty(&summary)?;
    if let Some(out) = args.output {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&out, json).with_context(|| format!("writing {}", out.display()))?;
        println!("Wrote benchmark report: {}", out.display());
    } else {
        println!("{json}");
    }

    Ok(())
}
