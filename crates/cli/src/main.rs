#![deny(warnings)]

use anyhow::Context;
use clap::{ArgGroup, Parser, ValueEnum};
use serde::Serialize;
use speech_emotion_core::config::{
    resolve_model_path, resolve_optional_string, AppConfig, ClipPolicy, Env, ExtractionParams,
    InputSource, OutputFormat, StdEnv, DEFAULT_FRAME_LENGTH_S, DEFAULT_HOP_LENGTH_S,
    DEFAULT_N_MFCC, DEFAULT_PREEMPHASIS, ENV_DIAGNOSTICS_DIR,
};
use speech_emotion_core::decode::SymphoniaDecoder;
use speech_emotion_core::emotion::{EmotionCode, SvmClassifier};
use speech_emotion_core::features::{mel_spectrogram_db, MelSpectrogram};
use speech_emotion_core::pipeline::{
    list_audio_files, Classification, ClipOutcome, ClipPipeline, ClipReport, ClipSource,
};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

type Pipeline = ClipPipeline<SymphoniaDecoder, SvmClassifier>;

#[derive(Parser, Debug)]
#[command(name = "speech-emotion")]
#[command(about = "Classify the emotion of short speech clips (MFCC features + SVM)")]
#[command(group(
    ArgGroup::new("input")
        .required(true)
        .multiple(false)
        .args(["file", "dir"])
))]
struct Args {
    /// Audio file to classify; `-` reads the clip from stdin
    #[arg(long)]
    file: Option<PathBuf>,

    /// Directory of .wav files to classify
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Model artifact (JSON). Falls back to $SPEECH_EMOTION_MODEL
    #[arg(long)]
    model: Option<String>,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Write waveform + mel-spectrogram data per classified clip here
    #[arg(long)]
    diagnostics_dir: Option<String>,

    #[arg(long, default_value_t = DEFAULT_N_MFCC)]
    n_mfcc: usize,

    #[arg(long, default_value_t = DEFAULT_FRAME_LENGTH_S)]
    frame_length: f64,

    #[arg(long, default_value_t = DEFAULT_HOP_LENGTH_S)]
    hop_length: f64,

    #[arg(long, default_value_t = DEFAULT_PREEMPHASIS)]
    preemphasis: f32,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
        }
    }
}

#[derive(Debug, Default)]
struct Summary {
    classified: usize,
    rejected: usize,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    source: &'a str,
    emotion: Option<EmotionCode>,
    label: Option<&'static str>,
    duration_s: Option<f64>,
    features: Option<&'a [f32]>,
    rejection: Option<&'static str>,
    message: Option<String>,
}

#[derive(Serialize)]
struct Diagnostics<'a> {
    source: &'a str,
    emotion: EmotionCode,
    sample_rate: u32,
    duration_s: f64,
    features: &'a [f32],
    waveform: &'a [f32],
    mel_spectrogram: MelSpectrogram,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let cfg = build_config(args, &StdEnv)?;

    tracing::info!(
        model = %cfg.model_path.as_path().display(),
        n_mfcc = cfg.extraction.n_mfcc,
        "config loaded"
    );

    let classifier = SvmClassifier::load(cfg.model_path.as_path(), cfg.extraction.n_mfcc)
        .with_context(|| {
            format!(
                "failed to load model {}",
                cfg.model_path.as_path().display()
            )
        })?;
    let pipeline = ClipPipeline::new(
        SymphoniaDecoder::new(),
        classifier,
        cfg.extraction,
        cfg.clip,
    )?;
    tracing::debug!(classes = ?pipeline.classifier().classes(), "model ready");

    let sources = collect_sources(&cfg.input)?;
    if sources.is_empty() {
        tracing::warn!("no audio files found");
    }

    let mut out = std::io::stdout().lock();
    let summary = run_batch(&pipeline, &sources, &cfg, &mut out)?;
    tracing::info!(
        classified = summary.classified,
        rejected = summary.rejected,
        "done"
    );

    Ok(())
}

#[cfg(not(feature = "parallel"))]
fn run_batch(
    pipeline: &Pipeline,
    sources: &[ClipSource],
    cfg: &AppConfig,
    out: &mut impl Write,
) -> anyhow::Result<Summary> {
    let mut summary = Summary::default();
    for report in pipeline.run(sources) {
        emit(&report?, cfg, &mut summary, out)?;
    }
    Ok(summary)
}

#[cfg(feature = "parallel")]
fn run_batch(
    pipeline: &Pipeline,
    sources: &[ClipSource],
    cfg: &AppConfig,
    out: &mut impl Write,
) -> anyhow::Result<Summary> {
    let mut summary = Summary::default();
    for report in pipeline.run_parallel(sources) {
        emit(&report?, cfg, &mut summary, out)?;
    }
    Ok(summary)
}

fn emit(
    report: &ClipReport,
    cfg: &AppConfig,
    summary: &mut Summary,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    if report.outcome.is_classified() {
        summary.classified += 1;
    } else {
        summary.rejected += 1;
    }
    if let (ClipOutcome::Classified(c), Some(dir)) = (&report.outcome, &cfg.diagnostics_dir) {
        write_diagnostics(dir, &report.source, c)?;
    }

    match cfg.output {
        OutputFormat::Text => writeln!(out, "{report}")?,
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(&json_report(report))?)?,
    }
    Ok(())
}

fn json_report(report: &ClipReport) -> JsonReport<'_> {
    match &report.outcome {
        ClipOutcome::Classified(c) => JsonReport {
            source: &report.source,
            emotion: Some(c.emotion),
            label: Some(c.emotion.name()),
            duration_s: Some(c.clip.source_duration_s()),
            features: Some(c.features.as_slice()),
            rejection: None,
            message: None,
        },
        ClipOutcome::Rejected(reason) => JsonReport {
            source: &report.source,
            emotion: None,
            label: None,
            duration_s: reason.duration_s(),
            features: None,
            rejection: Some(reason.kind()),
            message: Some(reason.to_string()),
        },
    }
}

/// Writes `<file name>.json`. The source extension is kept so `a.wav` and
/// `a.WAV` in one directory land in different files.
fn write_diagnostics(dir: &Path, source: &str, c: &Classification) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    let path = dir.join(diagnostics_file_name(source));

    let diagnostics = Diagnostics {
        source,
        emotion: c.emotion,
        sample_rate: c.clip.sample_rate(),
        duration_s: c.clip.source_duration_s(),
        features: c.features.as_slice(),
        waveform: c.clip.samples(),
        mel_spectrogram: mel_spectrogram_db(&c.clip),
    };
    let json = serde_json::to_vec(&diagnostics)?;
    std::fs::write(&path, json).with_context(|| format!("cannot write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "diagnostics written");
    Ok(path)
}

fn diagnostics_file_name(source: &str) -> String {
    let name = Path::new(source)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "clip".to_owned());
    format!("{name}.json")
}

fn collect_sources(input: &InputSource) -> anyhow::Result<Vec<ClipSource>> {
    Ok(match input {
        InputSource::File(path) => vec![ClipSource::File(path.clone())],
        InputSource::Directory(dir) => list_audio_files(dir)?
            .into_iter()
            .map(ClipSource::from)
            .collect(),
        InputSource::Stdin => {
            let mut bytes = Vec::new();
            std::io::stdin()
                .read_to_end(&mut bytes)
                .context("failed to read clip from stdin")?;
            vec![ClipSource::Memory {
                name: "stdin.wav".to_owned(),
                bytes,
            }]
        }
    })
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            level
                .parse()
                .with_context(|| format!("invalid --log-level: {level}"))?,
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_config(args: Args, env: &impl Env) -> anyhow::Result<AppConfig> {
    let input = match (args.file, args.dir) {
        (Some(f), None) if f.as_os_str() == "-" => InputSource::Stdin,
        (Some(f), None) => InputSource::File(f),
        (None, Some(d)) => InputSource::Directory(d),
        _ => anyhow::bail!("exactly one of --file or --dir must be provided"),
    };

    let model_path = resolve_model_path(args.model, env)?;
    let extraction = ExtractionParams::new(
        args.n_mfcc,
        args.frame_length,
        args.hop_length,
        args.preemphasis,
    )?;
    let diagnostics_dir =
        resolve_optional_string(args.diagnostics_dir, ENV_DIAGNOSTICS_DIR, env).map(PathBuf::from);

    Ok(AppConfig {
        input,
        model_path,
        extraction,
        clip: ClipPolicy::default(),
        output: args.format.into(),
        diagnostics_dir,
    })
}
