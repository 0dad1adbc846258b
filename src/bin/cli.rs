// Hoerbuch - Narrated audiobooks from text documents
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::Context;
use clap::{CommandFactory, Parser};
use hoerbuch::audio::{AudioConverter, PiperEngine};
use hoerbuch::chapters::marker::BookMetadata;
use hoerbuch::chapters::selection::{resolve_arguments, ChapterArg, ChapterMode};
use hoerbuch::config::{
    current_language, default_locale_dirs, default_model_dirs, find_voice_model, Messages,
    NarratorConfig, Padding,
};
use hoerbuch::document::load_document;
use hoerbuch::{ChapterOutcome, FfmpegBackend, HoerbuchError, Narrator};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hoerbuch", version)]
#[command(
    about = "Convert text documents (.txt, .docx, .odt, .epub) to OGG audio using Piper TTS, with optional MP3 conversion and chapter control."
)]
struct Cli {
    /// Show debug messages
    #[arg(short, long)]
    debug: bool,

    /// Optional ONNX voice file path
    #[arg(long)]
    voice: Option<PathBuf>,

    /// Convert OGG output to MP3 format with chapter tags (requires ffmpeg)
    #[arg(short, long)]
    mp3: bool,

    /// TTS speech rate multiplier (1.0 = normal, 0.9 = slower)
    #[arg(short, long, default_value_t = 1.0)]
    speed: f32,

    /// Interactive (-k) or direct chapter (e.g. -k 5). Position independent.
    #[arg(
        short = 'k',
        long = "chapters",
        value_name = "CHAPTER",
        num_args = 0..=1,
        allow_negative_numbers = true
    )]
    chapters: Option<Option<String>>,

    /// Input file path (.txt, .docx, .odt, .epub)
    input: Option<String>,
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    if std::env::args_os().len() <= 1 {
        let _ = Cli::command().print_help();
        println!();
        return ExitCode::SUCCESS;
    }

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let messages = Messages::load(&default_locale_dirs(), &current_language());

    match run(cli, messages.clone()).await {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<HoerbuchError>() {
                Some(err @ HoerbuchError::FileAlreadyExists(_)) => {
                    eprintln!("{}", err.user_message());
                }
                Some(err) => {
                    eprintln!("{}", messages.fill("Error: {msg}", &[("msg", &err.user_message())]));
                    tracing::debug!("{:?}", e);
                }
                None => eprintln!("{}", messages.fill("Critical error: {msg}", &[("msg", &format!("{:#}", e))])),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, messages: Messages) -> anyhow::Result<ExitCode> {
    let resolved = resolve_arguments(ChapterArg::from(cli.chapters), cli.input, |candidate| {
        Path::new(candidate).exists()
    });

    let input = match resolved.input {
        Some(input) => PathBuf::from(input),
        None => {
            let _ = Cli::command().print_help();
            anyhow::bail!(HoerbuchError::invalid_input("an input file is required"));
        }
    };

    if !input.exists() {
        return Err(HoerbuchError::FileNotFound(input.display().to_string()).into());
    }

    let model = find_voice_model(cli.voice.as_deref(), &default_model_dirs())?;
    println!("{}", messages.fill("Using voice from: {file}", &[("file", &model.display())]));

    let config = NarratorConfig {
        voice_model: model.clone(),
        speed: cli.speed,
        convert_to_mp3: cli.mp3,
        padding: Padding::default(),
        messages: messages.clone(),
    };
    config.validate()?;

    println!("{}", messages.fill("Loading voice from: {file}", &[("file", &model.display())]));
    let engine = PiperEngine::load(&model, config.speed).await?;
    engine.check_installed().await?;
    if engine.length_scale().is_some() {
        println!(
            "{}",
            messages.fill("-> TTS speed adjusted to: {speed} (1.0 = normal)", &[("speed", &config.speed)])
        );
    }

    if config.convert_to_mp3 {
        AudioConverter::check_ffmpeg().await?;
    }

    let document = load_document(&input, &messages)
        .await
        .with_context(|| format!("reading {}", input.display()))?;

    if document.segments.is_empty() {
        println!("{}", messages.tr("Warning: Document contains no extractable text segments."));
        return Ok(ExitCode::SUCCESS);
    }

    let metadata = BookMetadata::resolve(document.title, document.author, &input);
    println!(
        "{}",
        messages.fill(
            "Using title: '{title}', artist: '{artist}'",
            &[("title", &metadata.title), ("artist", &metadata.artist)],
        )
    );

    let (mode, not_found) = ChapterMode::select(&resolved.request, document.segments.len());
    if let Some(not_found) = not_found {
        println!(
            "{}",
            messages.fill(
                "Warning: chapter {n} not found (document has {m} chapters).",
                &[("n", &not_found.requested), ("m", &not_found.available)],
            )
        );
    }

    let mut narrator = Narrator::new(config, engine, FfmpegBackend::default());
    let mut stdin = BufReader::new(tokio::io::stdin());

    let outcome = narrator
        .run_chapter_mode(mode, &input, &document.segments, &metadata, &mut stdin)
        .await?;

    if let ChapterOutcome::Split(report) = &outcome {
        if !report.failed.is_empty() {
            tracing::warn!("{} chapters failed", report.failed.len());
        }
    }

    Ok(ExitCode::SUCCESS)
}
