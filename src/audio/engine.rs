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

//! Speech engine seam and the segment synthesizer adapter
//!
//! # Engine contract
//! An engine turns one text string into a lazy, finite, non-restartable
//! sequence of mono 16-bit sample buffers at the engine's configured sample
//! rate. The sequence is pulled one buffer at a time with
//! [`AudioStream::next_chunk`]; `Ok(None)` marks its end.
//!
//! # Piper
//! [`PiperEngine`] drives the `piper` binary in raw output mode:
//! `piper --model <voice.onnx> --output-raw [--length-scale <x>]`.
//! Text goes in on stdin, little-endian PCM comes out on stdout. The voice's
//! sample rate is read from the `<voice.onnx>.json` file next to the model.

use crate::error::{HoerbuchError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

/// Bytes read from the engine per chunk (4096 samples)
const CHUNK_BYTES: usize = 8192;

/// Pull-based sequence of audio buffers for one piece of text
#[async_trait]
pub trait AudioStream: Send {
    /// Next buffer of samples, or `None` once the engine is done
    async fn next_chunk(&mut self) -> Result<Option<Vec<i16>>>;
}

/// Text-to-speech engine
#[async_trait]
pub trait SpeechEngine: Send {
    /// Sample rate of every buffer this engine produces
    fn sample_rate(&self) -> u32;

    /// Start synthesizing `text`
    async fn synthesize(&mut self, text: &str) -> Result<Box<dyn AudioStream>>;
}

/// Split segment text into blank-line separated paragraphs
///
/// Paragraphs are only an engine input granularity. Whitespace-only
/// paragraphs are dropped; text without any real paragraph is passed through
/// unchanged as a single paragraph.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .collect();

    if paragraphs.is_empty() {
        vec![text]
    } else {
        paragraphs
    }
}

/// Adapter around a [`SpeechEngine`] that synthesizes whole segments
///
/// Keeps a running count of every sample handed out, so the total synthesized
/// duration is always derived from real buffer lengths.
pub struct SegmentSynthesizer<E> {
    engine: E,
    samples_produced: u64,
}

impl<E: SpeechEngine> SegmentSynthesizer<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            samples_produced: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.engine.sample_rate()
    }

    /// Samples produced across all segments so far
    pub fn samples_produced(&self) -> u64 {
        self.samples_produced
    }

    /// Seconds of speech produced across all segments so far
    pub fn duration_seconds(&self) -> f64 {
        self.samples_produced as f64 / f64::from(self.sample_rate())
    }

    /// Lazily synthesize one segment's text
    pub fn segment<'a>(&'a mut self, text: &'a str) -> SegmentAudio<'a, E> {
        let SegmentSynthesizer {
            engine,
            samples_produced,
        } = self;

        SegmentAudio {
            engine,
            samples_produced,
            paragraphs: split_paragraphs(text).into_iter(),
            current: None,
        }
    }

    pub fn into_inner(self) -> E {
        self.engine
    }
}

/// Buffers for one segment, pulled paragraph by paragraph
pub struct SegmentAudio<'a, E> {
    engine: &'a mut E,
    samples_produced: &'a mut u64,
    paragraphs: std::vec::IntoIter<&'a str>,
    current: Option<Box<dyn AudioStream>>,
}

impl<'a, E: SpeechEngine> SegmentAudio<'a, E> {
    /// Next buffer of the segment, or `None` after its last paragraph
    pub async fn next_buffer(&mut self) -> Result<Option<Vec<i16>>> {
        loop {
            if let Some(stream) = self.current.as_mut() {
                match stream.next_chunk().await? {
                    Some(buffer) => {
                        *self.samples_produced += buffer.len() as u64;
                        return Ok(Some(buffer));
                    }
                    None => self.current = None,
                }
            } else if let Some(paragraph) = self.paragraphs.next() {
                debug!("Synthesizing paragraph ({} chars)", paragraph.chars().count());
                self.current = Some(self.engine.synthesize(paragraph).await?);
            } else {
                return Ok(None);
            }
        }
    }
}

/// `<voice.onnx>.json` as written by Piper's training/export tools
#[derive(Debug, Deserialize)]
struct VoiceConfig {
    audio: VoiceAudioConfig,
}

#[derive(Debug, Deserialize)]
struct VoiceAudioConfig {
    sample_rate: u32,
}

/// Piper command line engine
#[derive(Debug, Clone)]
pub struct PiperEngine {
    binary: PathBuf,
    model: PathBuf,
    sample_rate: u32,
    length_scale: Option<f32>,
}

impl PiperEngine {
    /// Load voice settings for `model`
    ///
    /// `speed` is a rate multiplier; Piper expresses rate as a phoneme length
    /// scale, so the engine receives its reciprocal. A speed of exactly 1.0
    /// leaves Piper's own default untouched.
    pub async fn load(model: &Path, speed: f32) -> Result<Self> {
        let config_path = Self::config_path(model);
        let raw = tokio::fs::read_to_string(&config_path).await.map_err(|e| {
            HoerbuchError::InvalidVoiceConfig {
                path: config_path.display().to_string(),
                reason: e.to_string(),
            }
        })?;

        let config: VoiceConfig =
            serde_json::from_str(&raw).map_err(|e| HoerbuchError::InvalidVoiceConfig {
                path: config_path.display().to_string(),
                reason: e.to_string(),
            })?;

        if config.audio.sample_rate == 0 {
            return Err(HoerbuchError::InvalidVoiceConfig {
                path: config_path.display().to_string(),
                reason: "sample_rate must be positive".to_string(),
            });
        }

        let length_scale = if (speed - 1.0).abs() > f32::EPSILON {
            Some(1.0 / speed)
        } else {
            None
        };

        Ok(Self {
            binary: PathBuf::from("piper"),
            model: model.to_path_buf(),
            sample_rate: config.audio.sample_rate,
            length_scale,
        })
    }

    /// Path of the JSON config that accompanies a voice model
    pub fn config_path(model: &Path) -> PathBuf {
        let mut name = model.as_os_str().to_os_string();
        name.push(".json");
        PathBuf::from(name)
    }

    /// Use a specific piper executable instead of the one on PATH
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn length_scale(&self) -> Option<f32> {
        self.length_scale
    }

    /// Check that the piper binary can be started at all
    pub async fn check_installed(&self) -> Result<()> {
        Command::new(&self.binary)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| self.spawn_error(e))?;
        Ok(())
    }

    fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "--model".to_string(),
            self.model.to_string_lossy().to_string(),
            "--output-raw".to_string(),
        ];

        if let Some(scale) = self.length_scale {
            args.push("--length-scale".to_string());
            args.push(format!("{:.3}", scale));
        }

        args
    }

    fn spawn_error(&self, e: std::io::Error) -> HoerbuchError {
        if e.kind() == std::io::ErrorKind::NotFound {
            HoerbuchError::EngineNotFound(self.binary.display().to_string())
        } else {
            HoerbuchError::SynthesisFailed(format!("Failed to execute piper: {}", e))
        }
    }
}

#[async_trait]
impl SpeechEngine for PiperEngine {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn synthesize(&mut self, text: &str) -> Result<Box<dyn AudioStream>> {
        let mut child = Command::new(&self.binary)
            .args(self.build_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            HoerbuchError::SynthesisFailed("Failed to open piper stdin".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            HoerbuchError::SynthesisFailed("Failed to capture piper stdout".to_string())
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            HoerbuchError::SynthesisFailed("Failed to capture piper stderr".to_string())
        })?;

        // Feed text while stdout is drained, otherwise long paragraphs fill
        // the output pipe before piper has read all of its input.
        let input = format!("{}\n", text);
        let writer = tokio::spawn(async move {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await
        });

        let stderr_task = tokio::spawn(async move {
            let mut log = String::new();
            let _ = stderr.read_to_string(&mut log).await;
            log
        });

        Ok(Box::new(PiperStream {
            child,
            stdout,
            writer: Some(writer),
            stderr: Some(stderr_task),
            carry: None,
            finished: false,
        }))
    }
}

/// Raw PCM output of one piper process
struct PiperStream {
    child: Child,
    stdout: ChildStdout,
    writer: Option<JoinHandle<std::io::Result<()>>>,
    stderr: Option<JoinHandle<String>>,
    /// Odd byte left over from the previous read
    carry: Option<u8>,
    finished: bool,
}

impl PiperStream {
    async fn finish(&mut self) -> Result<()> {
        self.finished = true;

        if let Some(writer) = self.writer.take() {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(HoerbuchError::SynthesisFailed(format!(
                        "Failed to write text to piper: {}",
                        e
                    )))
                }
                Err(e) => {
                    return Err(HoerbuchError::SynthesisFailed(format!(
                        "piper input task failed: {}",
                        e
                    )))
                }
            }
        }

        let status = self.child.wait().await.map_err(|e| {
            HoerbuchError::SynthesisFailed(format!("piper process failed: {}", e))
        })?;

        let log = match self.stderr.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(HoerbuchError::SynthesisFailed(format!(
                "piper exited with status {}: {}",
                status,
                log.trim()
            )));
        }

        if self.carry.is_some() {
            debug!("Dropping trailing odd byte from piper output");
        }

        Ok(())
    }
}

/// Decode little-endian 16-bit samples, carrying an odd trailing byte over
fn decode_samples(carry: &mut Option<u8>, bytes: &[u8]) -> Vec<i16> {
    let mut samples = Vec::with_capacity(bytes.len() / 2 + 1);
    let mut rest = bytes;

    if let Some(low) = carry.take() {
        match rest.split_first() {
            Some((&high, tail)) => {
                samples.push(i16::from_le_bytes([low, high]));
                rest = tail;
            }
            None => {
                *carry = Some(low);
                return samples;
            }
        }
    }

    let mut pairs = rest.chunks_exact(2);
    for pair in &mut pairs {
        samples.push(i16::from_le_bytes([pair[0], pair[1]]));
    }
    if let [odd] = pairs.remainder() {
        *carry = Some(*odd);
    }

    samples
}

#[async_trait]
impl AudioStream for PiperStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<i16>>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; CHUNK_BYTES];
        loop {
            let n = self.stdout.read(&mut buf).await.map_err(|e| {
                HoerbuchError::SynthesisFailed(format!("Failed to read piper output: {}", e))
            })?;

            if n == 0 {
                self.finish().await?;
                return Ok(None);
            }

            let samples = decode_samples(&mut self.carry, &buf[..n]);
            if !samples.is_empty() {
                return Ok(Some(samples));
            }
        }
    }
}
