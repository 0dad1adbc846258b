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

//! Primary container writer
//!
//! A [`ContainerSink`] accepts mono 16-bit samples at a fixed sample rate and
//! turns them into the primary Ogg Vorbis container. The FFmpeg sink pipes raw
//! PCM into:
//! `ffmpeg -hide_banner -loglevel error -n -f s16le -ar {rate} -ac 1 -i pipe:0 -c:a libvorbis {out.ogg}`

use crate::audio::decoder::ffmpeg_spawn_error;
use crate::error::{HoerbuchError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::debug;

/// Writer for the primary audio container
#[async_trait]
pub trait ContainerSink: Send {
    /// Append samples to the container
    async fn write_samples(&mut self, samples: &[i16]) -> Result<()>;

    /// Flush and close the container
    ///
    /// After `Ok(())` the file is complete on disk.
    async fn finish(self: Box<Self>) -> Result<()>;

    /// Stop writing without completing the container
    ///
    /// Once this returns nothing writes to the output any more, so the
    /// caller can delete it.
    async fn abort(self: Box<Self>);
}

/// Ogg Vorbis sink backed by an ffmpeg child process
pub struct FfmpegOggSink {
    path: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
}

impl FfmpegOggSink {
    /// Start an encoder writing to `path`
    ///
    /// Fails with `FileAlreadyExists` if the path is taken.
    pub async fn create(path: &Path, sample_rate: u32) -> Result<Self> {
        if path.exists() {
            return Err(HoerbuchError::FileAlreadyExists(
                path.to_string_lossy().to_string(),
            ));
        }

        let args = Self::build_args(path, sample_rate);
        debug!("Running: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ffmpeg_spawn_error("ffmpeg", e))?;

        let stdin = child.stdin.take().ok_or_else(|| {
            HoerbuchError::FfmpegError("Failed to open ffmpeg stdin".to_string())
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            HoerbuchError::FfmpegError("Failed to capture ffmpeg stderr".to_string())
        })?;

        let stderr_task = tokio::spawn(async move {
            let mut log = String::new();
            let _ = stderr.read_to_string(&mut log).await;
            log
        });

        Ok(Self {
            path: path.to_path_buf(),
            child,
            stdin: Some(stdin),
            stderr: Some(stderr_task),
        })
    }

    fn build_args(path: &Path, sample_rate: u32) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-n".to_string(),
            "-f".to_string(),
            "s16le".to_string(),
            "-ar".to_string(),
            sample_rate.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-c:a".to_string(),
            "libvorbis".to_string(),
            path.to_string_lossy().to_string(),
        ]
    }

    async fn encoder_log(&mut self) -> String {
        match self.stderr.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        }
    }
}

/// Error for an encoder that stopped, from its stderr log
///
/// With `-n` ffmpeg refuses to open an output that appeared after
/// [`FfmpegOggSink::create`] checked the path. That file belongs to someone
/// else, so the refusal is reported as `FileAlreadyExists`.
fn encoder_failure(path: &Path, context: String, log: &str) -> HoerbuchError {
    if log.contains("already exists") {
        return HoerbuchError::FileAlreadyExists(path.to_string_lossy().to_string());
    }
    HoerbuchError::FfmpegError(format!("{} {}", context, log.trim()))
}

/// Encode samples as little-endian 16-bit PCM
pub fn encode_samples(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

#[async_trait]
impl ContainerSink for FfmpegOggSink {
    async fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            HoerbuchError::FfmpegError("Container is already closed".to_string())
        })?;

        if let Err(e) = stdin.write_all(&encode_samples(samples)).await {
            // A broken pipe means ffmpeg died; its log says why.
            self.stdin = None;
            let log = self.encoder_log().await;
            return Err(encoder_failure(
                &self.path,
                format!("Failed to write audio to {}: {}", self.path.display(), e),
                &log,
            ));
        }

        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await.map_err(|e| {
                HoerbuchError::FfmpegError(format!("Failed to close encoder input: {}", e))
            })?;
        }

        let status = self.child.wait().await.map_err(|e| {
            HoerbuchError::FfmpegError(format!("FFmpeg process failed: {}", e))
        })?;
        let log = self.encoder_log().await;

        if !status.success() {
            return Err(encoder_failure(
                &self.path,
                format!("Encoding {} failed with status {}:", self.path.display(), status),
                &log,
            ));
        }

        debug!("Closed container {}", self.path.display());
        Ok(())
    }

    async fn abort(mut self: Box<Self>) {
        self.stdin = None;
        if let Err(e) = self.child.kill().await {
            debug!("Encoder for {} already gone: {}", self.path.display(), e);
        }
        debug!("Aborted container {}", self.path.display());
    }
}
