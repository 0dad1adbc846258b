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

//! OGG to MP3 conversion
//!
//! # Conversion
//! The primary Ogg Vorbis container is re-encoded with FFmpeg/LAME at a fixed
//! quality, constant bitrate and stereo:
//! `ffmpeg -hide_banner -n -i input.ogg -codec:a libmp3lame -b:a 320k -ac 2 -id3v2_version 3 output.mp3`
//!
//! `-n` makes FFmpeg refuse to touch an existing output. The converter checks
//! for it as well so that nothing is spawned in that case.
//!
//! # Failure
//! A failed conversion removes whatever part of the MP3 it wrote. The source
//! OGG is never modified.

use crate::audio::decoder::ffmpeg_spawn_error;
use crate::error::{HoerbuchError, Result};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Conversion progress callback type (0.0 - 1.0)
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// MP3 encoding settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mp3Options {
    /// Constant bitrate in kbps
    pub bitrate_kbps: u32,
    /// Output channel count
    pub channels: u8,
}

impl Default for Mp3Options {
    fn default() -> Self {
        Self {
            bitrate_kbps: 320,
            channels: 2,
        }
    }
}

/// Audio converter
/// Re-encodes the primary container into MP3 using FFmpeg
pub struct AudioConverter {
    options: Mp3Options,
}

impl Default for AudioConverter {
    fn default() -> Self {
        Self::new(Mp3Options::default())
    }
}

impl AudioConverter {
    /// Create new converter with options
    pub fn new(options: Mp3Options) -> Self {
        Self { options }
    }

    /// Check that ffmpeg can be started at all
    pub async fn check_ffmpeg() -> Result<()> {
        let status = Command::new("ffmpeg")
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| ffmpeg_spawn_error("ffmpeg", e))?;

        if !status.success() {
            return Err(HoerbuchError::FfmpegError(format!(
                "ffmpeg -version exited with status: {}",
                status
            )));
        }
        Ok(())
    }

    /// Convert `input` into an MP3 at `output`, logging progress
    pub async fn convert(&self, input: &Path, output: &Path, total_duration: f64) -> Result<()> {
        let progress = Self::log_progress(output.display().to_string());
        self.convert_with_progress(input, output, total_duration, progress)
            .await
    }

    /// Progress callback that logs every completed quarter once
    pub fn log_progress(label: String) -> ProgressCallback {
        let reported = AtomicU8::new(0);
        Arc::new(move |progress: f32| {
            let quarter = progress_quarter(progress);
            if quarter > reported.fetch_max(quarter, Ordering::Relaxed) {
                info!("Converting {}: {}%", label, u32::from(quarter) * 25);
            }
        })
    }

    /// Convert with progress callback
    ///
    /// `total_duration` is only used to scale progress; pass 0 if unknown.
    pub async fn convert_with_progress(
        &self,
        input: &Path,
        output: &Path,
        total_duration: f64,
        progress_callback: ProgressCallback,
    ) -> Result<()> {
        if !input.exists() {
            return Err(HoerbuchError::FileNotFound(format!(
                "{}: Input file does not exist",
                input.display()
            )));
        }

        if output.exists() {
            return Err(HoerbuchError::FileAlreadyExists(
                output.to_string_lossy().to_string(),
            ));
        }

        let command = self.build_ffmpeg_command(input, output);
        debug!("Running: {}", command.join(" "));

        if let Err(e) = self
            .execute_conversion(&command, total_duration, progress_callback)
            .await
        {
            Self::remove_partial(output).await;
            return Err(e);
        }

        if !output.exists() {
            return Err(HoerbuchError::ConversionFailed(
                "Output file was not created".to_string(),
            ));
        }

        info!("Converted {} to {}", input.display(), output.display());
        Ok(())
    }

    /// Build FFmpeg command for conversion
    fn build_ffmpeg_command(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "ffmpeg".to_string(),
            "-hide_banner".to_string(),
            "-n".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-codec:a".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            format!("{}k", self.options.bitrate_kbps),
            "-ac".to_string(),
            self.options.channels.to_string(),
            "-id3v2_version".to_string(),
            "3".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }

    /// Execute FFmpeg conversion with progress tracking
    async fn execute_conversion(
        &self,
        command: &[String],
        total_duration: f64,
        progress_callback: ProgressCallback,
    ) -> Result<()> {
        let mut child = Command::new(&command[0])
            .args(&command[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ffmpeg_spawn_error("ffmpeg", e))?;

        let stderr = child.stderr.take().ok_or_else(|| {
            HoerbuchError::FfmpegError("Failed to capture ffmpeg stderr".to_string())
        })?;

        let mut lines = BufReader::new(stderr).lines();

        // FFmpeg separates progress updates with '\r', so one "line" may carry
        // many updates; only the last one matters.
        let progress_task = tokio::spawn({
            let progress_callback = progress_callback.clone();
            async move {
                let mut last = 0.0f32;
                let mut tail = Vec::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    let latest = line.rsplit('\r').next().unwrap_or(&line);
                    if let Some(progress) = Self::parse_ffmpeg_progress(latest, total_duration) {
                        if (progress - last).abs() > 0.01 {
                            last = progress;
                            progress_callback(progress);
                        }
                    } else if !latest.trim().is_empty() {
                        tail.push(latest.to_string());
                        if tail.len() > 5 {
                            tail.remove(0);
                        }
                    }
                }
                tail.join("\n")
            }
        });

        let status = child.wait().await.map_err(|e| {
            HoerbuchError::FfmpegError(format!("FFmpeg process failed: {}", e))
        })?;

        let log = progress_task.await.unwrap_or_default();

        if !status.success() {
            return Err(HoerbuchError::ConversionFailed(format!(
                "FFmpeg exited with status {}: {}",
                status,
                log.trim()
            )));
        }

        progress_callback(1.0);

        Ok(())
    }

    async fn remove_partial(output: &Path) {
        match tokio::fs::remove_file(output).await {
            Ok(()) => debug!("Removed partial output {}", output.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove partial output {}: {}", output.display(), e),
        }
    }

    /// Parse FFmpeg progress from stderr line
    ///
    /// FFmpeg outputs: "time=00:01:23.45 bitrate=64.0kbits/s"
    fn parse_ffmpeg_progress(line: &str, total_duration: f64) -> Option<f32> {
        let time_start = line.find("time=")?;
        let time_str = &line[time_start + 5..];
        let time_end = time_str.find(' ').unwrap_or(time_str.len());
        let elapsed_seconds = Self::parse_timestamp(&time_str[..time_end])?;

        if total_duration > 0.0 {
            Some((elapsed_seconds / total_duration).min(1.0) as f32)
        } else {
            None
        }
    }

    /// Parse timestamp in format HH:MM:SS.ss to seconds
    fn parse_timestamp(timestamp: &str) -> Option<f64> {
        let parts: Vec<&str> = timestamp.split(':').collect();
        if parts.len() == 3 {
            let hours: f64 = parts[0].parse().ok()?;
            let minutes: f64 = parts[1].parse().ok()?;
            let seconds: f64 = parts[2].parse().ok()?;
            Some(hours * 3600.0 + minutes * 60.0 + seconds)
        } else {
            None
        }
    }
}

/// Completed quarters of a 0.0 - 1.0 progress value
fn progress_quarter(progress: f32) -> u8 {
    (progress.clamp(0.0, 1.0) * 4.0).floor() as u8
}
