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

//! Audio formats and probing
//!
//! # Supported Formats
//! - OGG: Ogg Vorbis, the primary container (markers in Vorbis comments)
//! - MP3: MPEG Audio Layer 3, the secondary container (ID3v2 CHAP frames)
//!
//! # Probing
//! Duration and tags are read with
//! `ffprobe -v quiet -print_format json -show_format -show_streams {path}`.
//! Ogg Vorbis comments are reported on the audio stream, other containers put
//! them on the format, so both places are merged.

use crate::error::{HoerbuchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::process::Command;

/// Audio container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    /// Ogg Vorbis
    Ogg,
    /// MPEG Audio Layer 3
    Mp3,
}

impl AudioFormat {
    /// Get file extension for this format
    pub fn to_extension(&self) -> &'static str {
        match self {
            Self::Ogg => "ogg",
            Self::Mp3 => "mp3",
        }
    }
}

/// FFprobe JSON output structures
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    tags: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    tags: Option<BTreeMap<String, String>>,
}

/// Map a spawn failure of an ffmpeg-suite tool to our error type
pub(crate) fn ffmpeg_spawn_error(tool: &str, e: std::io::Error) -> HoerbuchError {
    if e.kind() == std::io::ErrorKind::NotFound {
        HoerbuchError::FfmpegNotFound
    } else {
        HoerbuchError::FfmpegError(format!("Failed to execute {}: {}", tool, e))
    }
}

/// Audio format decoder
pub struct AudioDecoder;

impl AudioDecoder {
    /// Execute FFprobe and parse its JSON report
    async fn probe(path: &Path) -> Result<FfprobeOutput> {
        let output = Command::new("ffprobe")
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(path.as_os_str())
            .output()
            .await
            .map_err(|e| ffmpeg_spawn_error("ffprobe", e))?;

        if !output.status.success() {
            return Err(HoerbuchError::FfmpegError(format!(
                "FFprobe failed on {}",
                path.display()
            )));
        }

        Self::parse_probe(&String::from_utf8_lossy(&output.stdout))
    }

    fn parse_probe(json: &str) -> Result<FfprobeOutput> {
        serde_json::from_str(json).map_err(|e| {
            HoerbuchError::FfmpegError(format!("Failed to parse FFprobe output: {}", e))
        })
    }

    /// Get container duration in seconds
    pub async fn get_duration(path: &Path) -> Result<f64> {
        let probe = Self::probe(path).await?;
        Self::duration_of(&probe, path)
    }

    fn duration_of(probe: &FfprobeOutput, path: &Path) -> Result<f64> {
        probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
            .ok_or_else(|| {
                HoerbuchError::FfmpegError(format!("No duration found in {}", path.display()))
            })
    }

    /// Read all metadata tags
    ///
    /// Format-level tags first, then tags of the first audio stream. Keys are
    /// returned as ffprobe reports them.
    pub async fn read_tags(path: &Path) -> Result<Vec<(String, String)>> {
        let probe = Self::probe(path).await?;
        Ok(Self::tags_of(probe))
    }

    fn tags_of(probe: FfprobeOutput) -> Vec<(String, String)> {
        let mut tags: Vec<(String, String)> = probe
            .format
            .tags
            .unwrap_or_default()
            .into_iter()
            .collect();

        if let Some(stream_tags) = probe
            .streams
            .into_iter()
            .find(|s| s.codec_type == "audio")
            .and_then(|s| s.tags)
        {
            tags.extend(stream_tags);
        }

        tags
    }
}
