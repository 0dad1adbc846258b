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

//! External media tools
//!
//! Every call the pipeline makes to an encoder, prober or tagger goes
//! through [`MediaBackend`], so the orchestration can run against a test
//! double. [`FfmpegBackend`] is the real thing.
//!
//! # Tag Rewrites
//! FFmpeg cannot edit tags in place. Both tag writers remux the file with
//! `-c copy` into a hidden sibling and rename it over the original:
//!
//! Vorbis comments (primary container):
//! `ffmpeg -i book.ogg -map 0 -c copy -map_metadata -1 -metadata:s:a:0 KEY=value ... .book.ogg.tags.ogg`
//!
//! ID3v2 chapters (secondary container):
//! `ffmpeg -i book.mp3 -f ffmetadata -i .book.mp3.chapters.mp3 -map 0:a -map_metadata 1 -map_chapters 1 -c copy -id3v2_version 3 .book.mp3.tags.mp3`

use crate::audio::container::{ContainerSink, FfmpegOggSink};
use crate::audio::converter::AudioConverter;
use crate::audio::decoder::{ffmpeg_spawn_error, AudioDecoder};
use crate::chapters::codec::VorbisComments;
use crate::chapters::projector::ChapterTags;
use crate::error::{HoerbuchError, Result};
use crate::file::manager::FileManager;
use crate::file::paths::temp_sibling;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Media operations used by the narration pipeline
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Open a new primary container for mono 16-bit audio
    async fn create_container(
        &self,
        path: &Path,
        sample_rate: u32,
    ) -> Result<Box<dyn ContainerSink>>;

    /// Read the Vorbis comments of a primary container
    async fn read_comments(&self, path: &Path) -> Result<VorbisComments>;

    /// Replace the Vorbis comments of a primary container
    async fn write_comments(&self, path: &Path, comments: &VorbisComments) -> Result<()>;

    /// Container duration in seconds
    async fn duration(&self, path: &Path) -> Result<f64>;

    /// Re-encode a primary container into the secondary format
    async fn transcode(&self, input: &Path, output: &Path) -> Result<()>;

    /// Replace the whole-file tags and chapters of a secondary container
    async fn write_chapter_tags(&self, path: &Path, tags: &ChapterTags) -> Result<()>;
}

/// Backend driving the ffmpeg and ffprobe command line tools
#[derive(Default)]
pub struct FfmpegBackend {
    converter: AudioConverter,
}

impl FfmpegBackend {
    pub fn new(converter: AudioConverter) -> Self {
        Self { converter }
    }

    fn comment_args(input: &Path, comments: &VorbisComments, output: &Path) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-n".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-map".to_string(),
            "0".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-map_metadata".to_string(),
            "-1".to_string(),
        ];

        for (key, value) in comments.iter() {
            args.push("-metadata:s:a:0".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(output.to_string_lossy().to_string());
        args
    }

    fn chapter_args(input: &Path, metadata_file: &Path, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-n".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-f".to_string(),
            "ffmetadata".to_string(),
            "-i".to_string(),
            metadata_file.to_string_lossy().to_string(),
            "-map".to_string(),
            "0:a".to_string(),
            "-map_metadata".to_string(),
            "1".to_string(),
            "-map_chapters".to_string(),
            "1".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-id3v2_version".to_string(),
            "3".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }

    async fn run_ffmpeg(args: &[String]) -> Result<()> {
        debug!("Running: ffmpeg {}", args.join(" "));

        let output = Command::new("ffmpeg")
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ffmpeg_spawn_error("ffmpeg", e))?;

        if !output.status.success() {
            return Err(HoerbuchError::FfmpegError(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Remux `path` into a sibling with `args`, then move it over `path`
    async fn rewrite(path: &Path, temp: &Path, args: &[String]) -> Result<()> {
        FileManager::safe_delete(temp).await?;

        let result = match Self::run_ffmpeg(args).await {
            Ok(()) => FileManager::replace(temp, path).await,
            Err(e) => Err(e),
        };

        if result.is_err() {
            if let Err(e) = FileManager::safe_delete(temp).await {
                warn!("{}", e);
            }
        }
        result
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn create_container(
        &self,
        path: &Path,
        sample_rate: u32,
    ) -> Result<Box<dyn ContainerSink>> {
        Ok(Box::new(FfmpegOggSink::create(path, sample_rate).await?))
    }

    async fn read_comments(&self, path: &Path) -> Result<VorbisComments> {
        Ok(VorbisComments::from_pairs(AudioDecoder::read_tags(path).await?))
    }

    async fn write_comments(&self, path: &Path, comments: &VorbisComments) -> Result<()> {
        let temp = temp_sibling(path, "tags");
        let args = Self::comment_args(path, comments, &temp);

        Self::rewrite(path, &temp, &args)
            .await
            .map_err(|e| HoerbuchError::tagging(path, e.to_string()))
    }

    async fn duration(&self, path: &Path) -> Result<f64> {
        AudioDecoder::get_duration(path).await
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        let total = match AudioDecoder::get_duration(input).await {
            Ok(seconds) => seconds,
            Err(e) => {
                debug!("No duration for progress reporting: {}", e);
                0.0
            }
        };
        self.converter.convert(input, output, total).await
    }

    async fn write_chapter_tags(&self, path: &Path, tags: &ChapterTags) -> Result<()> {
        let metadata_file = temp_sibling(path, "chapters");
        let temp = temp_sibling(path, "tags");

        tokio::fs::write(&metadata_file, tags.to_ffmetadata())
            .await
            .map_err(|e| HoerbuchError::tagging(path, e.to_string()))?;

        let args = Self::chapter_args(path, &metadata_file, &temp);
        let result = Self::rewrite(path, &temp, &args).await;

        if let Err(e) = FileManager::safe_delete(&metadata_file).await {
            warn!("{}", e);
        }

        result.map_err(|e| HoerbuchError::tagging(path, e.to_string()))
    }
}
