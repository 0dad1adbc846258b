//! Test doubles for the narration pipeline
//!
//! - [`ScriptedEngine`]: a fixed number of samples per character, optionally
//!   failing on a trigger word
//! - [`FakeBackend`]: raw PCM files in a temp dir, comments and chapter tags
//!   kept in memory
//! - [`RefusingSink`]: an encoder that finds its output taken by someone else

#![allow(dead_code)]

use async_trait::async_trait;
use hoerbuch::audio::container::encode_samples;
use hoerbuch::audio::{AudioStream, ContainerSink, SpeechEngine};
use hoerbuch::backend::MediaBackend;
use hoerbuch::chapters::{ChapterTags, Segment, VorbisComments};
use hoerbuch::config::{Messages, NarratorConfig, Padding};
use hoerbuch::{HoerbuchError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Samples per second produced by [`ScriptedEngine::default`]
pub const SAMPLE_RATE: u32 = 1000;

/// 1 second of audio per 10 characters at [`SAMPLE_RATE`]
pub const SAMPLES_PER_CHAR: usize = 100;

/// Largest buffer the engine hands out at once
const MAX_CHUNK: usize = 4096;

pub struct ScriptedStream {
    remaining: usize,
    fail_after_first: bool,
    sent_any: bool,
}

#[async_trait]
impl AudioStream for ScriptedStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<i16>>> {
        if self.fail_after_first && self.sent_any {
            return Err(HoerbuchError::SynthesisFailed("engine crashed".into()));
        }
        if self.remaining == 0 {
            return Ok(None);
        }
        let len = self.remaining.min(MAX_CHUNK);
        self.remaining -= len;
        self.sent_any = true;
        Ok(Some(vec![7; len]))
    }
}

/// Engine producing `samples_per_char` samples for every character
pub struct ScriptedEngine {
    pub sample_rate: u32,
    pub samples_per_char: usize,
    /// Text containing this word makes the stream fail after one buffer
    pub fail_on: Option<String>,
    pub calls: Vec<String>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            samples_per_char: SAMPLES_PER_CHAR,
            fail_on: None,
            calls: Vec::new(),
        }
    }
}

impl ScriptedEngine {
    pub fn failing_on(word: &str) -> Self {
        Self {
            fail_on: Some(word.to_string()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SpeechEngine for ScriptedEngine {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn synthesize(&mut self, text: &str) -> Result<Box<dyn AudioStream>> {
        self.calls.push(text.to_string());
        let fail = self.fail_on.as_deref().is_some_and(|word| text.contains(word));
        Ok(Box::new(ScriptedStream {
            remaining: text.chars().count() * self.samples_per_char,
            fail_after_first: fail,
            sent_any: false,
        }))
    }
}

/// Writes raw little-endian PCM to a file
pub struct PcmFileSink {
    file: File,
}

#[async_trait]
impl ContainerSink for PcmFileSink {
    async fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        self.file.write_all(&encode_samples(samples)).await?;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }

    async fn abort(self: Box<Self>) {}
}

/// Sink whose encoder refuses to overwrite a file that appeared after the
/// existence check
pub struct RefusingSink {
    path: PathBuf,
}

#[async_trait]
impl ContainerSink for RefusingSink {
    async fn write_samples(&mut self, _samples: &[i16]) -> Result<()> {
        Err(HoerbuchError::FileAlreadyExists(self.path.display().to_string()))
    }

    async fn finish(self: Box<Self>) -> Result<()> {
        Err(HoerbuchError::FileAlreadyExists(self.path.display().to_string()))
    }

    async fn abort(self: Box<Self>) {}
}

#[derive(Default)]
struct BackendState {
    comments: HashMap<PathBuf, VorbisComments>,
    chapter_tags: HashMap<PathBuf, ChapterTags>,
    containers_created: usize,
    transcodes: usize,
    comment_writes: usize,
}

/// In-memory stand-in for ffmpeg/ffprobe
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
    pub fail_transcode: bool,
    pub fail_tagging: bool,
    /// Another writer creates the container right after it is opened
    pub lose_container_race: bool,
}

impl FakeBackend {
    pub fn failing_transcode() -> Self {
        Self {
            fail_transcode: true,
            ..Self::default()
        }
    }

    pub fn failing_tags() -> Self {
        Self {
            fail_tagging: true,
            ..Self::default()
        }
    }

    pub fn losing_container_race() -> Self {
        Self {
            lose_container_race: true,
            ..Self::default()
        }
    }

    pub fn comments(&self, path: &Path) -> Option<VorbisComments> {
        self.state.lock().unwrap().comments.get(path).cloned()
    }

    pub fn set_comments(&self, path: &Path, comments: VorbisComments) {
        self.state.lock().unwrap().comments.insert(path.to_path_buf(), comments);
    }

    pub fn chapter_tags(&self, path: &Path) -> Option<ChapterTags> {
        self.state.lock().unwrap().chapter_tags.get(path).cloned()
    }

    pub fn containers_created(&self) -> usize {
        self.state.lock().unwrap().containers_created
    }

    pub fn transcodes(&self) -> usize {
        self.state.lock().unwrap().transcodes
    }

    pub fn comment_writes(&self) -> usize {
        self.state.lock().unwrap().comment_writes
    }
}

#[async_trait]
impl MediaBackend for FakeBackend {
    async fn create_container(&self, path: &Path, _sample_rate: u32) -> Result<Box<dyn ContainerSink>> {
        if self.lose_container_race {
            tokio::fs::write(path, b"someone else").await?;
            return Ok(Box::new(RefusingSink {
                path: path.to_path_buf(),
            }));
        }
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    HoerbuchError::FileAlreadyExists(path.display().to_string())
                }
                _ => HoerbuchError::from(e),
            })?;
        self.state.lock().unwrap().containers_created += 1;
        Ok(Box::new(PcmFileSink { file }))
    }

    async fn read_comments(&self, path: &Path) -> Result<VorbisComments> {
        Ok(self.comments(path).unwrap_or_default())
    }

    async fn write_comments(&self, path: &Path, comments: &VorbisComments) -> Result<()> {
        if self.fail_tagging {
            return Err(HoerbuchError::tagging(path, "tagger unavailable"));
        }
        let mut state = self.state.lock().unwrap();
        state.comment_writes += 1;
        state.comments.insert(path.to_path_buf(), comments.clone());
        Ok(())
    }

    async fn duration(&self, path: &Path) -> Result<f64> {
        let len = tokio::fs::metadata(path).await?.len();
        Ok(len as f64 / 2.0 / f64::from(SAMPLE_RATE))
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        if output.exists() {
            return Err(HoerbuchError::FileAlreadyExists(output.display().to_string()));
        }
        self.state.lock().unwrap().transcodes += 1;
        if self.fail_transcode {
            tokio::fs::write(output, b"partial").await?;
            return Err(HoerbuchError::ConversionFailed("encoder exploded".into()));
        }
        tokio::fs::copy(input, output).await?;
        Ok(())
    }

    async fn write_chapter_tags(&self, path: &Path, tags: &ChapterTags) -> Result<()> {
        if self.fail_tagging {
            return Err(HoerbuchError::tagging(path, "tagger unavailable"));
        }
        self.state
            .lock()
            .unwrap()
            .chapter_tags
            .insert(path.to_path_buf(), tags.clone());
        Ok(())
    }
}

pub fn config(convert_to_mp3: bool) -> NarratorConfig {
    NarratorConfig {
        voice_model: PathBuf::from("voice.onnx"),
        speed: 1.0,
        convert_to_mp3,
        padding: Padding::default(),
        messages: Messages::default(),
    }
}

/// Segment whose text is `chars` characters long
pub fn segment(title: &str, chars: usize) -> Segment {
    Segment::new(title, "x".repeat(chars))
}

/// Intro (50 chars), Body (200 chars), Outro (20 chars)
pub fn book() -> Vec<Segment> {
    vec![segment("Intro", 50), segment("Body", 200), segment("Outro", 20)]
}

/// Sorted file names in `dir`
pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
