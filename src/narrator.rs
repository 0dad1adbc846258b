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

//! Narration pipeline
//!
//! Ties documents, the speech engine and the media backend together.
//!
//! # Outputs
//! - Whole book: `<input stem>.ogg` with Vorbis comment markers, or
//!   `<input stem>.mp3` with ID3 chapters (the OGG is an intermediate)
//! - Single chapter: `<input stem>_<NN>_<title>.ogg|mp3`, no markers (the
//!   OGG is again an intermediate when MP3 output is on)
//!
//! # Cleanup
//! | failure                  | OGG                         | MP3               |
//! |--------------------------|-----------------------------|-------------------|
//! | output already exists    | untouched                   | untouched         |
//! | synthesis                | removed (created this run)  | never started     |
//! | MP3 conversion, book     | kept for the next run       | partial removed   |
//! | MP3 conversion, chapter  | removed (created this run)  | partial removed   |
//! | tagging                  | kept, warning               | kept, warning     |
//!
//! After a successful conversion the intermediate OGG is deleted, except a
//! book OGG that was already there before the run.

use crate::audio::decoder::AudioFormat;
use crate::audio::engine::{SegmentSynthesizer, SpeechEngine};
use crate::backend::MediaBackend;
use crate::chapters::codec::{read_markers, write_markers, VorbisComments};
use crate::chapters::marker::{BookMetadata, Marker, Segment};
use crate::chapters::projector::{project, ChapterTags};
use crate::chapters::recovery::estimate;
use crate::chapters::selection::{chapter_index, parse_menu_choice, render_menu, ChapterMode, MenuChoice};
use crate::chapters::timeline::{RecordedTimeline, TimelineRecorder};
use crate::config::{Messages, NarratorConfig};
use crate::error::{HoerbuchError, Result};
use crate::file::manager::{FileManager, PartialOutput};
use crate::file::paths::{book_output_path, chapter_output_path};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info, warn};

/// Result of split-all mode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitReport {
    /// Chapter files written
    pub written: Vec<PathBuf>,
    /// Chapter files that already existed
    pub skipped: Vec<PathBuf>,
    /// 1-based chapter numbers that failed, with the error text
    pub failed: Vec<(usize, String)>,
}

/// What a chapter mode run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterOutcome {
    /// One container for the whole document
    Book(PathBuf),
    /// One chapter file
    Chapter(PathBuf),
    Split(SplitReport),
    /// Nothing written: invalid menu input or unknown chapter number
    Cancelled,
}

/// Narrates documents with one engine and one media backend
pub struct Narrator<E, B> {
    config: NarratorConfig,
    synth: SegmentSynthesizer<E>,
    backend: B,
    recorder: TimelineRecorder,
}

fn seconds(value: f64) -> String {
    format!("{:.2}", value)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

impl<E: SpeechEngine, B: MediaBackend> Narrator<E, B> {
    pub fn new(config: NarratorConfig, engine: E, backend: B) -> Self {
        let recorder = TimelineRecorder::new(config.padding);
        Self {
            config,
            synth: SegmentSynthesizer::new(engine),
            backend,
            recorder,
        }
    }

    pub fn config(&self) -> &NarratorConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn messages(&self) -> &Messages {
        &self.config.messages
    }

    fn say(&self, line: impl AsRef<str>) {
        println!("{}", line.as_ref());
    }

    fn target_format(&self) -> AudioFormat {
        if self.config.convert_to_mp3 {
            AudioFormat::Mp3
        } else {
            AudioFormat::Ogg
        }
    }

    /// Record `segments` into a new OGG and embed the markers
    ///
    /// The existence check happens right before the container is created.
    /// A failed recording leaves no file behind; a failed marker write only
    /// produces a warning.
    pub async fn synthesize_book(
        &mut self,
        segments: &[Segment],
        metadata: &BookMetadata,
        ogg: &Path,
    ) -> Result<RecordedTimeline> {
        let timeline = self.record(segments, ogg, true).await?;

        self.say(self.messages().fill("OGG file successfully written: {file}", &[("file", &ogg.display())]));
        self.say(self.messages().fill("Total duration: {time}s", &[("time", &seconds(timeline.total_seconds))]));

        match self.embed_comments(ogg, &timeline.markers, metadata).await {
            Ok(()) => self.say(self.messages().tr("Chapter markers and metadata written to OGG Vorbis comments.")),
            Err(e) => warn!("Failed to write OGG Vorbis markers: {}", e),
        }

        Ok(timeline)
    }

    /// Record one segment into `ogg`, then convert it if MP3 output is on
    ///
    /// `index` is the 1-based chapter number. The whole-file title is the
    /// chapter title and no markers are written. Returns the final output.
    ///
    /// With MP3 output the OGG is removed once the conversion has finished,
    /// whether it succeeded or not, so a failed chapter leaves nothing behind.
    pub async fn synthesize_chapter(
        &mut self,
        index: usize,
        segment: &Segment,
        metadata: &BookMetadata,
        ogg: &Path,
    ) -> Result<PathBuf> {
        debug!("Chapter {}: {} characters", index, segment.char_count());
        self.say(self.messages().fill("  -> Synthesizing chapter: '{title}'", &[("title", &segment.title)]));

        let timeline = self.record(std::slice::from_ref(segment), ogg, false).await?;
        self.say(self.messages().fill(
            "  -> OGG saved: {file} (Duration: {time}s)",
            &[("file", &file_name(ogg)), ("time", &seconds(timeline.total_seconds))],
        ));

        let chapter_metadata = BookMetadata::new(segment.title.clone(), metadata.artist.clone());
        if let Err(e) = self.embed_comments(ogg, &[], &chapter_metadata).await {
            warn!("Failed to write OGG Vorbis metadata for single chapter: {}", e);
        }

        if !self.config.convert_to_mp3 {
            return Ok(ogg.to_path_buf());
        }

        let mp3 = ogg.with_extension(AudioFormat::Mp3.to_extension());
        let converted = self.convert(ogg, &mp3).await;
        self.remove_intermediate(ogg).await;
        converted?;

        match self
            .backend
            .write_chapter_tags(&mp3, &ChapterTags::without_chapters(&chapter_metadata))
            .await
        {
            Ok(()) => self.say(self.messages().fill("  -> MP3 tagged: {file}", &[("file", &file_name(&mp3))])),
            Err(e) => warn!("Error writing simple MP3 tags: {}", e),
        }

        Ok(mp3)
    }

    /// Markers for an OGG this run did not record
    ///
    /// Embedded markers win. Without them the markers are estimated from
    /// text length; if the duration cannot be read either, the result is
    /// empty and the caller gets a file without chapters.
    pub async fn recover_markers(&self, ogg: &Path, segments: &[Segment]) -> Vec<Marker> {
        self.say(self.messages().tr("Attempting to read custom markers from existing OGG file..."));

        match self.backend.read_comments(ogg).await {
            Ok(comments) => {
                if let Some(markers) = read_markers(&comments) {
                    if markers.len() != segments.len() {
                        warn!(
                            "OGG has {} markers but the document has {} segments",
                            markers.len(),
                            segments.len()
                        );
                    }
                    self.say(self.messages().fill(
                        "Successfully read {n} precise markers from OGG file.",
                        &[("n", &markers.len())],
                    ));
                    return markers;
                }
            }
            Err(e) => debug!("Could not read OGG comments: {}", e),
        }

        self.say(self.messages().tr("Warning: No OGG markers found. Estimating markers from text length."));

        let total = match self.backend.duration(ogg).await {
            Ok(total) => total,
            Err(e) => {
                warn!("Error reading OGG duration for marker calculation: {}", e);
                return Vec::new();
            }
        };

        let markers = estimate(segments, total, &self.config.padding);
        for marker in &markers {
            self.say(self.messages().fill(
                "  -> Approximate segment start: {title} at {time}s",
                &[("title", &marker.title), ("time", &seconds(marker.offset_seconds))],
            ));
        }
        markers
    }

    /// Narrate the whole document into one output next to `input`
    pub async fn narrate(
        &mut self,
        input: &Path,
        segments: &[Segment],
        metadata: &BookMetadata,
    ) -> Result<PathBuf> {
        let ogg = book_output_path(input, AudioFormat::Ogg);
        let output = book_output_path(input, self.target_format());

        if FileManager::file_exists(&output).await {
            self.say(self.messages().fill(
                "Output file '{file}' already exists. Skipping synthesis/conversion.",
                &[("file", &output.display())],
            ));
            return Err(HoerbuchError::FileAlreadyExists(output.display().to_string()));
        }

        if !self.config.convert_to_mp3 {
            self.synthesize_book(segments, metadata, &ogg).await?;
            info!("Narrated {}", ogg.display());
            return Ok(ogg);
        }

        let reused = FileManager::file_exists(&ogg).await;
        let markers = if reused {
            self.say(self.messages().tr("Existing OGG file found. Reusing for fast MP3 conversion."));
            self.recover_markers(&ogg, segments).await
        } else {
            self.synthesize_book(segments, metadata, &ogg).await?.markers
        };

        self.convert(&ogg, &output).await?;

        if !reused {
            self.remove_intermediate(&ogg).await;
        }

        self.say(self.messages().tr("Writing chapter markers and metadata to MP3..."));
        match self.backend.write_chapter_tags(&output, &project(&markers, metadata)).await {
            Ok(()) => self.say(self.messages().fill(
                "Metadata written successfully (Title: '{title}', Artist: '{artist}').",
                &[("title", &metadata.title), ("artist", &metadata.artist)],
            )),
            Err(e) => warn!("Error writing MP3 chapter tags: {}", e),
        }

        info!("Narrated {}", output.display());
        Ok(output)
    }

    /// Narrate chapter `number` (1-based, already range checked)
    async fn narrate_chapter(
        &mut self,
        input: &Path,
        number: usize,
        segments: &[Segment],
        metadata: &BookMetadata,
    ) -> Result<PathBuf> {
        let segment = &segments[number - 1];
        let ogg = chapter_output_path(input, number, &segment.title, AudioFormat::Ogg);
        let output = chapter_output_path(input, number, &segment.title, self.target_format());

        if FileManager::file_exists(&output).await {
            self.say(self.messages().fill(
                "Warning: output file already exists: {file}",
                &[("file", &file_name(&output))],
            ));
            return Err(HoerbuchError::FileAlreadyExists(output.display().to_string()));
        }

        self.synthesize_chapter(number, segment, metadata, &ogg).await
    }

    /// One file per chapter, skipping existing outputs and continuing past
    /// failures
    async fn split_all(
        &mut self,
        input: &Path,
        segments: &[Segment],
        metadata: &BookMetadata,
    ) -> SplitReport {
        let mut report = SplitReport::default();

        for (i, segment) in segments.iter().enumerate() {
            let number = i + 1;
            let ogg = chapter_output_path(input, number, &segment.title, AudioFormat::Ogg);
            let output = chapter_output_path(input, number, &segment.title, self.target_format());

            if FileManager::file_exists(&output).await {
                self.say(self.messages().fill(
                    "Skipping chapter '{title}': output file '{file}' already exists.",
                    &[("title", &segment.title), ("file", &file_name(&output))],
                ));
                report.skipped.push(output);
                continue;
            }

            match self.synthesize_chapter(number, segment, metadata, &ogg).await {
                Ok(path) => report.written.push(path),
                Err(e) => {
                    error!(
                        "Error synthesizing chapter {} ('{}'): {}",
                        number, segment.title, e
                    );
                    report.failed.push((number, e.to_string()));
                }
            }
        }

        self.say(self.messages().tr("All chapters processed in split-file mode."));
        report
    }

    /// Run the narration a chapter mode asks for
    ///
    /// Interactive mode prints the menu and reads one line from `reader`.
    /// An unusable answer, including end of input, writes nothing.
    pub async fn run_chapter_mode<R>(
        &mut self,
        mode: ChapterMode,
        input: &Path,
        segments: &[Segment],
        metadata: &BookMetadata,
        reader: &mut R,
    ) -> Result<ChapterOutcome>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        if segments.is_empty() {
            return Err(HoerbuchError::EmptyDocument);
        }

        match mode {
            ChapterMode::NoChapterMode => {
                self.say(self.messages().tr("Continuing with standard single-file synthesis (no chapter mode)."));
                Ok(ChapterOutcome::Book(self.narrate(input, segments, metadata).await?))
            }
            ChapterMode::DirectChapter(number) => {
                let title = match segments.get(number.wrapping_sub(1)) {
                    Some(segment) => &segment.title,
                    None => {
                        return Err(HoerbuchError::invalid_input(format!(
                            "chapter {} out of range 1..={}",
                            number,
                            segments.len()
                        )))
                    }
                };
                self.say(self.messages().fill(
                    "[Chapter mode: direct chapter {n} - '{title}']",
                    &[("n", &number), ("title", title)],
                ));
                let path = self.narrate_chapter(input, number, segments, metadata).await?;
                Ok(ChapterOutcome::Chapter(path))
            }
            ChapterMode::Interactive => self.interactive(input, segments, metadata, reader).await,
        }
    }

    async fn interactive<R>(
        &mut self,
        input: &Path,
        segments: &[Segment],
        metadata: &BookMetadata,
        reader: &mut R,
    ) -> Result<ChapterOutcome>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        print!("{}", render_menu(segments, self.messages()));
        print!("{}", self.messages().tr("Your choice: "));
        if let Err(e) = std::io::stdout().flush() {
            debug!("Could not flush the menu prompt: {}", e);
        }

        let mut line = String::new();
        reader.read_line(&mut line).await?;

        match parse_menu_choice(&line) {
            MenuChoice::CombineAll => {
                self.say(self.messages().tr("Synthesizing all chapters into a combined OGG..."));
                let path = self.narrate(input, segments, metadata).await?;
                self.say(self.messages().tr("Combined synthesis finished."));
                Ok(ChapterOutcome::Book(path))
            }
            MenuChoice::SplitAll => {
                self.say(self.messages().tr("Synthesizing each chapter to separate files..."));
                Ok(ChapterOutcome::Split(self.split_all(input, segments, metadata).await))
            }
            MenuChoice::Chapter(n) => {
                let number = i64::try_from(n)
                    .ok()
                    .and_then(|n| chapter_index(n, segments.len()));
                match number {
                    Some(number) => {
                        let path = self.narrate_chapter(input, number, segments, metadata).await?;
                        self.say(self.messages().tr("Single chapter finished."));
                        Ok(ChapterOutcome::Chapter(path))
                    }
                    None => {
                        self.say(self.messages().fill(
                            "Warning: chapter {n} not found (document has {m} chapters).",
                            &[("n", &n), ("m", &segments.len())],
                        ));
                        Ok(ChapterOutcome::Cancelled)
                    }
                }
            }
            MenuChoice::Invalid => {
                self.say(self.messages().tr("Invalid selection, aborting."));
                Ok(ChapterOutcome::Cancelled)
            }
        }
    }

    /// Stream `segments` into a freshly claimed container at `ogg`
    async fn record(&mut self, segments: &[Segment], ogg: &Path, announce: bool) -> Result<RecordedTimeline> {
        let claim = PartialOutput::claim(ogg).await?;

        let sink = match self.backend.create_container(ogg, self.synth.sample_rate()).await {
            Ok(sink) => sink,
            Err(e @ HoerbuchError::FileAlreadyExists(_)) => {
                claim.release();
                return Err(e);
            }
            Err(e) => {
                claim.discard().await;
                return Err(e);
            }
        };

        let messages = &self.config.messages;
        let recorded = self
            .recorder
            .record(segments, &mut self.synth, sink, |_, marker: &Marker| {
                if announce {
                    println!(
                        "{}",
                        messages.fill(
                            "  -> Segment started: {title} at {time}s",
                            &[("title", &marker.title), ("time", &seconds(marker.offset_seconds))],
                        )
                    );
                }
            })
            .await;

        match recorded {
            Ok(timeline) => {
                claim.commit();
                Ok(timeline)
            }
            Err(e @ HoerbuchError::FileAlreadyExists(_)) => {
                warn!("{} appeared while it was being created", ogg.display());
                claim.release();
                Err(e)
            }
            Err(e) => {
                error!("Synthesis of {} failed: {}", ogg.display(), e);
                claim.discard().await;
                Err(e)
            }
        }
    }

    /// Replace title, artist and markers in the OGG's comments
    async fn embed_comments(&self, ogg: &Path, markers: &[Marker], metadata: &BookMetadata) -> Result<()> {
        let mut comments = match self.backend.read_comments(ogg).await {
            Ok(comments) => comments,
            Err(e) => {
                debug!("Starting from empty comments: {}", e);
                VorbisComments::new()
            }
        };
        write_markers(&mut comments, markers, metadata);
        self.backend.write_comments(ogg, &comments).await
    }

    /// Delete an OGG that only existed to be converted
    async fn remove_intermediate(&self, ogg: &Path) {
        match FileManager::safe_delete(ogg).await {
            Ok(()) => self.say(self.messages().fill(
                "Temporary OGG file deleted: {file}",
                &[("file", &ogg.display())],
            )),
            Err(e) => warn!("{}", e),
        }
    }

    /// OGG → MP3, leaving the OGG alone and no partial MP3 behind
    async fn convert(&self, ogg: &Path, mp3: &Path) -> Result<()> {
        self.say(self.messages().tr("Converting OGG to MP3 (CBR 320k)..."));

        match self.backend.transcode(ogg, mp3).await {
            Ok(()) => {
                self.say(self.messages().fill(
                    "MP3 file successfully converted: {file}",
                    &[("file", &mp3.display())],
                ));
                Ok(())
            }
            Err(e @ HoerbuchError::FileAlreadyExists(_)) => Err(e),
            Err(e) => {
                error!("Error during MP3 conversion: {}", e);
                if let Err(delete_err) = FileManager::safe_delete(mp3).await {
                    warn!("{}", delete_err);
                } else {
                    self.say(self.messages().tr("Partial MP3 file deleted after error."));
                }
                Err(e)
            }
        }
    }
}
