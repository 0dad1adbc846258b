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

//! Audio production: synthesis, encoding, probing and conversion
//!
//! # Module Organization
//!
//! ## silence
//! Fixed-duration silent buffers for lead-in/lead-out padding.
//!
//! ## engine
//! Speech synthesis:
//! - `SpeechEngine` / `AudioStream` - pull-based engine seam
//! - `SegmentSynthesizer` - splits segments into paragraphs, counts samples
//! - `PiperEngine` - the `piper` command line engine
//!
//! ## container
//! - `ContainerSink` - primary container writer seam
//! - `FfmpegOggSink` - Ogg Vorbis via an ffmpeg child process
//!
//! ## decoder
//! Container formats and ffprobe inspection (duration, tags).
//!
//! ## converter
//! OGG to MP3 (CBR 320 kbps, stereo) with progress tracking.
//!
//! # FFmpeg Integration
//!
//! Encoding, tagging and conversion require FFmpeg and FFprobe in PATH:
//! - macOS: `brew install ffmpeg`
//! - Linux: `apt-get install ffmpeg` or `yum install ffmpeg`
//! - Windows: Download from https://ffmpeg.org/download.html

pub mod container;
pub mod converter;
pub mod decoder;
pub mod engine;
pub mod silence;

// Re-export commonly used types for convenience
pub use container::{ContainerSink, FfmpegOggSink};
pub use converter::{AudioConverter, Mp3Options, ProgressCallback};
pub use decoder::{AudioDecoder, AudioFormat};
pub use engine::{AudioStream, PiperEngine, SegmentSynthesizer, SpeechEngine};
pub use silence::silence;
