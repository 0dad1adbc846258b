//! Hoerbuch: narrated audiobooks from text documents
//!
//! Documents (`.txt`, `.docx`, `.odt`, `.epub`) are split into segments,
//! spoken by a Piper voice and written to an OGG Vorbis file whose Vorbis
//! comments carry one chapter marker per segment. Optionally the OGG is
//! converted to MP3 and the markers are projected into ID3v2 chapters.
//!
//! # Module Organization
//! - [`document`] - segment extraction
//! - [`audio`] - engine, container, probing, conversion
//! - [`chapters`] - timeline recording, marker codec, recovery, projection, selection
//! - [`backend`] - every external media tool behind one trait
//! - [`narrator`] - the pipeline
//! - [`config`], [`error`], [`file`] - shared plumbing

pub mod audio;
pub mod backend;
pub mod chapters;
pub mod config;
pub mod document;
pub mod error;
pub mod file;
pub mod narrator;

pub use backend::{FfmpegBackend, MediaBackend};
pub use config::{Messages, NarratorConfig, Padding};
pub use error::{HoerbuchError, Result};
pub use narrator::{ChapterOutcome, Narrator, SplitReport};
