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

//! Chapter timeline and marker handling
//!
//! # Module Organization
//!
//! ## marker
//! `Segment`, `Marker`, `BookMetadata` and ordering checks.
//!
//! ## timeline
//! `TimelineRecorder` streams segments into a container and records one
//! marker per segment at its first sample.
//!
//! ## codec
//! Markers as indexed Vorbis comments in the primary container.
//!
//! ## recovery
//! Proportional marker estimate for containers without markers.
//!
//! ## projector
//! Markers as ID3v2 `CHAP` frames for the MP3 container.
//!
//! ## selection
//! Chapter argument disambiguation, mode selection and the interactive menu.

pub mod codec;
pub mod marker;
pub mod projector;
pub mod recovery;
pub mod selection;
pub mod timeline;

pub use codec::{read_markers, write_markers, VorbisComments};
pub use marker::{BookMetadata, Marker, Segment};
pub use projector::{project, ChapterFrame, ChapterTags};
pub use recovery::estimate;
pub use selection::{ChapterArg, ChapterMode, ChapterRequest, MenuChoice};
pub use timeline::{AudioTimeline, RecordedTimeline, TimelineRecorder};
