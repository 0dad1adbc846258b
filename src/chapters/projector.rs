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

//! Marker projection into MP3 chapter tags
//!
//! # ID3v2 Chapter Frames
//! Each marker becomes one `CHAP` frame:
//! - element id: `ch{index}` (0-based, the scheme FFmpeg's ID3 muxer uses)
//! - start: `round(offset_seconds * 1000)` ms
//! - end: start of the next chapter in ms, `0` (unbounded) for the last one
//! - nested `TIT2` with the chapter title
//!
//! Whole-file `TIT2` (title) and `TPE1` (artist) are written alongside.
//!
//! # Embedding
//! Tags are rendered as an FFmpeg metadata document and muxed in by
//! [`crate::backend::MediaBackend::write_chapter_tags`]:
//! ```text
//! ;FFMETADATA1
//! title=Book
//! artist=Author
//!
//! [CHAPTER]
//! TIMEBASE=1/1000
//! START=500
//! END=3200
//! title=Intro
//! ```

use crate::chapters::marker::{BookMetadata, Marker};
use serde::{Deserialize, Serialize};

/// End offset written for the last chapter
pub const UNBOUNDED_END_MS: u64 = 0;

/// One ID3v2 `CHAP` frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterFrame {
    pub element_id: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub title: String,
}

/// Complete tag set for a secondary container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterTags {
    pub title: String,
    pub artist: String,
    pub chapters: Vec<ChapterFrame>,
}

/// Convert seconds to whole milliseconds, rounding to nearest
pub fn seconds_to_ms(seconds: f64) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * 1000.0).round() as u64
}

/// Map markers onto chapter frames, in marker order
pub fn project(markers: &[Marker], metadata: &BookMetadata) -> ChapterTags {
    let starts: Vec<u64> = markers
        .iter()
        .map(|m| seconds_to_ms(m.offset_seconds))
        .collect();

    let chapters = markers
        .iter()
        .enumerate()
        .map(|(index, marker)| ChapterFrame {
            element_id: format!("ch{}", index),
            start_ms: starts[index],
            end_ms: starts.get(index + 1).copied().unwrap_or(UNBOUNDED_END_MS),
            title: marker.title.clone(),
        })
        .collect();

    ChapterTags {
        title: metadata.title.clone(),
        artist: metadata.artist.clone(),
        chapters,
    }
}

impl ChapterTags {
    /// Whole-file tags without chapters
    pub fn without_chapters(metadata: &BookMetadata) -> Self {
        project(&[], metadata)
    }

    /// Render as an FFmpeg metadata (`;FFMETADATA1`) document
    pub fn to_ffmetadata(&self) -> String {
        let mut out = String::from(";FFMETADATA1\n");
        out.push_str(&format!("title={}\n", escape_ffmetadata(&self.title)));
        out.push_str(&format!("artist={}\n", escape_ffmetadata(&self.artist)));

        for chapter in &self.chapters {
            out.push_str("\n[CHAPTER]\n");
            out.push_str("TIMEBASE=1/1000\n");
            out.push_str(&format!("START={}\n", chapter.start_ms));
            out.push_str(&format!("END={}\n", chapter.end_ms));
            out.push_str(&format!("title={}\n", escape_ffmetadata(&chapter.title)));
        }

        out
    }
}

/// Escape `=`, `;`, `#`, `\` and newlines for an FFmpeg metadata file
pub fn escape_ffmetadata(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '=' | ';' | '#' | '\\' | '\n') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
