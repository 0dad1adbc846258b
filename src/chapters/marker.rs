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

//! Segments, markers and book metadata

use crate::config::DEFAULT_ARTIST;
use crate::file::paths::title_from_path;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One titled unit of source text, usually a chapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub title: String,
    pub text: String,
}

impl Segment {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
        }
    }

    /// Length of the text in characters
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Where one segment's audio begins in a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Seconds from the start of the container
    pub offset_seconds: f64,
    pub title: String,
}

impl Marker {
    pub fn new(offset_seconds: f64, title: impl Into<String>) -> Self {
        Self {
            offset_seconds,
            title: title.into(),
        }
    }
}

/// Check that offsets strictly increase
pub fn is_strictly_increasing(markers: &[Marker]) -> bool {
    markers
        .windows(2)
        .all(|w| w[0].offset_seconds < w[1].offset_seconds)
}

/// Whole-file title and artist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    pub artist: String,
}

impl BookMetadata {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }

    /// Fill in whatever the document did not provide
    ///
    /// A missing or blank title is derived from the input file name, a
    /// missing or blank author becomes the default artist.
    pub fn resolve(title: Option<String>, author: Option<String>, input: &Path) -> Self {
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| title_from_path(input));

        let artist = author
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| DEFAULT_ARTIST.to_string());

        Self { title, artist }
    }
}
