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

//! Marker codec for the primary (Ogg Vorbis) container
//!
//! # Field Layout
//! Vorbis comments are free-form `KEY=value` pairs, so markers are stored as
//! indexed fields:
//! - `title`, `artist` - whole-file metadata
//! - `chapter_start_time_{i}` - offset in seconds, shortest round-trip decimal
//! - `chapter_title_{i}` - chapter title
//!
//! `i` is 0-based and contiguous.
//!
//! # Reading
//! Indices are read from 0 upwards until the first one where either field is
//! missing. Only that prefix is trusted: with indices {0, 1, 3} present, two
//! markers are returned. A missing index 0 or an unparsable offset means the
//! file carries no usable markers.

use crate::chapters::marker::{BookMetadata, Marker};
use tracing::debug;

/// Prefix shared by every marker field
pub const CHAPTER_PREFIX: &str = "chapter_";

pub const TITLE_KEY: &str = "title";
pub const ARTIST_KEY: &str = "artist";

pub fn start_time_key(index: usize) -> String {
    format!("chapter_start_time_{}", index)
}

pub fn title_key(index: usize) -> String {
    format!("chapter_title_{}", index)
}

/// Ordered list of Vorbis comment fields
///
/// Field names are case-insensitive, so lookups and replacements ignore case.
/// Insertion order is kept for everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VorbisComments {
    fields: Vec<(String, String)>,
}

impl VorbisComments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Replace every value of `key` with a single `value`
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .fields
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some(pos) => {
                self.fields[pos].1 = value;
                let mut index = 0;
                self.fields.retain(|(k, _)| {
                    let keep = index <= pos || !k.eq_ignore_ascii_case(key);
                    index += 1;
                    keep
                });
            }
            None => self.fields.push((key.to_string(), value)),
        }
    }

    /// Remove every field whose name starts with `prefix`
    pub fn remove_prefixed(&mut self, prefix: &str) -> usize {
        let before = self.fields.len();
        self.fields.retain(|(k, _)| !has_prefix_ignore_case(k, prefix));
        before - self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.fields
    }
}

fn has_prefix_ignore_case(key: &str, prefix: &str) -> bool {
    key.len() >= prefix.len()
        && key.is_char_boundary(prefix.len())
        && key[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Replace all marker fields and the whole-file metadata
pub fn write_markers(comments: &mut VorbisComments, markers: &[Marker], metadata: &BookMetadata) {
    comments.set(TITLE_KEY, metadata.title.as_str());
    comments.set(ARTIST_KEY, metadata.artist.as_str());

    let removed = comments.remove_prefixed(CHAPTER_PREFIX);
    if removed > 0 {
        debug!("Cleared {} existing chapter fields", removed);
    }

    for (index, marker) in markers.iter().enumerate() {
        comments.set(&start_time_key(index), marker.offset_seconds.to_string());
        comments.set(&title_key(index), marker.title.as_str());
    }
}

/// Read the contiguous run of markers starting at index 0
///
/// Returns `None` when no usable markers are present.
pub fn read_markers(comments: &VorbisComments) -> Option<Vec<Marker>> {
    let mut markers = Vec::new();

    for index in 0.. {
        let (Some(start), Some(title)) = (
            comments.get(&start_time_key(index)),
            comments.get(&title_key(index)),
        ) else {
            break;
        };

        match parse_offset(start) {
            Some(offset) => markers.push(Marker::new(offset, title)),
            None => {
                debug!("Unparsable chapter start time {:?} at index {}", start, index);
                return None;
            }
        }
    }

    if markers.is_empty() {
        None
    } else {
        Some(markers)
    }
}

fn parse_offset(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> BookMetadata {
        BookMetadata::new("Book", "Author")
    }

    fn pairs(fields: &[(&str, &str)]) -> VorbisComments {
        VorbisComments::from_pairs(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_round_trip() {
        for markers in [
            vec![],
            vec![Marker::new(0.5, "Intro")],
            vec![
                Marker::new(0.5, "Intro"),
                Marker::new(5.500000000000001, "Körper = Body"),
                Marker::new(1234.567891, ""),
            ],
        ] {
            let mut comments = VorbisComments::new();
            write_markers(&mut comments, &markers, &meta());
            let read = read_markers(&comments).unwrap_or_default();
            assert_eq!(read, markers);
        }
    }

    #[test]
    fn test_gap_returns_prefix() {
        let comments = pairs(&[
            ("chapter_start_time_0", "0.5"),
            ("chapter_title_0", "A"),
            ("chapter_start_time_1", "3.2"),
            ("chapter_title_1", "B"),
            ("chapter_start_time_3", "9"),
            ("chapter_title_3", "D"),
        ]);

        let markers = read_markers(&comments).unwrap();
        assert_eq!(markers, vec![Marker::new(0.5, "A"), Marker::new(3.2, "B")]);
    }

    #[test]
    fn test_missing_index_zero_means_no_markers() {
        let comments = pairs(&[("chapter_start_time_1", "3.2"), ("chapter_title_1", "B")]);
        assert_eq!(read_markers(&comments), None);
    }

    #[test]
    fn test_title_without_time_ends_the_run() {
        let comments = pairs(&[
            ("chapter_start_time_0", "0.5"),
            ("chapter_title_0", "A"),
            ("chapter_title_1", "B"),
        ]);
        assert_eq!(read_markers(&comments).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_failure_means_no_markers() {
        for bad in ["abc", "-1", "NaN", "inf"] {
            let comments = pairs(&[
                ("chapter_start_time_0", "0.5"),
                ("chapter_title_0", "A"),
                ("chapter_start_time_1", bad),
                ("chapter_title_1", "B"),
            ]);
            assert_eq!(read_markers(&comments), None, "value {:?}", bad);
        }
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let comments = pairs(&[("CHAPTER_START_TIME_0", "1.5"), ("Chapter_Title_0", "Eins")]);
        assert_eq!(read_markers(&comments).unwrap(), vec![Marker::new(1.5, "Eins")]);
    }

    #[test]
    fn test_write_clears_stale_markers_and_keeps_other_fields() {
        let mut comments = pairs(&[
            ("ENCODER", "Lavc60 libvorbis"),
            ("TITLE", "Old"),
            ("chapter_start_time_0", "1"),
            ("chapter_title_0", "Old 0"),
            ("chapter_start_time_5", "9"),
            ("chapter_title_5", "Old 5"),
        ]);

        write_markers(&mut comments, &[Marker::new(0.5, "New")], &meta());

        assert_eq!(comments.get("encoder"), Some("Lavc60 libvorbis"));
        assert_eq!(comments.get("title"), Some("Book"));
        assert_eq!(comments.get("artist"), Some("Author"));
        assert_eq!(comments.get("chapter_title_5"), None);
        assert_eq!(comments.len(), 5);
    }

    #[test]
    fn test_set_collapses_duplicates() {
        let mut comments = pairs(&[("artist", "a"), ("x", "1"), ("ARTIST", "b")]);
        comments.set("Artist", "c");
        assert_eq!(
            comments.into_pairs(),
            vec![("artist".to_string(), "c".to_string()), ("x".to_string(), "1".to_string())]
        );
    }
}
