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

//! Output path derivation
//!
//! # Naming
//! - Whole book: the input path with its extension replaced,
//!   `books/roman.epub` → `books/roman.ogg`
//! - One chapter: `{input stem}_{NN}_{sanitized title}.{ext}` next to the
//!   input, `books/roman.epub` → `books/roman_03_Der_Sturm.ogg`
//!
//! # Title Sanitization
//! 1. Drop everything but letters, digits, `_`, whitespace and `-`
//! 2. Trim
//! 3. Collapse whitespace runs into a single `_`
//! 4. Keep at most 50 characters
//!
//! The result only contains characters the first step keeps and no
//! whitespace, so sanitizing it again changes nothing.

use crate::audio::decoder::AudioFormat;
use std::path::{Path, PathBuf};

/// Maximum length of a sanitized title in characters
pub const MAX_TITLE_CHARS: usize = 50;

/// Make a chapter title safe for use in a file name
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '_' || *c == '-')
        .collect();

    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect()
}

/// File stem for one chapter: two-digit 1-based index plus sanitized title
pub fn chapter_file_stem(index: usize, title: &str) -> String {
    format!("{:02}_{}", index, sanitize_title(title))
}

/// Output path for the whole book in `format`
pub fn book_output_path(input: &Path, format: AudioFormat) -> PathBuf {
    input.with_extension(format.to_extension())
}

/// Output path for chapter `index` (1-based) in `format`
pub fn chapter_output_path(input: &Path, index: usize, title: &str, format: AudioFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = format!(
        "{}_{}.{}",
        stem,
        chapter_file_stem(index, title),
        format.to_extension()
    );

    match input.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Human readable title from a file name
///
/// `_`, `-` and `.` become spaces, runs of spaces collapse, and every word
/// starts upper case with the rest lower case.
pub fn title_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let spaced: String = stem
        .chars()
        .map(|c| if matches!(c, '_' | '-' | '.') { ' ' } else { c })
        .collect();

    title_case(&spaced.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Upper-case the first letter of every run of letters, lower-case the rest
fn title_case(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_word = false;

    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                result.extend(c.to_lowercase());
            } else {
                result.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            result.push(c);
            in_word = false;
        }
    }

    result
}

/// Hidden scratch file next to `path` for rewrite-then-rename
pub fn temp_sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let temp = format!(".{}.{}{}", name, suffix, extension);

    match path.parent() {
        Some(parent) => parent.join(temp),
        None => PathBuf::from(temp),
    }
}
