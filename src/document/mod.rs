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

//! Segment extraction from text documents
//!
//! # Supported Formats
//! - `.txt`: paragraphs separated by blank lines, one segment each
//! - `.docx`: Word documents, headings start segments
//! - `.odt`: OpenDocument text, headings start segments
//! - `.epub`: e-books, one segment per table of contents entry
//!
//! The office formats and EPUB are zip archives of XML parts; they are read
//! with `zip` and parsed with `quick-xml`.

pub mod epub;
pub mod office;
pub mod txt;

use crate::chapters::marker::Segment;
use crate::config::Messages;
use crate::error::{HoerbuchError, Result};
use quick_xml::events::BytesText;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

/// Kind of input document, from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Txt,
    Docx,
    Odt,
    Epub,
}

impl DocumentKind {
    /// Detect the document kind from a path's extension (case-insensitive)
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "txt" => Ok(Self::Txt),
            "docx" => Ok(Self::Docx),
            "odt" => Ok(Self::Odt),
            "epub" => Ok(Self::Epub),
            _ => Err(HoerbuchError::UnsupportedDocument {
                extension: format!(".{}", extension),
            }),
        }
    }
}

/// Segments and whatever metadata the document carries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub segments: Vec<Segment>,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Load and segment the document at `path`
pub async fn load_document(path: &Path, messages: &Messages) -> Result<ExtractedDocument> {
    let kind = DocumentKind::from_path(path)?;

    let bytes = tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            HoerbuchError::FileNotFound(path.display().to_string())
        } else {
            HoerbuchError::file_io("read", path, e)
        }
    })?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let document = match kind {
        DocumentKind::Txt => txt::parse_txt(&String::from_utf8_lossy(&bytes), messages)?,
        DocumentKind::Docx => office::parse_docx(&bytes, &stem)?,
        DocumentKind::Odt => office::parse_odt(&bytes, &stem)?,
        DocumentKind::Epub => epub::parse_epub(&bytes, &stem)?,
    };

    debug!(
        "Extracted {} segments from {} ({:?})",
        document.segments.len(),
        path.display(),
        kind
    );
    Ok(document)
}

/// In-memory zip archive
pub(crate) struct Archive {
    zip: ZipArchive<Cursor<Vec<u8>>>,
}

impl Archive {
    pub(crate) fn open(bytes: &[u8]) -> Result<Self> {
        let zip = ZipArchive::new(Cursor::new(bytes.to_vec()))
            .map_err(|e| HoerbuchError::parse(format!("Not a valid archive: {}", e), None))?;
        Ok(Self { zip })
    }

    /// Read a member as UTF-8 text
    pub(crate) fn read_string(&mut self, name: &str) -> Result<String> {
        let mut file = self.zip.by_name(name).map_err(|e| {
            HoerbuchError::parse(format!("Missing archive member: {}", e), Some(name.to_string()))
        })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read a member if it exists
    pub(crate) fn read_optional(&mut self, name: &str) -> Result<Option<String>> {
        if self.zip.index_for_name(name).is_none() {
            return Ok(None);
        }
        self.read_string(name).map(Some)
    }
}

/// Decode XML text, tolerating HTML entities XML does not define
pub(crate) fn decode_text(text: &BytesText) -> String {
    match text.unescape_with(html_entity) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(text).into_owned(),
    }
}

fn html_entity(name: &str) -> Option<&'static str> {
    match name {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        "nbsp" => Some("\u{a0}"),
        "shy" => Some(""),
        "mdash" => Some("\u{2014}"),
        "ndash" => Some("\u{2013}"),
        "hellip" => Some("\u{2026}"),
        "laquo" => Some("\u{ab}"),
        "raquo" => Some("\u{bb}"),
        "bdquo" => Some("\u{201e}"),
        "ldquo" => Some("\u{201c}"),
        "rdquo" => Some("\u{201d}"),
        "lsquo" => Some("\u{2018}"),
        "rsquo" => Some("\u{2019}"),
        "sbquo" => Some("\u{201a}"),
        _ => None,
    }
}

/// Trimmed, non-empty text
pub(crate) fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Groups paragraphs into segments at heading boundaries
///
/// Text before the first heading becomes its own segment titled with the
/// file stem. A heading followed by no text produces no segment.
#[derive(Debug)]
pub(crate) struct SegmentBuilder {
    fallback_title: String,
    current_title: Option<String>,
    current_text: Vec<String>,
    segments: Vec<Segment>,
}

impl SegmentBuilder {
    pub(crate) fn new(fallback_title: &str) -> Self {
        Self {
            fallback_title: fallback_title.to_string(),
            current_title: None,
            current_text: Vec::new(),
            segments: Vec::new(),
        }
    }

    pub(crate) fn heading(&mut self, title: String) {
        self.flush();
        self.current_title = Some(title);
    }

    pub(crate) fn paragraph(&mut self, text: String) {
        self.current_text.push(text);
    }

    fn flush(&mut self) {
        if !self.current_text.is_empty() {
            let title = self
                .current_title
                .take()
                .unwrap_or_else(|| self.fallback_title.clone());
            let text = self.current_text.join("\n");
            self.segments.push(Segment::new(title, text.trim()));
        }
        self.current_title = None;
        self.current_text.clear();
    }

    pub(crate) fn finish(mut self) -> Vec<Segment> {
        self.flush();
        self.segments
    }
}
