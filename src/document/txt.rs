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

//! Plain text documents
//!
//! Two or more consecutive newlines separate paragraphs. Every non-empty
//! paragraph becomes a segment titled `Segment {n}`.

use crate::chapters::marker::Segment;
use crate::config::Messages;
use crate::document::{non_empty, ExtractedDocument};
use crate::error::{HoerbuchError, Result};
use regex::Regex;

pub fn parse_txt(text: &str, messages: &Messages) -> Result<ExtractedDocument> {
    let separator = Regex::new(r"\n{2,}").map_err(|e| HoerbuchError::parse(e.to_string(), None))?;
    let text = text.replace("\r\n", "\n");

    let segments = separator
        .split(&text)
        .filter_map(non_empty)
        .enumerate()
        .map(|(i, paragraph)| {
            Segment::new(messages.fill("Segment {n}", &[("n", &(i + 1))]), paragraph)
        })
        .collect();

    Ok(ExtractedDocument {
        segments,
        title: None,
        author: None,
    })
}
