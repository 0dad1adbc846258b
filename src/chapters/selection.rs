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

//! Chapter selection
//!
//! # Chapter Argument
//! The `-k/--chapters` option is ambiguous on the command line. It may be:
//! - absent: no chapter mode, the whole document becomes one container
//! - a bare flag: interactive menu
//! - a value, which is either a chapter number or a path
//!
//! A path value usually means the user wrote `-k book.epub` and the
//! positional argument ended up somewhere else. [`resolve_arguments`] sorts
//! this out with file existence checks only:
//!
//! | value         | value exists | input exists | result                      |
//! |---------------|--------------|--------------|-----------------------------|
//! | integer       | -            | -            | chapter number              |
//! | string        | yes          | no / absent  | value becomes input, menu   |
//! | string        | yes          | yes          | menu                        |
//! | string        | no           | -            | menu                        |
//!
//! Anything unclear ends up in the interactive menu, never in direct
//! synthesis.
//!
//! # Modes
//! A chapter number is checked against the segment count once the document
//! is loaded. Numbers outside `1..=count` fall back to the menu with a
//! warning.

use crate::chapters::marker::Segment;
use crate::config::Messages;
use tracing::{debug, warn};

/// Raw `-k/--chapters` argument as parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterArg {
    Absent,
    Flag,
    Value(String),
}

impl From<Option<Option<String>>> for ChapterArg {
    fn from(raw: Option<Option<String>>) -> Self {
        match raw {
            None => Self::Absent,
            Some(None) => Self::Flag,
            Some(Some(value)) => Self::Value(value),
        }
    }
}

/// What the user asked for before the document is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterRequest {
    None,
    Interactive,
    Number(i64),
}

/// Input path and chapter request after disambiguation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArgs {
    pub input: Option<String>,
    pub request: ChapterRequest,
    /// The chapter value was taken as the input path
    pub swapped: bool,
}

/// Resolve the chapter argument against the positional input
///
/// `exists` is the only source of filesystem knowledge, so the decision
/// table can be checked without touching the disk.
pub fn resolve_arguments<F>(arg: ChapterArg, input: Option<String>, exists: F) -> ResolvedArgs
where
    F: Fn(&str) -> bool,
{
    let value = match arg {
        ChapterArg::Absent => {
            return ResolvedArgs {
                input,
                request: ChapterRequest::None,
                swapped: false,
            }
        }
        ChapterArg::Flag => {
            return ResolvedArgs {
                input,
                request: ChapterRequest::Interactive,
                swapped: false,
            }
        }
        ChapterArg::Value(value) => value,
    };

    if let Ok(number) = value.trim().parse::<i64>() {
        return ResolvedArgs {
            input,
            request: ChapterRequest::Number(number),
            swapped: false,
        };
    }

    let input_exists = input.as_deref().map(&exists).unwrap_or(false);
    if exists(&value) && !input_exists {
        debug!("Treating chapter value {:?} as the input file", value);
        return ResolvedArgs {
            input: Some(value),
            request: ChapterRequest::Interactive,
            swapped: true,
        };
    }

    ResolvedArgs {
        input,
        request: ChapterRequest::Interactive,
        swapped: false,
    }
}

/// How the loaded document is narrated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterMode {
    /// Whole document into one container with markers
    NoChapterMode,
    /// Exactly one chapter, 1-based
    DirectChapter(usize),
    /// Ask the user
    Interactive,
}

/// Chapter number outside the document's range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterNotFound {
    pub requested: i64,
    pub available: usize,
}

impl ChapterMode {
    /// Pick the mode for a document with `segment_count` segments
    pub fn select(request: &ChapterRequest, segment_count: usize) -> (Self, Option<ChapterNotFound>) {
        match *request {
            ChapterRequest::None => (Self::NoChapterMode, None),
            ChapterRequest::Interactive => (Self::Interactive, None),
            ChapterRequest::Number(n) => match chapter_index(n, segment_count) {
                Some(index) => (Self::DirectChapter(index), None),
                None => {
                    warn!(
                        "Chapter {} not found (document has {} chapters), falling back to interactive mode",
                        n, segment_count
                    );
                    (
                        Self::Interactive,
                        Some(ChapterNotFound {
                            requested: n,
                            available: segment_count,
                        }),
                    )
                }
            },
        }
    }
}

/// `n` as a 1-based chapter number if it is in `1..=count`
pub fn chapter_index(n: i64, count: usize) -> Option<usize> {
    usize::try_from(n).ok().filter(|&i| i >= 1 && i <= count)
}

/// Answer to the interactive menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuChoice {
    /// All chapters into one container with markers
    CombineAll,
    /// One container per chapter
    SplitAll,
    /// A single chapter, 1-based and not yet range checked
    Chapter(u64),
    Invalid,
}

/// Parse one line of menu input
pub fn parse_menu_choice(line: &str) -> MenuChoice {
    let choice = line.trim().to_lowercase();
    match choice.as_str() {
        "a" => MenuChoice::CombineAll,
        "s" => MenuChoice::SplitAll,
        digits if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => digits
            .parse()
            .map(MenuChoice::Chapter)
            .unwrap_or(MenuChoice::Invalid),
        _ => MenuChoice::Invalid,
    }
}

/// Menu text listing every segment and the available options
pub fn render_menu(segments: &[Segment], messages: &Messages) -> String {
    let mut menu = String::new();
    menu.push_str(messages.tr("Interactive chapter mode started"));
    menu.push('\n');
    menu.push_str(&messages.fill("{n} chapters detected:", &[("n", &segments.len())]));
    menu.push('\n');

    for (i, segment) in segments.iter().enumerate() {
        menu.push_str(&format!("  [{}] {}\n", i + 1, segment.title));
    }

    menu.push('\n');
    menu.push_str(messages.tr("Options:"));
    menu.push('\n');
    menu.push_str(messages.tr("  [a] All chapters in ONE OGG file (with chapter markers)"));
    menu.push('\n');
    menu.push_str(messages.tr("  [s] Split chapters: ONE file per chapter"));
    menu.push('\n');
    menu.push_str(messages.tr("  [<number>] Synthesize a single specific chapter (e.g. '2')"));
    menu.push('\n');
    menu.push_str(&"-".repeat(50));
    menu.push('\n');
    menu
}
