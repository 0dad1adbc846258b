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

//! Approximate marker recovery
//!
//! Used when a container carries no readable markers. Each segment gets a
//! share of the speech duration proportional to its share of the characters:
//!
//! ```text
//! speech = max(0, total - lead_in - lead_out)
//! offset[0] = lead_in
//! offset[i + 1] = offset[i] + speech * chars[i] / total_chars
//! ```
//!
//! The audio itself is never inspected. Numbers, abbreviations and anything
//! else the engine reads out at an unusual rate make the estimate drift.

use crate::chapters::marker::{Marker, Segment};
use crate::config::Padding;
use tracing::debug;

/// Estimate marker offsets for `segments` in a container of `total_duration`
///
/// An empty result means chapter metadata cannot be derived, which happens
/// when the segments have no text or the container is no longer than its
/// padding.
pub fn estimate(segments: &[Segment], total_duration: f64, padding: &Padding) -> Vec<Marker> {
    let speech_duration = (total_duration - padding.lead_in - padding.lead_out).max(0.0);
    let total_chars: usize = segments.iter().map(Segment::char_count).sum();

    if total_chars == 0 || speech_duration == 0.0 || !speech_duration.is_finite() {
        debug!(
            "Cannot estimate markers ({} chars, {:.2}s of speech)",
            total_chars, speech_duration
        );
        return Vec::new();
    }

    let mut offset = padding.lead_in;
    let mut markers = Vec::with_capacity(segments.len());

    for segment in segments {
        markers.push(Marker::new(offset, segment.title.as_str()));
        let share = segment.char_count() as f64 / total_chars as f64;
        offset += speech_duration * share;
    }

    debug!(
        "Estimated {} markers over {:.2}s of speech",
        markers.len(),
        speech_duration
    );
    markers
}
