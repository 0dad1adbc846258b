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

//! Silence generation for lead-in / lead-out padding

/// Return a buffer of `duration_seconds` of 16-bit silence at `sample_rate`
///
/// The sample count is truncated, matching how a partial sample cannot be
/// written. Negative or non-finite durations yield an empty buffer.
pub fn silence(duration_seconds: f64, sample_rate: u32) -> Vec<i16> {
    vec![0; silence_len(duration_seconds, sample_rate)]
}

/// Number of samples in `duration_seconds` of audio at `sample_rate`
pub fn silence_len(duration_seconds: f64, sample_rate: u32) -> usize {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return 0;
    }
    (duration_seconds * f64::from(sample_rate)) as usize
}
