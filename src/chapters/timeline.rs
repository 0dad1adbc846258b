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

//! Timeline recorder
//!
//! Streams segments through the synthesizer into a container and records a
//! marker for each segment at the instant its first sample is written.
//!
//! # Layout of a recorded container
//! ```text
//! | lead-in | segment 0 | segment 1 | ... | segment n-1 | lead-out |
//!           ^ marker 0  ^ marker 1        ^ marker n-1
//! ```
//!
//! # Timing
//! Elapsed time is the number of samples written so far divided by the
//! sample rate. Engine-reported durations are never used, so every marker
//! points at audio that has already been handed to the container.

use crate::audio::container::ContainerSink;
use crate::audio::engine::{SegmentSynthesizer, SpeechEngine};
use crate::audio::silence::silence;
use crate::chapters::marker::{Marker, Segment};
use crate::config::Padding;
use crate::error::Result;
use tracing::{debug, info};

/// Accumulating state of one synthesis run
#[derive(Debug, Clone)]
pub struct AudioTimeline {
    sample_rate: u32,
    samples_written: u64,
    markers: Vec<Marker>,
}

impl AudioTimeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            samples_written: 0,
            markers: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.samples_written as f64 / f64::from(self.sample_rate)
    }

    /// Account for `samples` more samples written to the container
    pub fn advance(&mut self, samples: usize) {
        self.samples_written += samples as u64;
    }

    /// Record a marker at the current position
    pub fn mark(&mut self, title: &str) -> &Marker {
        let offset = self.elapsed_seconds();
        self.markers.push(Marker::new(offset, title));
        &self.markers[self.markers.len() - 1]
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn into_recorded(self) -> RecordedTimeline {
        RecordedTimeline {
            total_seconds: self.elapsed_seconds(),
            markers: self.markers,
        }
    }
}

/// Result of a completed recording
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTimeline {
    /// One marker per segment, in segment order
    pub markers: Vec<Marker>,
    /// Length of the container including padding
    pub total_seconds: f64,
}

/// Drives synthesis of a segment list into one container
pub struct TimelineRecorder {
    padding: Padding,
}

impl TimelineRecorder {
    pub fn new(padding: Padding) -> Self {
        Self { padding }
    }

    /// Record `segments` into `sink`
    ///
    /// The sink is finished on success and aborted on failure. Deleting a
    /// failed container is left to whoever created it.
    pub async fn record<E, F>(
        &self,
        segments: &[Segment],
        synth: &mut SegmentSynthesizer<E>,
        mut sink: Box<dyn ContainerSink>,
        mut on_segment: F,
    ) -> Result<RecordedTimeline>
    where
        E: SpeechEngine,
        F: FnMut(usize, &Marker),
    {
        let recorded = self
            .write_timeline(segments, synth, sink.as_mut(), &mut on_segment)
            .await;

        match recorded {
            Ok(timeline) => {
                sink.finish().await?;
                info!(
                    "Recorded {} segments, {:.2}s total",
                    timeline.markers.len(),
                    timeline.total_seconds
                );
                Ok(timeline)
            }
            Err(e) => {
                sink.abort().await;
                Err(e)
            }
        }
    }

    async fn write_timeline<E, F>(
        &self,
        segments: &[Segment],
        synth: &mut SegmentSynthesizer<E>,
        sink: &mut dyn ContainerSink,
        on_segment: &mut F,
    ) -> Result<RecordedTimeline>
    where
        E: SpeechEngine,
        F: FnMut(usize, &Marker),
    {
        let sample_rate = synth.sample_rate();
        let mut timeline = AudioTimeline::new(sample_rate);

        let total_chars: usize = segments.iter().map(Segment::char_count).sum();
        debug!(
            "Synthesizing {} characters in {} segments at {} Hz",
            total_chars,
            segments.len(),
            sample_rate
        );

        let lead_in = silence(self.padding.lead_in, sample_rate);
        sink.write_samples(&lead_in).await?;
        timeline.advance(lead_in.len());

        for (index, segment) in segments.iter().enumerate() {
            let marker = timeline.mark(&segment.title);
            on_segment(index, marker);

            let mut audio = synth.segment(&segment.text);
            while let Some(buffer) = audio.next_buffer().await? {
                sink.write_samples(&buffer).await?;
                timeline.advance(buffer.len());
            }
        }

        let lead_out = silence(self.padding.lead_out, sample_rate);
        sink.write_samples(&lead_out).await?;
        timeline.advance(lead_out.len());

        Ok(timeline.into_recorded())
    }
}
