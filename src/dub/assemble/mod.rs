//! Lay synthesized clips onto a vocals-only timeline.
//!
//! Clips keep their natural length. Each one starts at its caption time unless
//! the previous clip is still playing, in which case it waits for it to finish.
//! Drift accumulates instead of speech being time-stretched; the timeline grows
//! past the background when the last clip overruns it.

mod mix;

pub use mix::{merge_background_and_vocals, mix_args};

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::segment::TranscriptSegment;
use super::support::ffmpeg::{audio_duration_seconds, decode_to_pcm, is_wav};
use crate::ui::prelude::{Level, emit};

/// Timeline format; matches what the speech model returns.
pub const TIMELINE_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRequest {
    pub segment_index: usize,
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub segment_index: usize,
    pub start: f64,
    pub duration: f64,
}

impl Placement {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacementPlan {
    pub placements: Vec<Placement>,
    pub total_seconds: f64,
}

/// Places clips one at a time, in ascending start order.
struct Placer {
    previous_end: f64,
    total_seconds: f64,
}

impl Placer {
    fn new(background_seconds: f64) -> Self {
        Self {
            previous_end: 0.0,
            total_seconds: background_seconds.max(0.0),
        }
    }

    fn place(&mut self, request: ClipRequest) -> Placement {
        let placement = Placement {
            segment_index: request.segment_index,
            start: request.start.max(self.previous_end).max(0.0),
            duration: request.duration.max(0.0),
        };
        self.previous_end = placement.end();
        self.total_seconds = self.total_seconds.max(self.previous_end);
        placement
    }
}

/// Place clips in ascending caption order without overlap.
pub fn plan_placements(mut requests: Vec<ClipRequest>, background_seconds: f64) -> PlacementPlan {
    requests.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut placer = Placer::new(background_seconds);
    let placements = requests
        .into_iter()
        .map(|request| placer.place(request))
        .collect();

    PlacementPlan {
        placements,
        total_seconds: placer.total_seconds,
    }
}

#[derive(Debug)]
pub struct AssemblyReport {
    pub output: PathBuf,
    pub plan: PlacementPlan,
    pub skipped: Vec<PathBuf>,
}

/// Render the vocals track for `segments` against `background` into `output` (WAV).
///
/// Clips are decoded and written one at a time in start order, so only a
/// single clip is in memory. Missing or undecodable clips are reported and
/// left silent.
pub fn insert_audio_at_timestamps(
    segments: &[TranscriptSegment],
    background: &Path,
    output: &Path,
) -> Result<AssemblyReport> {
    let background_seconds = audio_duration_seconds(background)
        .with_context(|| format!("Failed to measure background {}", background.display()))?;

    let mut dubbed: Vec<(usize, &TranscriptSegment, &Path)> = segments
        .iter()
        .enumerate()
        .filter_map(|(index, segment)| segment.placed_clip().map(|clip| (index, segment, clip)))
        .collect();
    dubbed.sort_by(|a, b| a.1.start.total_cmp(&b.1.start));

    let mut track = TrackWriter::create(output)?;
    let mut placer = Placer::new(background_seconds);
    let mut placements = Vec::with_capacity(dubbed.len());
    let mut skipped = Vec::new();
    for (index, segment, clip) in dubbed {
        let samples = match load_clip(clip) {
            Ok(samples) => samples,
            Err(err) => {
                emit(
                    Level::Warn,
                    "dub.assemble.clip_skipped",
                    &format!("Skipping clip {}: {err:#}", clip.display()),
                    Some(serde_json::json!({
                        "segment": index,
                        "clip": clip.display().to_string(),
                    })),
                );
                skipped.push(clip.to_path_buf());
                continue;
            }
        };
        let placement = placer.place(ClipRequest {
            segment_index: index,
            start: segment.start,
            duration: samples.len() as f64 / f64::from(TIMELINE_SAMPLE_RATE),
        });
        track.write_at(seconds_to_samples(placement.start), &samples)?;
        placements.push(placement);
    }

    let plan = PlacementPlan {
        placements,
        total_seconds: placer.total_seconds,
    };
    track.finish(seconds_to_samples(plan.total_seconds))?;

    emit(
        Level::Debug,
        "dub.assemble.rendered",
        &format!(
            "Placed {} clips on a {:.1}s vocals track",
            plan.placements.len(),
            plan.total_seconds
        ),
        None,
    );

    Ok(AssemblyReport {
        output: output.to_path_buf(),
        plan,
        skipped,
    })
}

fn seconds_to_samples(seconds: f64) -> usize {
    (seconds * f64::from(TIMELINE_SAMPLE_RATE)).round().max(0.0) as usize
}

/// Sequential WAV writer that fills gaps between clips with silence.
struct TrackWriter {
    path: PathBuf,
    writer: hound::WavWriter<BufWriter<File>>,
    written: usize,
}

impl TrackWriter {
    fn create(path: &Path) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: TIMELINE_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            written: 0,
        })
    }

    fn pad_to(&mut self, position: usize) -> Result<()> {
        while self.written < position {
            self.writer.write_sample(0i16)?;
            self.written += 1;
        }
        Ok(())
    }

    /// Rounding must not pull a clip back over its predecessor, so an
    /// `offset` behind the write position starts at the write position.
    fn write_at(&mut self, offset: usize, samples: &[i16]) -> Result<()> {
        self.pad_to(offset)?;
        for &sample in samples {
            self.writer.write_sample(sample)?;
        }
        self.written += samples.len();
        Ok(())
    }

    fn finish(mut self, total_samples: usize) -> Result<()> {
        self.pad_to(total_samples)?;
        self.writer
            .finalize()
            .with_context(|| format!("Failed to finalize {}", self.path.display()))
    }
}

fn load_clip(path: &Path) -> Result<Vec<i16>> {
    if !path.exists() {
        anyhow::bail!("clip file does not exist");
    }

    if is_wav(path)
        && let Ok(reader) = hound::WavReader::open(path)
    {
        let spec = reader.spec();
        let native = spec.channels == 1
            && spec.sample_rate == TIMELINE_SAMPLE_RATE
            && spec.bits_per_sample == 16
            && spec.sample_format == hound::SampleFormat::Int;
        if native {
            return reader
                .into_samples::<i16>()
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("Failed to read samples from {}", path.display()));
        }
    }

    decode_to_pcm(path, TIMELINE_SAMPLE_RATE)
}
