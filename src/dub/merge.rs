//! Merge raw caption fragments into dubbing segments.
//!
//! Captions arrive as many short timed lines. Each segment costs one remote
//! synthesis call and leaves a small audible seam where it is placed, so
//! fragments separated by short pauses are folded together, with the pause
//! written into the text for the voice to honour.
//!
//! Fragments with fewer than three words (interjections, "[Music]" leftovers)
//! are unreliable timing anchors. When either side of a pair is that short the
//! gap allowance doubles and, if the pair merges, the merged segment's start is
//! nudged forward by one threshold, never past the incoming fragment's start.

use thiserror::Error;

use super::segment::TranscriptSegment;

pub const DEFAULT_GAP_THRESHOLD_SECONDS: f64 = 3.5;
pub const MAX_MERGED_DURATION_SECONDS: f64 = 120.0;
const FILLER_WORD_LIMIT: usize = 3;

#[derive(Debug, Error, PartialEq)]
pub enum MergeError {
    #[error("segment {index} has invalid timing: {start} --> {end}")]
    InvalidSegment { index: usize, start: f64, end: f64 },

    #[error("gap threshold must be a non-negative number of seconds, got {0}")]
    InvalidThreshold(f64),
}

pub fn merge(
    fragments: Vec<TranscriptSegment>,
    gap_threshold: f64,
) -> Result<Vec<TranscriptSegment>, MergeError> {
    if !gap_threshold.is_finite() || gap_threshold < 0.0 {
        return Err(MergeError::InvalidThreshold(gap_threshold));
    }
    validate(&fragments)?;

    let mut merged = Vec::with_capacity(fragments.len());
    let mut iter = fragments.into_iter();
    let Some(mut open) = iter.next() else {
        return Ok(merged);
    };

    for fragment in iter {
        let gap = fragment.start - open.end;
        let filler = is_filler(&open) || is_filler(&fragment);
        let (multiplier, candidate_start) = if filler {
            let nudged = (open.start + gap_threshold)
                .min(fragment.start)
                .max(open.start);
            (2.0, nudged)
        } else {
            (1.0, open.start)
        };

        let within_gap = gap <= gap_threshold * multiplier;
        let within_budget = fragment.end - candidate_start <= MAX_MERGED_DURATION_SECONDS;

        if within_gap && within_budget {
            open = absorb(open, fragment, candidate_start, gap);
        } else {
            merged.push(std::mem::replace(&mut open, fragment));
        }
    }

    merged.push(open);
    Ok(merged)
}

fn validate(fragments: &[TranscriptSegment]) -> Result<(), MergeError> {
    for (index, fragment) in fragments.iter().enumerate() {
        let finite = fragment.start.is_finite() && fragment.end.is_finite();
        if !finite || fragment.end < fragment.start {
            return Err(MergeError::InvalidSegment {
                index,
                start: fragment.start,
                end: fragment.end,
            });
        }
    }
    Ok(())
}

fn is_filler(segment: &TranscriptSegment) -> bool {
    segment.word_count() < FILLER_WORD_LIMIT
}

fn absorb(
    open: TranscriptSegment,
    fragment: TranscriptSegment,
    start: f64,
    gap: f64,
) -> TranscriptSegment {
    let pause = pause_annotation(gap);
    let translated_text = match (open.translated_text, fragment.translated_text) {
        (Some(head), Some(tail)) => Some(format!("{head}{pause}{tail}")),
        // a half-translated segment would be voiced in two languages
        _ => None,
    };

    TranscriptSegment {
        start,
        end: fragment.end.max(start),
        text: format!("{}{pause}{}", open.text, fragment.text),
        translated_text,
        dubbed_path: open.dubbed_path,
        for_dubbing: open.for_dubbing,
    }
}

fn pause_annotation(gap: f64) -> String {
    let seconds = gap.max(0.0).floor() as u64;
    format!("\n(pause for {seconds} seconds)\n")
}
