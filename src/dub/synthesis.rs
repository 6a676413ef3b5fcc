use std::fs;
use std::path::{Path, PathBuf};

use futures_util::{StreamExt, stream};

use super::gemini::speech::{SpeechRequest, SpeechSynthesizer};
use super::segment::{TranscriptSegment, sort_by_start};
use crate::common::progress::create_counter;
use crate::ui::prelude::{Level, emit};

#[derive(Debug, Clone, Copy)]
pub struct SynthesisJob<'a> {
    pub output_dir: &'a Path,
    pub voice: &'a str,
    pub target_language: &'a str,
    pub concurrency: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFailure {
    pub index: usize,
    pub error: String,
}

#[derive(Debug)]
pub struct SynthesisReport {
    /// Every input segment, sorted by start; failed ones have `for_dubbing = false`.
    pub segments: Vec<TranscriptSegment>,
    pub synthesized: usize,
    pub reused: usize,
    pub failures: Vec<SegmentFailure>,
}

impl SynthesisReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Outcome {
    Reused,
    Synthesized,
    Failed(String),
}

/// Clip location for the segment at `index`; unique per index.
pub fn clip_path(output_dir: &Path, index: usize, segment: &TranscriptSegment) -> PathBuf {
    output_dir.join(format!(
        "segment_{}_{}_{}.wav",
        index + 1,
        segment.start.floor() as i64,
        segment.end.floor() as i64
    ))
}

/// Synthesize every segment with at most `job.concurrency` calls in flight.
///
/// Clips already on disk are reused without a remote call. A failing segment
/// is logged and kept silent; it never cancels the others.
pub async fn synthesize_segments(
    synthesizer: &dyn SpeechSynthesizer,
    segments: Vec<TranscriptSegment>,
    job: SynthesisJob<'_>,
) -> SynthesisReport {
    let total = segments.len();
    let pb = create_counter(total as u64, "Synthesizing speech");

    let mut outcomes: Vec<(usize, TranscriptSegment, Outcome)> =
        stream::iter(segments.into_iter().enumerate())
            .map(|(index, segment)| synthesize_one(synthesizer, job, index, total, segment))
            .buffer_unordered(job.concurrency.max(1))
            .inspect(|_| pb.inc(1))
            .collect()
            .await;
    pb.finish_and_clear();

    outcomes.sort_by_key(|(index, _, _)| *index);

    let mut report = SynthesisReport {
        segments: Vec::with_capacity(total),
        synthesized: 0,
        reused: 0,
        failures: Vec::new(),
    };
    for (index, segment, outcome) in outcomes {
        match outcome {
            Outcome::Reused => report.reused += 1,
            Outcome::Synthesized => report.synthesized += 1,
            Outcome::Failed(error) => report.failures.push(SegmentFailure { index, error }),
        }
        report.segments.push(segment);
    }
    sort_by_start(&mut report.segments);

    if !report.is_complete() {
        emit(
            Level::Warn,
            "dub.synthesis.incomplete",
            &format!(
                "{} of {} segments failed to synthesize and will be silent",
                report.failures.len(),
                total
            ),
            Some(serde_json::json!({
                "failed": report.failures.iter().map(|f| f.index + 1).collect::<Vec<_>>(),
            })),
        );
    }

    report
}

async fn synthesize_one(
    synthesizer: &dyn SpeechSynthesizer,
    job: SynthesisJob<'_>,
    index: usize,
    total: usize,
    segment: TranscriptSegment,
) -> (usize, TranscriptSegment, Outcome) {
    let output = clip_path(job.output_dir, index, &segment);
    if output.exists() {
        emit(
            Level::Debug,
            "dub.synthesis.reused",
            &format!("Audio already exists for segment {}, skipping synthesis", index + 1),
            None,
        );
        return (index, segment.with_dub(output), Outcome::Reused);
    }

    emit(
        Level::Debug,
        "dub.synthesis.segment",
        &format!(
            "Synthesizing speech for segment {}/{} ({:.1}s slot)",
            index + 1,
            total,
            segment.duration()
        ),
        None,
    );
    let request = SpeechRequest {
        text: segment.speech_text(),
        voice: job.voice,
        target_language: job.target_language,
        output: &output,
    };
    match synthesizer.synthesize(request).await {
        Ok(path) => (index, segment.with_dub(path), Outcome::Synthesized),
        Err(err) => {
            // a partial clip would be reused as finished on the next run
            if output.exists()
                && let Err(remove_err) = fs::remove_file(&output)
            {
                emit(
                    Level::Warn,
                    "dub.synthesis.partial_clip",
                    &format!(
                        "Could not remove partial clip {}: {remove_err}",
                        output.display()
                    ),
                    None,
                );
            }
            emit(
                Level::Error,
                "dub.synthesis.failed",
                &format!("Segment {} failed: {err:#}", index + 1),
                Some(serde_json::json!({
                    "segment": index + 1,
                    "start": segment.start,
                    "end": segment.end,
                })),
            );
            let message = format!("{err:#}");
            (index, segment.without_dub(), Outcome::Failed(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeSynthesizer {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl SpeechSynthesizer for FakeSynthesizer {
        async fn synthesize(&self, request: SpeechRequest<'_>) -> Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            // later segments finish first
            let delay = 30u64.saturating_sub(request.text.len() as u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if request.text.contains("fail") {
                bail!("quota exhausted");
            }
            std::fs::write(request.output, request.text)?;
            Ok(request.output.to_path_buf())
        }
    }

    /// Leaves a truncated WAV header behind before failing.
    #[derive(Default)]
    struct TruncatingSynthesizer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpeechSynthesizer for TruncatingSynthesizer {
        async fn synthesize(&self, request: SpeechRequest<'_>) -> Result<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::write(request.output, b"RIFF")?;
            bail!("connection reset mid-stream");
        }
    }

    fn segments() -> Vec<TranscriptSegment> {
        (0..8)
            .map(|i| {
                let start = i as f64 * 2.0;
                TranscriptSegment::new(start, start + 1.5, "x".repeat(i + 1))
                    .with_translation("y".repeat(i + 1))
            })
            .collect()
    }

    fn job(dir: &Path, concurrency: usize) -> SynthesisJob<'_> {
        SynthesisJob {
            output_dir: dir,
            voice: "Charon",
            target_language: "es-ES",
            concurrency,
        }
    }

    #[test]
    fn clip_names_use_index_and_whole_seconds() {
        let segment = TranscriptSegment::new(12.7, 15.2, "hello");
        assert_eq!(
            clip_path(Path::new("out"), 0, &segment),
            PathBuf::from("out/segment_1_12_15.wav")
        );
    }

    #[tokio::test]
    async fn results_are_sorted_and_concurrency_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let fake = FakeSynthesizer::default();
        let report = synthesize_segments(&fake, segments(), job(dir.path(), 3)).await;

        assert!(report.is_complete());
        assert_eq!(report.synthesized, 8);
        assert!(fake.peak.load(Ordering::SeqCst) <= 3);
        for pair in report.segments.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
        assert!(report.segments.iter().all(|s| s.placed_clip().is_some()));
    }

    #[tokio::test]
    async fn second_run_makes_no_remote_calls() {
        let dir = tempfile::tempdir().unwrap();
        let first = FakeSynthesizer::default();
        synthesize_segments(&first, segments(), job(dir.path(), 4)).await;
        assert_eq!(first.calls.load(Ordering::SeqCst), 8);

        let second = FakeSynthesizer::default();
        let report = synthesize_segments(&second, segments(), job(dir.path(), 4)).await;
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.reused, 8);
        assert!(report.segments.iter().all(|s| s.for_dubbing));
    }

    #[tokio::test]
    async fn failed_segment_is_kept_silent() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = segments();
        input[2] = input[2].clone().with_translation("please fail here");

        let fake = FakeSynthesizer::default();
        let report = synthesize_segments(&fake, input, job(dir.path(), 2)).await;

        assert_eq!(report.segments.len(), 8);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 2);
        assert!(report.failures[0].error.contains("quota exhausted"));
        assert!(!report.segments[2].for_dubbing);
        assert_eq!(
            report.segments.iter().filter(|s| s.for_dubbing).count(),
            7
        );
    }

    #[tokio::test]
    async fn partial_clip_from_failed_call_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let input: Vec<_> = segments().into_iter().take(2).collect();

        let truncating = TruncatingSynthesizer::default();
        let first = synthesize_segments(&truncating, input.clone(), job(dir.path(), 2)).await;
        assert_eq!(truncating.calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.failures.len(), 2);
        for (index, segment) in input.iter().enumerate() {
            assert!(!clip_path(dir.path(), index, segment).exists());
        }

        let fake = FakeSynthesizer::default();
        let second = synthesize_segments(&fake, input, job(dir.path(), 2)).await;
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
        assert_eq!(second.synthesized, 2);
        assert_eq!(second.reused, 0);
        assert!(second.segments.iter().all(|s| s.for_dubbing));
    }
}
