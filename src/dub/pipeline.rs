//! End-to-end dubbing run.
//!
//! Stages run in order: download, transcript acquisition (parse or transcribe,
//! translate, merge), speech synthesis, vocals assembly, mixing, muxing and
//! finalization. The first three persist their results in the job state and
//! are skipped on a re-run once recorded.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;

use super::assemble::{insert_audio_at_timestamps, merge_background_and_vocals};
use super::captions::parse_caption_file;
use super::download::{Captions, Download, download_all};
use super::finalize::{
    FinalizeOptions, dubbed_audio_name, dubbed_video_name, finalize, write_output_gitignore,
};
use super::gemini::speech::SpeechSynthesizer;
use super::gemini::translate::{Translator, translate_segments};
use super::merge::merge;
use super::segment::{TranscriptSegment, sort_by_start};
use super::state::JobState;
use super::support::ffmpeg::{FfmpegRunner, combine_audio_video};
use super::synthesis::{SynthesisJob, synthesize_segments};
use super::transcribe::transcribe;
use crate::ui::prelude::{Level, emit};

pub const VOCALS_FILE: &str = "dubbed_vocals.wav";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("found {0} subtitle files; expected at most two (source, target)")]
    AmbiguousSubtitles(usize),
}

/// Everything a run needs, passed explicitly to each stage.
#[derive(Debug, Clone)]
pub struct DubJob {
    pub youtube_id: String,
    pub source_language: String,
    pub target_language: String,
    pub output_dir: PathBuf,
    pub voice: String,
    pub concurrency: usize,
    pub gap_threshold: f64,
    pub vocals_gain_db: f64,
    pub background_gain_db: f64,
    pub finalize: FinalizeOptions,
}

/// Fetching and local transcription of the source video. Both block.
pub trait MediaSource: Send + Sync {
    fn download(&self, job: &DubJob) -> Result<Download>;
    fn transcribe(&self, audio: &Path, job: &DubJob) -> Result<Vec<TranscriptSegment>>;
}

/// yt-dlp for media and captions, WhisperX for transcription.
#[derive(Debug, Default, Clone, Copy)]
pub struct YoutubeMedia;

impl MediaSource for YoutubeMedia {
    fn download(&self, job: &DubJob) -> Result<Download> {
        download_all(
            &job.youtube_id,
            &job.output_dir,
            &job.source_language,
            &job.target_language,
        )
    }

    fn transcribe(&self, audio: &Path, job: &DubJob) -> Result<Vec<TranscriptSegment>> {
        transcribe(audio, &job.output_dir, &job.source_language)
    }
}

pub struct Services {
    pub media: Arc<dyn MediaSource>,
    pub translator: Arc<dyn Translator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub ffmpeg: Arc<dyn FfmpegRunner>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptSource {
    /// No captions: transcribe the audio, then translate.
    Transcribe,
    /// Source-language captions only.
    Translate(PathBuf),
    /// Target-language captions, used as the translation.
    PreTranslated(PathBuf),
}

fn caption_language(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|stem| stem.to_str())
}

/// Assign recorded caption files to roles by their `{language}.json` name.
/// Files named after neither language are taken positionally as `[source, target]`.
pub fn captions_from_paths(
    paths: &[PathBuf],
    source_language: &str,
    target_language: &str,
) -> Result<Captions, PipelineError> {
    if paths.len() > 2 {
        return Err(PipelineError::AmbiguousSubtitles(paths.len()));
    }

    let named = |language: &str| {
        paths
            .iter()
            .find(|path| caption_language(path) == Some(language))
            .cloned()
    };
    let captions = Captions {
        source: named(source_language),
        target: named(target_language),
    };
    if !captions.is_empty() {
        return Ok(captions);
    }

    Ok(match paths {
        [source] => Captions {
            source: Some(source.clone()),
            target: None,
        },
        [source, target] => Captions {
            source: Some(source.clone()),
            target: Some(target.clone()),
        },
        _ => Captions::default(),
    })
}

pub fn transcript_source(captions: &Captions) -> TranscriptSource {
    match captions {
        Captions {
            target: Some(target),
            ..
        } => TranscriptSource::PreTranslated(target.clone()),
        Captions {
            source: Some(source),
            ..
        } => TranscriptSource::Translate(source.clone()),
        _ => TranscriptSource::Transcribe,
    }
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .context("Background task panicked")?
}

/// Produce the merged, translated segments for a run.
pub async fn acquire_transcripts(
    job: &DubJob,
    services: &Services,
    subtitle_paths: &[PathBuf],
    audio_path: &Path,
) -> Result<Vec<TranscriptSegment>> {
    let captions = captions_from_paths(subtitle_paths, &job.source_language, &job.target_language)?;
    let translator = services.translator.as_ref();
    let segments = match transcript_source(&captions) {
        TranscriptSource::Transcribe => {
            emit(
                Level::Info,
                "dub.transcripts.transcribe",
                "No subtitles found, transcribing audio",
                None,
            );
            let media = Arc::clone(&services.media);
            let audio = audio_path.to_path_buf();
            let task_job = job.clone();
            let fragments = blocking(move || media.transcribe(&audio, &task_job)).await?;
            translate_segments(
                translator,
                fragments,
                &job.source_language,
                &job.target_language,
            )
            .await?
        }
        TranscriptSource::Translate(path) => {
            let fragments = parse_caption_file(&path)?;
            translate_segments(
                translator,
                fragments,
                &job.source_language,
                &job.target_language,
            )
            .await?
        }
        TranscriptSource::PreTranslated(path) => parse_caption_file(&path)?
            .into_iter()
            .map(TranscriptSegment::pre_translated)
            .collect(),
    };

    let fragment_count = segments.len();
    let merged = merge(segments, job.gap_threshold)?;
    emit(
        Level::Info,
        "dub.transcripts.merged",
        &format!(
            "Merged {fragment_count} transcript fragments into {} segments",
            merged.len()
        ),
        Some(serde_json::json!({
            "fragments": fragment_count,
            "segments": merged.len(),
        })),
    );
    Ok(merged)
}

/// Segments marked for dubbing whose clip is gone from disk.
fn missing_clips(segments: &[TranscriptSegment]) -> usize {
    segments
        .iter()
        .filter_map(TranscriptSegment::placed_clip)
        .filter(|clip| !clip.exists())
        .count()
}

/// Download, transcript and synthesis stages, each skipped once `state`
/// records it. Returns the segments sorted by start.
pub async fn prepare_segments(
    job: &DubJob,
    services: &Services,
    state: &mut JobState,
) -> Result<Vec<TranscriptSegment>> {
    if !state.has_download() {
        let media = Arc::clone(&services.media);
        let task_job = job.clone();
        let download = blocking(move || media.download(&task_job)).await?;
        state.video_path = Some(download.video_path);
        state.audio_path = Some(download.audio_path);
        state.subtitle_paths = Some(download.captions.paths());
        state.save(&job.output_dir)?;
    }

    let audio_path = state.audio_path.clone().context("Job state has no audio path")?;

    if state.transcripts.is_none() {
        let subtitle_paths = state.subtitle_paths.clone().unwrap_or_default();
        let transcripts = acquire_transcripts(job, services, &subtitle_paths, &audio_path).await?;
        state.transcripts = Some(transcripts);
        state.tts_complete = false;
        state.save(&job.output_dir)?;
    }

    let mut segments = state.transcripts.clone().unwrap_or_default();

    let missing = missing_clips(&segments);
    if state.tts_complete && missing > 0 {
        emit(
            Level::Warn,
            "dub.synthesis.clips_missing",
            &format!("{missing} synthesized clips are missing, synthesizing them again"),
            None,
        );
    }

    if !state.tts_complete || missing > 0 {
        let report = synthesize_segments(
            services.synthesizer.as_ref(),
            segments,
            SynthesisJob {
                output_dir: &job.output_dir,
                voice: &job.voice,
                target_language: &job.target_language,
                concurrency: job.concurrency,
            },
        )
        .await;
        emit(
            Level::Info,
            "dub.synthesis.done",
            &format!(
                "All segments processed ({} synthesized, {} reused, {} failed)",
                report.synthesized,
                report.reused,
                report.failures.len()
            ),
            None,
        );
        state.tts_complete = report.is_complete();
        state.transcripts = Some(report.segments);
        state.save(&job.output_dir)?;
        segments = state.transcripts.clone().unwrap_or_default();
    }

    sort_by_start(&mut segments);
    Ok(segments)
}

/// Run every stage not yet recorded in the job state and return the final video path.
pub async fn run(job: &DubJob, services: &Services) -> Result<PathBuf> {
    fs::create_dir_all(&job.output_dir)
        .with_context(|| format!("Failed to create {}", job.output_dir.display()))?;
    write_output_gitignore(&job.output_dir)?;

    let mut state = JobState::load(&job.output_dir)?;
    let segments = prepare_segments(job, services, &mut state).await?;

    let video_path = state.video_path.clone().context("Job state has no video path")?;
    let audio_path = state.audio_path.clone().context("Job state has no audio path")?;

    let vocals = job.output_dir.join(VOCALS_FILE);
    let assembly = {
        let segments = segments.clone();
        let background = audio_path.clone();
        let vocals = vocals.clone();
        blocking(move || insert_audio_at_timestamps(&segments, &background, &vocals)).await?
    };
    emit(
        Level::Info,
        "dub.assemble.done",
        &format!("Dubbed vocals audio saved to {}", assembly.output.display()),
        Some(serde_json::json!({
            "placed": assembly.plan.placements.len(),
            "skipped": assembly.skipped.len(),
            "seconds": assembly.plan.total_seconds,
        })),
    );

    let mixed = {
        let ffmpeg = Arc::clone(&services.ffmpeg);
        let background = audio_path.clone();
        let vocals = vocals.clone();
        let output = job.output_dir.join(dubbed_audio_name(&job.target_language));
        let (vocals_gain, background_gain) = (job.vocals_gain_db, job.background_gain_db);
        blocking(move || {
            merge_background_and_vocals(
                ffmpeg.as_ref(),
                &background,
                &vocals,
                vocals_gain,
                background_gain,
                &output,
            )
        })
        .await?
    };
    emit(
        Level::Info,
        "dub.mix.done",
        &format!("Final dubbed audio saved to {}", mixed.display()),
        None,
    );

    let dubbed_video = {
        let ffmpeg = Arc::clone(&services.ffmpeg);
        let output = job.output_dir.join(dubbed_video_name(&job.target_language));
        blocking(move || combine_audio_video(ffmpeg.as_ref(), &video_path, &mixed, &output)).await?
    };

    let final_path = finalize(&dubbed_video, &segments, &vocals, &job.finalize)?;
    if job.finalize.cleanup {
        state.forget_clips();
        state.save(&job.output_dir)?;
    }
    emit(
        Level::Success,
        "dub.run.done",
        &format!("Dubbed video saved to {}", final_path.display()),
        Some(serde_json::json!({ "path": final_path.display().to_string() })),
    );
    Ok(final_path)
}
