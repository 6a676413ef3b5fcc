use std::sync::Arc;

use anyhow::{Context, Result, bail};

use super::captions::parse_caption_file;
use super::cli::{DubCommands, RunArgs, SegmentsArgs};
use super::config::DubConfig;
use super::credentials::CredentialPool;
use super::finalize::FinalizeOptions;
use super::gemini::GeminiClient;
use super::gemini::speech::GeminiSpeech;
use super::gemini::translate::GeminiTranslator;
use super::gemini::voices::{PREBUILT_VOICES, find_voice};
use super::merge::merge;
use super::pipeline::{self, DubJob, Services, YoutubeMedia};
use super::segment::TranscriptSegment;
use super::support::ffmpeg::{FfmpegRunner, SystemFfmpegRunner};
use crate::common::paths::expand_user_path;
use crate::common::requirements::{FFMPEG, FFPROBE, YT_DLP, ensure_tools};
use crate::ui::prelude::*;

pub async fn handle_dub_command(command: DubCommands) -> Result<()> {
    match command {
        DubCommands::Run(args) => handle_run(args).await,
        DubCommands::Segments(args) => handle_segments(args),
        DubCommands::Voices => {
            handle_voices();
            Ok(())
        }
    }
}

/// CLI flags win over config values.
fn build_job(args: &RunArgs, config: &DubConfig) -> Result<DubJob> {
    let voice = args.voice.clone().unwrap_or_else(|| config.voice.clone());
    if find_voice(&voice).is_none() {
        bail!("Unknown voice '{voice}'; run `ytdub voices` to list the available voices");
    }

    let concurrency = match args.concurrency {
        Some(0) => bail!("--concurrency must be at least 1"),
        Some(n) => n,
        None => config.concurrency,
    };

    Ok(DubJob {
        youtube_id: args.youtube_id.clone(),
        source_language: args
            .source_language
            .clone()
            .unwrap_or_else(|| config.source_language.clone()),
        target_language: args.target_language.clone(),
        output_dir: expand_user_path(&args.output_directory),
        voice,
        concurrency,
        gap_threshold: config.gap_threshold,
        vocals_gain_db: config.vocals_gain_db,
        background_gain_db: config.background_gain_db,
        finalize: FinalizeOptions {
            name: args.name.clone(),
            move_directory: args.move_directory.as_deref().map(expand_user_path),
            cleanup: args.cleanup,
        },
    })
}

fn api_keys<'a>(args: &'a RunArgs, config: &'a DubConfig) -> &'a [String] {
    if args.api_keys.is_empty() {
        config.api_keys()
    } else {
        &args.api_keys
    }
}

async fn handle_run(args: RunArgs) -> Result<()> {
    let config = DubConfig::load()?;
    let job = build_job(&args, &config)?;

    let credentials = CredentialPool::new(api_keys(&args, &config).iter().cloned()).with_context(
        || {
            format!(
                "Pass --api-keys or set api_keys in {}",
                DubConfig::path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|_| "the config file".to_string())
            )
        },
    )?;

    ensure_tools(&[FFMPEG, FFPROBE, YT_DLP])?;

    let client = GeminiClient::new().context("Failed to build the Gemini HTTP client")?;
    let ffmpeg: Arc<dyn FfmpegRunner> = Arc::new(SystemFfmpegRunner);
    let services = Services {
        media: Arc::new(YoutubeMedia),
        translator: Arc::new(GeminiTranslator::new(
            client.clone(),
            Arc::clone(&credentials),
            config.translation_model.clone(),
            config.translation_fallback_model.clone(),
            config.retry_policy(),
        )),
        synthesizer: Arc::new(GeminiSpeech::new(
            client,
            Arc::clone(&credentials),
            config.tts_model.clone(),
            config.retry_policy(),
            Arc::clone(&ffmpeg),
        )),
        ffmpeg,
    };

    emit(
        Level::Info,
        "dub.run.start",
        &format!(
            "Dubbing {} from {} to {} with voice {} ({} API keys)",
            job.youtube_id,
            job.source_language,
            job.target_language,
            job.voice,
            credentials.len()
        ),
        Some(serde_json::json!({
            "youtube_id": job.youtube_id,
            "source_language": job.source_language,
            "target_language": job.target_language,
            "output_dir": job.output_dir.display().to_string(),
        })),
    );

    pipeline::run(&job, &services).await?;
    Ok(())
}

fn handle_segments(args: SegmentsArgs) -> Result<()> {
    let threshold = match args.threshold {
        Some(threshold) => threshold,
        None => DubConfig::load()?.gap_threshold,
    };
    let fragments = parse_caption_file(&args.file)?;
    let fragment_count = fragments.len();
    let segments = merge(fragments, threshold)?;

    match get_output_format() {
        OutputFormat::Json => emit(
            Level::Info,
            "dub.segments",
            &format!("{} segments", segments.len()),
            Some(serde_json::json!({
                "fragments": fragment_count,
                "segments": segments,
            })),
        ),
        OutputFormat::Text => {
            for segment in &segments {
                emit(Level::Info, "dub.segments.segment", &describe(segment), None);
            }
            separator(true);
            emit(
                Level::Success,
                "dub.segments.summary",
                &format!(
                    "{fragment_count} fragments merged into {} segments",
                    segments.len()
                ),
                None,
            );
        }
    }
    Ok(())
}

fn describe(segment: &TranscriptSegment) -> String {
    format!(
        "[{} --> {}] {}",
        timestamp(segment.start),
        timestamp(segment.end),
        segment.text.replace('\n', " ")
    )
}

fn timestamp(seconds: f64) -> String {
    let millis = (seconds.max(0.0) * 1000.0).round() as u64;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        millis / 3_600_000,
        millis / 60_000 % 60,
        millis / 1000 % 60,
        millis % 1000
    )
}

fn handle_voices() {
    for voice in PREBUILT_VOICES {
        emit(
            Level::Info,
            "dub.voices.voice",
            &format!("{:<16}{}", voice.name, voice.gender),
            Some(serde_json::json!(voice)),
        );
    }
}
