use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use duct::cmd;

use crate::common::progress::create_spinner;
use crate::ui::prelude::{Level, emit};

pub const VIDEO_FILE: &str = "video.mp4";
pub const AUDIO_FILE: &str = "audio.mp3";
pub const SUBTITLE_DIR: &str = "subtitles";

const VIDEO_FORMAT: &str = "bestvideo[height=1080][ext=mp4]/best";
const AUDIO_FORMAT: &str = "bestaudio/best";

#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub video_path: PathBuf,
    pub audio_path: PathBuf,
    pub captions: Captions,
}

/// Caption files found for a job, by role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Captions {
    pub source: Option<PathBuf>,
    pub target: Option<PathBuf>,
}

impl Captions {
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.target.is_none()
    }

    fn only(role: CaptionRole, path: PathBuf) -> Self {
        match role {
            CaptionRole::Source => Self {
                source: Some(path),
                target: None,
            },
            CaptionRole::Target => Self {
                source: None,
                target: Some(path),
            },
        }
    }

    /// `[source, target]` order, skipping missing roles.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.source.iter().chain(self.target.iter()).cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionRole {
    Source,
    /// Already in the dub language; used as the translation.
    Target,
}

/// Automatic target captions stand in for a translation, so they win over
/// automatic source captions.
fn automatic_caption_order<'a>(
    source_language: &'a str,
    target_language: &'a str,
) -> [(&'a str, CaptionRole); 2] {
    [
        (target_language, CaptionRole::Target),
        (source_language, CaptionRole::Source),
    ]
}

/// Which caption track yt-dlp should write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionKind {
    /// Uploaded by the channel.
    Manual,
    /// Generated by YouTube speech recognition or auto-translation.
    Automatic,
}

impl CaptionKind {
    fn flag(self) -> &'static str {
        match self {
            CaptionKind::Manual => "--write-subs",
            CaptionKind::Automatic => "--write-auto-subs",
        }
    }

    fn label(self) -> &'static str {
        match self {
            CaptionKind::Manual => "subtitles",
            CaptionKind::Automatic => "automatic captions",
        }
    }
}

pub fn youtube_url(youtube_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={youtube_id}")
}

pub fn subtitle_path(output_dir: &Path, language: &str) -> PathBuf {
    output_dir.join(SUBTITLE_DIR).join(format!("{language}.json"))
}

fn video_args(url: &str, output: &Path) -> Vec<String> {
    vec![
        "--quiet".into(),
        "--no-warnings".into(),
        "-f".into(),
        VIDEO_FORMAT.into(),
        "--recode-video".into(),
        "mp4".into(),
        "--embed-metadata".into(),
        "-o".into(),
        output.to_string_lossy().into_owned(),
        url.into(),
    ]
}

fn audio_args(url: &str, output_dir: &Path) -> Vec<String> {
    vec![
        "--quiet".into(),
        "--no-warnings".into(),
        "-f".into(),
        AUDIO_FORMAT.into(),
        "--extract-audio".into(),
        "--audio-format".into(),
        "mp3".into(),
        "--audio-quality".into(),
        "192K".into(),
        "-o".into(),
        output_dir.join("audio.%(ext)s").to_string_lossy().into_owned(),
        url.into(),
    ]
}

fn subtitle_args(url: &str, output_dir: &Path, language: &str, kind: CaptionKind) -> Vec<String> {
    let template = output_dir
        .join(SUBTITLE_DIR)
        .join(format!("{language}.%(ext)s"));
    vec![
        "--quiet".into(),
        "--no-warnings".into(),
        "--skip-download".into(),
        kind.flag().into(),
        "--sub-langs".into(),
        language.into(),
        "--sub-format".into(),
        "json3".into(),
        "-o".into(),
        template.to_string_lossy().into_owned(),
        url.into(),
    ]
}

fn yt_dlp(args: Vec<String>) -> Result<()> {
    cmd("yt-dlp", args)
        .stdout_null()
        .run()
        .context("yt-dlp failed")?;
    Ok(())
}

pub fn download_video(youtube_id: &str, output_dir: &Path) -> Result<PathBuf> {
    let path = output_dir.join(VIDEO_FILE);
    if path.exists() {
        emit(
            Level::Info,
            "dub.download.video_cached",
            &format!("Video already downloaded at {}", path.display()),
            None,
        );
        return Ok(path);
    }

    let pb = create_spinner(format!("Downloading video {youtube_id}..."));
    let result = yt_dlp(video_args(&youtube_url(youtube_id), &path));
    pb.finish_and_clear();
    result.with_context(|| format!("Failed to download video {youtube_id}"))?;
    emit(
        Level::Success,
        "dub.download.video",
        &format!("Video downloaded to {}", path.display()),
        None,
    );
    Ok(path)
}

pub fn download_audio(youtube_id: &str, output_dir: &Path) -> Result<PathBuf> {
    let path = output_dir.join(AUDIO_FILE);
    if path.exists() {
        return Ok(path);
    }

    let pb = create_spinner(format!("Downloading audio {youtube_id}..."));
    let result = yt_dlp(audio_args(&youtube_url(youtube_id), output_dir));
    pb.finish_and_clear();
    result.with_context(|| format!("Failed to download audio for {youtube_id}"))?;

    if !path.exists() {
        anyhow::bail!("yt-dlp did not produce {}", path.display());
    }
    emit(
        Level::Success,
        "dub.download.audio",
        &format!("Audio downloaded to {}", path.display()),
        None,
    );
    Ok(path)
}

/// Caption files already present for the source and target languages.
pub fn existing_subtitles(
    output_dir: &Path,
    source_language: &str,
    target_language: &str,
) -> Captions {
    let existing = |language: &str| Some(subtitle_path(output_dir, language)).filter(|p| p.exists());
    Captions {
        source: existing(source_language),
        target: existing(target_language),
    }
}

/// Fetch one json3 caption track into `subtitles/{language}.json`.
/// Returns `None` when yt-dlp fails or the video has no such track.
pub fn download_caption(
    youtube_id: &str,
    output_dir: &Path,
    language: &str,
    kind: CaptionKind,
) -> Result<Option<PathBuf>> {
    let subtitle_dir = output_dir.join(SUBTITLE_DIR);
    fs::create_dir_all(&subtitle_dir)
        .with_context(|| format!("Failed to create {}", subtitle_dir.display()))?;

    let target = subtitle_path(output_dir, language);
    if target.exists() {
        return Ok(Some(target));
    }

    let pb = create_spinner(format!("Downloading {language} {}...", kind.label()));
    let result = yt_dlp(subtitle_args(
        &youtube_url(youtube_id),
        output_dir,
        language,
        kind,
    ));
    pb.finish_and_clear();
    if let Err(err) = result {
        emit(
            Level::Warn,
            "dub.download.subtitles_failed",
            &format!("Error downloading {language} {}: {err:#}", kind.label()),
            None,
        );
        return Ok(None);
    }

    let Some(downloaded) = find_downloaded_subtitle(&subtitle_dir, language)? else {
        emit(
            Level::Warn,
            "dub.download.no_subtitles",
            &format!("No {language} {} available for {youtube_id}", kind.label()),
            None,
        );
        return Ok(None);
    };
    fs::rename(&downloaded, &target).with_context(|| {
        format!(
            "Failed to move {} to {}",
            downloaded.display(),
            target.display()
        )
    })?;
    Ok(Some(target))
}

/// Manual captions for both languages. When neither exists, automatic
/// captions are tried for the target language first and used as the
/// translation; only if that fails are source-language ones fetched.
pub fn download_subtitles(
    youtube_id: &str,
    output_dir: &Path,
    source_language: &str,
    target_language: &str,
) -> Result<Captions> {
    let manual = Captions {
        source: download_caption(youtube_id, output_dir, source_language, CaptionKind::Manual)?,
        target: download_caption(youtube_id, output_dir, target_language, CaptionKind::Manual)?,
    };
    if !manual.is_empty() {
        return Ok(manual);
    }

    for (language, role) in automatic_caption_order(source_language, target_language) {
        if let Some(path) =
            download_caption(youtube_id, output_dir, language, CaptionKind::Automatic)?
        {
            emit(
                Level::Info,
                "dub.download.automatic_captions",
                &format!("Using automatic {language} captions from YouTube"),
                None,
            );
            return Ok(Captions::only(role, path));
        }
    }
    Ok(Captions::default())
}

/// yt-dlp names caption files `<template>.<lang>.json3`.
fn find_downloaded_subtitle(subtitle_dir: &Path, language: &str) -> Result<Option<PathBuf>> {
    let prefix = format!("{language}.");
    let entries = fs::read_dir(subtitle_dir)
        .with_context(|| format!("Failed to read {}", subtitle_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.starts_with(&prefix) && name.ends_with(".json3") {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Fetch video, audio and captions, reusing files on disk.
pub fn download_all(
    youtube_id: &str,
    output_dir: &Path,
    source_language: &str,
    target_language: &str,
) -> Result<Download> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let video_path = download_video(youtube_id, output_dir)?;
    let audio_path = download_audio(youtube_id, output_dir)?;

    let mut captions = existing_subtitles(output_dir, source_language, target_language);
    if captions.is_empty() {
        captions = download_subtitles(youtube_id, output_dir, source_language, target_language)?;
    }
    emit(
        Level::Info,
        "dub.download.subtitles",
        &format!("Found {} subtitle files", captions.paths().len()),
        Some(serde_json::json!({
            "source": captions.source,
            "target": captions.target,
        })),
    );

    Ok(Download {
        video_path,
        audio_path,
        captions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_is_fetched_at_1080p_mp4() {
        let args = video_args("https://www.youtube.com/watch?v=abc", Path::new("out/video.mp4"));
        assert!(args.contains(&VIDEO_FORMAT.to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://www.youtube.com/watch?v=abc"));
    }

    #[test]
    fn audio_is_extracted_to_mp3() {
        let args = audio_args("url", Path::new("out")).join(" ");
        assert!(args.contains("--extract-audio --audio-format mp3 --audio-quality 192K"));
        assert!(args.contains("out/audio.%(ext)s"));
    }

    #[test]
    fn subtitles_request_json3_for_one_language() {
        let args = subtitle_args("url", Path::new("out"), "es-ES", CaptionKind::Manual).join(" ");
        assert!(args.contains("--write-subs --sub-langs es-ES --sub-format json3"));
        assert!(args.contains("out/subtitles/es-ES.%(ext)s"));
        assert!(!args.contains("--write-auto-subs"));
    }

    #[test]
    fn automatic_captions_use_auto_subs_flag() {
        let args =
            subtitle_args("url", Path::new("out"), "es-ES", CaptionKind::Automatic).join(" ");
        assert!(args.contains("--write-auto-subs --sub-langs es-ES"));
        assert!(!args.contains("--write-subs "));
    }

    #[test]
    fn automatic_target_captions_are_tried_before_source() {
        assert_eq!(
            automatic_caption_order("en-US", "es-ES"),
            [("es-ES", CaptionRole::Target), ("en-US", CaptionRole::Source)]
        );
        let target = Captions::only(CaptionRole::Target, PathBuf::from("subtitles/es-ES.json"));
        assert_eq!(target.source, None);
        assert_eq!(target.paths(), vec![PathBuf::from("subtitles/es-ES.json")]);
    }

    #[test]
    fn existing_subtitles_are_split_by_role() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(SUBTITLE_DIR)).unwrap();
        fs::write(subtitle_path(dir.path(), "es-ES"), "{}").unwrap();
        fs::write(subtitle_path(dir.path(), "en-US"), "{}").unwrap();

        let found = existing_subtitles(dir.path(), "en-US", "es-ES");
        assert_eq!(found.source, Some(subtitle_path(dir.path(), "en-US")));
        assert_eq!(found.target, Some(subtitle_path(dir.path(), "es-ES")));
        assert_eq!(
            found.paths(),
            vec![
                subtitle_path(dir.path(), "en-US"),
                subtitle_path(dir.path(), "es-ES")
            ]
        );

        let target_only = existing_subtitles(dir.path(), "fr-FR", "es-ES");
        assert_eq!(target_only.source, None);
        assert_eq!(target_only.target, Some(subtitle_path(dir.path(), "es-ES")));
        assert!(existing_subtitles(dir.path(), "fr-FR", "de-DE").is_empty());
    }

    #[test]
    fn cached_caption_is_reused_without_yt_dlp() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(SUBTITLE_DIR)).unwrap();
        fs::write(subtitle_path(dir.path(), "es-ES"), "{}").unwrap();

        let found =
            download_caption("abc123", dir.path(), "es-ES", CaptionKind::Automatic).unwrap();
        assert_eq!(found, Some(subtitle_path(dir.path(), "es-ES")));
    }

    #[test]
    fn downloaded_caption_file_is_located_by_language() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("en-US.en-US.json3"), "{}").unwrap();
        fs::write(dir.path().join("es-ES.json"), "{}").unwrap();

        let found = find_downloaded_subtitle(dir.path(), "en-US").unwrap();
        assert_eq!(found, Some(dir.path().join("en-US.en-US.json3")));
        assert_eq!(find_downloaded_subtitle(dir.path(), "es-ES").unwrap(), None);
    }
}
