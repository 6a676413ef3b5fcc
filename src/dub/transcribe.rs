//! Speech-to-text fallback for videos without captions.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use duct::cmd;
use serde::Deserialize;

use super::captions::fragment_from_cue;
use super::segment::TranscriptSegment;
use super::support::WHISPERX_UVX_ARGS;
use crate::common::progress::create_spinner;
use crate::common::requirements::{UVX, ensure_tools};
use crate::ui::prelude::{Level, emit};

const TRANSCRIPT_DIR: &str = "transcript";

#[derive(Debug, Deserialize)]
struct WhisperxOutput {
    #[serde(default)]
    segments: Vec<WhisperxSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperxSegment {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
}

/// Where WhisperX writes its JSON for `audio`.
pub fn transcript_path(output_dir: &Path, audio: &Path) -> PathBuf {
    let stem = audio
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    output_dir.join(TRANSCRIPT_DIR).join(format!("{stem}.json"))
}

/// Two-letter code WhisperX expects, from a locale like `en-US`.
fn whisper_language(locale: &str) -> String {
    locale
        .split(['-', '_'])
        .next()
        .unwrap_or(locale)
        .to_lowercase()
}

fn whisperx_args(audio: &Path, transcript_dir: &Path, language: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = WHISPERX_UVX_ARGS.iter().map(OsString::from).collect();
    args.extend([
        OsString::from("whisperx"),
        audio.as_os_str().to_os_string(),
        OsString::from("--output_format"),
        OsString::from("json"),
        OsString::from("--output_dir"),
        transcript_dir.as_os_str().to_os_string(),
        OsString::from("--language"),
        OsString::from(whisper_language(language)),
        OsString::from("--compute_type"),
        OsString::from("int8"),
        OsString::from("--segment_resolution"),
        OsString::from("sentence"),
    ]);
    args
}

/// Transcribe `audio`, reusing an earlier transcript when one exists.
pub fn transcribe(audio: &Path, output_dir: &Path, language: &str) -> Result<Vec<TranscriptSegment>> {
    let path = transcript_path(output_dir, audio);
    if path.exists() {
        emit(
            Level::Info,
            "dub.transcribe.cached",
            &format!("Reusing transcript {}", path.display()),
            None,
        );
    } else {
        let transcript_dir = output_dir.join(TRANSCRIPT_DIR);
        fs::create_dir_all(&transcript_dir)
            .with_context(|| format!("Failed to create {}", transcript_dir.display()))?;

        ensure_tools(&[UVX])?;
        let pb = create_spinner(format!("Transcribing {} with WhisperX...", audio.display()));
        let result = cmd("uvx", whisperx_args(audio, &transcript_dir, language))
            .stdout_null()
            .run();
        pb.finish_and_clear();
        result.with_context(|| format!("Failed to run WhisperX for {}", audio.display()))?;

        if !path.exists() {
            anyhow::bail!(
                "WhisperX did not produce the expected transcript at {}",
                path.display()
            );
        }
    }

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let fragments = parse_whisperx(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    emit(
        Level::Success,
        "dub.transcribe.success",
        &format!("Transcribed {} fragments", fragments.len()),
        None,
    );
    Ok(fragments)
}

pub fn parse_whisperx(contents: &str) -> Result<Vec<TranscriptSegment>> {
    let output: WhisperxOutput = serde_json::from_str(contents)?;
    Ok(output
        .segments
        .into_iter()
        .filter_map(|segment| fragment_from_cue(segment.start, segment.end, &segment.text))
        .collect())
}
