//! Resumable job state kept next to the outputs.
//!
//! Each stage fills in its own fields and the file is rewritten as soon as the
//! stage finishes, so a re-run picks up after the last completed stage. Only
//! the orchestrator writes it, after any parallel work for the stage is done.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::segment::TranscriptSegment;
use super::support::retry_once;

pub const STATE_FILE: &str = "download_metadata.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    #[serde(default)]
    pub video_path: Option<PathBuf>,
    #[serde(default)]
    pub audio_path: Option<PathBuf>,
    /// `None` until the download stage ran; `Some(vec![])` means no captions exist.
    #[serde(default)]
    pub subtitle_paths: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub transcripts: Option<Vec<TranscriptSegment>>,
    #[serde(default)]
    pub tts_complete: bool,
}

impl JobState {
    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(STATE_FILE)
    }

    /// Load the state for `output_dir`, or an empty state when none was saved.
    pub fn load(output_dir: &Path) -> Result<Self> {
        let path = Self::path(output_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading job state {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parsing job state {}", path.display()))
    }

    pub fn save(&self, output_dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serializing job state")?;
        let path = Self::path(output_dir);
        retry_once("writing job state", || write_atomically(&path, json.as_bytes()))
    }

    /// Record that the clips were deleted so the next run synthesizes again.
    pub fn forget_clips(&mut self) {
        self.tts_complete = false;
        if let Some(segments) = self.transcripts.take() {
            self.transcripts = Some(
                segments
                    .into_iter()
                    .map(TranscriptSegment::without_dub)
                    .collect(),
            );
        }
    }

    /// Video, audio and the caption lookup are all recorded.
    pub fn has_download(&self) -> bool {
        self.video_path.is_some() && self.audio_path.is_some() && self.subtitle_paths.is_some()
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temporary file in {}", dir.display()))?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}
