use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::segment::TranscriptSegment;
use crate::ui::prelude::{Level, emit};

pub const OUTPUT_GITIGNORE: &str = "*\n";

/// `dubbed_video_es_es.mp4` for target `es-ES`.
pub fn dubbed_video_name(target_language: &str) -> String {
    format!("dubbed_video_{}.mp4", language_suffix(target_language))
}

pub fn dubbed_audio_name(target_language: &str) -> String {
    format!("dubbed_audio_{}.mp3", language_suffix(target_language))
}

fn language_suffix(language: &str) -> String {
    language.replace('-', "_").to_lowercase()
}

/// Keep generated media out of version control when the output lives in a repo.
pub fn write_output_gitignore(output_dir: &Path) -> Result<()> {
    let path = output_dir.join(".gitignore");
    fs::write(&path, OUTPUT_GITIGNORE)
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[derive(Debug, Clone, Default)]
pub struct FinalizeOptions {
    pub name: Option<String>,
    pub move_directory: Option<PathBuf>,
    pub cleanup: bool,
}

/// Apply rename, move and cleanup to the muxed video; returns its final path.
pub fn finalize(
    video: &Path,
    segments: &[TranscriptSegment],
    vocals: &Path,
    options: &FinalizeOptions,
) -> Result<PathBuf> {
    let mut current = video.to_path_buf();

    if let Some(name) = options.name.as_deref() {
        let stem = Path::new(name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        let renamed = current.with_file_name(format!("{stem}.mp4"));
        fs::rename(&current, &renamed).with_context(|| {
            format!("Failed to rename {} to {}", current.display(), renamed.display())
        })?;
        emit(
            Level::Info,
            "dub.finalize.renamed",
            &format!("Renamed final video to {}", renamed.display()),
            None,
        );
        current = renamed;
    }

    if let Some(directory) = options.move_directory.as_deref() {
        fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create {}", directory.display()))?;
        let file_name = current
            .file_name()
            .context("Final video path has no file name")?;
        let destination = directory.join(file_name);
        move_file(&current, &destination)?;
        emit(
            Level::Info,
            "dub.finalize.moved",
            &format!("Moved final video to {}", destination.display()),
            None,
        );
        current = destination;
    }

    if options.cleanup {
        let removed = cleanup_intermediates(segments, vocals);
        emit(
            Level::Info,
            "dub.finalize.cleanup",
            &format!("Removed {removed} intermediate files"),
            None,
        );
    }

    Ok(current)
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    fs::remove_file(from).with_context(|| format!("Failed to remove {}", from.display()))
}

/// Delete per-segment clips and the vocals track; failures are only logged.
pub fn cleanup_intermediates(segments: &[TranscriptSegment], vocals: &Path) -> usize {
    let clips = segments
        .iter()
        .filter_map(|segment| segment.dubbed_path.as_deref());

    let mut removed = 0;
    for path in clips.chain(std::iter::once(vocals)) {
        if !path.exists() {
            continue;
        }
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(err) => emit(
                Level::Warn,
                "dub.finalize.cleanup_failed",
                &format!("Failed to remove {}: {err}", path.display()),
                None,
            ),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_names_follow_target_language() {
        assert_eq!(dubbed_video_name("es-ES"), "dubbed_video_es_es.mp4");
        assert_eq!(dubbed_audio_name("pt-BR"), "dubbed_audio_pt_br.mp3");
    }

    #[test]
    fn rename_move_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("dubbed_video_es_es.mp4");
        let vocals = dir.path().join("dubbed_vocals.wav");
        let clip = dir.path().join("segment_1_0_2.wav");
        for path in [&video, &vocals, &clip] {
            fs::write(path, b"x").unwrap();
        }
        let segments = vec![TranscriptSegment::new(0.0, 2.0, "one two three").with_dub(&clip)];
        let options = FinalizeOptions {
            name: Some("Episode 1.mkv".to_string()),
            move_directory: Some(dir.path().join("published")),
            cleanup: true,
        };

        let final_path = finalize(&video, &segments, &vocals, &options).unwrap();

        assert_eq!(final_path, dir.path().join("published").join("Episode 1.mp4"));
        assert!(final_path.exists());
        assert!(!video.exists());
        assert!(!vocals.exists());
        assert!(!clip.exists());
    }

    #[test]
    fn no_options_leaves_everything_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("dubbed_video_es_es.mp4");
        let vocals = dir.path().join("dubbed_vocals.wav");
        fs::write(&video, b"x").unwrap();
        fs::write(&vocals, b"x").unwrap();

        let final_path = finalize(&video, &[], &vocals, &FinalizeOptions::default()).unwrap();
        assert_eq!(final_path, video);
        assert!(vocals.exists());
    }

    #[test]
    fn cleanup_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let segments = vec![
            TranscriptSegment::new(0.0, 1.0, "gone").with_dub(dir.path().join("segment_1_0_1.wav")),
        ];
        assert_eq!(cleanup_intermediates(&segments, &dir.path().join("vocals.wav")), 0);
    }
}
