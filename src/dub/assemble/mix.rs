use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::dub::support::ffmpeg::{FfmpegRunOptions, FfmpegRunner, audio_duration_seconds};

/// Overlay the vocals on the background from time zero with per-track gain.
///
/// `duration=longest` keeps the mix running when the vocals outlast the
/// background; the background is silent for the remainder.
pub fn mix_args(
    background: &Path,
    vocals: &Path,
    vocals_gain_db: f64,
    background_gain_db: f64,
    output: &Path,
) -> Vec<String> {
    let filter = format!(
        "[0:a]volume={background_gain_db}dB[bg];[1:a]volume={vocals_gain_db}dB[vox];[bg][vox]amix=inputs=2:duration=longest:normalize=0:dropout_transition=0[mix]"
    );
    vec![
        "-y".into(),
        "-i".into(),
        background.to_string_lossy().into_owned(),
        "-i".into(),
        vocals.to_string_lossy().into_owned(),
        "-filter_complex".into(),
        filter,
        "-map".into(),
        "[mix]".into(),
        "-c:a".into(),
        "libmp3lame".into(),
        "-b:a".into(),
        "192k".into(),
        output.to_string_lossy().into_owned(),
    ]
}

pub fn merge_background_and_vocals(
    runner: &dyn FfmpegRunner,
    background: &Path,
    vocals: &Path,
    vocals_gain_db: f64,
    background_gain_db: f64,
    output: &Path,
) -> Result<PathBuf> {
    let total = match (
        audio_duration_seconds(background),
        audio_duration_seconds(vocals),
    ) {
        (Ok(a), Ok(b)) => Some(a.max(b)),
        _ => None,
    };

    let args = mix_args(background, vocals, vocals_gain_db, background_gain_db, output);
    runner
        .run(
            &args,
            FfmpegRunOptions::new(total, false).with_message("mixing"),
        )
        .with_context(|| format!("Failed to mix vocals into {}", output.display()))?;

    Ok(output.to_path_buf())
}
