pub mod ffmpeg;

use std::fmt::Display;

use crate::ui::prelude::{Level, emit};

/// Uvx arguments for running WhisperX with compatible Python and torch versions.
/// Prevents torchaudio compatibility issues (see: https://github.com/m-bain/whisperX/issues/1264)
pub const WHISPERX_UVX_ARGS: &[&str] = &["--python", "3.10"];

/// Run a local write, trying a second time if the first attempt fails.
pub fn retry_once<T, E: Display>(label: &str, mut op: impl FnMut() -> Result<T, E>) -> Result<T, E> {
    match op() {
        Ok(value) => Ok(value),
        Err(err) => {
            emit(
                Level::Warn,
                "dub.io.retry",
                &format!("{label} failed ({err}), retrying once"),
                None,
            );
            op()
        }
    }
}
