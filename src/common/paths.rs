use anyhow::{Context, Result};
use std::path::PathBuf;

/// Expand a leading `~` and environment variables in a user-supplied path.
pub fn expand_user_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
    }
}

/// Get the ytdub config directory
pub fn ytdub_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Unable to determine user config directory")?
        .join("ytdub");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory at {}", config_dir.display()))?;

    Ok(config_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_home_prefix() {
        let home = dirs::home_dir().expect("home dir");
        assert_eq!(expand_user_path("~/dubs"), home.join("dubs"));
    }

    #[test]
    fn leaves_relative_paths_alone() {
        assert_eq!(expand_user_path("output/"), PathBuf::from("output/"));
    }
}
