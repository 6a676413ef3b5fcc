use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::config::DocumentedConfig;
use crate::common::paths;
use crate::documented_config;

use super::gemini::speech::DEFAULT_TTS_MODEL;
use super::gemini::translate::{DEFAULT_FALLBACK_MODEL, DEFAULT_MODEL};
use super::gemini::voices::DEFAULT_VOICE;
use super::merge::DEFAULT_GAP_THRESHOLD_SECONDS;
use super::retry::{DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS, RetryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DubConfig {
    pub voice: String,
    pub source_language: String,
    pub concurrency: usize,
    pub gap_threshold: f64,
    pub vocals_gain_db: f64,
    pub background_gain_db: f64,
    pub translation_model: String,
    pub translation_fallback_model: String,
    pub tts_model: String,
    pub retry_backoff_secs: u64,
    pub max_attempts: u32,
    pub api_keys: Option<Vec<String>>,
}

impl Default for DubConfig {
    fn default() -> Self {
        Self {
            voice: DEFAULT_VOICE.to_string(),
            source_language: Self::DEFAULT_SOURCE_LANGUAGE.to_string(),
            concurrency: Self::DEFAULT_CONCURRENCY,
            gap_threshold: DEFAULT_GAP_THRESHOLD_SECONDS,
            vocals_gain_db: Self::DEFAULT_VOCALS_GAIN_DB,
            background_gain_db: 0.0,
            translation_model: DEFAULT_MODEL.to_string(),
            translation_fallback_model: DEFAULT_FALLBACK_MODEL.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            retry_backoff_secs: DEFAULT_BACKOFF.as_secs(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            api_keys: None,
        }
    }
}

documented_config!(DubConfig {
    fields: [
        voice, "Prebuilt Gemini voice used for the dub (see `ytdub voices`)",
        source_language, "Language of the original video",
        concurrency, "Speech synthesis requests in flight at once",
        gap_threshold, "Caption fragments closer than this many seconds are merged",
        vocals_gain_db, "Gain applied to the dubbed vocals in decibels",
        background_gain_db, "Gain applied to the original audio in decibels",
        translation_model, "Gemini model used for translation",
        translation_fallback_model, "Model tried when translation loses segment markers",
        tts_model, "Gemini model used for speech synthesis",
        retry_backoff_secs, "Seconds to wait before retrying a failed Gemini call",
        max_attempts, "Attempts per Gemini call before giving up (0 retries forever)",
    ],
    optional: [
        api_keys, "Gemini API keys, rotated across requests",
    ],
    config_path: Ok(paths::ytdub_config_dir()?.join("config.toml")),
});

impl DubConfig {
    pub const DEFAULT_SOURCE_LANGUAGE: &'static str = "en-US";
    pub const DEFAULT_CONCURRENCY: usize = 4;
    pub const DEFAULT_VOCALS_GAIN_DB: f64 = 5.0;

    pub fn load() -> Result<Self> {
        Self::load_from_path(&<Self as DocumentedConfig>::config_path()?)
    }

    /// Out-of-range values fall back to their defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = <Self as DocumentedConfig>::load_from_path_documented(path)?;
        let defaults = Self::default();
        if config.concurrency == 0 {
            config.concurrency = defaults.concurrency;
        }
        if !config.gap_threshold.is_finite() || config.gap_threshold < 0.0 {
            config.gap_threshold = defaults.gap_threshold;
        }
        if !config.vocals_gain_db.is_finite() {
            config.vocals_gain_db = defaults.vocals_gain_db;
        }
        if !config.background_gain_db.is_finite() {
            config.background_gain_db = defaults.background_gain_db;
        }
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.max_attempts,
            Duration::from_secs(self.retry_backoff_secs),
        )
    }

    pub fn api_keys(&self) -> &[String] {
        self.api_keys.as_deref().unwrap_or_default()
    }

    pub fn path() -> Result<PathBuf> {
        <Self as DocumentedConfig>::config_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn first_load_writes_documented_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = DubConfig::load_from_path(&path).unwrap();
        assert_eq!(config, DubConfig::default());

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("voice = \"Charon\""));
        assert!(written.contains("gap_threshold = 3.5"));
        assert!(written.contains("# api_keys = []"));
    }

    #[test]
    fn partial_files_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "voice = \"Kore\"\napi_keys = [\"k1\", \"k2\"]\n").unwrap();

        let config = DubConfig::load_from_path(&path).unwrap();
        assert_eq!(config.voice, "Kore");
        assert_eq!(config.api_keys(), ["k1".to_string(), "k2".to_string()]);
        assert_eq!(config.source_language, "en-US");
        assert_eq!(config.vocals_gain_db, 5.0);
    }

    #[test]
    fn invalid_values_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "concurrency = 0\ngap_threshold = -2.0\n").unwrap();

        let config = DubConfig::load_from_path(&path).unwrap();
        assert_eq!(config.concurrency, DubConfig::DEFAULT_CONCURRENCY);
        assert_eq!(config.gap_threshold, DEFAULT_GAP_THRESHOLD_SECONDS);
    }

    #[test]
    fn zero_attempts_retries_forever() {
        let config = DubConfig {
            max_attempts: 0,
            ..DubConfig::default()
        };
        assert_eq!(config.retry_policy().max_attempts(), None);
        assert_eq!(DubConfig::default().retry_policy().max_attempts(), Some(5));
    }
}
