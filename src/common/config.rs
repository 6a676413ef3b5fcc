//! Self-documenting TOML configuration files.
//!
//! A config struct derives serde with `#[serde(default)]` and is registered
//! with [`documented_config!`]. On first load the file is written with every
//! field and a trailing description comment; optional fields that are unset
//! are written commented out so users can see what is available.
//!
//! ```ignore
//! documented_config!(DubConfig {
//!     fields: [
//!         voice, "Prebuilt TTS voice",
//!     ],
//!     optional: [
//!         api_keys, "Gemini API keys",
//!     ],
//!     config_path: Ok(paths::ytdub_config_dir()?.join("config.toml")),
//! });
//! ```

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Metadata about a configuration field
#[derive(Debug, Clone)]
pub struct ConfigFieldMeta {
    pub name: &'static str,
    /// TOML-serialized default value, or None if serialization failed
    pub default_value: Option<String>,
    pub description: &'static str,
    pub is_optional: bool,
}

/// Implemented by [`documented_config!`].
pub trait DocumentedConfig: Sized + Default {
    fn field_metadata() -> Vec<ConfigFieldMeta>;

    fn is_optional_field_set(&self, field_name: &str) -> bool;

    /// TOML-serialized value for a specific field
    fn get_field_value(&self, field_name: &str) -> String;

    fn config_path() -> Result<PathBuf>;

    fn render_documented(&self) -> String {
        let mut output = String::new();
        for field in Self::field_metadata() {
            if field.is_optional && !self.is_optional_field_set(field.name) {
                let Some(default_val) = &field.default_value else {
                    continue;
                };
                output.push_str(&format!(
                    "# {} = {}  # {}\n",
                    field.name, default_val, field.description
                ));
            } else {
                output.push_str(&format!(
                    "{} = {}  # {}\n",
                    field.name,
                    self.get_field_value(field.name),
                    field.description
                ));
            }
        }
        output
    }

    fn save_with_documentation(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        fs::write(path, self.render_documented())
            .with_context(|| format!("writing config to {}", path.display()))?;
        Ok(())
    }

    fn load_from_path_documented(path: &Path) -> Result<Self>
    where
        for<'de> Self: serde::de::Deserialize<'de>,
    {
        if !path.exists() {
            let config = Self::default();
            config.save_with_documentation(path)?;
            return Ok(config);
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))
    }
}

#[macro_export]
macro_rules! documented_config {
    (
        $config_name:ident {
            fields: [
                $($field:ident, $desc:expr),* $(,)?
            ],
            optional: [
                $($opt_field:ident, $opt_desc:expr),* $(,)?
            ],
            config_path: $path:expr $(,)?
        }
    ) => {
        impl $crate::common::config::DocumentedConfig for $config_name {
            fn field_metadata() -> Vec<$crate::common::config::ConfigFieldMeta> {
                let default_config = Self::default();
                vec![
                    $(
                        $crate::common::config::ConfigFieldMeta {
                            name: stringify!($field),
                            default_value: toml::Value::try_from(&default_config.$field)
                                .map(|v| v.to_string())
                                .ok(),
                            description: $desc,
                            is_optional: false,
                        },
                    )*
                    $(
                        $crate::common::config::ConfigFieldMeta {
                            name: stringify!($opt_field),
                            default_value: {
                                let inner_default = default_config.$opt_field.clone()
                                    .unwrap_or_default();
                                toml::Value::try_from(&inner_default)
                                    .map(|v| v.to_string())
                                    .ok()
                            },
                            description: $opt_desc,
                            is_optional: true,
                        },
                    )*
                ]
            }

            fn is_optional_field_set(&self, field_name: &str) -> bool {
                match field_name {
                    $(
                        stringify!($opt_field) => self.$opt_field.is_some(),
                    )*
                    _ => false,
                }
            }

            fn get_field_value(&self, field_name: &str) -> String {
                match field_name {
                    $(
                        stringify!($field) => toml::Value::try_from(&self.$field)
                            .map(|v| v.to_string())
                            .unwrap_or_else(|_| format!("{:?}", self.$field)),
                    )*
                    $(
                        stringify!($opt_field) => {
                            let value = self.$opt_field.clone().unwrap_or_default();
                            toml::Value::try_from(&value)
                                .map(|v| v.to_string())
                                .unwrap_or_else(|_| "\"\"".to_string())
                        }
                    )*
                    _ => String::new(),
                }
            }

            fn config_path() -> anyhow::Result<std::path::PathBuf> {
                $path
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(default)]
    struct SampleConfig {
        volume: f64,
        name: String,
        keys: Option<Vec<String>>,
    }

    impl Default for SampleConfig {
        fn default() -> Self {
            Self {
                volume: 0.5,
                name: "charon".to_string(),
                keys: None,
            }
        }
    }

    crate::documented_config!(SampleConfig {
        fields: [
            volume, "Playback volume",
            name, "Voice name",
        ],
        optional: [
            keys, "API keys",
        ],
        config_path: Ok(std::path::PathBuf::from("sample.toml")),
    });

    #[test]
    fn unset_optional_fields_are_commented() {
        let rendered = SampleConfig::default().render_documented();
        assert!(rendered.contains("volume = 0.5  # Playback volume"));
        assert!(rendered.contains("name = \"charon\"  # Voice name"));
        assert!(rendered.contains("# keys = []  # API keys"));
    }

    #[test]
    fn first_load_writes_documented_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let loaded = SampleConfig::load_from_path_documented(&path).unwrap();
        assert_eq!(loaded, SampleConfig::default());
        assert!(path.exists());

        let reloaded = SampleConfig::load_from_path_documented(&path).unwrap();
        assert_eq!(reloaded, SampleConfig::default());
    }

    #[test]
    fn set_optional_fields_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = SampleConfig {
            keys: Some(vec!["a".into(), "b".into()]),
            ..SampleConfig::default()
        };
        config.save_with_documentation(&path).unwrap();
        let loaded = SampleConfig::load_from_path_documented(&path).unwrap();
        assert_eq!(loaded.keys, Some(vec!["a".to_string(), "b".to_string()]));
    }
}
