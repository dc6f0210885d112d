//! Runtime settings for neuralgc.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace `neuralgc.toml` -> environment -> CLI overrides.
//!
//! Settings only locate things (result and batch roots, the program name
//! written into batch lines, logging). They never feed a run's identity.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Workspace-level settings file name.
pub const SETTINGS_FILE: &str = "neuralgc.toml";

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Root under which each family gets its result directory.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Where generated batch files are written.
    #[serde(default = "default_batches_dir")]
    pub batches_dir: PathBuf,
    /// Program name written at the start of every batch line.
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            batches_dir: default_batches_dir(),
            program: default_program(),
            log: LogConfig::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter for the stderr layer when `-v`/`-q` are not given.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for daily-rotated JSON logs; disabled when unset.
    #[serde(default)]
    pub json_dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_dir: None,
        }
    }
}

/// Values given explicitly on the command line. Unset fields leave the
/// lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SettingsOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batches_dir: Option<PathBuf>,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("Results")
}

fn default_batches_dir() -> PathBuf {
    PathBuf::from("Batches")
}

fn default_program() -> String {
    "neuralgc".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Path of the user-level settings file, if a home directory is known.
pub fn user_settings_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "neuralgc", "neuralgc")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load layered settings.
pub fn load_settings(
    workspace: Option<&Path>,
    overrides: Option<&SettingsOverrides>,
) -> Result<Settings, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));

    if let Some(user_config) = user_settings_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(SETTINGS_FILE);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // NEURALGC_RESULTS_DIR, NEURALGC_LOG__LEVEL, ...
    figment = figment.merge(Env::prefixed("NEURALGC_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let mut settings: Settings = figment.extract().map_err(Box::new)?;

    // Relative roots are taken relative to the workspace.
    if let Some(ws) = workspace {
        for dir in [&mut settings.results_dir, &mut settings.batches_dir] {
            if dir.is_relative() {
                *dir = ws.join(&*dir);
            }
        }
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.results_dir, PathBuf::from("Results"));
        assert_eq!(settings.batches_dir, PathBuf::from("Batches"));
        assert_eq!(settings.program, "neuralgc");
        assert_eq!(settings.log.level, "info");
        assert!(settings.log.json_dir.is_none());
    }

    #[test]
    fn test_settings_serialization_roundtrip() {
        let settings = Settings::default();
        let toml_str = toml::to_string(&settings).unwrap();
        let back: Settings = toml::from_str(&toml_str).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_load_settings_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"
results_dir = "out/results"
program = "/opt/bin/neuralgc"

[log]
level = "debug"
"#,
        )
        .unwrap();

        let settings = load_settings(Some(dir.path()), None).unwrap();
        assert_eq!(settings.results_dir, dir.path().join("out/results"));
        assert_eq!(settings.batches_dir, dir.path().join("Batches"));
        assert_eq!(settings.program, "/opt/bin/neuralgc");
        assert_eq!(settings.log.level, "debug");
    }

    #[test]
    fn test_overrides_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "results_dir = \"a\"\n").unwrap();

        let overrides = SettingsOverrides {
            results_dir: Some(PathBuf::from("/abs/results")),
            batches_dir: None,
        };
        let settings = load_settings(Some(dir.path()), Some(&overrides)).unwrap();
        assert_eq!(settings.results_dir, PathBuf::from("/abs/results"));
        assert_eq!(settings.batches_dir, dir.path().join("Batches"));
    }

    #[test]
    fn test_invalid_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "results_dir = [1, 2]\n").unwrap();
        assert!(load_settings(Some(dir.path()), None).is_err());
    }
}
