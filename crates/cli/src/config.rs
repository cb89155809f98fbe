//! Server configuration: defaults, then an optional TOML file, then
//! `STAGEWATCH_*` environment variables, then command-line flags.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stagewatch_core::{AdvancePolicy, EmitMode, SignalPolicy, ThresholdPolicy};

/// Prefix of every environment variable read by [`ServeConfig::apply_env`].
pub(crate) const ENV_PREFIX: &str = "STAGEWATCH_";

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("could not read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value '{value}' for {key}: {message}")]
    Env {
        key: String,
        value: String,
        message: String,
    },
}

/// What moves a job to its next stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub(crate) enum AdvanceMode {
    /// Wall-clock threshold between stages.
    #[default]
    Threshold,
    /// Completion signals from an external pipeline.
    Signal,
}

impl AdvanceMode {
    pub(crate) fn policy(self, threshold: Duration) -> Arc<dyn AdvancePolicy> {
        match self {
            AdvanceMode::Threshold => Arc::new(ThresholdPolicy::new(threshold)),
            AdvanceMode::Signal => Arc::new(SignalPolicy),
        }
    }
}

impl fmt::Display for AdvanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvanceMode::Threshold => f.write_str("threshold"),
            AdvanceMode::Signal => f.write_str("signal"),
        }
    }
}

impl FromStr for AdvanceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "threshold" => Ok(AdvanceMode::Threshold),
            "signal" => Ok(AdvanceMode::Signal),
            other => Err(format!("unknown advance mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ServeConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    /// Minimum time a stage stays current under the threshold policy.
    pub(crate) stage_threshold_ms: u64,
    pub(crate) emit_mode: EmitMode,
    pub(crate) advance: AdvanceMode,
    /// How long a finished job stays pollable.
    pub(crate) grace_period_secs: u64,
    pub(crate) sweep_interval_secs: u64,
    pub(crate) upload_dir: PathBuf,
    pub(crate) max_body_size: usize,
}

impl Default for ServeConfig {
    fn default() -> Self {
        ServeConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
            stage_threshold_ms: 3000,
            emit_mode: EmitMode::Prefix,
            advance: AdvanceMode::Threshold,
            grace_period_secs: 600,
            sweep_interval_secs: 30,
            upload_dir: PathBuf::from("uploads"),
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

/// Command-line overrides. `None` leaves the lower layers in charge.
#[derive(Debug, Clone, Default)]
pub(crate) struct ServeOverrides {
    pub(crate) host: Option<String>,
    pub(crate) port: Option<u16>,
    pub(crate) stage_threshold_ms: Option<u64>,
    pub(crate) emit_mode: Option<EmitMode>,
    pub(crate) advance: Option<AdvanceMode>,
    pub(crate) grace_period_secs: Option<u64>,
    pub(crate) upload_dir: Option<PathBuf>,
}

impl ServeConfig {
    /// Build the effective configuration from every layer.
    pub(crate) fn load(
        file: Option<&Path>,
        overrides: ServeOverrides,
    ) -> Result<Self, ConfigError> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => ServeConfig::default(),
        };
        config.apply_env(std::env::vars())?;
        config.apply_overrides(overrides);
        Ok(config)
    }

    pub(crate) fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply every `STAGEWATCH_<KEY>` variable found in `vars`.
    pub(crate) fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let key = key.to_ascii_lowercase();
            let invalid = |message: String| ConfigError::Env {
                key: name.clone(),
                value: value.clone(),
                message,
            };
            match key.as_str() {
                "host" => self.host = value.clone(),
                "port" => self.port = value.parse().map_err(|e| invalid(format!("{e}")))?,
                "stage_threshold_ms" => {
                    self.stage_threshold_ms =
                        value.parse().map_err(|e| invalid(format!("{e}")))?
                }
                "emit_mode" => self.emit_mode = value.parse().map_err(invalid)?,
                "advance" => self.advance = value.parse().map_err(invalid)?,
                "grace_period_secs" => {
                    self.grace_period_secs =
                        value.parse().map_err(|e| invalid(format!("{e}")))?
                }
                "sweep_interval_secs" => {
                    self.sweep_interval_secs =
                        value.parse().map_err(|e| invalid(format!("{e}")))?
                }
                "upload_dir" => self.upload_dir = PathBuf::from(&value),
                "max_body_size" => {
                    self.max_body_size = value.parse().map_err(|e| invalid(format!("{e}")))?
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub(crate) fn apply_overrides(&mut self, o: ServeOverrides) {
        if let Some(host) = o.host {
            self.host = host;
        }
        if let Some(port) = o.port {
            self.port = port;
        }
        if let Some(ms) = o.stage_threshold_ms {
            self.stage_threshold_ms = ms;
        }
        if let Some(mode) = o.emit_mode {
            self.emit_mode = mode;
        }
        if let Some(advance) = o.advance {
            self.advance = advance;
        }
        if let Some(secs) = o.grace_period_secs {
            self.grace_period_secs = secs;
        }
        if let Some(dir) = o.upload_dir {
            self.upload_dir = dir;
        }
    }

    pub(crate) fn stage_threshold(&self) -> Duration {
        Duration::from_millis(self.stage_threshold_ms)
    }

    pub(crate) fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub(crate) fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub(crate) fn policy(&self) -> Arc<dyn AdvancePolicy> {
        self.advance.policy(self.stage_threshold())
    }

    pub(crate) fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn toml_fills_only_given_keys() {
        let config: ServeConfig = toml::from_str(
            r#"
            port = 9100
            emit_mode = "latest"
            advance = "signal"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.emit_mode, EmitMode::Latest);
        assert_eq!(config.advance, AdvanceMode::Signal);
        assert_eq!(config.stage_threshold_ms, 3000);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn env_overrides_file_and_ignores_foreign_vars() {
        let mut config = ServeConfig::default();
        config
            .apply_env(env(&[
                ("STAGEWATCH_PORT", "9200"),
                ("STAGEWATCH_STAGE_THRESHOLD_MS", "250"),
                ("STAGEWATCH_EMIT_MODE", "latest"),
                ("PATH", "/usr/bin"),
            ]))
            .unwrap();
        assert_eq!(config.port, 9200);
        assert_eq!(config.stage_threshold(), Duration::from_millis(250));
        assert_eq!(config.emit_mode, EmitMode::Latest);
    }

    #[test]
    fn bad_env_value_names_the_variable() {
        let mut config = ServeConfig::default();
        let err = config
            .apply_env(env(&[("STAGEWATCH_PORT", "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains("STAGEWATCH_PORT"), "{err}");
    }

    #[test]
    fn flags_win_over_everything() {
        let mut config = ServeConfig::default();
        config
            .apply_env(env(&[("STAGEWATCH_PORT", "9200")]))
            .unwrap();
        config.apply_overrides(ServeOverrides {
            port: Some(9300),
            advance: Some(AdvanceMode::Signal),
            ..Default::default()
        });
        assert_eq!(config.port, 9300);
        assert_eq!(config.policy().name(), "signal");
    }

    #[test]
    fn config_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stagewatch.toml");
        std::fs::write(&path, "grace_period_secs = 5\nupload_dir = \"/tmp/up\"\n").unwrap();

        let config = ServeConfig::from_file(&path).unwrap();
        assert_eq!(config.grace_period(), Duration::from_secs(5));
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/up"));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = ServeConfig::from_file(Path::new("/nonexistent/stagewatch.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
