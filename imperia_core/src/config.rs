use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use imperia_net::{ListenScope, SocketOptions, DEFAULT_MAX_FRAME_SIZE};
use serde::Deserialize;
use thiserror::Error;

use crate::scenario::MapKind;

pub const CONFIG_PATH_ENV: &str = "IMPERIA_CONFIG_PATH";
pub const DEFAULT_PORT: u16 = 42932;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse imperia config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read imperia config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImperiaConfig {
    pub scenario_rules_dir: PathBuf,
    pub battle_rules_dir: PathBuf,
    pub listen_port: u16,
    pub listen_scope: ListenScope,
    pub connect_timeout_ms: u64,
    pub max_frame_size: u32,
}

impl Default for ImperiaConfig {
    fn default() -> Self {
        Self {
            scenario_rules_dir: PathBuf::from("data/rules/scenario"),
            battle_rules_dir: PathBuf::from("data/rules/battle"),
            listen_port: DEFAULT_PORT,
            listen_scope: ListenScope::Local,
            connect_timeout_ms: 2000,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ImperiaConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config = ImperiaConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn rules_dir(&self, kind: MapKind) -> &Path {
        match kind {
            MapKind::Scenario => &self.scenario_rules_dir,
            MapKind::Battle => &self.battle_rules_dir,
        }
    }

    pub fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            max_frame_size: self.max_frame_size,
        }
    }
}

/// Load from `IMPERIA_CONFIG_PATH` if set, falling back to defaults. The
/// returned path is the file actually used.
pub fn load_config_from_env() -> (ImperiaConfig, Option<PathBuf>) {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV).map(PathBuf::from) {
        match ImperiaConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "imperia::config",
                    path = %path.display(),
                    "imperia_config.loaded=file"
                );
                return (config, Some(path));
            }
            Err(err) => {
                tracing::warn!(
                    target: "imperia::config",
                    path = %path.display(),
                    error = %err,
                    "imperia_config.load_failed"
                );
            }
        }
    }

    tracing::info!(target: "imperia::config", "imperia_config.loaded=builtin");
    (ImperiaConfig::default(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{"listen_port": 5000, "listen_scope": "any"}"#;
        let config = ImperiaConfig::from_json_str(json).unwrap();
        assert_eq!(config.listen_port, 5000);
        assert_eq!(config.listen_scope, ListenScope::Any);
        assert_eq!(config.connect_timeout_ms, 2000);
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn rules_dir_follows_map_kind() {
        let config = ImperiaConfig::from_json_str(
            r#"{"scenario_rules_dir": "rules/s", "battle_rules_dir": "rules/b"}"#,
        )
        .unwrap();
        assert_eq!(config.rules_dir(MapKind::Scenario), Path::new("rules/s"));
        assert_eq!(config.rules_dir(MapKind::Battle), Path::new("rules/b"));
    }

    #[test]
    fn bad_scope_is_a_parse_error() {
        assert!(ImperiaConfig::from_json_str(r#"{"listen_scope": "lan"}"#).is_err());
    }

    #[test]
    fn from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("imperia.json");
        match ImperiaConfig::from_file(&missing) {
            Err(ConfigError::ReadFailed { path, .. }) => assert_eq!(path, missing),
            other => panic!("unexpected result: {other:?}"),
        }
        fs::write(&missing, r#"{"connect_timeout_ms": 250}"#).unwrap();
        let config = ImperiaConfig::from_file(&missing).unwrap();
        assert_eq!(
            config.socket_options().connect_timeout,
            Duration::from_millis(250)
        );
    }
}
