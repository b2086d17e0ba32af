use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::DemeterConfig;

pub const DEFAULT_CONFIG_PATHS: &[&str] = &["demeter.yaml", "config/demeter.yaml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// 按候选路径加载配置；一个都不存在时退回内置默认值。
pub fn load_config(path: Option<PathBuf>) -> Result<DemeterConfig, ConfigError> {
    let candidate_paths = match path {
        Some(p) => vec![p],
        None => DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .collect::<Vec<PathBuf>>(),
    };

    for candidate in candidate_paths {
        if let Some(config) = try_load_file(&candidate)? {
            return Ok(config);
        }
    }

    Ok(DemeterConfig::default())
}

fn try_load_file(path: &Path) -> Result<Option<DemeterConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: DemeterConfig =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(Some(config))
}
