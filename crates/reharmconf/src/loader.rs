//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, ReharmConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/reharm/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("reharm/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("reharm.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a config file as a raw TOML table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

pub(crate) fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents
        .parse::<toml::Table>()
        .map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Deep-merge `overlay` into `base`; tables merge key by key, everything else is replaced.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Turn a merged table into a config, filling unset fields with defaults.
pub(crate) fn table_to_config(
    table: toml::Table,
    path: &Path,
) -> Result<ReharmConfig, ConfigError> {
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Apply `REHARM_*` (and `RUST_LOG`) environment overrides.
pub fn apply_env_overrides(
    config: &mut ReharmConfig,
    sources: &mut ConfigSources,
) -> Result<(), ConfigError> {
    apply_overrides_from(config, sources, env::vars())
}

/// Apply overrides from an explicit variable list.
///
/// Unparseable values are rejected rather than skipped.
pub fn apply_overrides_from<I>(
    config: &mut ReharmConfig,
    sources: &mut ConfigSources,
    vars: I,
) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let applied = match key.as_str() {
            "REHARM_STYLE" => {
                config.session.style = value;
                true
            }
            "REHARM_COMPLEXITY" => {
                config.session.complexity = parse_var(&key, &value)?;
                true
            }
            "REHARM_BEAM_WIDTH" => {
                config.search.beam_width = parse_var(&key, &value)?;
                true
            }
            "REHARM_MAX_SUGGESTIONS" => {
                config.search.max_suggestions = parse_var(&key, &value)?;
                true
            }
            "REHARM_MAX_TIME_MS" => {
                config.search.max_time_ms = parse_var(&key, &value)?;
                true
            }
            "REHARM_SEED" => {
                config.search.seed = Some(parse_var(&key, &value)?);
                true
            }
            "REHARM_INSTRUMENT" => {
                config.voicing.instrument = value;
                true
            }
            // RUST_LOG wins over the reharm-specific variable when both are set
            "REHARM_LOG_LEVEL" if !sources.env_overrides.iter().any(|k| k == "RUST_LOG") => {
                config.telemetry.log_level = value;
                true
            }
            "RUST_LOG" => {
                config.telemetry.log_level = value;
                true
            }
            _ => false,
        };

        if applied {
            sources.env_overrides.push(key);
        }
    }

    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_path(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        field: key.to_string(),
        message: format!("cannot parse {:?}", value),
    })
}
