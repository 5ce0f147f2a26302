//! `inline-proxy` configuration loading.
//!
//! TOML is the sole config file source; no environment-variable overrides.
//! Every field has a default, so a missing config file is not itself an
//! error — only a present-but-malformed one is.

use serde::Deserialize;
use std::path::Path;

/// Default config path, mirroring this codebase's `/etc/<tool>/<tool>.toml`
/// convention for its other long-running services.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dbwire/inline-proxy.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub bind: String,
    pub upstream: String,
    pub idle_timeout_secs: Option<u64>,
}

impl Default for ProxyConfig {
    fn default() -> ProxyConfig {
        ProxyConfig {
            bind: "localhost:37017".to_owned(),
            upstream: "localhost:27017".to_owned(),
            idle_timeout_secs: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    bind: Option<String>,
    upstream: Option<String>,
    idle_timeout_secs: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Load config from `path` if it exists; returns defaults untouched if the
/// file is absent. A file that exists but fails to parse is always an
/// error — silently falling back would mask a typo in a deployed config.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ProxyConfig::default()),
        Err(e) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                source: e,
            })
        }
    };

    let raw: RawConfig = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        source: e,
    })?;

    let defaults = ProxyConfig::default();
    Ok(ProxyConfig {
        bind: raw.bind.unwrap_or(defaults.bind),
        upstream: raw.upstream.unwrap_or(defaults.upstream),
        idle_timeout_secs: raw.idle_timeout_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/dbwire/inline-proxy.toml")).unwrap();
        assert_eq!(config, ProxyConfig::default());
    }

    #[test]
    fn partial_toml_keeps_unset_fields_at_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inline-proxy.toml");
        std::fs::write(&path, "bind = \"0.0.0.0:37017\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.bind, "0.0.0.0:37017");
        assert_eq!(config.upstream, ProxyConfig::default().upstream);
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inline-proxy.toml");
        std::fs::write(&path, "bind = [[[").unwrap();

        assert!(load_config(&path).is_err());
    }
}
