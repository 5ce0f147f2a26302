//! `offline-sniffer` configuration loading.
//!
//! TOML is the sole config file source; no environment-variable overrides.
//! Unlike the inline proxy, `source` has no sane default — a sniffer that
//! doesn't know what to read from is a misconfiguration, not a choice to
//! fall back on.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default config path, matching the inline proxy's `/etc/dbwire/...`
/// convention for this codebase's long-running services.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dbwire/offline-sniffer.toml";

/// Default TCP port filtered for when none is configured.
pub const DEFAULT_PORT: u16 = 27017;

/// Where the driver reads captured frames from: a live device (infinite)
/// or a capture file (finite replay).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSource {
    Device(String),
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnifferConfig {
    pub source: CaptureSource,
    pub port: u16,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    device: Option<String>,
    file: Option<PathBuf>,
    port: Option<u16>,
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
    #[error("config must set exactly one of `device` or `file`, found {found}")]
    AmbiguousSource { found: usize },
}

/// Load config from `path`. Unlike the inline proxy, a missing file is
/// still an error once combined with CLI overrides that also leave
/// `source` unset — that resolution happens in [`load_config`], which
/// merges CLI flags in after this returns.
fn load_raw(path: &Path) -> Result<RawConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RawConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        }),
    }
}

/// Load the config file and merge in CLI overrides, producing the fully
/// resolved [`SnifferConfig`]. `cli_device`/`cli_file` take precedence over
/// the file; exactly one of (config `device`, config `file`, CLI device,
/// CLI file) must end up set.
pub fn load_config(
    path: &Path,
    cli_device: Option<String>,
    cli_file: Option<PathBuf>,
    cli_port: Option<u16>,
) -> Result<SnifferConfig, ConfigError> {
    let raw = load_raw(path)?;

    let device = cli_device.or(raw.device);
    let file = cli_file.or(raw.file);
    let port = cli_port.or(raw.port).unwrap_or(DEFAULT_PORT);

    let source = match (device, file) {
        (Some(device), None) => CaptureSource::Device(device),
        (None, Some(file)) => CaptureSource::File(file),
        (None, None) => return Err(ConfigError::AmbiguousSource { found: 0 }),
        (Some(_), Some(_)) => return Err(ConfigError::AmbiguousSource { found: 2 }),
    };

    Ok(SnifferConfig { source, port })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_with_no_cli_overrides_is_ambiguous() {
        let err = load_config(Path::new("/nonexistent/offline-sniffer.toml"), None, None, None).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousSource { found: 0 }));
    }

    #[test]
    fn cli_device_overrides_config_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline-sniffer.toml");
        std::fs::write(&path, "file = \"/tmp/capture.pcap\"\n").unwrap();

        let config = load_config(&path, Some("eth0".to_owned()), None, None).unwrap();
        assert_eq!(config.source, CaptureSource::Device("eth0".to_owned()));
    }

    #[test]
    fn device_and_file_both_set_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline-sniffer.toml");
        std::fs::write(&path, "device = \"eth0\"\nfile = \"/tmp/capture.pcap\"\n").unwrap();

        let err = load_config(&path, None, None, None).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousSource { found: 2 }));
    }

    #[test]
    fn port_defaults_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline-sniffer.toml");
        std::fs::write(&path, "device = \"eth0\"\n").unwrap();

        let config = load_config(&path, None, None, None).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
    }
}
