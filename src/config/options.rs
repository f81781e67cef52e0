use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use super::paths::expand_home;

/// Default config file location. A missing file here is tolerated;
/// a missing file passed explicitly on the command line is an error.
pub const DEFAULT_CONFIG_FILE: &str = "~/.gotty";

/// Server options, immutable after startup.
///
/// Resolution order: defaults, then the config file, then CLI flags
/// (applied in `cli::Cli::into_options`).
#[derive(Debug, Clone)]
pub struct Options {
    /// Bind host. Empty means all interfaces.
    pub address: String,
    pub port: u16,
    /// Allow client input to reach the PTY.
    pub permit_write: bool,
    pub enable_basic_auth: bool,
    /// Basic auth credential in `user:password` form.
    pub credential: String,
    pub enable_random_url: bool,
    pub random_url_length: usize,
    /// Preferences file forwarded to the browser.
    pub profile_file: String,
    pub enable_tls: bool,
    pub tls_crt_file: String,
    pub tls_key_file: String,
    /// Session title template. Fields: `Command`, `Hostname`, plus any
    /// scalar preference key.
    pub title_format: String,
    pub enable_reconnect: bool,
    /// Reconnect delay in seconds, forwarded via preferences.
    pub reconnect_time: u64,
    /// Accept only the first client, then drain.
    pub once: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: 8080,
            permit_write: false,
            enable_basic_auth: false,
            credential: String::new(),
            enable_random_url: false,
            random_url_length: 8,
            profile_file: "~/.gotty.prf".to_string(),
            enable_tls: false,
            tls_crt_file: "~/.gotty.crt".to_string(),
            tls_key_file: "~/.gotty.key".to_string(),
            title_format: "GoTTY - {{ .Command }} ({{ .Hostname }})".to_string(),
            enable_reconnect: false,
            reconnect_time: 10,
            once: false,
        }
    }
}

/// On-disk config file. Keys are the snake_case option names; unknown
/// keys are rejected rather than silently ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    address: Option<String>,
    port: Option<u16>,
    permit_write: Option<bool>,
    enable_basic_auth: Option<bool>,
    credential: Option<String>,
    enable_random_url: Option<bool>,
    random_url_length: Option<usize>,
    profile_file: Option<String>,
    enable_tls: Option<bool>,
    tls_crt_file: Option<String>,
    tls_key_file: Option<String>,
    title_format: Option<String>,
    enable_reconnect: Option<bool>,
    reconnect_time: Option<u64>,
    once: Option<bool>,
}

impl ConfigFile {
    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    fn apply(&self, options: &mut Options) {
        if let Some(v) = &self.address {
            options.address = v.clone();
        }
        if let Some(v) = self.port {
            options.port = v;
        }
        if let Some(v) = self.permit_write {
            options.permit_write = v;
        }
        if let Some(v) = self.enable_basic_auth {
            options.enable_basic_auth = v;
        }
        if let Some(v) = &self.credential {
            options.credential = v.clone();
        }
        if let Some(v) = self.enable_random_url {
            options.enable_random_url = v;
        }
        if let Some(v) = self.random_url_length {
            options.random_url_length = v;
        }
        if let Some(v) = &self.profile_file {
            options.profile_file = v.clone();
        }
        if let Some(v) = self.enable_tls {
            options.enable_tls = v;
        }
        if let Some(v) = &self.tls_crt_file {
            options.tls_crt_file = v.clone();
        }
        if let Some(v) = &self.tls_key_file {
            options.tls_key_file = v.clone();
        }
        if let Some(v) = &self.title_format {
            options.title_format = v.clone();
        }
        if let Some(v) = self.enable_reconnect {
            options.enable_reconnect = v;
        }
        if let Some(v) = self.reconnect_time {
            options.reconnect_time = v;
        }
        if let Some(v) = self.once {
            options.once = v;
        }
    }
}

/// Overlay a config file onto `options`.
///
/// `explicit` marks a path given on the command line: then a missing
/// file is an error. The default path is tolerated when absent.
pub fn apply_config_file(options: &mut Options, path: &str, explicit: bool) -> Result<()> {
    let path = expand_home(path);
    if !Path::new(&path).exists() {
        if explicit {
            bail!("Config file not found: {}", path);
        }
        return Ok(());
    }

    tracing::info!(path = %path, "Loading config file");
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path))?;
    ConfigFile::parse(&content)?.apply(options);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.port, 8080);
        assert!(options.address.is_empty());
        assert!(!options.permit_write);
        assert_eq!(options.random_url_length, 8);
        assert_eq!(options.profile_file, "~/.gotty.prf");
        assert_eq!(options.tls_crt_file, "~/.gotty.crt");
        assert_eq!(options.tls_key_file, "~/.gotty.key");
        assert_eq!(options.reconnect_time, 10);
    }

    #[test]
    fn test_config_overlay() {
        let mut options = Options::default();
        let config = ConfigFile::parse(
            r#"
port = 9000
permit_write = true
title_format = "terminal"
"#,
        )
        .unwrap();
        config.apply(&mut options);
        assert_eq!(options.port, 9000);
        assert!(options.permit_write);
        assert_eq!(options.title_format, "terminal");
        // Untouched keys keep their defaults
        assert_eq!(options.profile_file, "~/.gotty.prf");
    }

    #[test]
    fn test_config_apply_is_idempotent() {
        let content = r#"
port = 9000
enable_basic_auth = true
credential = "u:p"
"#;
        let mut once = Options::default();
        ConfigFile::parse(content).unwrap().apply(&mut once);
        let mut twice = once.clone();
        ConfigFile::parse(content).unwrap().apply(&mut twice);
        assert_eq!(format!("{:?}", once), format!("{:?}", twice));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(ConfigFile::parse("no_such_option = true").is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let mut options = Options::default();
        let err = apply_config_file(&mut options, "/nonexistent/gotty.conf", true);
        assert!(err.is_err());
    }

    #[test]
    fn test_missing_default_file_is_tolerated() {
        let mut options = Options::default();
        apply_config_file(&mut options, "/nonexistent/gotty.conf", false).unwrap();
        assert_eq!(options.port, 8080);
    }
}
