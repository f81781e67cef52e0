use anyhow::Result;
use clap::Parser;

use crate::config::{apply_config_file, Options, DEFAULT_CONFIG_FILE};
use crate::web::App;

/// Flags mirror the option names; values given here override the
/// config file. Defaults live in `Options::default`.
#[derive(Parser, Debug)]
#[command(name = "gotty", version, about = "Share your terminal as a web application")]
pub struct Cli {
    /// Command to run, with its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Bind address (empty = all interfaces)
    #[arg(short, long)]
    pub address: Option<String>,

    /// TCP port [default: 8080]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Permit clients to write to the PTY
    #[arg(short = 'w', long)]
    pub permit_write: bool,

    /// Require HTTP basic authentication
    #[arg(long)]
    pub enable_basic_auth: bool,

    /// Basic auth credential (user:password)
    #[arg(short = 'c', long)]
    pub credential: Option<String>,

    /// Serve on a random URL path
    #[arg(short = 'r', long)]
    pub enable_random_url: bool,

    /// Length of the random URL segment [default: 8]
    #[arg(long)]
    pub random_url_length: Option<usize>,

    /// Serve HTTPS
    #[arg(short = 't', long)]
    pub enable_tls: bool,

    /// TLS certificate file [default: ~/.gotty.crt]
    #[arg(long)]
    pub tls_crt_file: Option<String>,

    /// TLS key file [default: ~/.gotty.key]
    #[arg(long)]
    pub tls_key_file: Option<String>,

    /// Session title template (fields: Command, Hostname, preference keys)
    #[arg(long)]
    pub title_format: Option<String>,

    /// Tell the browser to reconnect after the session ends
    #[arg(long)]
    pub enable_reconnect: bool,

    /// Reconnect delay in seconds [default: 10]
    #[arg(long)]
    pub reconnect_time: Option<u64>,

    /// Accept only the first client, then drain
    #[arg(long)]
    pub once: bool,

    /// Preferences file forwarded to the browser [default: ~/.gotty.prf]
    #[arg(long)]
    pub profile_file: Option<String>,

    /// Config file [default: ~/.gotty]
    #[arg(long)]
    pub config: Option<String>,
}

impl Cli {
    /// Resolve defaults, then the config file, then the flags.
    pub fn into_options(self) -> Result<(Vec<String>, Options)> {
        let mut options = Options::default();

        let config_path = self
            .config
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
        apply_config_file(&mut options, &config_path, self.config.is_some())?;

        if let Some(v) = self.address {
            options.address = v;
        }
        if let Some(v) = self.port {
            options.port = v;
        }
        if self.permit_write {
            options.permit_write = true;
        }
        if self.enable_basic_auth {
            options.enable_basic_auth = true;
        }
        if let Some(v) = self.credential {
            options.credential = v;
        }
        if self.enable_random_url {
            options.enable_random_url = true;
        }
        if let Some(v) = self.random_url_length {
            options.random_url_length = v;
        }
        if self.enable_tls {
            options.enable_tls = true;
        }
        if let Some(v) = self.tls_crt_file {
            options.tls_crt_file = v;
        }
        if let Some(v) = self.tls_key_file {
            options.tls_key_file = v;
        }
        if let Some(v) = self.title_format {
            options.title_format = v;
        }
        if self.enable_reconnect {
            options.enable_reconnect = true;
        }
        if let Some(v) = self.reconnect_time {
            options.reconnect_time = v;
        }
        if self.once {
            options.once = true;
        }
        if let Some(v) = self.profile_file {
            options.profile_file = v;
        }

        Ok((self.command, options))
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let (command, options) = cli.into_options()?;
    let app = App::new(command, options)?;
    app.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_flags() {
        let cli = Cli::parse_from(["gotty", "bash"]);
        let (command, options) = cli.into_options().unwrap();
        assert_eq!(command, vec!["bash"]);
        assert_eq!(options.port, 8080);
        assert!(!options.permit_write);
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from(["gotty", "-w", "-p", "9000", "--once", "cat"]);
        let (command, options) = cli.into_options().unwrap();
        assert_eq!(command, vec!["cat"]);
        assert_eq!(options.port, 9000);
        assert!(options.permit_write);
        assert!(options.once);
    }

    #[test]
    fn test_command_keeps_its_own_flags() {
        let cli = Cli::parse_from(["gotty", "-w", "ls", "-la"]);
        let (command, _) = cli.into_options().unwrap();
        assert_eq!(command, vec!["ls", "-la"]);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = std::env::temp_dir().join(format!("gotty-cli-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gotty.conf");
        std::fs::write(&path, "port = 9000\npermit_write = true\n").unwrap();

        let cli = Cli::parse_from([
            "gotty",
            "--config",
            path.to_str().unwrap(),
            "-p",
            "9001",
            "cat",
        ]);
        let (_, options) = cli.into_options().unwrap();
        assert_eq!(options.port, 9001);
        assert!(options.permit_write);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let cli = Cli::parse_from(["gotty", "--config", "/nonexistent/gotty.conf", "cat"]);
        assert!(cli.into_options().is_err());
    }
}
