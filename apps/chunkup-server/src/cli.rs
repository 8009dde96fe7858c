//! Command-line arguments.

use std::net::IpAddr;
use std::path::PathBuf;

use chunkup_server::ServerConfig;
use clap::Parser;

/// chunkup server - receives chunked uploads and reassembles them.
#[derive(Debug, Parser)]
#[command(name = "chunkup-server", version, about)]
pub struct Cli {
    /// Configuration file (defaults to the per-user config path)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short = 'b', long = "bind")]
    pub bind: Option<IpAddr>,

    /// Port to listen on (0 = OS-assigned)
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Directory for staged chunks
    #[arg(long = "staging-dir", value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Directory for merged files
    #[arg(long = "target-dir", value_name = "DIR")]
    pub target_dir: Option<PathBuf>,
}

impl Cli {
    /// Overrides file settings with whatever was given on the command line.
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = &self.staging_dir {
            config.staging_dir = dir.clone();
        }
        if let Some(dir) = &self.target_dir {
            config.target_dir = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_keeps_config() {
        let cli = Cli::try_parse_from(["chunkup-server"]).unwrap();
        let mut config = ServerConfig::default();
        cli.apply(&mut config);
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn overrides_apply() {
        let cli = Cli::try_parse_from([
            "chunkup-server",
            "--config",
            "/etc/chunkup.toml",
            "-p",
            "8080",
            "--bind",
            "127.0.0.1",
            "--target-dir",
            "/srv/out",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/chunkup.toml")));

        let mut config = ServerConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind.to_string(), "127.0.0.1");
        assert_eq!(config.target_dir, PathBuf::from("/srv/out"));
        assert_eq!(config.staging_dir, PathBuf::from("temp"));
    }

    #[test]
    fn invalid_port_is_rejected() {
        assert!(Cli::try_parse_from(["chunkup-server", "--port", "70000"]).is_err());
    }
}
