//! CLI argument definitions using clap derive macros.

use std::fmt;
use std::path::PathBuf;

use clap::Parser;

/// Download SAR product files with checksum verification.
///
/// URLs are taken from the arguments, or read one per line from stdin when
/// none are given. `s3://` URLs need an Earthdata bearer token.
#[derive(Parser)]
#[command(name = "sarfetch")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Directory the files are written to [default: current directory]
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-64) [default: available CPUs]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub concurrency: Option<u8>,

    /// Skip checksum verification
    #[arg(long)]
    pub no_verify: bool,

    /// Attempts per request for transient failures (1-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_attempts: Option<u32>,

    /// Earthdata Login username
    #[arg(long, env = "EARTHDATA_USERNAME")]
    pub username: Option<String>,

    /// Earthdata Login password
    #[arg(long, env = "EARTHDATA_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Earthdata bearer token (required for s3:// URLs)
    #[arg(long, env = "EARTHDATA_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Config file [default: $XDG_CONFIG_HOME/sarfetch/config.toml]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("urls", &self.urls)
            .field("output_dir", &self.output_dir)
            .field("concurrency", &self.concurrency)
            .field("no_verify", &self.no_verify)
            .field("max_attempts", &self.max_attempts)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("config", &self.config)
            .field("verbose", &self.verbose)
            .field("quiet", &self.quiet)
            .finish()
    }
}
