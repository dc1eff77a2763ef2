//! CLI entry point for sarfetch.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sarfetch_core::auth::{BasicAuth, BearerToken, Session};
use sarfetch_core::download::{DownloadConfig, EngineError};
use sarfetch_core::http::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, ExponentialBackoff};
use sarfetch_core::storage::{CredentialBroker, is_object_url};
use sarfetch_core::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod app_config;
mod cli;
mod progress_display;

use app_config::FileConfig;
use cli::Args;
use progress_display::ProgressDisplay;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = app_config::load_file_config(args.config.as_deref())?;
    if loaded.loaded_from_file {
        debug!(path = ?loaded.path, "loaded config file");
    }
    let file = loaded.config;

    let urls = collect_urls(&args.urls)?;
    if urls.is_empty() {
        info!("No input provided. Pipe URLs via stdin or pass as arguments.");
        info!("Example: echo 'https://datapool.asf.alaska.edu/SLC/SA/granule.zip' | sarfetch");
        return Ok(ExitCode::SUCCESS);
    }

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| file.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let concurrency = args.concurrency.or(file.concurrency).map(usize::from);
    let token = non_empty(args.token.as_deref());

    let session = Arc::new(build_session(&args, &file, token)?);

    let display = show_progress(args.quiet).then(ProgressDisplay::new);
    let mut config = DownloadConfig::default()
        .with_verify(!args.no_verify && file.verify_checksums.unwrap_or(true));
    if let (Some(username), Some(password)) =
        (non_empty(args.username.as_deref()), args.password.as_deref())
    {
        config = config.with_basic_auth(BasicAuth::new(username, password));
    }
    if let Some(display) = &display {
        config = config.with_progress(display.callback());
    }

    let mut client = Client::new(Arc::clone(&session), config);
    if let Some(token) = token {
        let mut broker = CredentialBroker::builder(Arc::clone(&session), token);
        if let Some(endpoint) = file.credentials_url.as_deref() {
            broker = broker.endpoint(endpoint);
        }
        if let Some(region) = file.region.as_deref() {
            broker = broker.region(region);
        }
        let broker = broker.build().context("failed to configure storage credentials")?;
        client = client.with_broker(Arc::new(broker));
    } else if urls.iter().any(|url| is_object_url(url)) {
        warn!("s3:// URLs need an Earthdata token (--token or EARTHDATA_TOKEN)");
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling downloads");
                cancel.cancel();
            }
        }
    });

    info!(
        urls = urls.len(),
        output_dir = %output_dir.display(),
        "sarfetch starting"
    );
    let result = client
        .download_urls(&urls, &output_dir, concurrency, &cancel)
        .await;
    if let Some(display) = &display {
        display.finish();
    }

    match result {
        Ok(paths) => {
            info!(files = paths.len(), "Download complete");
            Ok(ExitCode::SUCCESS)
        }
        Err(EngineError::Batch(batch)) => {
            for failure in &batch {
                error!(error = %failure, "download failed");
            }
            let cancelled = batch.iter().filter(|failure| failure.is_cancelled()).count();
            error!(
                failed = batch.len(),
                cancelled,
                "Some downloads did not complete"
            );
            Ok(ExitCode::FAILURE)
        }
        Err(other) => Err(other).context("download run failed"),
    }
}

fn build_session(args: &Args, file: &FileConfig, token: Option<&str>) -> Result<Session> {
    let max_attempts = args
        .max_attempts
        .or(file.max_attempts)
        .unwrap_or(DEFAULT_MAX_ATTEMPTS);
    let base_delay = file
        .retry_base_delay_ms
        .map_or(DEFAULT_BASE_DELAY, Duration::from_millis);

    let mut builder =
        Session::builder().retry_policy(ExponentialBackoff::new(max_attempts, base_delay));
    if let Some(secs) = file.connect_timeout_secs {
        builder = builder.connect_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = file.read_timeout_secs {
        builder = builder.read_timeout(Duration::from_secs(secs));
    }
    if let Some(token) = token {
        builder = builder.authenticator(BearerToken::new(token));
    }
    builder.build().context("failed to build HTTP session")
}

/// URLs from the arguments, else from piped stdin (one per line, `#` comments ignored).
fn collect_urls(from_args: &[String]) -> Result<Vec<String>> {
    let raw = if !from_args.is_empty() {
        from_args.join("\n")
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read URLs from stdin")?;
        buffer
    } else {
        return Ok(Vec::new());
    };

    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToString::to_string)
        .collect())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn show_progress(quiet: bool) -> bool {
    let dumb_terminal = std::env::var("TERM").is_ok_and(|term| term.eq_ignore_ascii_case("dumb"));
    io::stderr().is_terminal() && !quiet && !dumb_terminal
}
