//! tactls - Tact language server binary.
//!
//! Speaks LSP over stdin/stdout. Logs go to stderr, or to `--log-file`, since
//! stdout carries the protocol.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "tactls", version, about = "Language server for Tact")]
struct Args {
    /// Communicate over stdin/stdout (the only transport; accepted for
    /// editors that always pass it)
    #[arg(long)]
    stdio: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn init_tracing(log_file: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let mut init_warning = None;
    if let Some(path) = log_file {
        match open_log_file(path) {
            Ok(file) => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                    .with(env_filter)
                    .init();
                tracing::info!(path = %path.display(), "Logging initialized");
                return;
            }
            Err(e) => {
                init_warning = Some(format!(
                    "Failed to open log file {}: {e}; logging to stderr",
                    path.display()
                ));
            }
        }
    }

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .init();
    if let Some(warning) = init_warning {
        tracing::warn!("{warning}");
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_file.as_deref());
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        stdio = args.stdio,
        "Starting tactls"
    );

    let outcome = tactls_lsp::serve_stdio().await?;
    std::process::exit(outcome.exit_code());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn arguments_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn accepts_editor_flags() {
        let args = Args::try_parse_from(["tactls", "--stdio", "--log-file", "/tmp/tactls.log"])
            .unwrap();
        assert!(args.stdio);
        assert_eq!(args.log_file, Some(PathBuf::from("/tmp/tactls.log")));

        let args = Args::try_parse_from(["tactls"]).unwrap();
        assert!(!args.stdio);
        assert!(args.log_file.is_none());
    }

    #[test]
    fn log_file_parent_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("tactls.log");
        open_log_file(&path).unwrap();
        assert!(path.is_file());
    }
}
