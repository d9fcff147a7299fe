//! ptyrun: run one program on a pty attached to the local terminal

use crate::terminal_guard::RawModeGuard;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ptyspawn_pty::{AsyncPtyMaster, LaunchSpec, WindowSize};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a program on a pseudo-terminal")]
pub struct Args {
    /// Terminal columns (defaults to the local terminal's width)
    #[arg(long)]
    pub cols: Option<u16>,

    /// Terminal rows (defaults to the local terminal's height)
    #[arg(long)]
    pub rows: Option<u16>,

    /// Working directory for the program
    #[arg(long)]
    pub cwd: Option<String>,

    /// Environment entry to set, KEY=VALUE (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Start from an empty environment instead of this process's
    #[arg(long)]
    pub clear_env: bool,

    /// Terminal name exported to the program as TERM
    #[arg(long)]
    pub term: Option<String>,

    /// Log level
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Path to log file (stderr if not specified)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log foreground process changes, polling every MS milliseconds
    #[arg(long, value_name = "MS")]
    pub watch_foreground: Option<u64>,

    /// Program to run and its arguments (defaults to $SHELL)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_directive()));

    match &args.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Override `base` with `overrides`, matching entries by key. Order of first
/// appearance is kept.
pub fn merge_env(base: Vec<String>, overrides: &[String]) -> Vec<String> {
    let mut merged = base;
    for entry in overrides {
        let key = entry.split_once('=').map_or(entry.as_str(), |(k, _)| k);
        match merged
            .iter_mut()
            .find(|existing| existing.split_once('=').map(|(k, _)| k) == Some(key))
        {
            Some(existing) => *existing = entry.clone(),
            None => merged.push(entry.clone()),
        }
    }
    merged
}

fn initial_size(args: &Args) -> WindowSize {
    let local = if io::stdout().is_terminal() {
        crossterm::terminal::size().ok()
    } else {
        None
    };
    let (local_cols, local_rows) = local.unwrap_or((0, 0));
    WindowSize::new(
        i64::from(args.cols.unwrap_or(local_cols)),
        i64::from(args.rows.unwrap_or(local_rows)),
    )
}

/// Translate the command line into a launch spec.
pub fn build_spec(args: &Args) -> LaunchSpec {
    let (program, rest) = match args.command.split_first() {
        Some((program, rest)) => (program.clone(), rest.to_vec()),
        None => (
            std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()),
            Vec::new(),
        ),
    };

    let base = if args.clear_env {
        Vec::new()
    } else {
        std::env::vars().map(|(k, v)| format!("{k}={v}")).collect()
    };

    let mut spec = LaunchSpec::new(program)
        .args(rest)
        .env(merge_env(base, &args.env))
        .cwd(args.cwd.clone().unwrap_or_default())
        .size(initial_size(args));
    if let Some(term) = &args.term {
        spec = spec.term(term.clone());
    }
    spec
}

/// Shuttle bytes between the local terminal and the pty until the program
/// side hangs up.
async fn relay(mut master: AsyncPtyMaster, watch: Option<Duration>, program: &str) -> Result<()> {
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut winch = signal(SignalKind::window_change()).context("Failed to watch SIGWINCH")?;
    let mut ticker = tokio::time::interval(watch.unwrap_or(Duration::from_secs(1)));
    let mut stdin_open = true;
    let mut foreground: Option<String> = None;
    let mut output = vec![0u8; 8192];
    let mut input = vec![0u8; 1024];

    loop {
        tokio::select! {
            result = master.read(&mut output) => {
                let n = result.context("Failed to read from pty")?;
                if n == 0 {
                    debug!("pty closed");
                    break;
                }
                stdout.write_all(&output[..n]).await?;
                stdout.flush().await?;
            }

            result = stdin.read(&mut input), if stdin_open => {
                match result.context("Failed to read stdin")? {
                    0 => {
                        debug!("stdin closed");
                        stdin_open = false;
                    }
                    n => master.write_all(&input[..n]).await.context("Failed to write to pty")?,
                }
            }

            _ = winch.recv() => {
                match crossterm::terminal::size() {
                    Ok((cols, rows)) => {
                        if let Err(e) = master.resize(i64::from(cols), i64::from(rows)) {
                            warn!("Failed to resize pty: {}", e);
                        }
                    }
                    Err(e) => warn!("Failed to read local terminal size: {}", e),
                }
            }

            _ = ticker.tick(), if watch.is_some() => {
                let name = master
                    .foreground_process_name()
                    .unwrap_or_else(|| program.to_string());
                if foreground.as_deref() != Some(name.as_str()) {
                    info!(foreground = %name, "foreground process changed");
                    foreground = Some(name);
                }
            }
        }
    }

    Ok(())
}

/// Run ptyrun with the process arguments and return the exit code to use.
pub async fn run() -> Result<i32> {
    let args = Args::parse();
    init_logging(&args)?;
    debug!("ptyrun args: {:?}", args);

    let spec = build_spec(&args);
    let session = ptyspawn_pty::spawn(&spec)
        .with_context(|| format!("Failed to launch {}", spec.program()))?;
    info!(
        pid = %session.pid(),
        device = %session.device_path().display(),
        size = %spec.window_size(),
        "launched {}",
        spec.program()
    );

    let (master, child) = session
        .into_async()
        .context("Failed to register pty with the runtime")?;

    let mut guard = RawModeGuard::enter_if_terminal()?;

    let watch = args.watch_foreground.map(Duration::from_millis);
    let relayed = relay(master, watch, spec.program()).await;
    guard.restore()?;
    relayed?;

    let status = tokio::task::spawn_blocking(move || child.wait())
        .await
        .context("Reaper task failed")?
        .context("Failed to reap child")?;
    info!(code = status.code(), "program exited");
    Ok(status.code())
}
