mod cli;
mod error_fmt;
mod run;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::{Result, WrapErr};
use phasectl_config::Config;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::Layered};

use crate::cli::{Cli, Commands, DEFAULT_CONFIG, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{format_error_json, humanize};
use crate::run::{RunOptions, RunSummary};

type Subscriber = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Subscriber> + Send + Sync>;

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    let _ = color_eyre::install();

    if let Err(err) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        tracing::error!(error = %err, "command failed");
        std::process::exit(1);
    }
}

fn real_main(cli: Cli) -> Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging)?;

    match cli.cmd {
        Commands::Run {
            mode,
            simulate,
            duration_s,
            target_phase_rad,
            reset_after_s,
        } => {
            let opts = RunOptions {
                mode,
                simulate,
                duration: seconds("--duration-s", duration_s)?,
                target_phase_rad,
                reset_after: seconds("--reset-after-s", reset_after_s)?,
                json: cli.json,
            };
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .wrap_err("failed to install ctrl-c handler")?;

            tracing::info!(mode = mode.as_str(), simulate, "run start");
            let summary = run::run(&cfg, &opts, shutdown)?;
            print_summary(mode.as_str(), &summary, cli.json);
            Ok(())
        }
        Commands::SelfCheck { simulate } => {
            run::self_check(&cfg, simulate)?;
            if cli.json {
                println!("{}", serde_json::json!({ "type": "self_check", "status": "ok" }));
            } else {
                println!("ok");
            }
            Ok(())
        }
    }
}

/// Explicit paths must exist; the default path falls back to built-in defaults.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    let cfg = if !explicit && !path.exists() {
        Config::default()
    } else {
        let text = std::fs::read_to_string(&path)
            .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
        phasectl_config::load_toml(&text)
            .wrap_err_with(|| format!("failed to parse config {}", path.display()))?
    };
    cfg.validate()?;
    Ok(cfg)
}

fn seconds(flag: &str, value: Option<f64>) -> Result<Option<Duration>> {
    match value {
        None => Ok(None),
        Some(s) if s.is_finite() && s >= 0.0 => Ok(Some(Duration::from_secs_f64(s))),
        Some(s) => eyre::bail!("{flag} must be a non-negative number of seconds (got {s})"),
    }
}

fn init_tracing(json: bool, level: Option<&str>, logging: &phasectl_config::Logging) -> Result<()> {
    let level = level.or(logging.level.as_deref()).unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Console logs go to stderr so stdout carries only reports.
    let console: BoxedLayer = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    let mut layers = vec![console];
    if let Some(file) = &logging.file {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file must name a file (got {file})"))?;
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        layers.push(fmt::layer().json().with_ansi(false).with_writer(writer).boxed());
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .map_err(|e| eyre::eyre!("failed to install tracing subscriber: {e}"))
}

fn print_summary(mode: &str, summary: &RunSummary, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "type": "summary",
                "mode": mode,
                "steps": summary.steps,
                "commands": summary.commands,
                "superseded": summary.superseded,
            })
        );
    } else {
        println!(
            "done: {} steps, {} stage commands ({} superseded)",
            summary.steps, summary.commands, summary.superseded
        );
    }
}
