//! plugdeps - Git-backed plugin manager
//!
//! CLI entry point: loads config, registers configured plugins, runs a command.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use tokio::sync::Mutex;
use tracing::{debug, info};

use plugdeps::cli::{Cli, Command, SnapCommand, get_log_path};
use plugdeps::config::Config;
use plugdeps::feedback::{self, AcceptAll};
use plugdeps::{ActivePaths, Deps, Notifier, PluginDecl, Snapshot, TwoStage, UpdateOptions};

type Shared = Arc<Mutex<Deps>>;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Register `plugins` now and `later` in a deferred round
async fn register_config_plugins(config: &Config, deps: &Shared, notifier: &Notifier) -> Result<()> {
    let plugins = config.plugin_decls().context("Invalid plugin declaration in config")?;
    let later = config.later_decls().context("Invalid plugin declaration in config")?;
    debug!(now = plugins.len(), later = later.len(), "register_config_plugins: called");
    if plugins.is_empty() && later.is_empty() {
        return Ok(());
    }

    let mut stages = TwoStage::new(notifier.clone());
    let shared = deps.clone();
    stages
        .now(async move {
            shared.lock().await.add_many(plugins).await?;
            Ok::<(), eyre::Report>(())
        })
        .await;
    let shared = deps.clone();
    stages.later(async move {
        shared.lock().await.add_many(later).await?;
        Ok::<(), eyre::Report>(())
    });
    if let Some(report) = stages.flush().await {
        debug!(%report, "register_config_plugins: errors during registration");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;
    info!(package = %config.path.package.display(), "plugdeps loaded config");

    let notifier = Notifier::stderr(config.silent);
    let active = ActivePaths::new();
    let mut deps = Deps::new(&config, notifier.clone()).with_load_path(active.clone());
    if cli.yes {
        deps = deps.with_confirm(AcceptAll);
    }
    let deps: Shared = Arc::new(Mutex::new(deps));

    register_config_plugins(&config, &deps, &notifier).await?;

    // Dispatch command
    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Add { specs } => {
            debug!(?specs, "main: matched Add command");
            cmd_add(&deps, specs).await
        }
        Command::Update { names, force, offline } => {
            debug!(?names, force, offline, "main: matched Update command");
            cmd_update(&deps, &names, UpdateOptions { force, offline }).await
        }
        Command::Clean { force } => {
            debug!(force, "main: matched Clean command");
            deps.lock().await.clean(force).await?;
            Ok(())
        }
        Command::Remove { name, delete } => {
            debug!(%name, delete, "main: matched Remove command");
            deps.lock().await.remove(&name, delete).await?;
            Ok(())
        }
        Command::Snap { command } => {
            debug!(?command, "main: matched Snap command");
            cmd_snap(&deps, command).await
        }
        Command::Session => {
            debug!("main: matched Session command");
            cmd_session(&deps).await
        }
        Command::Path => {
            debug!("main: matched Path command");
            for path in active.paths() {
                println!("{}", path.display());
            }
            Ok(())
        }
        Command::Log { lines } => {
            debug!(?lines, "main: matched Log command");
            cmd_log(&config.path.log, lines)
        }
    }
}

async fn cmd_add(deps: &Shared, specs: Vec<String>) -> Result<()> {
    let decls = specs.into_iter().map(PluginDecl::from).collect();
    let installed = deps.lock().await.add_many(decls).await?;
    let failed = installed.iter().filter(|p| !p.is_ok()).count();
    if failed > 0 {
        return Err(eyre!("{} of {} plugin(s) failed to install", failed, installed.len()));
    }
    Ok(())
}

async fn cmd_update(deps: &Shared, names: &[String], opts: UpdateOptions) -> Result<()> {
    let outcome = deps.lock().await.update(names, opts).await?;
    let failed = outcome.plugins.iter().filter(|p| !p.is_ok()).count();
    if !opts.force && !outcome.cancelled {
        println!("{}", feedback::render(&outcome.entries));
    }
    if failed > 0 {
        return Err(eyre!("{} plugin(s) failed to update", failed));
    }
    Ok(())
}

async fn cmd_snap(deps: &Shared, command: SnapCommand) -> Result<()> {
    let mut deps = deps.lock().await;
    match command {
        SnapCommand::Get => {
            let snap = deps.snap_get().await?;
            print!("{}", serde_yaml::to_string(&snap)?);
        }
        SnapCommand::Set { file } => {
            let snap = Snapshot::load(&file).context(format!("Failed to read snapshot {}", file.display()))?;
            deps.snap_set(&snap).await?;
        }
        SnapCommand::Save { path } => {
            let path = deps.snap_save(path.as_deref()).await?;
            println!("{}", path.display());
        }
        SnapCommand::Load { path } => {
            deps.snap_load(path.as_deref()).await?;
        }
    }
    Ok(())
}

async fn cmd_session(deps: &Shared) -> Result<()> {
    let specs = deps.lock().await.get_session();
    if specs.is_empty() {
        println!("No plugins registered");
        return Ok(());
    }
    for spec in specs {
        println!(
            "{} {}",
            spec.name.bold(),
            spec.source.as_deref().unwrap_or("<no source>").dimmed()
        );
        if let Some(checkout) = &spec.checkout {
            println!("  checkout: {}", checkout);
        }
        if let Some(monitor) = &spec.monitor {
            println!("  monitor:  {}", monitor);
        }
        if !spec.depends.is_empty() {
            println!("  depends:  {}", spec.depends.join(", "));
        }
    }
    Ok(())
}

fn cmd_log(path: &Path, lines: Option<usize>) -> Result<()> {
    let content = feedback::log::tail(path, lines).context("Failed to read update log")?;
    if content.is_empty() {
        println!("No update log found at: {}", path.display());
        return Ok(());
    }
    println!("{}", content);
    Ok(())
}
