//! Process startup
//!
//! Parses the command line, loads configuration, starts logging, builds the
//! configured transport and hands off to the selected command.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::app::cli::{Args, Command};
use crate::app::commands;
use crate::app::error::AppResult;
use crate::core::config::Settings;
use crate::core::error_handling::log_error_with_context;
use crate::core::logging::{init_logging, LogFormat};
use crate::core::version::long_version;
use crate::transport::TransportRegistry;

/// Run `qrelay` with the process arguments, returning the exit code
pub async fn startup() -> i32 {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => 0,
        // Failed before the logger came up
        Err(e) if log::max_level() == log::LevelFilter::Off => {
            eprintln!("FATAL: {}", e);
            1
        }
        Err(e) => {
            log_error_with_context(&e, "qrelay");
            1
        }
    }
}

/// Execute the command described by `args`
pub async fn run(args: Args) -> AppResult<()> {
    let mut settings = Settings::load(args.config_file.as_deref()).await?;
    settings.apply_overrides(args.provider.as_deref(), args.app_name.as_deref());

    configure_logging(&args, &settings)?;
    log::info!("qrelay {} starting", long_version());
    log::debug!("Resolved settings: {:?}", settings);

    let registry = TransportRegistry::discover();
    let transport = registry.create(&settings.provider, &settings).await?;
    if settings.provider == "memory" && args.command != Command::Demo {
        log::warn!("The memory provider only reaches queues inside this process");
    }

    match args.command {
        Command::Listen => commands::listen(transport, &settings).await,
        Command::Query { city, timeout } => {
            commands::query(transport, &settings, &city, timeout.map(Duration::from_secs)).await
        }
        Command::Submit { name, lat, lon } => {
            commands::submit(transport, &settings, &name, lat, lon).await
        }
        Command::Demo => commands::demo(transport, &settings).await,
    }
}

fn configure_logging(args: &Args, settings: &Settings) -> AppResult<()> {
    let level = args.log_level.as_deref().or(settings.log.level.as_deref());
    let format = args
        .log_format
        .as_deref()
        .or(settings.log.format.as_deref())
        .map(str::parse::<LogFormat>)
        .transpose()?
        .unwrap_or_default();
    let file: Option<PathBuf> = match args.effective_log_file() {
        Some(file) => file,
        None => settings.log.file.clone(),
    };
    let color = args.use_color(std::io::stdout().is_terminal());

    init_logging(level, format, file.as_deref(), color)?;
    Ok(())
}
