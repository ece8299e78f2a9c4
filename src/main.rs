use std::env::consts::{ARCH, FAMILY, OS};
use std::path::Path;
use std::process::exit;

use clap::Parser;
use console::style;
use tracing::{info, trace, warn};

use crate::cli::Cli;
use crate::config::{ConfigManager, LoadOutcome};
use crate::logger::{Logger, LoggerOptions};
use crate::program::{report_outcome, Program};

mod cli;
mod config;
mod fancaps;
mod logger;
mod program;

fn main() {
    exit(run());
}

#[tokio::main]
async fn run() -> i32 {
    let cli = Cli::parse();

    let manager = ConfigManager::new(&cli.config);
    let (config, outcome) = match manager.load_or_create() {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("{}", style(format!("Failed to load {}: {}", cli.config.display(), err)).red());
            return 1;
        }
    };

    let settings = match cli.resolve(&config) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{}", style(err.to_string()).red());
            return 1;
        }
    };

    let logger = match Logger::init(LoggerOptions {
        level: &settings.log_level,
        debug: settings.debug,
        log_dir: settings.write_log.then_some(settings.output_dir.as_path()),
    }) {
        Ok(logger) => logger,
        Err(err) => {
            eprintln!("{}", style(format!("Failed to initialize logging: {}", err)).red());
            return 1;
        }
    };

    report_config(&outcome, manager.path());
    log_system_information();

    let program = Program::new(settings, logger.console());
    let code = report_outcome(program.run().await);

    logger.finish();
    code
}

fn report_config(outcome: &LoadOutcome, path: &Path) {
    match outcome {
        LoadOutcome::Loaded => trace!("Loaded configuration from {}", path.display()),
        LoadOutcome::Created => info!("Created default configuration at {}", path.display()),
        LoadOutcome::Replaced { backup, reason } => warn!(
            "{} could not be read ({}), it was moved to {} and replaced by the defaults",
            path.display(),
            reason,
            backup.display()
        ),
    }
}

/// Logs information about the system being used.
fn log_system_information() {
    trace!("ARCH:   \"{}\"", ARCH);
    trace!("FAMILY: \"{}\"", FAMILY);
    trace!("OS:     \"{}\"", OS);
}
