pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use partnerline_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "partnerline",
    about = "Partnerline attribution CLI",
    long_about = "Attribute deal revenue to partners, compare crediting models, and operate the attribution store.",
    after_help = "Examples:\n  partnerline attribute --input deal.json --model time_decay\n  partnerline compare --input deal.json\n  partnerline calculate --deal deal-demo-001 --all"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run one attribution model over a deal file without touching the database")]
    Attribute {
        #[arg(long, help = "Path to a JSON file with `deal`, `touchpoints` and `partners`")]
        input: PathBuf,
        #[arg(long, help = "Model name; defaults to attribution.default_model")]
        model: Option<String>,
    },
    #[command(about = "Run every attribution model over a deal file side by side")]
    Compare {
        #[arg(long, help = "Path to a JSON file with `deal`, `touchpoints` and `partners`")]
        input: PathBuf,
    },
    #[command(about = "Recalculate and persist attribution for stored deals")]
    Calculate {
        #[arg(long = "deal", required = true, help = "Deal id; repeat for several deals")]
        deals: Vec<String>,
        #[arg(
            long,
            conflicts_with = "all",
            help = "Model name; defaults to attribution.default_model"
        )]
        model: Option<String>,
        #[arg(long, help = "Run every model")]
        all: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo partners, deals and touchpoints")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Attribute { input, model } => commands::attribute::run(&input, model.as_deref()),
        Command::Compare { input } => commands::compare::run(&input),
        Command::Calculate { deals, model, all } => {
            commands::calculate::run(&deals, model.as_deref(), all)
        }
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout carries only the command payload.
fn init_logging(config: &AppConfig) {
    use tracing::Level;
    use LogFormat::*;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}
