#![allow(clippy::too_many_arguments, clippy::useless_format, clippy::len_zero)]

use clap::{Parser, Subcommand};
use colored::Colorize;
use skyfall_core::{CliErrorDisplay, LoggingConfig, SkyfallError};
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;

use commands::{
    handle_playbooks_command, handle_runs_command, handle_schedules_command,
    handle_techniques_command, PlaybooksCommand, RunsCommand, SchedulesCommand,
    TechniquesCommand,
};
use config::CliContext;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Parser)]
#[command(name = "skyfall")]
#[command(version = VERSION)]
#[command(about = "Skyfall - cloud adversary emulation with automated playbooks")]
#[command(long_about = r#"
Skyfall runs catalogued attack techniques against EntraID, Azure, AWS and M365,
either one at a time or composed into playbooks. Every playbook run leaves a
folder with the configuration it ran, one artifact per step and a Report.csv.

Use 'skyfall techniques list' to browse the catalog, 'skyfall playbooks create'
to start a playbook and 'skyfall playbooks run' to execute it.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Browse the technique catalog")]
    Techniques {
        #[command(subcommand)]
        action: Option<TechniquesCommand>,
    },

    #[command(about = "Create, edit, import and run playbooks")]
    Playbooks {
        #[command(subcommand)]
        action: Option<PlaybooksCommand>,
    },

    #[command(about = "Manage playbook schedules and run the scheduler")]
    Schedules {
        #[command(subcommand)]
        action: Option<SchedulesCommand>,
    },

    #[command(about = "Inspect past playbook runs")]
    Runs {
        #[command(subcommand)]
        action: Option<RunsCommand>,
    },

    #[command(about = "Print the effective configuration as TOML")]
    Config,

    #[command(about = "Show version information")]
    Version {
        #[arg(short, long)]
        detailed: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let ctx = CliContext::load();
    init_logging(cli.verbose, ctx.as_ref().ok().map(|c| &c.config.logging));

    match run(cli, ctx).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<SkyfallError>() {
                Some(err) => eprint!("{}: {}", "Error".red().bold(), CliErrorDisplay::new(err)),
                None => eprintln!("{}: {:#}", "Error".red().bold(), e),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool, logging: Option<&LoggingConfig>) {
    let default_level = match (verbose, logging) {
        (true, _) => "debug".to_string(),
        (false, Some(logging)) => logging.level.clone(),
        (false, None) => "warn".to_string(),
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_level));

    let json = logging.map(|l| l.json_format).unwrap_or(false);
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli, ctx: anyhow::Result<CliContext>) -> anyhow::Result<()> {
    match cli.command {
        Commands::Version { detailed } => cmd_version(detailed),
        Commands::Config => cmd_config(&ctx?),
        Commands::Techniques { action } => handle_techniques_command(&ctx?, action).await,
        Commands::Playbooks { action } => handle_playbooks_command(&ctx?, action).await,
        Commands::Schedules { action } => handle_schedules_command(&ctx?, action).await,
        Commands::Runs { action } => handle_runs_command(&ctx?, action).await,
    }
}

fn cmd_config(ctx: &CliContext) -> anyhow::Result<()> {
    println!("{}", toml::to_string_pretty(&ctx.config)?);
    Ok(())
}

fn cmd_version(detailed: bool) -> anyhow::Result<()> {
    if detailed {
        println!("{}", "Skyfall Version Information".cyan().bold());
        println!("{}", "═".repeat(40).dimmed());
        println!("  {:<15} {}", "Version:".bold(), VERSION);
        println!("  {:<15} {}", "Name:".bold(), NAME);
        println!("  {:<15} Apache-2.0", "License:".bold());
        println!();
        println!("  {}", "Attack Surfaces:".bold());
        println!("    ◆ EntraID");
        println!("    ◆ Azure");
        println!("    ◆ AWS");
        println!("    ◆ M365");
        println!();
        println!("  {}", "Build Information:".bold());
        println!("    Rust Edition: 2021");
        #[cfg(debug_assertions)]
        println!("    Build:        Debug");
        #[cfg(not(debug_assertions))]
        println!("    Build:        Release");
    } else {
        println!("skyfall {}", VERSION);
    }

    Ok(())
}
