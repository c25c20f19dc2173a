use clap::Subcommand;
use colored::Colorize;
use comfy_table::{Cell, Color};
use skyfall_core::RunSummary;

use super::{new_table, outcome_cell, status_cell};
use crate::config::CliContext;

#[derive(Subcommand)]
pub enum RunsCommand {
    #[command(about = "List past runs, newest first")]
    List {
        #[arg(short, long, help = "Only runs of this playbook")]
        playbook: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },

    #[command(about = "Show the report and configuration of one run")]
    Show {
        #[arg(help = "Run folder name")]
        folder: String,

        #[arg(long, help = "Also print each step's artifact")]
        artifacts: bool,
    },
}

pub async fn handle_runs_command(
    ctx: &CliContext,
    cmd: Option<RunsCommand>,
) -> anyhow::Result<()> {
    match cmd.unwrap_or(RunsCommand::List {
        playbook: None,
        limit: 20,
        format: "text".to_string(),
    }) {
        RunsCommand::List {
            playbook,
            limit,
            format,
        } => cmd_runs_list(ctx, playbook.as_deref(), limit, &format),
        RunsCommand::Show { folder, artifacts } => cmd_runs_show(ctx, &folder, artifacts),
    }
}

fn cmd_runs_list(
    ctx: &CliContext,
    playbook: Option<&str>,
    limit: usize,
    format: &str,
) -> anyhow::Result<()> {
    let store = ctx.run_store();
    let mut runs: Vec<RunSummary> = match playbook {
        Some(playbook) => store.list_runs_for(playbook)?,
        None => store.list_runs()?,
    };
    runs.truncate(limit);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    println!("{}", "Playbook Runs".cyan().bold());
    println!();

    if runs.is_empty() {
        println!("{}", "No runs recorded.".yellow());
        return Ok(());
    }

    let mut table = new_table(&["Folder", "Playbook", "Started", "Steps", "Outcome"]);
    for run in &runs {
        table.add_row(vec![
            Cell::new(&run.folder_name).fg(Color::Cyan),
            Cell::new(&run.playbook_name),
            Cell::new(run.started_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(run.steps),
            outcome_cell(run.outcome),
        ]);
    }

    println!("{table}");
    Ok(())
}

fn cmd_runs_show(ctx: &CliContext, folder: &str, artifacts: bool) -> anyhow::Result<()> {
    let store = ctx.run_store();
    let rows = store.load_report(folder)?;
    let snapshot = store.load_snapshot(folder)?;

    println!("{} {}", "Run".cyan().bold(), folder.bold());
    println!("{}", "═".repeat(50).dimmed());

    let mut config = new_table(&["#", "Technique", "Params", "Wait (s)"]);
    for (index, step) in &snapshot {
        config.add_row(vec![
            Cell::new(index),
            Cell::new(&step.module),
            Cell::new(
                step.params
                    .as_ref()
                    .map(|p| serde_json::to_string(p).unwrap_or_default())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(step.wait),
        ]);
    }
    println!("{}", "Configuration".yellow().bold());
    println!("{config}");
    println!();

    println!("{}", "Report".yellow().bold());
    if rows.is_empty() {
        println!("{}", "Empty report.".dimmed());
    } else {
        let mut report = new_table(&["Time_Stamp", "Module", "Result"]);
        for row in &rows {
            report.add_row(vec![
                Cell::new(&row.time_stamp),
                Cell::new(&row.module).fg(Color::Cyan),
                status_cell(row.result),
            ]);
        }
        println!("{report}");
    }

    if artifacts {
        let mut seen = Vec::new();
        for row in &rows {
            if seen.contains(&row.module) {
                continue;
            }
            seen.push(row.module.clone());

            println!();
            println!("{} {}", "Artifact".yellow().bold(), row.module.cyan());
            match store.read_artifact(folder, &row.module) {
                Ok(content) => println!("{}", content),
                Err(e) => println!("{}", e.to_string().red()),
            }
        }
    }

    Ok(())
}
