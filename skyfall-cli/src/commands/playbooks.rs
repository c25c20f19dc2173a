use anyhow::{anyhow, Context};
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{Cell, Color};
use serde_json::Value;
use skyfall_core::{
    ActiveCredential, AttackSurface, CredentialContext, ExecutionRun, ModelError, Playbook,
    SkyfallError,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{new_table, outcome_cell, status_cell};
use crate::config::CliContext;

#[derive(Subcommand)]
pub enum PlaybooksCommand {
    #[command(about = "List stored playbooks")]
    List {
        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },

    #[command(about = "Show a playbook and its steps")]
    Show {
        #[arg(help = "Playbook name")]
        name: String,

        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, yaml, json)"
        )]
        format: String,
    },

    #[command(about = "Create an empty playbook")]
    Create {
        #[arg(help = "Playbook name")]
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,

        #[arg(short, long, default_value = "")]
        author: String,

        #[arg(short, long = "reference", help = "Reference URL (repeatable)")]
        references: Vec<String>,
    },

    #[command(about = "Append a technique step to a playbook")]
    AddStep {
        #[arg(help = "Playbook name")]
        name: String,

        #[arg(help = "Technique id")]
        module: String,

        #[arg(
            short,
            long = "param",
            help = "Positional input, parsed as JSON when possible (repeatable)"
        )]
        params: Vec<String>,

        #[arg(short, long, default_value_t = 0, help = "Seconds to wait after the step")]
        wait: u64,
    },

    #[command(about = "Remove a step and renumber the ones after it")]
    RemoveStep {
        #[arg(help = "Playbook name")]
        name: String,

        #[arg(help = "Step index")]
        index: u32,
    },

    #[command(about = "Import a playbook file as-is")]
    Import {
        #[arg(help = "Path to a YAML playbook")]
        path: PathBuf,

        #[arg(short, long, help = "Store under this file name instead")]
        name: Option<String>,
    },

    #[command(about = "Write a stored playbook file to stdout or a path")]
    Export {
        #[arg(help = "Playbook name")]
        name: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    #[command(about = "Delete a playbook")]
    Delete {
        #[arg(help = "Playbook name")]
        name: String,

        #[arg(short, long, help = "Skip confirmation")]
        force: bool,
    },

    #[command(about = "Execute a playbook now")]
    Run {
        #[arg(help = "Playbook name")]
        name: String,

        #[arg(
            long = "as",
            value_name = "SURFACE=IDENTITY[,TENANT]",
            help = "Active credential for an attack surface (repeatable)"
        )]
        credentials: Vec<String>,

        #[arg(long, help = "Ignore per-step waits")]
        no_wait: bool,

        #[arg(
            long,
            value_name = "SECONDS",
            value_parser = clap::value_parser!(u64).range(1..),
            help = "Abort a step after this long"
        )]
        timeout: Option<u64>,

        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },
}

pub async fn handle_playbooks_command(
    ctx: &CliContext,
    cmd: Option<PlaybooksCommand>,
) -> anyhow::Result<()> {
    match cmd.unwrap_or(PlaybooksCommand::List {
        format: "text".to_string(),
    }) {
        PlaybooksCommand::List { format } => cmd_playbooks_list(ctx, &format),
        PlaybooksCommand::Show { name, format } => cmd_playbooks_show(ctx, &name, &format),
        PlaybooksCommand::Create {
            name,
            description,
            author,
            references,
        } => cmd_playbooks_create(ctx, &name, &description, &author, references),
        PlaybooksCommand::AddStep {
            name,
            module,
            params,
            wait,
        } => cmd_playbooks_add_step(ctx, &name, &module, &params, wait).await,
        PlaybooksCommand::RemoveStep { name, index } => {
            cmd_playbooks_remove_step(ctx, &name, index)
        }
        PlaybooksCommand::Import { path, name } => {
            cmd_playbooks_import(ctx, &path, name.as_deref())
        }
        PlaybooksCommand::Export { name, output } => {
            cmd_playbooks_export(ctx, &name, output.as_deref())
        }
        PlaybooksCommand::Delete { name, force } => cmd_playbooks_delete(ctx, &name, force),
        PlaybooksCommand::Run {
            name,
            credentials,
            no_wait,
            timeout,
            format,
        } => cmd_playbooks_run(ctx, &name, &credentials, no_wait, timeout, &format).await,
    }
}

fn find_playbook(ctx: &CliContext, name: &str) -> anyhow::Result<Playbook> {
    ctx.playbook_store()
        .find(name)?
        .ok_or_else(|| SkyfallError::from(ModelError::NotFound(name.to_string())).into())
}

fn cmd_playbooks_list(ctx: &CliContext, format: &str) -> anyhow::Result<()> {
    let playbooks = ctx.playbook_store().list()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&playbooks)?);
        return Ok(());
    }

    println!("{}", "Playbooks".cyan().bold());
    println!();

    if playbooks.is_empty() {
        println!("{}", "No playbooks yet.".yellow());
        println!(
            "{}",
            "Create one with 'skyfall playbooks create <name>'".dimmed()
        );
        return Ok(());
    }

    let mut table = new_table(&["Name", "Steps", "Author", "Created", "Description"]);
    for playbook in &playbooks {
        table.add_row(vec![
            Cell::new(&playbook.name).fg(Color::Cyan),
            Cell::new(playbook.step_count()),
            Cell::new(&playbook.author),
            Cell::new(playbook.creation_date.to_string()),
            Cell::new(truncate(&playbook.description, 40)),
        ]);
    }

    println!("{table}");
    println!();
    println!(
        "{} {} playbook(s)",
        "Total:".dimmed(),
        playbooks.len().to_string().bold()
    );
    Ok(())
}

fn cmd_playbooks_show(ctx: &CliContext, name: &str, format: &str) -> anyhow::Result<()> {
    let playbook = find_playbook(ctx, name)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&playbook)?);
            return Ok(());
        }
        "yaml" => {
            print!("{}", serde_yaml::to_string(&playbook)?);
            return Ok(());
        }
        _ => {}
    }

    println!("{}", playbook.name.cyan().bold());
    println!("{}", "═".repeat(50).dimmed());
    println!("  {:<14} {}", "Description:".bold(), playbook.description);
    println!("  {:<14} {}", "Author:".bold(), playbook.author);
    println!("  {:<14} {}", "Created:".bold(), playbook.creation_date);
    for reference in &playbook.references {
        println!("  {:<14} {}", "Reference:".bold(), reference);
    }
    println!();

    if playbook.is_empty() {
        println!("{}", "No steps.".yellow());
        return Ok(());
    }

    let mut table = new_table(&["#", "Technique", "Params", "Wait (s)"]);
    for (index, step) in playbook.steps() {
        let params = match &step.params {
            Some(params) => serde_json::to_string(params)?,
            None => "-".to_string(),
        };
        table.add_row(vec![
            Cell::new(index),
            Cell::new(&step.module).fg(Color::Cyan),
            Cell::new(truncate(&params, 50)),
            Cell::new(step.wait),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn cmd_playbooks_create(
    ctx: &CliContext,
    name: &str,
    description: &str,
    author: &str,
    references: Vec<String>,
) -> anyhow::Result<()> {
    let playbook = ctx
        .playbook_store()
        .create(name, description, author, references)?;

    println!(
        "{} Created playbook '{}'",
        "✓".green().bold(),
        playbook.name.cyan()
    );
    Ok(())
}

async fn cmd_playbooks_add_step(
    ctx: &CliContext,
    name: &str,
    module: &str,
    params: &[String],
    wait: u64,
) -> anyhow::Result<()> {
    let store = ctx.playbook_store();
    let mut playbook = find_playbook(ctx, name)?;

    let catalog = ctx.catalog()?;
    match catalog.get(module) {
        Some(descriptor) => {
            let expected = descriptor.input_spec.len();
            if expected > 0 && params.len() != expected {
                println!(
                    "{} {} expects {} input(s), {} given",
                    "!".yellow().bold(),
                    module,
                    expected,
                    params.len()
                );
            }
        }
        None => println!(
            "{} '{}' is not in the technique catalog; the step will fail until it is",
            "!".yellow().bold(),
            module
        ),
    }

    let params = if params.is_empty() {
        None
    } else {
        Some(params.iter().map(|p| parse_param(p)).collect())
    };
    let index = playbook
        .add_step(module, params, wait)
        .map_err(SkyfallError::from)?;
    store.save(&playbook)?;

    println!(
        "{} Added step {} ({}) to '{}'",
        "✓".green().bold(),
        index,
        module.cyan(),
        playbook.name
    );
    Ok(())
}

fn cmd_playbooks_remove_step(ctx: &CliContext, name: &str, index: u32) -> anyhow::Result<()> {
    let store = ctx.playbook_store();
    let mut playbook = find_playbook(ctx, name)?;

    let removed = playbook
        .remove_step(index)
        .ok_or_else(|| anyhow!("Playbook '{}' has no step {}", name, index))?;
    store.save(&playbook)?;

    println!(
        "{} Removed step {} ({}) from '{}'",
        "✓".green().bold(),
        index,
        removed.module.cyan(),
        playbook.name
    );
    Ok(())
}

fn cmd_playbooks_import(ctx: &CliContext, path: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let raw = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = match name {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
            .ok_or_else(|| anyhow!("Cannot derive a file name from {}", path.display()))?,
    };

    let stored = ctx.playbook_store().import(&raw, &filename)?;
    println!(
        "{} Imported {} bytes to {}",
        "✓".green().bold(),
        raw.len(),
        stored.display()
    );
    Ok(())
}

fn cmd_playbooks_export(ctx: &CliContext, name: &str, output: Option<&Path>) -> anyhow::Result<()> {
    let raw = ctx.playbook_store().export(name)?;

    match output {
        Some(path) => {
            std::fs::write(path, &raw)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{} Exported '{}' to {}",
                "✓".green().bold(),
                name,
                path.display()
            );
        }
        None => print!("{}", String::from_utf8_lossy(&raw)),
    }
    Ok(())
}

fn cmd_playbooks_delete(ctx: &CliContext, name: &str, force: bool) -> anyhow::Result<()> {
    let store = ctx.playbook_store();
    if !store.exists(name) {
        return Err(SkyfallError::from(ModelError::NotFound(name.to_string())).into());
    }

    if !force {
        println!(
            "{} This deletes playbook '{}'. Re-run with --force to confirm.",
            "!".yellow().bold(),
            name
        );
        return Ok(());
    }

    store.delete(name)?;
    println!("{} Deleted playbook '{}'", "✓".green().bold(), name);
    Ok(())
}

async fn cmd_playbooks_run(
    ctx: &CliContext,
    name: &str,
    credentials: &[String],
    no_wait: bool,
    timeout: Option<u64>,
    format: &str,
) -> anyhow::Result<()> {
    let context = Arc::new(CredentialContext::new());
    for spec in credentials {
        let (surface, credential) = parse_credential(spec)?;
        context.set_active(surface, credential).await;
    }

    let mut engine_config = ctx.config.engine.clone();
    if no_wait {
        engine_config.honor_waits = false;
    }
    if timeout.is_some() {
        engine_config.step_timeout_secs = timeout;
    }

    let engine = ctx.engine(context).await?.with_config(engine_config);
    let run = engine.execute_playbook(name).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(());
    }

    print_run(&run);
    Ok(())
}

fn print_run(run: &ExecutionRun) {
    println!(
        "{} {}",
        "Run".cyan().bold(),
        run.folder_name.as_str().bold()
    );
    println!();

    if run.steps.is_empty() {
        println!("{}", "Playbook has no steps; empty report written.".yellow());
    } else {
        let mut table = new_table(&["#", "Technique", "Started", "Result", "Detail"]);
        for step in &run.steps {
            table.add_row(vec![
                Cell::new(step.index),
                Cell::new(&step.module).fg(Color::Cyan),
                Cell::new(step.started_at.format("%H:%M:%S").to_string()),
                status_cell(step.status),
                Cell::new(step.error.as_deref().map(|e| truncate(e, 50)).unwrap_or_default()),
            ]);
        }
        println!("{table}");
    }

    println!();
    let mut summary = new_table(&["Outcome", "Succeeded", "Failed", "Folder"]);
    summary.add_row(vec![
        outcome_cell(Some(run.outcome())),
        Cell::new(run.succeeded_steps()).fg(Color::Green),
        Cell::new(run.failed_steps()).fg(Color::Red),
        Cell::new(run.run_dir.display().to_string()),
    ]);
    println!("{summary}");
}

fn parse_param(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_credential(spec: &str) -> anyhow::Result<(AttackSurface, ActiveCredential)> {
    let (surface, rest) = spec
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected SURFACE=IDENTITY[,TENANT], got '{}'", spec))?;
    let surface = surface.trim().parse::<AttackSurface>().map_err(|e| anyhow!(e))?;

    let (identity, tenant) = match rest.split_once(',') {
        Some((identity, tenant)) => (identity.trim(), Some(tenant.trim())),
        None => (rest.trim(), None),
    };
    if identity.is_empty() {
        return Err(anyhow!("Credential for {} has no identity", surface));
    }

    let mut credential = ActiveCredential::new(identity);
    if let Some(tenant) = tenant.filter(|t| !t.is_empty()) {
        credential = credential.with_tenant(tenant);
    }
    Ok((surface, credential))
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let cut: String = value.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
