use anyhow::anyhow;
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{Cell, Color};
use skyfall_core::{AttackSurface, RegistryError, SkyfallError, TechniqueDescriptor};

use super::new_table;
use crate::config::CliContext;

#[derive(Subcommand)]
pub enum TechniquesCommand {
    #[command(about = "List catalogued techniques")]
    List {
        #[arg(short, long, help = "Filter by attack surface (EntraID, Azure, AWS, M365)")]
        surface: Option<String>,

        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },

    #[command(about = "Show a technique's inputs, references and notes")]
    Info {
        #[arg(help = "Technique id")]
        id: String,

        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },
}

pub async fn handle_techniques_command(
    ctx: &CliContext,
    cmd: Option<TechniquesCommand>,
) -> anyhow::Result<()> {
    match cmd.unwrap_or(TechniquesCommand::List {
        surface: None,
        format: "text".to_string(),
    }) {
        TechniquesCommand::List { surface, format } => {
            cmd_techniques_list(ctx, surface.as_deref(), &format).await
        }
        TechniquesCommand::Info { id, format } => cmd_techniques_info(ctx, &id, &format).await,
    }
}

async fn cmd_techniques_list(
    ctx: &CliContext,
    surface: Option<&str>,
    format: &str,
) -> anyhow::Result<()> {
    let registry = ctx.registry().await?;
    let surface = surface
        .map(|s| s.parse::<AttackSurface>().map_err(|e| anyhow!(e)))
        .transpose()?;

    let descriptors: Vec<&TechniqueDescriptor> = match surface {
        Some(surface) => registry.catalog().by_surface(surface),
        None => registry.catalog().list(),
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    println!("{}", "Technique Catalog".cyan().bold());
    println!();

    if descriptors.is_empty() {
        println!("{}", "No techniques match.".yellow());
        return Ok(());
    }

    let mut table = new_table(&["ID", "Name", "Surface", "Inputs", "Implementation"]);
    for descriptor in &descriptors {
        let implemented = registry.is_registered(&descriptor.execution_path).await;
        table.add_row(vec![
            Cell::new(&descriptor.id).fg(Color::Cyan),
            Cell::new(&descriptor.name),
            Cell::new(descriptor.attack_surface.to_string()),
            Cell::new(descriptor.input_spec.len()),
            if implemented {
                Cell::new(&descriptor.execution_path).fg(Color::Green)
            } else {
                Cell::new(format!("{} (missing)", descriptor.execution_path)).fg(Color::Red)
            },
        ]);
    }

    println!("{table}");
    println!();
    println!(
        "{} {} technique(s)",
        "Total:".dimmed(),
        descriptors.len().to_string().bold()
    );
    Ok(())
}

async fn cmd_techniques_info(ctx: &CliContext, id: &str, format: &str) -> anyhow::Result<()> {
    let registry = ctx.registry().await?;
    let descriptor = registry
        .catalog()
        .get(id)
        .ok_or_else(|| SkyfallError::from(RegistryError::NotFound(id.to_string())))?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(descriptor)?);
        return Ok(());
    }

    println!("{} {}", descriptor.id.cyan().bold(), descriptor.name.bold());
    println!("{}", "═".repeat(50).dimmed());
    println!("  {:<16} {}", "Surface:".bold(), descriptor.attack_surface);
    println!("  {:<16} {}", "Execution path:".bold(), descriptor.execution_path);

    match registry.resolve(id).await {
        Ok(_) => println!("  {:<16} {}", "Status:".bold(), "ready".green()),
        Err(e) => println!("  {:<16} {}", "Status:".bold(), e.to_string().red()),
    }

    if !descriptor.input_spec.is_empty() {
        println!();
        println!("  {}", "Inputs (positional)".yellow().bold());
        let mut table = new_table(&["#", "Key", "Title", "Kind", "Placeholder"]);
        for (position, field) in descriptor.input_spec.iter().enumerate() {
            table.add_row(vec![
                Cell::new(position + 1),
                Cell::new(&field.key),
                Cell::new(&field.title),
                Cell::new(field.kind.to_string()),
                Cell::new(&field.placeholder),
            ]);
        }
        println!("{table}");
    }

    if !descriptor.references.is_empty() {
        println!();
        println!("  {}", "References".yellow().bold());
        for reference in &descriptor.references {
            println!("    - {}", reference);
        }
    }

    if !descriptor.notes.is_empty() {
        println!();
        println!("  {}", "Notes".yellow().bold());
        for note in &descriptor.notes {
            println!("    - {}", note);
        }
    }

    Ok(())
}
