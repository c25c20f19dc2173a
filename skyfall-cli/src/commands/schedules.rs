use chrono::Local;
use clap::Subcommand;
use colored::Colorize;
use comfy_table::{Cell, Color};
use skyfall_core::{CredentialContext, NewSchedule, PlaybookTrigger, ScheduleDriver, SkyfallError};
use std::sync::Arc;
use tracing::info;

use super::new_table;
use crate::config::CliContext;

#[derive(Subcommand)]
pub enum SchedulesCommand {
    #[command(about = "List stored schedules with their next occurrence")]
    List {
        #[arg(
            short,
            long,
            default_value = "text",
            help = "Output format (text, json)"
        )]
        format: String,
    },

    #[command(about = "Schedule a playbook")]
    Add {
        #[arg(help = "Playbook name")]
        playbook: String,

        #[arg(short, long, help = "Schedule name (generated when omitted)")]
        name: Option<String>,

        #[arg(long, value_name = "YYYY-MM-DD")]
        start_date: String,

        #[arg(long, value_name = "YYYY-MM-DD", default_value = "")]
        end_date: String,

        #[arg(long, value_name = "HH:MM[:SS]")]
        time: String,

        #[arg(long)]
        repeat: bool,

        #[arg(
            long,
            default_value = "",
            help = "hourly, daily, weekly or monthly (with --repeat)"
        )]
        frequency: String,
    },

    #[command(about = "Remove a schedule")]
    Remove {
        #[arg(help = "Schedule name")]
        name: String,
    },

    #[command(about = "Fire due schedules until interrupted")]
    Daemon,
}

pub async fn handle_schedules_command(
    ctx: &CliContext,
    cmd: Option<SchedulesCommand>,
) -> anyhow::Result<()> {
    match cmd.unwrap_or(SchedulesCommand::List {
        format: "text".to_string(),
    }) {
        SchedulesCommand::List { format } => cmd_schedules_list(ctx, &format),
        SchedulesCommand::Add {
            playbook,
            name,
            start_date,
            end_date,
            time,
            repeat,
            frequency,
        } => cmd_schedules_add(
            ctx,
            NewSchedule::new(name, playbook, start_date, end_date, time, repeat, frequency),
        ),
        SchedulesCommand::Remove { name } => cmd_schedules_remove(ctx, &name),
        SchedulesCommand::Daemon => cmd_schedules_daemon(ctx).await,
    }
}

fn cmd_schedules_list(ctx: &CliContext, format: &str) -> anyhow::Result<()> {
    let schedules = ctx.schedule_store().list_schedules()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&schedules)?);
        return Ok(());
    }

    println!("{}", "Schedules".cyan().bold());
    println!();

    if schedules.is_empty() {
        println!("{}", "No schedules.".yellow());
        return Ok(());
    }

    let now = Local::now().naive_local();
    let mut table = new_table(&["Name", "Playbook", "Start", "End", "Time", "Repeat", "Next"]);
    for (name, schedule) in &schedules {
        let next = match schedule.policy(name) {
            Ok(policy) => match policy.next_occurrence_after(now) {
                Some(next) => Cell::new(next.format("%Y-%m-%d %H:%M:%S").to_string())
                    .fg(Color::Green),
                None => Cell::new("expired").fg(Color::DarkGrey),
            },
            Err(_) => Cell::new("invalid").fg(Color::Red),
        };
        let repeat = if schedule.repeat {
            schedule.repeat_frequency.clone()
        } else {
            "once".to_string()
        };

        table.add_row(vec![
            Cell::new(name).fg(Color::Cyan),
            Cell::new(&schedule.playbook_id),
            Cell::new(&schedule.start_date),
            Cell::new(if schedule.end_date.is_empty() {
                "-"
            } else {
                schedule.end_date.as_str()
            }),
            Cell::new(&schedule.execution_time),
            Cell::new(repeat),
            next,
        ]);
    }

    println!("{table}");
    Ok(())
}

fn cmd_schedules_add(ctx: &CliContext, schedule: NewSchedule) -> anyhow::Result<()> {
    let label = schedule.name.clone().unwrap_or_else(|| "new schedule".to_string());
    let (_, candidate) = schedule.clone().into_parts();
    candidate
        .policy(&label)
        .map_err(SkyfallError::from)?;

    if ctx.playbook_store().find(&schedule.playbook_id)?.is_none() {
        println!(
            "{} No playbook named '{}' exists yet; the schedule will fail until it does",
            "!".yellow().bold(),
            schedule.playbook_id
        );
    }

    let name = ctx.schedule_store().add_schedule(schedule)?;
    println!("{} Added schedule '{}'", "✓".green().bold(), name.cyan());
    Ok(())
}

fn cmd_schedules_remove(ctx: &CliContext, name: &str) -> anyhow::Result<()> {
    let removed = ctx.schedule_store().remove_schedule(name)?;
    println!(
        "{} Removed schedule '{}' ({})",
        "✓".green().bold(),
        name,
        removed.playbook_id
    );
    Ok(())
}

async fn cmd_schedules_daemon(ctx: &CliContext) -> anyhow::Result<()> {
    let engine = ctx.engine(Arc::new(CredentialContext::new())).await?;
    let trigger: Arc<dyn PlaybookTrigger> = Arc::new(engine);
    let driver = ScheduleDriver::new(
        Arc::new(ctx.schedule_store()),
        trigger,
        ctx.config.scheduler.clone(),
    );

    driver.start().await?;
    println!(
        "{} Scheduler running every {}s against {}. Press Ctrl-C to stop.",
        "●".green(),
        ctx.config.scheduler.tick_interval_secs,
        ctx.config.storage.schedules_file.display()
    );

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");
    driver.stop().await?;

    let history = driver.get_history(20).await;
    if !history.is_empty() {
        let mut table = new_table(&["Schedule", "Playbook", "Fired", "Result"]);
        for record in &history {
            table.add_row(vec![
                Cell::new(&record.schedule).fg(Color::Cyan),
                Cell::new(&record.playbook_id),
                Cell::new(record.fired_at.format("%Y-%m-%d %H:%M:%S").to_string()),
                if record.success {
                    Cell::new(record.run_folder.as_deref().unwrap_or("")).fg(Color::Green)
                } else {
                    Cell::new(record.error_message.as_deref().unwrap_or("failed"))
                        .fg(Color::Red)
                },
            ]);
        }
        println!("{table}");
    }
    Ok(())
}
