pub mod playbooks;
pub mod runs;
pub mod schedules;
pub mod techniques;

pub use playbooks::{handle_playbooks_command, PlaybooksCommand};
pub use runs::{handle_runs_command, RunsCommand};
pub use schedules::{handle_schedules_command, SchedulesCommand};
pub use techniques::{handle_techniques_command, TechniquesCommand};

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, Table};
use skyfall_core::{RunOutcome, StepStatus};

pub(crate) fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).fg(Color::White))
                .collect::<Vec<_>>(),
        );
    table
}

pub(crate) fn status_cell(status: StepStatus) -> Cell {
    match status {
        StepStatus::Success => Cell::new("success").fg(Color::Green),
        StepStatus::Failed => Cell::new("failed").fg(Color::Red),
    }
}

pub(crate) fn outcome_cell(outcome: Option<RunOutcome>) -> Cell {
    match outcome {
        Some(RunOutcome::Succeeded) => Cell::new("succeeded").fg(Color::Green),
        Some(RunOutcome::Partial) => Cell::new("partial").fg(Color::Yellow),
        Some(RunOutcome::Failed) => Cell::new("failed").fg(Color::Red),
        Some(RunOutcome::Empty) => Cell::new("empty").fg(Color::DarkGrey),
        None => Cell::new("unknown").fg(Color::DarkGrey),
    }
}
