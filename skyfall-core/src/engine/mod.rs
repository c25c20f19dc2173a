mod executor;
mod run;

pub use executor::{ExecutionEngine, PlaybookTrigger};
pub use run::{
    artifact_file_name, parse_run_folder_name, read_report, run_folder_name, ExecutionRun,
    ReportRow, RunOutcome, RunStore, RunSummary, StepRecord, StepStatus, CONFIG_SNAPSHOT_FILE,
    REPORT_FILE, REPORT_TIMESTAMP_FORMAT,
};
