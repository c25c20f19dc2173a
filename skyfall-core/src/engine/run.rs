use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::SkyfallResult;
use crate::playbooks::PlaybookStep;

pub const CONFIG_SNAPSHOT_FILE: &str = "Config.yml";
pub const REPORT_FILE: &str = "Report.csv";
pub const REPORT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const FOLDER_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S_%6f";
const FOLDER_TIMESTAMP_LEN: usize = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
}

impl StepStatus {
    pub fn from_success(success: bool) -> Self {
        if success {
            StepStatus::Success
        } else {
            StepStatus::Failed
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One line of `Report.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(rename = "Time_Stamp")]
    pub time_stamp: String,
    #[serde(rename = "Module")]
    pub module: String,
    #[serde(rename = "Result")]
    pub result: StepStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
    Partial,
    Empty,
}

impl RunOutcome {
    /// Derived from report rows only, never from how the run returned.
    pub fn from_rows(rows: &[ReportRow]) -> Self {
        if rows.is_empty() {
            return RunOutcome::Empty;
        }
        let failed = rows
            .iter()
            .filter(|r| r.result == StepStatus::Failed)
            .count();
        match failed {
            0 => RunOutcome::Succeeded,
            n if n == rows.len() => RunOutcome::Failed,
            _ => RunOutcome::Partial,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Succeeded => write!(f, "succeeded"),
            RunOutcome::Failed => write!(f, "failed"),
            RunOutcome::Partial => write!(f, "partial"),
            RunOutcome::Empty => write!(f, "empty"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: u32,
    pub module: String,
    pub started_at: DateTime<Local>,
    pub status: StepStatus,
    pub artifact: PathBuf,
    /// Resolution or invocation error, when the step never produced a result.
    pub error: Option<String>,
}

impl StepRecord {
    pub fn report_row(&self) -> ReportRow {
        ReportRow {
            time_stamp: self.started_at.format(REPORT_TIMESTAMP_FORMAT).to_string(),
            module: self.module.clone(),
            result: self.status,
        }
    }
}

/// Record of one playbook execution. Complete once `ExecutionEngine::execute_playbook`
/// returns and never modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRun {
    pub run_id: Uuid,
    pub playbook_name: String,
    pub folder_name: String,
    pub run_dir: PathBuf,
    pub started_at: DateTime<Local>,
    pub finished_at: Option<DateTime<Local>>,
    pub sequence: BTreeMap<u32, PlaybookStep>,
    pub steps: Vec<StepRecord>,
}

impl ExecutionRun {
    pub fn report(&self) -> Vec<ReportRow> {
        self.steps.iter().map(StepRecord::report_row).collect()
    }

    pub fn outcome(&self) -> RunOutcome {
        RunOutcome::from_rows(&self.report())
    }

    pub fn succeeded_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Success)
            .count()
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.len() - self.succeeded_steps()
    }

    pub fn config_path(&self) -> PathBuf {
        self.run_dir.join(CONFIG_SNAPSHOT_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.run_dir.join(REPORT_FILE)
    }
}

/// File name of the artifact written for `module`.
///
/// Two steps invoking the same technique share one artifact; the later step's
/// response replaces the earlier one. Distinct ids always get distinct names:
/// bytes outside `[A-Za-z0-9_-]` are written as `%XX`.
pub fn artifact_file_name(module: &str) -> String {
    if module.is_empty() {
        return "%.txt".to_string();
    }

    let mut name = String::with_capacity(module.len() + 4);
    for byte in module.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_') {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("%{:02X}", byte));
        }
    }
    name.push_str(".txt");
    name
}

pub fn run_folder_name(playbook_name: &str, started_at: &DateTime<Local>) -> String {
    format!(
        "{}_{}",
        playbook_name,
        started_at.format(FOLDER_TIMESTAMP_FORMAT)
    )
}

/// Splits `<playbook>_<timestamp>[-N]` back into its parts.
pub fn parse_run_folder_name(folder_name: &str) -> Option<(String, NaiveDateTime)> {
    for (idx, _) in folder_name.rmatch_indices('_') {
        let rest = &folder_name[idx + 1..];
        if rest.len() < FOLDER_TIMESTAMP_LEN || !rest.is_char_boundary(FOLDER_TIMESTAMP_LEN) {
            continue;
        }
        let (stamp, suffix) = rest.split_at(FOLDER_TIMESTAMP_LEN);
        let suffix_ok = suffix.is_empty()
            || suffix
                .strip_prefix('-')
                .map(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
                .unwrap_or(false);
        if !suffix_ok {
            continue;
        }
        if let Ok(ts) = NaiveDateTime::parse_from_str(stamp, FOLDER_TIMESTAMP_FORMAT) {
            let name = &folder_name[..idx];
            if !name.is_empty() {
                return Some((name.to_string(), ts));
            }
        }
    }
    None
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub folder_name: String,
    pub playbook_name: String,
    pub started_at: NaiveDateTime,
    pub path: PathBuf,
    pub steps: usize,
    pub outcome: Option<RunOutcome>,
}

/// Read-only view over past run folders.
#[derive(Debug, Clone)]
pub struct RunStore {
    dir: PathBuf,
}

impl RunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Past runs, newest first. Folders not named like a run are ignored.
    pub fn list_runs(&self) -> SkyfallResult<Vec<RunSummary>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            let Some(folder_name) = path.file_name().and_then(|n| n.to_str()).map(String::from)
            else {
                continue;
            };
            let Some((playbook_name, started_at)) = parse_run_folder_name(&folder_name) else {
                debug!(folder = %folder_name, "Ignoring non-run folder");
                continue;
            };

            let rows = read_report(&path.join(REPORT_FILE)).ok();
            runs.push(RunSummary {
                steps: rows.as_ref().map_or(0, |r| r.len()),
                outcome: rows.as_deref().map(RunOutcome::from_rows),
                folder_name,
                playbook_name,
                started_at,
                path,
            });
        }

        runs.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.folder_name.cmp(&a.folder_name))
        });
        Ok(runs)
    }

    pub fn list_runs_for(&self, playbook_name: &str) -> SkyfallResult<Vec<RunSummary>> {
        Ok(self
            .list_runs()?
            .into_iter()
            .filter(|r| r.playbook_name == playbook_name)
            .collect())
    }

    pub fn load_report(&self, folder_name: &str) -> SkyfallResult<Vec<ReportRow>> {
        read_report(&self.dir.join(folder_name).join(REPORT_FILE))
    }

    pub fn load_snapshot(&self, folder_name: &str) -> SkyfallResult<BTreeMap<u32, PlaybookStep>> {
        let content = fs::read_to_string(self.dir.join(folder_name).join(CONFIG_SNAPSHOT_FILE))?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn read_artifact(&self, folder_name: &str, module: &str) -> SkyfallResult<String> {
        Ok(fs::read_to_string(
            self.dir.join(folder_name).join(artifact_file_name(module)),
        )?)
    }
}

pub fn read_report(path: &Path) -> SkyfallResult<Vec<ReportRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(module: &str, result: StepStatus) -> ReportRow {
        ReportRow {
            time_stamp: "2024-01-01 09:00:00".to_string(),
            module: module.to_string(),
            result,
        }
    }

    #[test]
    fn test_outcome_from_rows() {
        assert_eq!(RunOutcome::from_rows(&[]), RunOutcome::Empty);
        assert_eq!(
            RunOutcome::from_rows(&[row("A", StepStatus::Success)]),
            RunOutcome::Succeeded
        );
        assert_eq!(
            RunOutcome::from_rows(&[row("A", StepStatus::Failed), row("B", StepStatus::Failed)]),
            RunOutcome::Failed
        );
        assert_eq!(
            RunOutcome::from_rows(&[row("A", StepStatus::Success), row("B", StepStatus::Failed)]),
            RunOutcome::Partial
        );
    }

    #[test]
    fn test_artifact_file_name() {
        assert_eq!(artifact_file_name("AWS-001"), "AWS-001.txt");
        assert_eq!(artifact_file_name("../escape"), "%2E%2E%2Fescape.txt");
        assert_eq!(artifact_file_name("a/b"), "a%2Fb.txt");
        assert_eq!(artifact_file_name(""), "%.txt");
    }

    #[test]
    fn test_artifact_file_name_keeps_distinct_ids_apart() {
        let ids = ["a/b", "a_b", "a.b", "a%2Fb", "", "step", "é"];
        let names: std::collections::HashSet<String> =
            ids.iter().map(|id| artifact_file_name(id)).collect();
        assert_eq!(names.len(), ids.len());
        assert_eq!(artifact_file_name("a_b"), artifact_file_name("a_b"));
    }

    #[test]
    fn test_run_folder_name_round_trip() {
        let started = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let folder = run_folder_name("Recon_v2", &started);
        assert_eq!(folder, "Recon_v2_2024-03-09_14-05-07_000000");

        let (name, ts) = parse_run_folder_name(&folder).unwrap();
        assert_eq!(name, "Recon_v2");
        assert_eq!(ts, started.naive_local());

        let (name, _) = parse_run_folder_name(&format!("{}-2", folder)).unwrap();
        assert_eq!(name, "Recon_v2");

        assert!(parse_run_folder_name("not-a-run").is_none());
        assert!(parse_run_folder_name("_2024-03-09_14-05-07_000000").is_none());
    }

    #[test]
    fn test_report_row_csv_header() {
        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(row("AWS-001", StepStatus::Success)).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(
            out,
            "Time_Stamp,Module,Result\n2024-01-01 09:00:00,AWS-001,success\n"
        );
    }
}
