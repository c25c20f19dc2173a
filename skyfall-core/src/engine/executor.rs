use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, Timelike};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::credentials::CredentialContext;
use crate::error::{EngineError, SkyfallError, SkyfallResult};
use crate::playbooks::{validate_name, Playbook, PlaybookStep, PlaybookStore};
use crate::techniques::{render_response, TechniqueContext, TechniqueHandle, TechniqueRegistry};

use super::run::{
    artifact_file_name, run_folder_name, ExecutionRun, ReportRow, RunStore, StepRecord,
    StepStatus, CONFIG_SNAPSHOT_FILE, REPORT_FILE,
};

const MAX_FOLDER_ATTEMPTS: u32 = 100;

/// Anything that can start a playbook run by name. The schedule driver depends on
/// this rather than on the engine itself.
#[async_trait]
pub trait PlaybookTrigger: Send + Sync {
    async fn trigger(&self, playbook_id: &str) -> SkyfallResult<ExecutionRun>;
}

/// Walks a playbook's sequence, dispatching each step through the registry and
/// recording the outcome in a fresh run folder.
pub struct ExecutionEngine {
    store: Arc<PlaybookStore>,
    registry: Arc<TechniqueRegistry>,
    credentials: Arc<CredentialContext>,
    runs_dir: PathBuf,
    config: EngineConfig,
    run_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ExecutionEngine {
    pub fn new(
        store: Arc<PlaybookStore>,
        registry: Arc<TechniqueRegistry>,
        credentials: Arc<CredentialContext>,
        runs_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            registry,
            credentials,
            runs_dir: runs_dir.into(),
            config: EngineConfig::default(),
            run_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<PlaybookStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<TechniqueRegistry> {
        &self.registry
    }

    pub fn credentials(&self) -> &Arc<CredentialContext> {
        &self.credentials
    }

    pub fn run_store(&self) -> RunStore {
        RunStore::new(self.runs_dir.clone())
    }

    /// True while a run of `playbook_name` holds its lock.
    pub async fn is_running(&self, playbook_name: &str) -> bool {
        let locks = self.run_locks.lock().await;
        locks
            .get(playbook_name)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Runs every step of the named playbook in ascending index order.
    ///
    /// Only a missing playbook or an unusable run folder fail the call; step failures
    /// are recorded in the report and the run carries on. A second call for the same
    /// playbook waits until the first one finishes.
    pub async fn execute_playbook(&self, playbook_name: &str) -> SkyfallResult<ExecutionRun> {
        let lock = self.run_lock(playbook_name).await;
        let result = {
            let _guard = lock.lock().await;
            self.run_playbook(playbook_name).await
        };
        self.release_run_lock(playbook_name, lock).await;
        result
    }

    async fn run_playbook(&self, playbook_name: &str) -> SkyfallResult<ExecutionRun> {
        let playbook = self
            .store
            .find(playbook_name)?
            .ok_or_else(|| EngineError::PlaybookNotFound(playbook_name.to_string()))?;
        validate_name(&playbook.name)?;

        let started_at = Local::now();
        let (folder_name, run_dir) = self.create_run_folder(&playbook.name, &started_at)?;
        let mut report = self.prepare_run_folder(&playbook, &run_dir)?;

        let mut run = ExecutionRun {
            run_id: Uuid::new_v4(),
            playbook_name: playbook.name.clone(),
            folder_name,
            run_dir,
            started_at,
            finished_at: None,
            sequence: playbook.sequence.clone(),
            steps: Vec::with_capacity(playbook.step_count()),
        };

        info!(
            playbook = %run.playbook_name,
            run_id = %run.run_id,
            folder = %run.folder_name,
            steps = playbook.step_count(),
            "Starting playbook run"
        );

        let total = playbook.step_count();
        for (position, (index, step)) in playbook.steps().enumerate() {
            let record = self.run_step(index, step, &run.run_dir).await;

            if let Err(e) = append_row(&mut report, &record.report_row()) {
                warn!(
                    playbook = %run.playbook_name,
                    step = index,
                    error = %e,
                    "Failed to append report row"
                );
            }
            run.steps.push(record);

            let is_last = position + 1 == total;
            if !is_last && step.wait > 0 && self.config.honor_waits {
                debug!(step = index, wait = step.wait, "Waiting before next step");
                tokio::time::sleep(Duration::from_secs(step.wait)).await;
            }
        }

        run.finished_at = Some(Local::now());
        info!(
            playbook = %run.playbook_name,
            run_id = %run.run_id,
            succeeded = run.succeeded_steps(),
            failed = run.failed_steps(),
            outcome = %run.outcome(),
            "Playbook run finished"
        );

        Ok(run)
    }

    async fn run_lock(&self, playbook_name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.run_locks.lock().await;
        locks
            .entry(playbook_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the map entry once no other run holds or waits on `lock`.
    async fn release_run_lock(&self, playbook_name: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.run_locks.lock().await;
        let idle = locks
            .get(playbook_name)
            .map(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(&lock) == 2)
            .unwrap_or(false);
        if idle {
            locks.remove(playbook_name);
        }
    }

    fn create_run_folder(
        &self,
        playbook_name: &str,
        started_at: &DateTime<Local>,
    ) -> SkyfallResult<(String, PathBuf)> {
        fs::create_dir_all(&self.runs_dir)
            .map_err(|e| folder_error(&self.runs_dir, e.to_string()))?;

        let base = run_folder_name(playbook_name, started_at);
        for attempt in 0..MAX_FOLDER_ATTEMPTS {
            let folder_name = if attempt == 0 {
                base.clone()
            } else {
                format!("{}-{}", base, attempt)
            };
            let path = self.runs_dir.join(&folder_name);

            match fs::create_dir(&path) {
                Ok(()) => return Ok((folder_name, path)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(folder_error(&path, e.to_string())),
            }
        }

        Err(folder_error(
            &self.runs_dir.join(&base),
            "no unique run folder name available".to_string(),
        ))
    }

    /// Writes the sequence snapshot and the report header before any step runs.
    fn prepare_run_folder(
        &self,
        playbook: &Playbook,
        run_dir: &Path,
    ) -> SkyfallResult<csv::Writer<fs::File>> {
        let snapshot_path = run_dir.join(CONFIG_SNAPSHOT_FILE);
        let snapshot = serde_yaml::to_string(&playbook.sequence)?;
        fs::write(&snapshot_path, snapshot)
            .map_err(|e| folder_error(&snapshot_path, e.to_string()))?;

        let report_path = run_dir.join(REPORT_FILE);
        let mut report = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&report_path)
            .map_err(|e| folder_error(&report_path, e.to_string()))?;
        report
            .write_record(["Time_Stamp", "Module", "Result"])
            .map_err(|e| folder_error(&report_path, e.to_string()))?;
        report
            .flush()
            .map_err(|e| folder_error(&report_path, e.to_string()))?;

        Ok(report)
    }

    async fn run_step(&self, index: u32, step: &PlaybookStep, run_dir: &Path) -> StepRecord {
        let now = Local::now();
        let started_at = now.with_nanosecond(0).unwrap_or(now);
        let artifact = run_dir.join(artifact_file_name(&step.module));

        let (response, success, error) = match self.registry.resolve(&step.module).await {
            Ok(handle) => self.invoke(handle, step).await,
            Err(e) => {
                warn!(step = index, module = %step.module, error = %e, "Technique resolution failed");
                (json!({ "Error": e.to_string() }), false, Some(e.to_string()))
            }
        };

        if let Err(e) = fs::write(&artifact, render_response(&response)) {
            warn!(
                step = index,
                module = %step.module,
                path = %artifact.display(),
                error = %e,
                "Failed to write step artifact"
            );
        }

        let status = StepStatus::from_success(success);
        info!(step = index, module = %step.module, result = %status, "Step finished");

        StepRecord {
            index,
            module: step.module.clone(),
            started_at,
            status,
            artifact,
            error,
        }
    }

    /// Runs the technique on its own task so a panic or timeout is contained.
    async fn invoke(
        &self,
        handle: TechniqueHandle,
        step: &PlaybookStep,
    ) -> (Value, bool, Option<String>) {
        let ctx = TechniqueContext::new(
            handle.descriptor.id.clone(),
            handle.descriptor.attack_surface,
            self.credentials.clone(),
        );
        let implementation = handle.implementation;
        let params = step.params.clone();

        let mut task =
            tokio::spawn(async move { implementation.invoke(&ctx, params).await });

        let joined = match self.config.step_timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    let err = SkyfallError::invocation_failed(
                        &step.module,
                        format!("timed out after {}s", secs),
                    );
                    err.log();
                    return (json!({ "Error": err.to_string() }), false, Some(err.to_string()));
                }
            },
            None => task.await,
        };

        match joined {
            Ok(Ok(result)) => {
                let (response, success) = result.normalize();
                (response, success, None)
            }
            Ok(Err(e)) => {
                let err = SkyfallError::invocation_failed(&step.module, e.to_string());
                err.log();
                (json!({ "Error": err.to_string() }), false, Some(err.to_string()))
            }
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    format!("panicked: {}", panic_message(join_error.into_panic()))
                } else {
                    "cancelled".to_string()
                };
                error!(module = %step.module, "Technique {}", message);
                let err = SkyfallError::invocation_failed(&step.module, message);
                (json!({ "Error": err.to_string() }), false, Some(err.to_string()))
            }
        }
    }
}

#[async_trait]
impl PlaybookTrigger for ExecutionEngine {
    async fn trigger(&self, playbook_id: &str) -> SkyfallResult<ExecutionRun> {
        self.execute_playbook(playbook_id).await
    }
}

fn append_row(report: &mut csv::Writer<fs::File>, row: &ReportRow) -> SkyfallResult<()> {
    report.serialize(row)?;
    report.flush()?;
    Ok(())
}

fn folder_error(path: &Path, message: String) -> SkyfallError {
    EngineError::RunFolderCreateFailed {
        path: path.display().to_string(),
        message,
    }
    .into()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
