use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::engine::{PlaybookTrigger, RunOutcome};
use crate::error::{SkyfallError, SkyfallResult};

use super::store::ScheduleStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiringRecord {
    pub schedule: String,
    pub playbook_id: String,
    pub scheduled_for: NaiveDateTime,
    pub fired_at: DateTime<Local>,
    pub success: bool,
    pub run_folder: Option<String>,
    pub outcome: Option<RunOutcome>,
    pub error_message: Option<String>,
}

#[derive(Debug, Default)]
pub struct FiringHistory {
    entries: VecDeque<FiringRecord>,
    limit: usize,
}

impl FiringHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
        }
    }

    pub fn add_entry(&mut self, entry: FiringRecord) {
        self.entries.push_back(entry);
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    /// Up to `limit` most recent entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<FiringRecord> {
        let start = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Periodically re-reads the schedule store and starts due playbooks.
///
/// The store only records intent; this loop is the part that acts on it. Each tick
/// covers the window `(previous tick, now]`, and every due schedule is fired on its
/// own task so one long playbook never delays another.
#[derive(Clone)]
pub struct ScheduleDriver {
    store: Arc<ScheduleStore>,
    trigger: Arc<dyn PlaybookTrigger>,
    config: SchedulerConfig,
    history: Arc<Mutex<FiringHistory>>,
    running: Arc<RwLock<bool>>,
    shutdown_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl ScheduleDriver {
    pub fn new(
        store: Arc<ScheduleStore>,
        trigger: Arc<dyn PlaybookTrigger>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            trigger,
            history: Arc::new(Mutex::new(FiringHistory::new(config.history_limit))),
            config,
            running: Arc::new(RwLock::new(false)),
            shutdown_tx: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn get_history(&self, limit: usize) -> Vec<FiringRecord> {
        self.history.lock().await.recent(limit)
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Fires every schedule with an occurrence in `(window_start, window_end]`.
    ///
    /// Returns the spawned firing tasks. Schedules whose policy does not parse are
    /// skipped with a warning.
    pub async fn tick(
        &self,
        window_start: NaiveDateTime,
        window_end: NaiveDateTime,
    ) -> SkyfallResult<Vec<JoinHandle<()>>> {
        let schedules = self.store.list_schedules()?;
        let mut fired = Vec::new();

        for (name, schedule) in schedules {
            let policy = match schedule.policy(&name) {
                Ok(policy) => policy,
                Err(e) => {
                    warn!(schedule = %name, error = %e, "Skipping schedule with invalid policy");
                    continue;
                }
            };

            let Some(scheduled_for) = policy
                .next_occurrence_after(window_start)
                .filter(|next| *next <= window_end)
            else {
                continue;
            };

            info!(
                schedule = %name,
                playbook = %schedule.playbook_id,
                scheduled_for = %scheduled_for,
                "Schedule due, starting playbook"
            );

            let trigger = self.trigger.clone();
            let history = self.history.clone();
            let playbook_id = schedule.playbook_id.clone();

            fired.push(tokio::spawn(async move {
                let fired_at = Local::now();
                let result = trigger.trigger(&playbook_id).await;
                let entry = firing_record(name, playbook_id, scheduled_for, fired_at, result);
                history.lock().await.add_entry(entry);
            }));
        }

        debug!(fired = fired.len(), "Schedule tick complete");
        Ok(fired)
    }

    async fn background_loop(self, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.config.tick_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut window_start = Local::now().naive_local();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !*self.running.read().await {
                        break;
                    }

                    let now = Local::now().naive_local();
                    if now <= window_start {
                        debug!("Clock did not advance, skipping tick");
                        continue;
                    }

                    if let Err(e) = self.tick(window_start, now).await {
                        error!("Schedule tick failed: {}", e);
                    }
                    window_start = now;
                }
                _ = &mut shutdown_rx => {
                    info!("Schedule driver shutting down");
                    break;
                }
            }
        }
    }

    pub async fn start(&self) -> SkyfallResult<()> {
        let mut running = self.running.write().await;
        if *running {
            return Err(SkyfallError::Internal(
                "Schedule driver already running".to_string(),
            ));
        }
        *running = true;
        drop(running);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        let driver = self.clone();
        tokio::spawn(async move {
            driver.background_loop(shutdown_rx).await;
        });

        info!(
            "Schedule driver started with tick interval: {} seconds",
            self.config.tick_interval_secs
        );
        Ok(())
    }

    pub async fn stop(&self) -> SkyfallResult<()> {
        *self.running.write().await = false;

        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }

        info!("Schedule driver stopped");
        Ok(())
    }
}

fn firing_record(
    schedule: String,
    playbook_id: String,
    scheduled_for: NaiveDateTime,
    fired_at: DateTime<Local>,
    result: SkyfallResult<crate::engine::ExecutionRun>,
) -> FiringRecord {
    match result {
        Ok(run) => FiringRecord {
            schedule,
            playbook_id,
            scheduled_for,
            fired_at,
            success: true,
            outcome: Some(run.outcome()),
            run_folder: Some(run.folder_name),
            error_message: None,
        },
        Err(e) => {
            e.log();
            FiringRecord {
                schedule,
                playbook_id,
                scheduled_for,
                fired_at,
                success: false,
                run_folder: None,
                outcome: None,
                error_message: Some(e.to_string()),
            }
        }
    }
}
