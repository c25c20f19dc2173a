use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use skyfall_core::engine::ExecutionRun;
use skyfall_core::error::{EngineError, SkyfallResult};
use skyfall_core::{
    NewSchedule, PlaybookTrigger, SchedulerConfig, ScheduleDriver, ScheduleStore,
};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Default)]
struct RecordingTrigger {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl PlaybookTrigger for RecordingTrigger {
    async fn trigger(&self, playbook_id: &str) -> SkyfallResult<ExecutionRun> {
        self.calls.lock().unwrap().push(playbook_id.to_string());
        Err(EngineError::PlaybookNotFound(playbook_id.to_string()).into())
    }
}

fn at(date: &str, time: &str) -> NaiveDateTime {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .unwrap()
        .and_time(chrono::NaiveTime::parse_from_str(time, "%H:%M:%S").unwrap())
}

#[test]
fn test_add_schedule_without_name_generates_one() {
    let temp_dir = TempDir::new().unwrap();
    let store = ScheduleStore::new(temp_dir.path().join("schedules.yml"));

    let name = store
        .add_schedule(NewSchedule::new(
            None,
            "Recon",
            "2024-01-01",
            "2024-02-01",
            "09:00",
            true,
            "daily",
        ))
        .unwrap();
    assert!(!name.is_empty());

    let schedules = store.list_schedules().unwrap();
    let stored = schedules.get(&name).unwrap();
    assert_eq!(stored.playbook_id, "Recon");
    assert_eq!(stored.start_date, "2024-01-01");
    assert_eq!(stored.end_date, "2024-02-01");
    assert_eq!(stored.execution_time, "09:00");
    assert!(stored.repeat);
    assert_eq!(stored.repeat_frequency, "daily");

    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(raw.contains("'true'") || raw.contains("\"true\""));
}

#[test]
fn test_every_addition_rewrites_whole_collection() {
    let temp_dir = TempDir::new().unwrap();
    let store = ScheduleStore::new(temp_dir.path().join("nested").join("schedules.yml"));

    for name in ["a", "b", "c"] {
        store
            .add_schedule(NewSchedule::new(
                Some(name.to_string()),
                "Recon",
                "2024-01-01",
                "",
                "09:00",
                false,
                "",
            ))
            .unwrap();
    }

    let names: Vec<String> = store.list_schedules().unwrap().into_keys().collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_tick_fires_only_due_schedules() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(ScheduleStore::new(temp_dir.path().join("schedules.yml")));

    store
        .add_schedule(NewSchedule::new(
            Some("morning".to_string()),
            "Recon",
            "2024-01-01",
            "2024-02-01",
            "09:00",
            true,
            "daily",
        ))
        .unwrap();
    store
        .add_schedule(NewSchedule::new(
            Some("evening".to_string()),
            "Lateral",
            "2024-01-01",
            "",
            "18:00",
            true,
            "daily",
        ))
        .unwrap();
    store
        .add_schedule(NewSchedule::new(
            Some("broken".to_string()),
            "Ghost",
            "not-a-date",
            "",
            "09:00",
            false,
            "",
        ))
        .unwrap();

    let trigger = Arc::new(RecordingTrigger::default());
    let driver = ScheduleDriver::new(store.clone(), trigger.clone(), SchedulerConfig::default());

    let fired = driver
        .tick(at("2024-01-10", "08:59:30"), at("2024-01-10", "09:00:00"))
        .await
        .unwrap();
    assert_eq!(fired.len(), 1);
    for handle in fired {
        handle.await.unwrap();
    }
    assert_eq!(*trigger.calls.lock().unwrap(), vec!["Recon"]);

    let history = driver.get_history(10).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].schedule, "morning");
    assert!(!history[0].success);
    assert!(history[0].error_message.as_ref().unwrap().contains("Recon"));

    let fired = driver
        .tick(at("2024-02-02", "08:59:30"), at("2024-02-02", "09:00:00"))
        .await
        .unwrap();
    assert!(fired.is_empty(), "end date has passed");
}

#[tokio::test]
async fn test_tick_rereads_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(ScheduleStore::new(temp_dir.path().join("schedules.yml")));
    let trigger = Arc::new(RecordingTrigger::default());
    let driver = ScheduleDriver::new(store.clone(), trigger.clone(), SchedulerConfig::default());

    let window = (at("2024-01-01", "08:00:00"), at("2024-01-01", "10:00:00"));
    assert!(driver.tick(window.0, window.1).await.unwrap().is_empty());

    store
        .add_schedule(NewSchedule::new(
            None, "Recon", "2024-01-01", "", "09:00", false, "",
        ))
        .unwrap();

    let fired = driver.tick(window.0, window.1).await.unwrap();
    assert_eq!(fired.len(), 1);
}

#[tokio::test]
async fn test_start_stop() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(ScheduleStore::new(temp_dir.path().join("schedules.yml")));
    let driver = ScheduleDriver::new(
        store,
        Arc::new(RecordingTrigger::default()),
        SchedulerConfig::default(),
    );

    driver.start().await.unwrap();
    assert!(driver.is_running().await);
    assert!(driver.start().await.is_err());

    driver.stop().await.unwrap();
    assert!(!driver.is_running().await);
}
