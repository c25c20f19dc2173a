use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use skyfall_core::{
    register_builtin_techniques, ActiveCredential, AttackSurface, CredentialContext,
    ExecutionEngine, InputField, NewSchedule, PlaybookStore, PlaybookTrigger, RunOutcome,
    RunStore, ScheduleDriver, ScheduleStore, SchedulerConfig, SkyfallResult, StepStatus,
    StorageConfig, Technique, TechniqueCatalog, TechniqueContext, TechniqueRegistry,
    TechniqueResult,
};
use std::sync::Arc;
use tempfile::TempDir;

const CATALOG: &str = r#"
AWS-101:
  name: Enumerate S3 buckets
  attack_surface: AWS
  execution_path: packs::aws::list-buckets
  input_spec:
    - title: Region
      key: region
      placeholder: us-east-1
  references:
    - https://attack.mitre.org/techniques/T1619/
"#;

/// Echoes the active identity and the requested region.
struct ListBuckets;

#[async_trait]
impl Technique for ListBuckets {
    fn describe_inputs(&self) -> Vec<InputField> {
        vec![InputField::new("region", "Region")]
    }

    async fn invoke(
        &self,
        ctx: &TechniqueContext,
        params: Option<Vec<Value>>,
    ) -> SkyfallResult<TechniqueResult> {
        let Some(credential) = ctx.active_credential().await else {
            return Ok(TechniqueResult::failure(json!({"Error": "not signed in"})));
        };
        let region = params
            .and_then(|p| p.into_iter().next())
            .unwrap_or(Value::Null);

        Ok(TechniqueResult::success(
            json!({"caller": credential.identity, "region": region, "buckets": ["logs", "backups"]}),
            Some(json!(["logs", "backups"])),
        ))
    }
}

struct Environment {
    _temp_dir: TempDir,
    storage: StorageConfig,
    credentials: Arc<CredentialContext>,
    engine: Arc<ExecutionEngine>,
}

async fn environment() -> Environment {
    let temp_dir = TempDir::new().unwrap();
    let storage = StorageConfig::with_data_dir(temp_dir.path());
    std::fs::create_dir_all(&storage.data_dir).unwrap();
    std::fs::write(&storage.catalog_file, CATALOG).unwrap();

    let catalog = TechniqueCatalog::load_from_file(&storage.catalog_file).unwrap();
    let registry = TechniqueRegistry::new(Arc::new(catalog));
    register_builtin_techniques(&registry).await.unwrap();
    registry
        .register("packs::aws::list-buckets", Arc::new(ListBuckets))
        .await
        .unwrap();

    let credentials = Arc::new(CredentialContext::new());
    let engine = Arc::new(ExecutionEngine::new(
        Arc::new(PlaybookStore::new(&storage.playbooks_dir)),
        Arc::new(registry),
        credentials.clone(),
        &storage.runs_dir,
    ));

    Environment {
        _temp_dir: temp_dir,
        storage,
        credentials,
        engine,
    }
}

#[tokio::test]
async fn test_author_run_and_inspect() {
    let env = environment().await;
    let store = env.engine.store();

    store
        .create("S3 Recon", "Bucket discovery", "red-team", Vec::new())
        .unwrap();
    let mut playbook = store.find("S3 Recon").unwrap().unwrap();
    playbook.add_step("AWS-000", None, 0).unwrap();
    playbook.add_step("AWS-101", Some(vec![json!("eu-west-1")]), 0).unwrap();
    playbook.add_step("AWS-999", None, 0).unwrap();
    store.save(&playbook).unwrap();

    env.credentials
        .set_active(
            AttackSurface::Aws,
            ActiveCredential::new("arn:aws:iam::111:user/red").with_tenant("111"),
        )
        .await;

    let run = env.engine.execute_playbook("S3 Recon").await.unwrap();
    assert_eq!(run.outcome(), RunOutcome::Partial);
    let statuses: Vec<StepStatus> = run.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Success, StepStatus::Success, StepStatus::Failed]
    );

    let runs = RunStore::new(&env.storage.runs_dir);
    let summaries = runs.list_runs_for("S3 Recon").unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].folder_name, run.folder_name);
    assert_eq!(summaries[0].steps, 3);

    let snapshot = runs.load_snapshot(&run.folder_name).unwrap();
    assert_eq!(snapshot, playbook.sequence);

    let artifact = runs.read_artifact(&run.folder_name, "AWS-101").unwrap();
    assert!(artifact.contains("logs"));
    assert!(artifact.contains("backups"));
    assert!(!artifact.contains("eu-west-1"), "pretty form is written when present");

    let missing = runs.read_artifact(&run.folder_name, "AWS-999").unwrap();
    assert!(missing.contains("AWS-999"));
}

#[tokio::test]
async fn test_schedule_fires_playbook() {
    let env = environment().await;
    let store = env.engine.store();
    let mut playbook = store.create("Nightly", "", "", Vec::new()).unwrap();
    playbook.add_step("AWS-000", None, 0).unwrap();
    store.save(&playbook).unwrap();

    let schedules = Arc::new(ScheduleStore::new(&env.storage.schedules_file));
    schedules
        .add_schedule(NewSchedule::new(
            Some("nightly".to_string()),
            "Nightly",
            "2024-03-01",
            "2024-03-31",
            "02:00",
            true,
            "daily",
        ))
        .unwrap();

    let trigger: Arc<dyn PlaybookTrigger> = env.engine.clone();
    let driver = ScheduleDriver::new(schedules, trigger, SchedulerConfig::default());

    let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
    let handles = driver
        .tick(
            day.and_hms_opt(1, 59, 30).unwrap(),
            day.and_hms_opt(2, 0, 0).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(handles.len(), 1);
    for handle in handles {
        handle.await.unwrap();
    }

    let history = driver.get_history(10).await;
    assert_eq!(history.len(), 1);
    assert!(history[0].success);
    assert_eq!(history[0].outcome, Some(RunOutcome::Failed));

    let runs = RunStore::new(&env.storage.runs_dir)
        .list_runs_for("Nightly")
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(history[0].run_folder.as_deref(), Some(runs[0].folder_name.as_str()));

    let after_end = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
    let handles = driver
        .tick(
            after_end.and_hms_opt(1, 0, 0).unwrap(),
            after_end.and_hms_opt(3, 0, 0).unwrap(),
        )
        .await
        .unwrap();
    assert!(handles.is_empty());
}
