use anyhow::{Context, Result};
use skyfall_core::{
    register_builtin_techniques, CredentialContext, ExecutionEngine, PlaybookStore, RunStore,
    ScheduleStore, SkyfallConfig, TechniqueCatalog, TechniqueRegistry,
};
use std::sync::Arc;

/// Loaded configuration plus constructors for the core components.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config: SkyfallConfig,
}

impl CliContext {
    pub fn load() -> Result<Self> {
        let config = SkyfallConfig::load().context(
            "Failed to load configuration. Check ./skyfall.toml, ~/.skyfall/config.toml \
             and SKYFALL__* environment variables",
        )?;
        Ok(Self { config })
    }

    pub fn playbook_store(&self) -> PlaybookStore {
        PlaybookStore::new(self.config.storage.playbooks_dir.clone())
    }

    pub fn schedule_store(&self) -> ScheduleStore {
        ScheduleStore::new(self.config.storage.schedules_file.clone())
    }

    pub fn run_store(&self) -> RunStore {
        RunStore::new(self.config.storage.runs_dir.clone())
    }

    pub fn catalog(&self) -> Result<TechniqueCatalog> {
        Ok(TechniqueCatalog::load_from_file(
            &self.config.storage.catalog_file,
        )?)
    }

    /// Catalog from disk with every built-in implementation registered.
    pub async fn registry(&self) -> Result<TechniqueRegistry> {
        let registry = TechniqueRegistry::new(Arc::new(self.catalog()?));
        register_builtin_techniques(&registry).await?;
        Ok(registry)
    }

    pub async fn engine(&self, credentials: Arc<CredentialContext>) -> Result<ExecutionEngine> {
        let registry = Arc::new(self.registry().await?);
        Ok(ExecutionEngine::new(
            Arc::new(self.playbook_store()),
            registry,
            credentials,
            self.config.storage.runs_dir.clone(),
        )
        .with_config(self.config.engine.clone()))
    }
}
