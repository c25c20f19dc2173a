#![allow(
    clippy::needless_borrows_for_generic_args,
    clippy::derivable_impls,
    clippy::type_complexity,
    clippy::ptr_arg,
    clippy::len_zero
)]

pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod playbooks;
pub mod schedules;
pub mod techniques;

pub use config::{
    get_config_dir, get_data_dir, ConfigLoadError, EngineConfig, LoggingConfig, SchedulerConfig,
    SkyfallConfig, StorageConfig,
};
pub use credentials::{ActiveCredential, CredentialContext};
pub use engine::{
    ExecutionEngine, ExecutionRun, PlaybookTrigger, ReportRow, RunOutcome, RunStore, RunSummary,
    StepRecord, StepStatus,
};
pub use error::{
    CliErrorDisplay, EngineError, ModelError, RegistryError, ScheduleError, SkyfallError,
    SkyfallResult, StepError,
};
pub use playbooks::{Playbook, PlaybookStep, PlaybookStore};
pub use schedules::{
    FiringHistory, FiringRecord, NewSchedule, RepeatFrequency, Schedule, ScheduleDriver,
    ScheduleStore, TriggerPolicy,
};
pub use techniques::{
    register_builtin_techniques, AttackSurface, InputField, InputKind, Technique,
    TechniqueCatalog, TechniqueContext, TechniqueDescriptor, TechniqueHandle, TechniqueRegistry,
    TechniqueResult,
};
