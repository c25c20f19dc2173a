//! Error types for the Skyfall core library.
//!
//! Each component owns a small error enum; [`SkyfallError`] wraps them so callers
//! can propagate with `?` across component boundaries.
//!
//! # Error Codes Reference
//!
//! | Code Range | Category | Description |
//! |------------|----------|-------------|
//! | E1001-E1099 | Registry | Technique resolution and catalog errors |
//! | E2001-E2099 | Model | Playbook persistence errors |
//! | E3001-E3099 | Engine | Fatal run errors (playbook lookup, run folder) |
//! | E4001-E4099 | Step | Technique invocation failures (recorded, never propagated by the engine) |
//! | E5001-E5099 | Schedule | Schedule store and trigger policy errors |
//! | E6001-E6099 | Config | Configuration loading and validation errors |
//! | E9001-E9099 | General | IO, serialization and internal errors |

use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::config::ConfigLoadError;

/// Errors raised while resolving a technique id to an implementation.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("technique not found: {0}")]
    NotFound(String),

    #[error("invalid implementation for '{technique}': {message}")]
    InvalidImplementation { technique: String, message: String },

    #[error("execution path already registered: {0}")]
    DuplicatePath(String),

    #[error("technique catalog is malformed ({path}): {message}")]
    CatalogCorrupt { path: String, message: String },
}

/// Errors raised by the playbook store.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("playbook not found: {0}")]
    NotFound(String),

    #[error("playbook already exists: {0}")]
    AlreadyExists(String),

    #[error("playbook '{name}' is malformed: {message}")]
    Corrupt { name: String, message: String },

    #[error("invalid playbook name '{0}': must be a single file name component")]
    InvalidName(String),

    #[error("playbook '{0}' has no free step index left")]
    SequenceFull(String),
}

/// Fatal errors for a single playbook run. Both abort before any step executes.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("playbook not found: {0}")]
    PlaybookNotFound(String),

    #[error("failed to create run folder {path}: {message}")]
    RunFolderCreateFailed { path: String, message: String },
}

/// Failure of one technique invocation. The engine records it, it never aborts a run.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("invocation of '{module}' failed: {message}")]
    InvocationFailed { module: String, message: String },
}

/// Errors raised by the schedule store and trigger policy evaluation.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("schedule file is malformed ({path}): {message}")]
    Corrupt { path: String, message: String },

    #[error("schedule not found: {0}")]
    NotFound(String),

    #[error("invalid trigger policy for schedule '{name}': {message}")]
    InvalidPolicy { name: String, message: String },
}

/// The main error type for the Skyfall core library.
#[derive(Debug, Error)]
pub enum SkyfallError {
    #[error("[{code}] Registry error: {0}", code = registry_code(.0))]
    Registry(#[from] RegistryError),

    #[error("[{code}] Playbook error: {0}", code = model_code(.0))]
    Model(#[from] ModelError),

    #[error("[{code}] Engine error: {0}", code = engine_code(.0))]
    Engine(#[from] EngineError),

    #[error("[E4001] Step error: {0}")]
    Step(#[from] StepError),

    #[error("[{code}] Schedule error: {0}", code = schedule_code(.0))]
    Schedule(#[from] ScheduleError),

    #[error("[E6001] Configuration error: {0}")]
    Config(#[from] ConfigLoadError),

    #[error("[E9001] Internal error: {0}")]
    Internal(String),

    #[error("[E9005] IO error: {0}")]
    IoError(String),

    #[error("[E9006] Serialization error: {0}")]
    SerializationError(String),
}

fn registry_code(err: &RegistryError) -> &'static str {
    match err {
        RegistryError::NotFound(_) => "E1001",
        RegistryError::InvalidImplementation { .. } => "E1002",
        RegistryError::DuplicatePath(_) => "E1003",
        RegistryError::CatalogCorrupt { .. } => "E1004",
    }
}

fn model_code(err: &ModelError) -> &'static str {
    match err {
        ModelError::NotFound(_) => "E2001",
        ModelError::AlreadyExists(_) => "E2002",
        ModelError::Corrupt { .. } => "E2003",
        ModelError::InvalidName(_) => "E2004",
        ModelError::SequenceFull(_) => "E2005",
    }
}

fn engine_code(err: &EngineError) -> &'static str {
    match err {
        EngineError::PlaybookNotFound(_) => "E3001",
        EngineError::RunFolderCreateFailed { .. } => "E3002",
    }
}

fn schedule_code(err: &ScheduleError) -> &'static str {
    match err {
        ScheduleError::Corrupt { .. } => "E5001",
        ScheduleError::NotFound(_) => "E5002",
        ScheduleError::InvalidPolicy { .. } => "E5003",
    }
}

/// Result type alias for Skyfall operations.
pub type SkyfallResult<T> = Result<T, SkyfallError>;

impl From<serde_json::Error> for SkyfallError {
    fn from(err: serde_json::Error) -> Self {
        SkyfallError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for SkyfallError {
    fn from(err: serde_yaml::Error) -> Self {
        SkyfallError::SerializationError(err.to_string())
    }
}

impl From<csv::Error> for SkyfallError {
    fn from(err: csv::Error) -> Self {
        SkyfallError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for SkyfallError {
    fn from(err: std::io::Error) -> Self {
        SkyfallError::IoError(err.to_string())
    }
}

impl From<config::ConfigError> for SkyfallError {
    fn from(err: config::ConfigError) -> Self {
        SkyfallError::Config(ConfigLoadError::Config(err))
    }
}

impl SkyfallError {
    /// Build the error a technique returns when its provider call fails.
    pub fn invocation_failed(module: impl Into<String>, message: impl Into<String>) -> Self {
        SkyfallError::Step(StepError::InvocationFailed {
            module: module.into(),
            message: message.into(),
        })
    }

    pub fn internal(message: impl Into<String>) -> Self {
        SkyfallError::Internal(message.into())
    }

    pub fn is_registry_error(&self) -> bool {
        matches!(self, SkyfallError::Registry(_))
    }

    pub fn is_model_error(&self) -> bool {
        matches!(self, SkyfallError::Model(_))
    }

    pub fn is_engine_error(&self) -> bool {
        matches!(self, SkyfallError::Engine(_))
    }

    pub fn is_schedule_error(&self) -> bool {
        matches!(self, SkyfallError::Schedule(_))
    }

    pub fn is_config_error(&self) -> bool {
        matches!(self, SkyfallError::Config(_))
    }

    /// Returns true if this error stops a playbook run before any step executes.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(
            self,
            SkyfallError::Engine(_)
                | SkyfallError::Model(ModelError::Corrupt { .. })
                | SkyfallError::Model(ModelError::InvalidName(_))
        )
    }

    /// Returns an error code suitable for logging or external reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            SkyfallError::Registry(e) => registry_code(e),
            SkyfallError::Model(e) => model_code(e),
            SkyfallError::Engine(e) => engine_code(e),
            SkyfallError::Step(_) => "E4001",
            SkyfallError::Schedule(e) => schedule_code(e),
            SkyfallError::Config(_) => "E6001",
            SkyfallError::Internal(_) => "E9001",
            SkyfallError::IoError(_) => "E9005",
            SkyfallError::SerializationError(_) => "E9006",
        }
    }

    /// Returns a user-friendly suggestion for how to resolve this error.
    pub fn user_suggestion(&self) -> Option<&'static str> {
        match self {
            SkyfallError::Registry(RegistryError::NotFound(_)) => {
                Some("Run 'skyfall techniques list' to see registered techniques")
            }
            SkyfallError::Registry(RegistryError::CatalogCorrupt { .. }) => {
                Some("Fix the technique catalog YAML or remove it to use the built-in catalog")
            }
            SkyfallError::Model(ModelError::NotFound(_))
            | SkyfallError::Engine(EngineError::PlaybookNotFound(_)) => {
                Some("Run 'skyfall playbooks list' to see available playbooks")
            }
            SkyfallError::Model(ModelError::AlreadyExists(_)) => {
                Some("Choose a different name or delete the existing playbook first")
            }
            SkyfallError::Model(ModelError::Corrupt { .. }) => {
                Some("Re-import the playbook or fix its YAML by hand")
            }
            SkyfallError::Model(ModelError::SequenceFull(_)) => {
                Some("Renumber the playbook's steps from 1 in its YAML file")
            }
            SkyfallError::Engine(EngineError::RunFolderCreateFailed { .. }) => {
                Some("Check that storage.runs_dir exists and is writable")
            }
            SkyfallError::Schedule(ScheduleError::Corrupt { .. }) => {
                Some("Fix the schedules file YAML or move it aside")
            }
            SkyfallError::Config(_) => Some("Run 'skyfall config' to inspect the effective configuration"),
            _ => None,
        }
    }

    /// Log this error with appropriate severity level.
    pub fn log(&self) {
        let code = self.error_code();
        let suggestion = self.user_suggestion();

        if self.is_fatal_to_run() || self.is_config_error() {
            error!(
                error_code = %code,
                suggestion = suggestion,
                "Error occurred: {}",
                self
            );
        } else {
            warn!(
                error_code = %code,
                suggestion = suggestion,
                "Operation failed: {}",
                self
            );
        }
    }
}

/// Format an error for CLI display with its suggestion.
pub struct CliErrorDisplay<'a> {
    error: &'a SkyfallError,
    show_suggestion: bool,
}

impl<'a> CliErrorDisplay<'a> {
    pub fn new(error: &'a SkyfallError) -> Self {
        Self {
            error,
            show_suggestion: true,
        }
    }

    pub fn without_suggestion(mut self) -> Self {
        self.show_suggestion = false;
        self
    }
}

impl<'a> fmt::Display for CliErrorDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.error)?;

        if self.show_suggestion {
            if let Some(suggestion) = self.error.user_suggestion() {
                writeln!(f)?;
                writeln!(f, "  Suggestion: {}", suggestion)?;
            }
        }

        Ok(())
    }
}
