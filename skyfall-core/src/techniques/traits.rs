use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::credentials::{ActiveCredential, CredentialContext};
use crate::error::SkyfallResult;

use super::types::{AttackSurface, InputField, TechniqueResult};

/// Uniform contract every pluggable operation implements.
#[async_trait]
pub trait Technique: Send + Sync {
    /// Positional parameters the technique expects. Must be side-effect free.
    fn describe_inputs(&self) -> Vec<InputField>;

    /// Runs the technique. `params` is `None` when the playbook step has no parameters.
    ///
    /// Returning `Err` is recorded as a failed step, same as a `success: false` result.
    async fn invoke(
        &self,
        ctx: &TechniqueContext,
        params: Option<Vec<Value>>,
    ) -> SkyfallResult<TechniqueResult>;
}

/// Handed to every invocation.
#[derive(Clone)]
pub struct TechniqueContext {
    pub technique_id: String,
    pub surface: AttackSurface,
    pub credentials: Arc<CredentialContext>,
}

impl TechniqueContext {
    pub fn new(
        technique_id: impl Into<String>,
        surface: AttackSurface,
        credentials: Arc<CredentialContext>,
    ) -> Self {
        Self {
            technique_id: technique_id.into(),
            surface,
            credentials,
        }
    }

    /// Whatever credential is active on this technique's surface right now.
    pub async fn active_credential(&self) -> Option<ActiveCredential> {
        self.credentials.get_active(self.surface).await
    }
}

impl std::fmt::Debug for TechniqueContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TechniqueContext")
            .field("technique_id", &self.technique_id)
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}
