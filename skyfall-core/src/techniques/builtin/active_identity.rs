use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::SkyfallResult;
use crate::techniques::traits::{Technique, TechniqueContext};
use crate::techniques::types::{InputField, TechniqueResult};

pub const ACTIVE_IDENTITY_PATH: &str = "builtin::active-identity";

/// Reports which credential is active on the technique's attack surface.
///
/// Useful as a first playbook step to record who the rest of the run acted as.
#[derive(Debug, Default)]
pub struct ActiveIdentityTechnique;

impl ActiveIdentityTechnique {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Technique for ActiveIdentityTechnique {
    fn describe_inputs(&self) -> Vec<InputField> {
        Vec::new()
    }

    async fn invoke(
        &self,
        ctx: &TechniqueContext,
        _params: Option<Vec<Value>>,
    ) -> SkyfallResult<TechniqueResult> {
        match ctx.active_credential().await {
            Some(credential) => {
                debug!(surface = %ctx.surface, identity = %credential.identity, "Active identity");
                let raw = json!({
                    "surface": ctx.surface.to_string(),
                    "identity": credential.identity,
                    "tenant": credential.tenant,
                    "activated_at": credential.activated_at.to_rfc3339(),
                });
                let pretty = match &credential.tenant {
                    Some(tenant) => format!(
                        "{} active identity: {} (tenant {})",
                        ctx.surface, credential.identity, tenant
                    ),
                    None => format!("{} active identity: {}", ctx.surface, credential.identity),
                };
                Ok(TechniqueResult::success(raw, Some(Value::String(pretty))))
            }
            None => Ok(TechniqueResult::failure(json!({
                "Error": format!("no active credential for {}", ctx.surface)
            }))),
        }
    }
}
