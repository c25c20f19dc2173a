//! Built-in Techniques
//!
//! Techniques bundled with Skyfall so a playbook can run without an external
//! technique pack.
//!
//! - [`ActiveIdentityTechnique`]: reports the active credential of an attack surface.
//!   Catalogued once per surface as `ENTRA-000`, `AZ-000`, `AWS-000` and `M365-000`.

mod active_identity;

pub use active_identity::{ActiveIdentityTechnique, ACTIVE_IDENTITY_PATH};

use std::sync::Arc;

use crate::error::SkyfallResult;

use super::registry::TechniqueRegistry;
use super::traits::Technique;
use super::types::{AttackSurface, TechniqueDescriptor};

fn surface_prefix(surface: AttackSurface) -> &'static str {
    match surface {
        AttackSurface::EntraId => "ENTRA",
        AttackSurface::Azure => "AZ",
        AttackSurface::Aws => "AWS",
        AttackSurface::M365 => "M365",
    }
}

pub fn builtin_descriptors() -> Vec<TechniqueDescriptor> {
    AttackSurface::all()
        .into_iter()
        .map(|surface| {
            TechniqueDescriptor::new(
                format!("{}-000", surface_prefix(surface)),
                format!("Show active {} identity", surface),
                surface,
                ACTIVE_IDENTITY_PATH,
            )
            .with_note("Fails when no credential is active for the surface")
        })
        .collect()
}

pub fn create_builtin_technique(execution_path: &str) -> Option<Arc<dyn Technique>> {
    match execution_path {
        ACTIVE_IDENTITY_PATH => Some(Arc::new(ActiveIdentityTechnique::new())),
        _ => None,
    }
}

pub fn is_builtin_technique(execution_path: &str) -> bool {
    matches!(execution_path, ACTIVE_IDENTITY_PATH)
}

pub async fn register_builtin_techniques(registry: &TechniqueRegistry) -> SkyfallResult<()> {
    for path in [ACTIVE_IDENTITY_PATH] {
        if let Some(technique) = create_builtin_technique(path) {
            registry.register(path, technique).await?;
        }
    }
    Ok(())
}
