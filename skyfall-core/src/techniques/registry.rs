use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{RegistryError, SkyfallResult};

use super::catalog::TechniqueCatalog;
use super::traits::Technique;
use super::types::{InputField, TechniqueDescriptor};

/// A resolved technique: its catalog entry plus the implementation behind its
/// execution path.
#[derive(Clone)]
pub struct TechniqueHandle {
    pub descriptor: TechniqueDescriptor,
    pub implementation: Arc<dyn Technique>,
}

impl TechniqueHandle {
    pub fn describe_inputs(&self) -> Vec<InputField> {
        self.implementation.describe_inputs()
    }
}

impl std::fmt::Debug for TechniqueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TechniqueHandle")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Explicit registration table from execution path to implementation.
///
/// Technique ids are looked up in the catalog at call time, then the descriptor's
/// `execution_path` selects the implementation.
pub struct TechniqueRegistry {
    catalog: Arc<TechniqueCatalog>,
    implementations: RwLock<HashMap<String, Arc<dyn Technique>>>,
}

impl TechniqueRegistry {
    pub fn new(catalog: Arc<TechniqueCatalog>) -> Self {
        Self {
            catalog,
            implementations: RwLock::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Arc<TechniqueCatalog> {
        &self.catalog
    }

    pub async fn register(
        &self,
        execution_path: impl Into<String>,
        implementation: Arc<dyn Technique>,
    ) -> SkyfallResult<()> {
        let execution_path = execution_path.into();
        let mut implementations = self.implementations.write().await;

        if implementations.contains_key(&execution_path) {
            return Err(RegistryError::DuplicatePath(execution_path).into());
        }

        implementations.insert(execution_path.clone(), implementation);
        info!(execution_path = %execution_path, "Registered technique implementation");
        Ok(())
    }

    pub async fn is_registered(&self, execution_path: &str) -> bool {
        self.implementations.read().await.contains_key(execution_path)
    }

    pub async fn registered_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.implementations.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Resolves a technique id to its handle.
    ///
    /// Unknown ids and unregistered execution paths are `NotFound`. An implementation
    /// whose inputs disagree with the catalog's non-empty `input_spec` (keys and order)
    /// is `InvalidImplementation`.
    pub async fn resolve(&self, technique_id: &str) -> SkyfallResult<TechniqueHandle> {
        let descriptor = self
            .catalog
            .get(technique_id)
            .ok_or_else(|| RegistryError::NotFound(technique_id.to_string()))?;

        let implementation = self
            .implementations
            .read()
            .await
            .get(&descriptor.execution_path)
            .cloned()
            .ok_or_else(|| {
                RegistryError::NotFound(format!(
                    "{} (execution path '{}' is not registered)",
                    technique_id, descriptor.execution_path
                ))
            })?;

        check_contract(descriptor, implementation.as_ref())?;

        debug!(
            technique = %technique_id,
            execution_path = %descriptor.execution_path,
            "Resolved technique"
        );

        Ok(TechniqueHandle {
            descriptor: descriptor.clone(),
            implementation,
        })
    }
}

fn check_contract(
    descriptor: &TechniqueDescriptor,
    implementation: &dyn Technique,
) -> Result<(), RegistryError> {
    if descriptor.input_spec.is_empty() {
        return Ok(());
    }

    let declared: Vec<&str> = descriptor.input_spec.iter().map(|f| f.key.as_str()).collect();
    let described = implementation.describe_inputs();
    let actual: Vec<&str> = described.iter().map(|f| f.key.as_str()).collect();

    if declared != actual {
        return Err(RegistryError::InvalidImplementation {
            technique: descriptor.id.clone(),
            message: format!(
                "catalog declares inputs {:?} but implementation describes {:?}",
                declared, actual
            ),
        });
    }

    Ok(())
}
