use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{RegistryError, SkyfallResult};

use super::builtin::builtin_descriptors;
use super::types::{AttackSurface, TechniqueDescriptor};

/// Every known technique descriptor keyed by id.
///
/// Built once at process start and shared read-only behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct TechniqueCatalog {
    entries: BTreeMap<String, TechniqueDescriptor>,
}

impl TechniqueCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding only the bundled descriptors.
    pub fn builtin() -> Self {
        Self::from_descriptors(builtin_descriptors())
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = TechniqueDescriptor>) -> Self {
        let mut catalog = Self::new();
        for descriptor in descriptors {
            catalog.insert(descriptor);
        }
        catalog
    }

    /// Parses a YAML mapping of `id -> descriptor`. The key becomes the descriptor id.
    pub fn parse_yaml(content: &str, source: &str) -> SkyfallResult<Self> {
        let raw: BTreeMap<String, TechniqueDescriptor> = if content.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_yaml::from_str(content).map_err(|e| RegistryError::CatalogCorrupt {
                path: source.to_string(),
                message: e.to_string(),
            })?
        };

        let mut catalog = Self::new();
        for (id, mut descriptor) in raw {
            if descriptor.execution_path.trim().is_empty() {
                return Err(RegistryError::CatalogCorrupt {
                    path: source.to_string(),
                    message: format!("technique '{}' has no execution_path", id),
                }
                .into());
            }
            descriptor.id = id;
            catalog.insert(descriptor);
        }
        Ok(catalog)
    }

    /// Built-in descriptors with the catalog file at `path` merged on top.
    ///
    /// A missing file yields the built-ins alone; a malformed one is an error.
    pub fn load_from_file(path: &Path) -> SkyfallResult<Self> {
        let mut catalog = Self::builtin();

        if !path.exists() {
            debug!(path = %path.display(), "No technique catalog file, using built-ins only");
            return Ok(catalog);
        }

        let content = std::fs::read_to_string(path)?;
        let external = Self::parse_yaml(&content, &path.display().to_string())?;
        info!(
            path = %path.display(),
            count = external.len(),
            "Loaded technique catalog"
        );
        catalog.merge(external);
        Ok(catalog)
    }

    pub fn insert(&mut self, descriptor: TechniqueDescriptor) -> Option<TechniqueDescriptor> {
        self.entries.insert(descriptor.id.clone(), descriptor)
    }

    /// Entries of `other` replace entries with the same id.
    pub fn merge(&mut self, other: TechniqueCatalog) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, id: &str) -> Option<&TechniqueDescriptor> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// All descriptors sorted by id.
    pub fn list(&self) -> Vec<&TechniqueDescriptor> {
        self.entries.values().collect()
    }

    pub fn by_surface(&self, surface: AttackSurface) -> Vec<&TechniqueDescriptor> {
        self.entries
            .values()
            .filter(|d| d.attack_surface == surface)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
