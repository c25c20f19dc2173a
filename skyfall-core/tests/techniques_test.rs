use async_trait::async_trait;
use serde_json::{json, Value};
use skyfall_core::error::{RegistryError, SkyfallError, SkyfallResult};
use skyfall_core::{
    register_builtin_techniques, AttackSurface, CredentialContext, InputField, InputKind,
    Technique, TechniqueCatalog, TechniqueContext, TechniqueRegistry, TechniqueResult,
};
use std::sync::Arc;
use tempfile::TempDir;

struct ResourceGroupLister;

#[async_trait]
impl Technique for ResourceGroupLister {
    fn describe_inputs(&self) -> Vec<InputField> {
        vec![
            InputField::new("subscription", "Subscription id"),
            InputField::new("resource_group", "Resource group").with_placeholder("rg-prod"),
        ]
    }

    async fn invoke(
        &self,
        _ctx: &TechniqueContext,
        params: Option<Vec<Value>>,
    ) -> SkyfallResult<TechniqueResult> {
        let params = params.unwrap_or_default();
        Ok(TechniqueResult::success(
            json!({ "value": params }),
            None,
        ))
    }
}

const CATALOG: &str = r#"
AZ-002:
  name: List resource group contents
  attack_surface: Azure
  execution_path: azure::list-rg
  input_spec:
    - title: Subscription id
      key: subscription
    - title: Resource group
      key: resource_group
      kind: text
      placeholder: rg-prod
  references:
    - https://attack.mitre.org/techniques/T1580/
AZ-003:
  name: Reordered inputs
  attack_surface: Azure
  execution_path: azure::list-rg-reordered
  input_spec:
    - title: Resource group
      key: resource_group
    - title: Subscription id
      key: subscription
"#;

async fn registry_from_file() -> (TempDir, TechniqueRegistry) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("techniques.yml");
    std::fs::write(&path, CATALOG).unwrap();

    let catalog = TechniqueCatalog::load_from_file(&path).unwrap();
    let registry = TechniqueRegistry::new(Arc::new(catalog));
    register_builtin_techniques(&registry).await.unwrap();
    registry
        .register("azure::list-rg", Arc::new(ResourceGroupLister))
        .await
        .unwrap();
    registry
        .register("azure::list-rg-reordered", Arc::new(ResourceGroupLister))
        .await
        .unwrap();

    (temp_dir, registry)
}

#[tokio::test]
async fn test_catalog_file_and_builtins_resolve() {
    let (_tmp, registry) = registry_from_file().await;

    let azure: Vec<String> = registry
        .catalog()
        .by_surface(AttackSurface::Azure)
        .into_iter()
        .map(|d| d.id.clone())
        .collect();
    assert_eq!(azure, vec!["AZ-000", "AZ-002", "AZ-003"]);

    let handle = registry.resolve("AZ-002").await.unwrap();
    assert_eq!(handle.descriptor.input_spec[0].kind, InputKind::Text);
    assert_eq!(handle.describe_inputs().len(), 2);

    let ctx = TechniqueContext::new(
        "AZ-002",
        AttackSurface::Azure,
        Arc::new(CredentialContext::new()),
    );
    let (response, success) = handle
        .implementation
        .invoke(&ctx, Some(vec![json!("sub-1"), json!("rg1")]))
        .await
        .unwrap()
        .normalize();
    assert!(success);
    assert_eq!(response, json!({ "value": ["sub-1", "rg1"] }));

    assert!(registry.resolve("AWS-000").await.is_ok());
}

#[tokio::test]
async fn test_input_order_is_part_of_the_contract() {
    let (_tmp, registry) = registry_from_file().await;

    let err = registry.resolve("AZ-003").await.unwrap_err();
    assert!(matches!(
        err,
        SkyfallError::Registry(RegistryError::InvalidImplementation { .. })
    ));
}

#[test]
fn test_corrupt_catalog_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("techniques.yml");
    std::fs::write(&path, "AZ-002:\n  name: [broken").unwrap();

    let err = TechniqueCatalog::load_from_file(&path).unwrap_err();
    assert!(matches!(
        err,
        SkyfallError::Registry(RegistryError::CatalogCorrupt { .. })
    ));
}
