//! Active credential per attack surface.
//!
//! Techniques act as "whoever is currently active" on their provider. Instead of a
//! process global, the context is an explicit object the engine hands to every
//! invocation through [`TechniqueContext`](crate::techniques::TechniqueContext).
//!
//! Two runs sharing one context observe each other's `set_active` calls. Runs that
//! need different identities on the same surface must use separate contexts.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::techniques::AttackSurface;

#[derive(Clone, Serialize, Deserialize)]
pub struct ActiveCredential {
    /// Display identity (UPN, ARN, app id...). Safe to log.
    pub identity: String,
    pub tenant: Option<String>,
    /// Opaque token or key material handed to techniques. Never logged.
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub activated_at: DateTime<Utc>,
}

impl ActiveCredential {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            tenant: None,
            secret: None,
            activated_at: Utc::now(),
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

impl fmt::Debug for ActiveCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveCredential")
            .field("identity", &self.identity)
            .field("tenant", &self.tenant)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("activated_at", &self.activated_at)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct CredentialContext {
    active: RwLock<HashMap<AttackSurface, ActiveCredential>>,
}

impl CredentialContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the active credential for `surface`, returning the previous one.
    pub async fn set_active(
        &self,
        surface: AttackSurface,
        credential: ActiveCredential,
    ) -> Option<ActiveCredential> {
        info!(surface = %surface, identity = %credential.identity, "Activated credential");
        self.active.write().await.insert(surface, credential)
    }

    pub async fn get_active(&self, surface: AttackSurface) -> Option<ActiveCredential> {
        self.active.read().await.get(&surface).cloned()
    }

    pub async fn clear(&self, surface: AttackSurface) -> Option<ActiveCredential> {
        self.active.write().await.remove(&surface)
    }

    pub async fn active_surfaces(&self) -> Vec<AttackSurface> {
        let mut surfaces: Vec<AttackSurface> = self.active.read().await.keys().copied().collect();
        surfaces.sort();
        surfaces
    }
}
