//! Service — a command sent to the hub.
//!
//! Examples: `light.turn_off`, `scene.turn_on`, `notify.mobile_app_phone`.

use serde::{Deserialize, Serialize};

/// A named remote command with its target and parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    /// Targeted entity ids. Empty for services that target nothing
    /// (`notify.*`) or everything in a domain.
    #[serde(default)]
    pub target: Vec<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ServiceCall {
    #[must_use]
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            target: Vec::new(),
            data: serde_json::Value::Null,
        }
    }

    /// Call `service` on the domain of `entity_id`, targeting that entity.
    #[must_use]
    pub fn for_entity(entity_id: &str, service: impl Into<String>) -> Self {
        Self::new(crate::entity::domain_of(entity_id), service).target(entity_id)
    }

    #[must_use]
    pub fn target(mut self, entity_id: impl Into<String>) -> Self {
        self.target.push(entity_id.into());
        self
    }

    #[must_use]
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// `domain.service`, used in logs and error messages.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }
}

impl std::fmt::Display for ServiceCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.domain, self.service)?;
        if !self.target.is_empty() {
            write!(f, "({})", self.target.join(", "))?;
        }
        Ok(())
    }
}
