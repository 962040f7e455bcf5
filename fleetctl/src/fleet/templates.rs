//! Policy templates: named capability presets that can be applied to probes.

use crate::types::CapabilityLevel;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

/// A reusable capability policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PolicyTemplate {
    pub id: String,
    pub name: String,
    pub level: CapabilityLevel,
    #[serde(default)]
    pub description: String,
}

impl PolicyTemplate {
    /// The wire payload pushed to a probe when this template is applied.
    pub fn to_policy(&self) -> serde_json::Value {
        json!({
            "template_id": self.id,
            "level": self.level,
        })
    }
}

/// Concurrent template lookup table, seeded from configuration.
#[derive(Default)]
pub struct PolicyTemplateStore {
    templates: DashMap<String, PolicyTemplate>,
}

impl PolicyTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(templates: impl IntoIterator<Item = PolicyTemplate>) -> Self {
        let store = Self::new();
        for template in templates {
            store.insert(template);
        }
        store
    }

    pub fn insert(&self, template: PolicyTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn get(&self, id: &str) -> Option<PolicyTemplate> {
        self.templates.get(id).map(|t| t.clone())
    }

    pub fn list(&self) -> Vec<PolicyTemplate> {
        let mut templates: Vec<PolicyTemplate> =
            self.templates.iter().map(|t| t.clone()).collect();
        templates.sort_by(|a, b| a.id.cmp(&b.id));
        templates
    }
}
