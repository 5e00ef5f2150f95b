use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single remotely-managed resource (one indexer) as reported by its service.
///
/// Fields the core does not interpret are kept in `extra` so an update can
/// send the complete object back to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "enable", default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl Target {
    pub fn new(id: i64, name: &str, enabled: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            enabled,
            extra: Map::new(),
        }
    }

    /// Display name, falling back to the id when the service omits one.
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("unknown (id={})", self.id)
        } else {
            self.name.clone()
        }
    }

    /// Return a new target with `patch` merged over a copy of this one.
    /// `self` is never touched.
    pub fn merged(&self, patch: &TargetPatch) -> Target {
        let mut copy = self.clone();
        if let Some(enabled) = patch.enabled {
            copy.enabled = enabled;
        }
        if let Some(name) = &patch.name {
            copy.name = name.clone();
        }
        for (key, value) in &patch.extra {
            copy.extra.insert(key.clone(), value.clone());
        }
        copy
    }
}

/// Partial update applied over a target's current configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetPatch {
    #[serde(rename = "enable", skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TargetPatch {
    pub fn set_enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Default::default()
        }
    }
}

/// Identity shared by the breaker registry and the result cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetKey {
    pub service: String,
    pub target_id: i64,
}

impl TargetKey {
    pub fn new(service: &str, target_id: i64) -> Self {
        Self {
            service: service.to_string(),
            target_id,
        }
    }
}

impl std::fmt::Display for TargetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.service, self.target_id)
    }
}

/// Outcome of a service-side connectivity test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub success: bool,
    pub error_message: Option<String>,
}

impl ProbeResult {
    pub fn passed() -> Self {
        Self { success: true, error_message: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
        }
    }
}
