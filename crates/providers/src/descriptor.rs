//! Model descriptors: one entry in a fallback chain.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use wayfinder_config::{ModelEntry, ModelsConfig};
use wayfinder_core::Purpose;

/// A model the router may call.
///
/// Priority is the descriptor's position in its chain. The last-failure time
/// lives in the router's shared cooldown table, keyed by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Model name sent to the backend
    pub name: String,

    /// Registry key of the backend provider
    pub backend: String,

    /// Purpose this descriptor is reserved for; `None` for the shared chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<Purpose>,

    /// How long the descriptor is skipped after a fallback-class failure
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: backend.into(),
            purpose: None,
            cooldown: Duration::from_secs(60),
        }
    }

    pub fn for_purpose(mut self, purpose: Purpose) -> Self {
        self.purpose = Some(purpose);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Build from a config entry, using `default_cooldown_secs` when the entry has none.
    pub fn from_entry(entry: &ModelEntry, default_cooldown_secs: u64) -> Self {
        let secs = entry.cooldown_secs.unwrap_or(default_cooldown_secs);
        Self::new(&entry.name, &entry.backend).with_cooldown(Duration::from_secs(secs))
    }

    /// The shared chain and purpose overrides described by `config`.
    pub fn chains_from_config(config: &ModelsConfig) -> (Vec<Self>, Vec<Self>) {
        let default_chain = config
            .chain
            .iter()
            .map(|e| Self::from_entry(e, config.cooldown_secs))
            .collect();

        let overrides = Purpose::ALL
            .iter()
            .filter_map(|p| {
                config
                    .overrides
                    .get(*p)
                    .map(|e| Self::from_entry(e, config.cooldown_secs).for_purpose(*p))
            })
            .collect();

        (default_chain, overrides)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfinder_config::AppConfig;

    #[test]
    fn entry_cooldown_falls_back_to_default() {
        let mut entry = ModelEntry::new("gpt-4.1", "azure");
        assert_eq!(ModelDescriptor::from_entry(&entry, 45).cooldown, Duration::from_secs(45));

        entry.cooldown_secs = Some(5);
        assert_eq!(ModelDescriptor::from_entry(&entry, 45).cooldown, Duration::from_secs(5));
    }

    #[test]
    fn overrides_are_tagged_with_purpose() {
        let mut config = AppConfig::default();
        config.models.overrides.tool_calling = Some(ModelEntry::new("gpt-5", "azure"));

        let (chain, overrides) = ModelDescriptor::chains_from_config(&config.models);
        assert_eq!(chain.len(), 2);
        assert!(chain.iter().all(|d| d.purpose.is_none()));
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].purpose, Some(Purpose::ToolCalling));
    }

    #[test]
    fn descriptor_serializes_cooldown_as_seconds() {
        let d = ModelDescriptor::new("gpt-4.1-mini", "azure").with_cooldown(Duration::from_secs(90));
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["cooldown"], 90);
        assert!(json.get("purpose").is_none());
    }
}
