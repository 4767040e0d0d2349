use std::fmt;

use indexmap::IndexMap;

/// What a model can be asked to do by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Image in, text out.
    Vision,
    /// Text in, text out.
    Text,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Vision => "vision",
            Capability::Text => "text",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<Capability>,
    pub context_window: Option<u64>,
}

impl ModelSpec {
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Known models in preference order. The first model registered for a
/// capability is the default for that capability.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: Capability) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: Capability) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert =
        |name: &str, provider: &str, capabilities: &[Capability], context_window: Option<u64>| {
            map.insert(
                name.to_string(),
                ModelSpec {
                    name: name.to_string(),
                    provider: provider.to_string(),
                    capabilities: capabilities.to_vec(),
                    context_window,
                },
            );
        };

    // Vision models, most preferred first.
    insert(
        "fancyfeast/llama-joycaption-beta-one-hf-llava",
        "openai-compat",
        &[Capability::Vision],
        Some(8192),
    );
    insert(
        "Guilherme34/Llama-3.2-11b-vision-uncensored",
        "openai-compat",
        &[Capability::Vision],
        Some(8192),
    );
    insert(
        "Qwen/Qwen2.5-VL-7B-Instruct",
        "openai-compat",
        &[Capability::Vision],
        Some(8192),
    );

    insert(
        "Qwen/Qwen2.5-72B-Instruct-AWQ",
        "openai-compat",
        &[Capability::Text],
        Some(2048),
    );
    insert(
        "anyisalin/Midnight-Rose-70B-v2.0.3-AWQ",
        "openai-compat",
        &[Capability::Text],
        Some(2048),
    );

    insert("dryrun-vision-1", "dryrun", &[Capability::Vision], None);
    insert("dryrun-text-1", "dryrun", &[Capability::Text], Some(8192));

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_prefers_hosted_models_over_dryrun() {
        let registry = ModelRegistry::new(None);
        let vision = registry.by_capability(Capability::Vision);
        assert_eq!(
            vision.first().map(|model| model.name.as_str()),
            Some("fancyfeast/llama-joycaption-beta-one-hf-llava")
        );
        assert_eq!(
            vision.last().map(|model| model.provider.as_str()),
            Some("dryrun")
        );
        let text = registry.by_capability(Capability::Text);
        assert_eq!(
            text.first().map(|model| model.name.as_str()),
            Some("Qwen/Qwen2.5-72B-Instruct-AWQ")
        );
    }

    #[test]
    fn ensure_rejects_model_without_capability() {
        let registry = ModelRegistry::new(None);
        assert!(registry
            .ensure("dryrun-text-1", Capability::Vision)
            .is_none());
        assert!(registry.ensure("dryrun-text-1", Capability::Text).is_some());
        assert!(registry.ensure("missing", Capability::Text).is_none());
    }
}
