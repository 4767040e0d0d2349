use super::registry::{Capability, ModelRegistry, ModelSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    /// Resolve `requested` for `capability`, falling back to the first
    /// registered model that supports it.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: Capability,
    ) -> Result<ModelSelection, String> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let (fallback_reason, requested_text) = if let Some(requested_value) = requested {
            if let Some(model) = self.registry.ensure(requested_value, capability) {
                return Ok(ModelSelection {
                    model,
                    requested: Some(requested_value.to_string()),
                    fallback_reason: None,
                });
            }
            (
                Some(format!(
                    "Requested model '{requested_value}' unavailable for capability '{capability}'."
                )),
                Some(requested_value.to_string()),
            )
        } else {
            (Some("No model specified; using default.".to_string()), None)
        };

        let candidates = self.registry.by_capability(capability);
        let Some(model) = candidates.first().cloned() else {
            return Err(format!(
                "No models available for capability '{capability}'."
            ));
        };
        Ok(ModelSelection {
            model,
            requested: requested_text,
            fallback_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;

    fn vision_model(name: &str) -> ModelSpec {
        ModelSpec {
            name: name.to_string(),
            provider: "dryrun".to_string(),
            capabilities: vec![Capability::Vision],
            context_window: None,
        }
    }

    fn registry(models: Vec<ModelSpec>) -> ModelRegistry {
        let mut map = IndexMap::new();
        for model in models {
            map.insert(model.name.clone(), model);
        }
        ModelRegistry::new(Some(map))
    }

    #[test]
    fn selector_falls_back_when_requested_model_unavailable() {
        let selection = ModelSelector::new(Some(registry(vec![vision_model("vision-a")])))
            .select(Some("missing"), Capability::Vision)
            .unwrap();
        assert_eq!(selection.model.name, "vision-a");
        assert_eq!(selection.requested.as_deref(), Some("missing"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested model 'missing' unavailable for capability 'vision'.")
        );
    }

    #[test]
    fn selector_walks_the_chain_in_registry_order() {
        let selection = ModelSelector::new(Some(registry(vec![
            vision_model("primary"),
            vision_model("secondary"),
        ])))
        .select(None, Capability::Vision)
        .unwrap();
        assert_eq!(selection.model.name, "primary");
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("No model specified; using default.")
        );
    }

    #[test]
    fn blank_request_is_treated_as_unspecified() {
        let selection = ModelSelector::new(Some(registry(vec![vision_model("primary")])))
            .select(Some("   "), Capability::Vision)
            .unwrap();
        assert_eq!(selection.requested, None);
    }

    #[test]
    fn exact_match_has_no_fallback_reason() {
        let selection = ModelSelector::new(None)
            .select(Some("dryrun-text-1"), Capability::Text)
            .unwrap();
        assert_eq!(selection.model.provider, "dryrun");
        assert_eq!(selection.fallback_reason, None);
    }

    #[test]
    fn selector_errors_when_no_models_for_capability() {
        let err = ModelSelector::new(Some(registry(vec![vision_model("vision-only")])))
            .select(Some("vision-only"), Capability::Text)
            .err()
            .unwrap_or_default();
        assert_eq!(err, "No models available for capability 'text'.");
    }
}
