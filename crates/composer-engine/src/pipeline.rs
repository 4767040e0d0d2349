use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use composer_contracts::challenge::{
    build_chat_system_prompt, build_vision_user_prompt, clamp_intensity, parse_challenge,
    Challenge, GenerationRequest, MOSAIC_TITLE_INSTRUCTION, MOSAIC_TITLE_SYSTEM, VISION_SYSTEM,
};
use composer_contracts::events::{EventPayload, EventWriter};
use composer_contracts::models::{Capability, ModelSelection, ModelSelector, ModelSpec};

use crate::image_ref::{resolve_image_url, ImageSource};
use crate::providers::{
    default_provider_registry, map_object, truncate_text, ChatMessage, CompletionRequest,
    ContentPart, ModelProvider, ModelProviderRegistry, RequestPurpose, Role, SamplingConfig,
};

/// Low temperature: describe what is there.
pub const VISION_SAMPLING: SamplingConfig = SamplingConfig {
    temperature: 0.5,
    top_p: 0.9,
    repetition_penalty: 1.05,
    max_tokens: 1024,
};

pub const GENERATION_SAMPLING: SamplingConfig = SamplingConfig {
    temperature: 0.7,
    top_p: 0.8,
    repetition_penalty: 1.1,
    max_tokens: 1024,
};

pub const CHAT_SAMPLING: SamplingConfig = SamplingConfig {
    temperature: 0.8,
    top_p: 0.9,
    repetition_penalty: 1.05,
    max_tokens: 1024,
};

pub const TITLE_SAMPLING: SamplingConfig = SamplingConfig {
    temperature: 0.8,
    top_p: 0.9,
    repetition_penalty: 1.2,
    max_tokens: 64,
};

const GENERATION_NUDGE: &str = "Create the challenge now. Answer only with the JSON.";

/// One turn of a game-master conversation as callers send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Vision stage -> prompt builder -> generation stage -> parser.
///
/// Holds no per-request state; share it behind an `Arc` to serve concurrent
/// callers. Stage failures are returned as-is: there is no retry.
pub struct Pipeline {
    providers: ModelProviderRegistry,
    vision: ModelSelection,
    text: ModelSelection,
    events: Option<EventWriter>,
    image_source: ImageSource,
}

impl Pipeline {
    pub fn new(
        vision_model: Option<&str>,
        text_model: Option<&str>,
        events: Option<EventWriter>,
    ) -> Result<Self> {
        Self::from_parts(
            ModelSelector::new(None),
            default_provider_registry()?,
            vision_model,
            text_model,
            events,
        )
    }

    pub fn from_parts(
        selector: ModelSelector,
        providers: ModelProviderRegistry,
        vision_model: Option<&str>,
        text_model: Option<&str>,
        events: Option<EventWriter>,
    ) -> Result<Self> {
        let vision = select_model(&selector, &providers, vision_model, Capability::Vision)?;
        let text = select_model(&selector, &providers, text_model, Capability::Text)?;
        Ok(Self {
            providers,
            vision,
            text,
            events,
            image_source: ImageSource::default(),
        })
    }

    /// Restrict which image references the pipeline will resolve.
    pub fn with_image_source(mut self, source: ImageSource) -> Self {
        self.image_source = source;
        self
    }

    pub fn image_source(&self) -> ImageSource {
        self.image_source
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.names()
    }

    pub fn vision_model(&self) -> &ModelSpec {
        &self.vision.model
    }

    pub fn text_model(&self) -> &ModelSpec {
        &self.text.model
    }

    pub fn vision_fallback_reason(&self) -> Option<&str> {
        self.vision.fallback_reason.as_deref()
    }

    pub fn text_fallback_reason(&self) -> Option<&str> {
        self.text.fallback_reason.as_deref()
    }

    /// Produce a challenge for the image at `image_ref`.
    ///
    /// Out-of-range intensities are clamped. Unusable model output yields a
    /// fallback challenge; a failed model call is an error.
    pub fn run(&self, image_ref: &str, intensity: i64, context: Option<&str>) -> Result<Challenge> {
        let intensity = clamp_intensity(intensity);
        let run_id = format!("challenge-{}", Uuid::new_v4());
        let events = self.events.as_ref().map(|writer| writer.for_run(run_id.as_str()));
        info!(%run_id, intensity, "pipeline started");
        emit(
            events.as_ref(),
            "pipeline_started",
            map_object(json!({
                "intensity": intensity,
                "has_context": context.is_some_and(|value| !value.trim().is_empty()),
                "vision_model": self.vision.model.name,
                "text_model": self.text.model.name,
            })),
        );

        let scene = match self.describe_scene(image_ref, context) {
            Ok(scene) => scene,
            Err(err) => return Err(fail(events.as_ref(), "vision", err)),
        };
        emit(
            events.as_ref(),
            "vision_completed",
            map_object(json!({
                "model": self.vision.model.name,
                "chars": scene.chars().count(),
            })),
        );

        let request = GenerationRequest::new(&scene, intensity, context);
        let raw = match self.generate_raw(&request) {
            Ok(raw) => raw,
            Err(err) => return Err(fail(events.as_ref(), "generation", err)),
        };
        emit(
            events.as_ref(),
            "generation_completed",
            map_object(json!({
                "model": self.text.model.name,
                "chars": raw.chars().count(),
            })),
        );

        let challenge = parse_challenge(&raw, intensity);
        if challenge.is_fallback() {
            warn!(%run_id, intensity, "model output unusable; fallback challenge returned");
            emit(
                events.as_ref(),
                "challenge_fallback",
                map_object(json!({
                    "intensity": intensity,
                    "raw_excerpt": truncate_text(&raw, 200),
                    "challenge_title": challenge.challenge_title,
                })),
            );
        } else {
            info!(%run_id, title = %challenge.challenge_title, "challenge generated");
            emit(
                events.as_ref(),
                "challenge_parsed",
                map_object(json!({
                    "intensity": challenge.intensity,
                    "challenge_title": challenge.challenge_title,
                    "duration_seconds": challenge.duration_seconds,
                })),
            );
        }
        Ok(challenge)
    }

    /// Vision stage: free-text description of the scene in the image.
    pub fn describe_scene(&self, image_ref: &str, context: Option<&str>) -> Result<String> {
        let image_url = resolve_image_url(image_ref, self.image_source)?;
        let request = CompletionRequest {
            model: self.vision.model.name.clone(),
            purpose: RequestPurpose::SceneDescription,
            messages: vec![
                ChatMessage::text(Role::System, VISION_SYSTEM),
                ChatMessage {
                    role: Role::User,
                    content: vec![
                        ContentPart::ImageUrl(image_url),
                        ContentPart::Text(build_vision_user_prompt(context)),
                    ],
                },
            ],
            sampling: VISION_SAMPLING,
        };
        let scene = self.invoke(&self.vision.model, &request)?;
        debug!(chars = scene.chars().count(), "scene described");
        Ok(scene.trim().to_string())
    }

    /// Generation stage: raw model text, expected to hold a challenge JSON.
    pub fn generate_raw(&self, request: &GenerationRequest) -> Result<String> {
        let completion = CompletionRequest {
            model: self.text.model.name.clone(),
            purpose: RequestPurpose::Challenge,
            messages: vec![
                ChatMessage::text(Role::System, request.render()),
                ChatMessage::text(Role::User, GENERATION_NUDGE),
            ],
            sampling: GENERATION_SAMPLING,
        };
        let raw = self.invoke(&self.text.model, &completion)?;
        debug!(raw = %truncate_text(&raw, 200), "generation returned");
        Ok(raw)
    }

    /// Free conversation with the game master.
    pub fn chat(
        &self,
        turns: &[ChatTurn],
        system_prompt: Option<&str>,
        context: Option<&str>,
    ) -> Result<String> {
        if turns.is_empty() {
            bail!("chat requires at least one message");
        }
        let mut messages = vec![ChatMessage::text(
            Role::System,
            build_chat_system_prompt(system_prompt, context),
        )];
        for turn in turns {
            let role = Role::parse(&turn.role)
                .ok_or_else(|| anyhow!("unsupported chat role '{}'", turn.role))?;
            messages.push(ChatMessage::text(role, turn.content.clone()));
        }
        let request = CompletionRequest {
            model: self.text.model.name.clone(),
            purpose: RequestPurpose::Chat,
            messages,
            sampling: CHAT_SAMPLING,
        };
        info!(turns = turns.len(), "game master chat");
        Ok(self.invoke(&self.text.model, &request)?.trim().to_string())
    }

    /// Short poetic title for a photo mosaic.
    pub fn title_mosaic(&self, image_ref: &str) -> Result<String> {
        let image_url = resolve_image_url(image_ref, self.image_source)?;
        let request = CompletionRequest {
            model: self.vision.model.name.clone(),
            purpose: RequestPurpose::MosaicTitle,
            messages: vec![
                ChatMessage::text(Role::System, MOSAIC_TITLE_SYSTEM),
                ChatMessage {
                    role: Role::User,
                    content: vec![
                        ContentPart::ImageUrl(image_url),
                        ContentPart::Text(MOSAIC_TITLE_INSTRUCTION.to_string()),
                    ],
                },
            ],
            sampling: TITLE_SAMPLING,
        };
        let raw = self.invoke(&self.vision.model, &request)?;
        let title = clean_title(&raw);
        if title.is_empty() {
            bail!("{} returned an empty title", self.vision.model.name);
        }
        info!(%title, "mosaic title generated");
        Ok(title)
    }

    fn invoke(&self, model: &ModelSpec, request: &CompletionRequest) -> Result<String> {
        let provider = self.provider(model)?;
        provider.complete(request).with_context(|| {
            format!(
                "{} call failed ({} via {})",
                request.purpose.as_str(),
                model.name,
                model.provider
            )
        })
    }

    fn provider(&self, model: &ModelSpec) -> Result<&dyn ModelProvider> {
        self.providers
            .get(&model.provider)
            .ok_or_else(|| anyhow!("no provider registered for '{}'", model.provider))
    }
}

fn select_model(
    selector: &ModelSelector,
    providers: &ModelProviderRegistry,
    requested: Option<&str>,
    capability: Capability,
) -> Result<ModelSelection> {
    let selection = selector
        .select(requested, capability)
        .map_err(|err| anyhow!(err))?;
    if providers.get(&selection.model.provider).is_none() {
        bail!(
            "model '{}' needs provider '{}', which is not registered",
            selection.model.name,
            selection.model.provider
        );
    }
    match (&selection.requested, &selection.fallback_reason) {
        (Some(_), Some(reason)) => warn!(capability = %capability, model = %selection.model.name, "{reason}"),
        (None, Some(reason)) => debug!(capability = %capability, model = %selection.model.name, "{reason}"),
        _ => {}
    }
    Ok(selection)
}

fn clean_title(raw: &str) -> String {
    let first_line = raw
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    first_line
        .chars()
        .filter(|ch| !matches!(ch, '"' | '“' | '”'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn emit(events: Option<&EventWriter>, event_type: &str, payload: EventPayload) {
    let Some(writer) = events else {
        return;
    };
    if let Err(err) = writer.emit(event_type, payload) {
        warn!(event_type, error = %err, "event log write failed");
    }
}

fn fail(events: Option<&EventWriter>, stage: &str, err: anyhow::Error) -> anyhow::Error {
    warn!(stage, error = %format!("{err:#}"), "pipeline failed");
    let mut payload = EventPayload::new();
    payload.insert("stage".to_string(), Value::String(stage.to_string()));
    payload.insert(
        "error".to_string(),
        Value::String(truncate_text(&format!("{err:#}"), 512)),
    );
    emit(events, "pipeline_failed", payload);
    err
}
