use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};

use composer_contracts::challenge::{fallback_challenge, MIN_INTENSITY};

const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// `http(s)` or `data:` URL.
    ImageUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentPart::Text(text.into())],
        }
    }

    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::ImageUrl(_) => None,
            })
            .collect::<Vec<&str>>()
            .join("\n")
    }
}

/// Per-call sampling knobs, passed through to the provider untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub max_tokens: u32,
}

/// What a completion is for. Providers may ignore it; the dryrun provider
/// uses it to pick a canned answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPurpose {
    SceneDescription,
    Challenge,
    Chat,
    MosaicTitle,
}

impl RequestPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestPurpose::SceneDescription => "scene_description",
            RequestPurpose::Challenge => "challenge",
            RequestPurpose::Chat => "chat",
            RequestPurpose::MosaicTitle => "mosaic_title",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub purpose: RequestPurpose,
    pub messages: Vec<ChatMessage>,
    pub sampling: SamplingConfig,
}

/// "Send messages, get text back." One call, no retry.
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[derive(Default)]
pub struct ModelProviderRegistry {
    providers: BTreeMap<String, Box<dyn ModelProvider>>,
}

impl ModelProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ModelProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ModelProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

pub fn default_provider_registry() -> Result<ModelProviderRegistry> {
    let mut providers = ModelProviderRegistry::new();
    providers.register(DryrunProvider);
    providers.register(OpenAiCompatProvider::from_env()?);
    Ok(providers)
}

/// OpenAI-style `chat/completions` endpoint: vLLM, OpenRouter, Ollama `/v1`
/// and friends.
pub struct OpenAiCompatProvider {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl OpenAiCompatProvider {
    pub fn from_env() -> Result<Self> {
        let api_base = non_empty_env("COMPOSER_API_BASE")
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_key = non_empty_env("COMPOSER_API_KEY")
            .or_else(|| non_empty_env("OPENROUTER_API_KEY"))
            .or_else(|| non_empty_env("OPENAI_API_KEY"));
        let timeout_secs = non_empty_env("COMPOSER_HTTP_TIMEOUT_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self::new(api_base, api_key, Duration::from_secs(timeout_secs))
    }

    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("failed building HTTP client")?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            http,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

impl ModelProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let endpoint = self.endpoint();
        let payload = build_chat_payload(request);
        let mut call = self.http.post(&endpoint).json(&payload);
        if let Some(api_key) = &self.api_key {
            call = call.bearer_auth(api_key);
        }
        let response = call
            .send()
            .with_context(|| format!("chat completion request failed ({endpoint})"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .with_context(|| format!("{} response body read failed", request.model))?;
        completion_from_body(&request.model, status, &body)
    }
}

/// Offline provider with canned, deterministic answers.
pub struct DryrunProvider;

const DRYRUN_SCENE: &str = "Couple sitting close on a sofa, hands touching. Casual clothes, soft warm lighting in a private living room. Relaxed, affectionate atmosphere.";
const DRYRUN_TITLE: &str = "Our Quiet Constellation";

impl ModelProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let text = match request.purpose {
            RequestPurpose::SceneDescription => DRYRUN_SCENE.to_string(),
            RequestPurpose::MosaicTitle => DRYRUN_TITLE.to_string(),
            RequestPurpose::Challenge => {
                let prompt = request
                    .messages
                    .iter()
                    .map(ChatMessage::text_content)
                    .collect::<Vec<String>>()
                    .join("\n");
                let level = intensity_from_prompt(&prompt).unwrap_or(MIN_INTENSITY);
                let template = fallback_challenge(level);
                json!({
                    "challenge_title": template.challenge_title,
                    "challenge_text": template.challenge_text,
                    "rationale": template.rationale,
                    "duration_seconds": template.duration_seconds,
                    "intensity": level,
                })
                .to_string()
            }
            RequestPurpose::Chat => {
                let last_user = request
                    .messages
                    .iter()
                    .rev()
                    .find(|message| message.role == Role::User)
                    .map(ChatMessage::text_content)
                    .unwrap_or_default();
                format!("(dryrun) Take a slow breath together, then: {}", last_user.trim())
            }
        };
        Ok(text)
    }
}

fn intensity_from_prompt(prompt: &str) -> Option<i64> {
    let marker = "### INTENSITY LEVEL: ";
    let start = prompt.find(marker)? + marker.len();
    let rest = &prompt[start..];
    let end = rest.find('/')?;
    rest[..end].trim().parse().ok()
}

pub(crate) fn build_chat_payload(request: &CompletionRequest) -> Value {
    let messages = request
        .messages
        .iter()
        .map(|message| {
            let content = match message.content.as_slice() {
                [ContentPart::Text(text)] => Value::String(text.clone()),
                parts => Value::Array(
                    parts
                        .iter()
                        .map(|part| match part {
                            ContentPart::Text(text) => json!({"type": "text", "text": text}),
                            ContentPart::ImageUrl(url) => {
                                json!({"type": "image_url", "image_url": {"url": url}})
                            }
                        })
                        .collect(),
                ),
            };
            json!({"role": message.role.as_str(), "content": content})
        })
        .collect::<Vec<Value>>();

    json!({
        "model": request.model,
        "messages": messages,
        "temperature": request.sampling.temperature,
        "top_p": request.sampling.top_p,
        "repetition_penalty": request.sampling.repetition_penalty,
        "max_tokens": request.sampling.max_tokens,
    })
}

/// `choices[0].message.content`, either a string or an array of text parts.
pub(crate) fn extract_chat_text(response: &Value) -> Option<String> {
    let content = response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))?;
    let text = match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<&str>>()
            .join(""),
        _ => return None,
    };
    if text.trim().is_empty() {
        return None;
    }
    Some(text)
}

/// Status and body of a chat/completions response, reduced to its text.
pub(crate) fn completion_from_body(model: &str, status: u16, body: &str) -> Result<String> {
    if !(200..300).contains(&status) {
        bail!("{model} request failed ({status}): {}", truncate_text(body, 512));
    }
    let parsed: Value = serde_json::from_str(body)
        .with_context(|| format!("{model} returned invalid JSON payload"))?;
    let Some(text) = extract_chat_text(&parsed) else {
        bail!(
            "{model} returned no completion text: {}",
            truncate_text(&parsed.to_string(), 512)
        );
    };
    Ok(text)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
