mod image_ref;
mod pipeline;
mod providers;

pub use image_ref::{is_remote_image_ref, resolve_image_url, ImageSource, MAX_VISION_DIM};
pub use pipeline::{
    ChatTurn, Pipeline, CHAT_SAMPLING, GENERATION_SAMPLING, TITLE_SAMPLING, VISION_SAMPLING,
};
pub use providers::{
    default_provider_registry, ChatMessage, CompletionRequest, ContentPart, DryrunProvider,
    ModelProvider, ModelProviderRegistry, OpenAiCompatProvider, RequestPurpose, Role,
    SamplingConfig,
};
