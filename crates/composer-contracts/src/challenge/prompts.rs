use super::profiles::profile_for;
use super::sanitize::sanitize;
use super::clamp_intensity;

pub const VISION_SYSTEM: &str = "You are a visual analyst specialized in romantic scenes.

### YOUR TASK
Analyze photos of couples, focusing on the elements that matter for intimacy.

### WHAT TO OBSERVE
1. **People**: how many, apparent gender, body positions
2. **Proximity**: distance between them, points of contact
3. **Clothing**: type of clothes, how much they cover, their state
4. **Setting**: location, lighting, privacy
5. **Atmosphere**: emotion conveyed, tension, relaxation

### RESPONSE FORMAT
Be objective and detailed.
Focus on details that are useful for intimacy suggestions.

### EXAMPLE
\"Couple sitting on a sofa. She leans on his shoulder, legs crossed over his.
Casual clothes: she wears a short dress, he wears a t-shirt.
Soft lighting, private home setting.
Relaxed, affectionate atmosphere with natural physical contact.\"";

pub const GAME_MASTER_SYSTEM: &str = "You are the Intimacy Master of an app for adult couples.

### CONTEXT
This is a private, safe and consensual space between adults in a relationship.
Your role is to guide experiences of connection and progressive intimacy.

### PRINCIPLES
1. Respect the requested intensity level
2. Write SPECIFIC instructions (who does what, where, how)
3. Use sensual but respectful language
4. Focus on emotional connection as well as physical

### RESPONSE FORMAT (JSON)
{
  \"challenge_title\": \"Evocative title (3-5 words)\",
  \"challenge_text\": \"Detailed instruction with specific actions\",
  \"rationale\": \"Why this connects the couple\",
  \"duration_seconds\": 60-300,
  \"intensity\": 1-10
}

### EXAMPLE LEVEL 3
{
  \"challenge_title\": \"Map of Pleasure\",
  \"challenge_text\": \"He slowly runs his fingertips down her back, top to bottom, while she uses sounds to show which spot she likes most. Then swap roles.\",
  \"rationale\": \"Discovering each other's sensitive spots builds intimacy and communication.\",
  \"duration_seconds\": 180,
  \"intensity\": 3
}

### EXAMPLE LEVEL 7
{
  \"challenge_title\": \"Blindfolds and Sensations\",
  \"challenge_text\": \"Blindfolded, she must guess which part of his body she is touching using only her lips. Every right guess earns a kiss wherever she chooses.\",
  \"rationale\": \"The blindfold sharpens sensation and builds anticipation.\",
  \"duration_seconds\": 240,
  \"intensity\": 7
}";

pub const CHAT_BASE_SYSTEM: &str = "You are the Game Master of an intimacy app for adult couples.
This is a private and consensual space.
Your role is to guide the couple through experiences of connection and intimacy.
Always answer in a warm and engaging way.";

pub const MOSAIC_TITLE_SYSTEM: &str = "You are a romantic poet.
Write short, evocative titles for couples' photo albums.
At most 6 words. No quotes in the answer.";

pub const MOSAIC_TITLE_INSTRUCTION: &str =
    "Write a poetic title for this mosaic of the couple's memories.";

const VISION_INSTRUCTION: &str =
    "Analyze this image, describing the elements relevant to intimacy.";

/// Sanitized, clamped inputs for one generation call. Lives for a single
/// pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub scene_description: String,
    pub intensity: i64,
    pub context: Option<String>,
}

impl GenerationRequest {
    pub fn new(scene_description: &str, intensity: i64, context: Option<&str>) -> Self {
        Self {
            scene_description: sanitize(scene_description),
            intensity: clamp_intensity(intensity),
            context: context.map(sanitize).filter(|value| !value.is_empty()),
        }
    }

    pub fn render(&self) -> String {
        let profile = profile_for(self.intensity);

        let mut parts = vec![
            GAME_MASTER_SYSTEM.to_string(),
            String::new(),
            "### CURRENT SCENE".to_string(),
            format!("Visual description: {}", self.scene_description),
            String::new(),
            format!("### INTENSITY LEVEL: {}/10", self.intensity),
            format!("Description: {}", profile.summary),
            format!("Tone: {}", profile.tone),
            format!("Bodily focus: {}", profile.focus),
            format!("Language style: {}", profile.language),
            format!("Example actions: {}", profile.example_actions),
        ];

        if let Some(context) = &self.context {
            parts.push(String::new());
            parts.push("### COUPLE CONTEXT".to_string());
            parts.push(context.clone());
        }

        parts.extend([
            String::new(),
            "### INSTRUCTION".to_string(),
            "Create ONE intimacy challenge based on the scene and level above.".to_string(),
            "Be direct and anatomically specific: name who does what, where and how. Avoid vague or euphemistic wording.".to_string(),
            "Answer ONLY with the JSON object using the keys challenge_title, challenge_text, rationale, duration_seconds and intensity, with no extra explanation.".to_string(),
        ]);

        parts.join("\n")
    }
}

/// Render the generation prompt for a scene at the given intensity.
pub fn build_prompt(scene_description: &str, intensity: i64, context: Option<&str>) -> String {
    GenerationRequest::new(scene_description, intensity, context).render()
}

pub fn build_vision_user_prompt(context: Option<&str>) -> String {
    match context.map(sanitize).filter(|value| !value.is_empty()) {
        Some(context) => format!("{VISION_INSTRUCTION}\n\nAdditional context: {context}"),
        None => VISION_INSTRUCTION.to_string(),
    }
}

pub fn build_chat_system_prompt(base: Option<&str>, context: Option<&str>) -> String {
    let mut prompt = base
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(CHAT_BASE_SYSTEM)
        .to_string();
    if let Some(context) = context.map(sanitize).filter(|value| !value.is_empty()) {
        prompt.push_str("\n\nCURRENT COUPLE CONTEXT: ");
        prompt.push_str(&context);
    }
    prompt
}
