//! Challenge generation contract: intensity tables, prompt rendering and the
//! tolerant parser that turns model output into a [`Challenge`].

mod fallback;
mod parser;
mod profiles;
mod prompts;
mod sanitize;

use serde::{Deserialize, Serialize};

pub use fallback::{fallback_challenge, nearest_fallback_level, FALLBACK_DURATION_SECONDS, FALLBACK_ERROR};
pub use parser::parse_challenge;
pub use profiles::{profile_for, IntensityProfile, DEFAULT_PROFILE_LEVEL};
pub use prompts::{
    build_chat_system_prompt, build_prompt, build_vision_user_prompt, GenerationRequest,
    CHAT_BASE_SYSTEM, GAME_MASTER_SYSTEM, MOSAIC_TITLE_INSTRUCTION, MOSAIC_TITLE_SYSTEM,
    VISION_SYSTEM,
};
pub use sanitize::{sanitize, MAX_INPUT_CHARS, SANITIZED_PLACEHOLDER};

pub const MIN_INTENSITY: i64 = 1;
pub const MAX_INTENSITY: i64 = 10;

/// Field names every model answer must carry.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "challenge_title",
    "challenge_text",
    "rationale",
    "duration_seconds",
    "intensity",
];

/// A single challenge handed back to the caller.
///
/// `error` is only present when the model output could not be used and a
/// pre-written fallback was substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_title: String,
    pub challenge_text: String,
    pub rationale: String,
    pub duration_seconds: u64,
    pub intensity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Challenge {
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

/// Out-of-range levels are pulled to the nearest bound rather than rejected.
pub fn clamp_intensity(level: i64) -> i64 {
    level.clamp(MIN_INTENSITY, MAX_INTENSITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_pulls_out_of_range_levels_to_bounds() {
        assert_eq!(clamp_intensity(0), 1);
        assert_eq!(clamp_intensity(-40), 1);
        assert_eq!(clamp_intensity(11), 10);
        assert_eq!(clamp_intensity(7), 7);
    }

    #[test]
    fn error_marker_is_omitted_when_absent() -> anyhow::Result<()> {
        let challenge = Challenge {
            challenge_title: "T".to_string(),
            challenge_text: "B".to_string(),
            rationale: "R".to_string(),
            duration_seconds: 60,
            intensity: 2,
            error: None,
        };
        let value = serde_json::to_value(&challenge)?;
        let keys: Vec<&str> = value
            .as_object()
            .map(|object| object.keys().map(String::as_str).collect())
            .unwrap_or_default();
        assert_eq!(keys.len(), REQUIRED_FIELDS.len());
        for field in REQUIRED_FIELDS {
            assert!(keys.contains(&field), "missing {field}");
        }
        Ok(())
    }
}
