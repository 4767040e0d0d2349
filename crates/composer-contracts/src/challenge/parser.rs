use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::fallback::fallback_challenge;
use super::Challenge;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)```(?:json)?\s*([\s\S]*?)\s*```").expect("invalid code fence regex")
});

const RAW_EXCERPT_CHARS: usize = 200;

/// The shape a usable model answer must have. Anything else the model adds is
/// ignored, including its own `error` key.
#[derive(Debug, Deserialize)]
struct ModelChallenge {
    challenge_title: String,
    challenge_text: String,
    rationale: String,
    duration_seconds: u64,
    intensity: i64,
}

/// Turn raw model output into a [`Challenge`].
///
/// Never fails: when no valid object with every required field can be found,
/// the nearest pre-written fallback for `intensity` is returned instead.
pub fn parse_challenge(raw: &str, intensity: i64) -> Challenge {
    match extract_challenge(raw) {
        Ok(parsed) => Challenge {
            challenge_title: parsed.challenge_title,
            challenge_text: parsed.challenge_text,
            rationale: parsed.rationale,
            duration_seconds: parsed.duration_seconds,
            intensity: parsed.intensity,
            error: None,
        },
        Err(err) => {
            warn!(
                error = %err,
                raw = %excerpt(raw),
                "challenge JSON parse failed; using fallback"
            );
            fallback_challenge(intensity)
        }
    }
}

fn extract_challenge(raw: &str) -> anyhow::Result<ModelChallenge> {
    let candidate = json_candidate(raw);
    let value: Value = serde_json::from_str(candidate)?;
    if !value.is_object() {
        anyhow::bail!("model output is not a JSON object");
    }
    Ok(serde_json::from_value(value)?)
}

fn json_candidate(raw: &str) -> &str {
    let mut cleaned = raw.trim();
    if let Some(fenced) = CODE_FENCE
        .captures(cleaned)
        .and_then(|captures| captures.get(1))
    {
        cleaned = fenced.as_str();
    }
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if end > start {
            return &cleaned[start..=end];
        }
    }
    cleaned
}

fn excerpt(raw: &str) -> String {
    if raw.chars().count() <= RAW_EXCERPT_CHARS {
        return raw.to_string();
    }
    raw.chars().take(RAW_EXCERPT_CHARS).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::{FALLBACK_ERROR, REQUIRED_FIELDS};
    use super::*;

    const CLEAN: &str = r#"{"challenge_title":"Slow Dance","challenge_text":"Hold each other close and sway without music.","rationale":"Moving together builds closeness.","duration_seconds":180,"intensity":3}"#;

    fn assert_fallback(challenge: &Challenge, intensity: i64) {
        assert_eq!(challenge.error.as_deref(), Some(FALLBACK_ERROR));
        assert_eq!(challenge.intensity, intensity);
        assert!(!challenge.challenge_title.is_empty());
        assert!(!challenge.challenge_text.is_empty());
        assert!(!challenge.rationale.is_empty());
        assert!(challenge.duration_seconds > 0);
    }

    #[test]
    fn clean_json_is_returned_unchanged() {
        let challenge = parse_challenge(CLEAN, 3);
        assert_eq!(challenge.challenge_title, "Slow Dance");
        assert_eq!(
            challenge.challenge_text,
            "Hold each other close and sway without music."
        );
        assert_eq!(challenge.rationale, "Moving together builds closeness.");
        assert_eq!(challenge.duration_seconds, 180);
        assert_eq!(challenge.intensity, 3);
        assert_eq!(challenge.error, None);
    }

    #[test]
    fn fenced_json_after_prose_is_extracted() {
        let raw = format!("Here you go: ```json\n{CLEAN}\n```");
        let challenge = parse_challenge(&raw, 3);
        assert_eq!(challenge.challenge_title, "Slow Dance");
        assert_eq!(challenge.error, None);
    }

    #[test]
    fn leading_fence_without_language_tag_is_extracted() {
        let raw = format!("```\n{CLEAN}\n```");
        assert_eq!(parse_challenge(&raw, 3).error, None);
    }

    #[test]
    fn json_embedded_in_prose_is_extracted() {
        let raw = format!("Sure! {CLEAN} Enjoy.");
        assert_eq!(parse_challenge(&raw, 3).challenge_title, "Slow Dance");
    }

    #[test]
    fn model_values_win_over_requested_intensity() {
        let challenge = parse_challenge(CLEAN, 9);
        assert_eq!(challenge.intensity, 3);
        assert_eq!(challenge.error, None);
    }

    #[test]
    fn model_supplied_error_key_is_dropped() {
        let raw = json!({
            "challenge_title": "A",
            "challenge_text": "B",
            "rationale": "C",
            "duration_seconds": 60,
            "intensity": 2,
            "error": "pretend"
        })
        .to_string();
        assert_eq!(parse_challenge(&raw, 2).error, None);
    }

    #[test]
    fn non_json_prose_falls_back() {
        let challenge = parse_challenge("I'd rather describe a sunset.", 4);
        assert_fallback(&challenge, 4);
        assert_eq!(challenge.challenge_title, "Guided Caress");
    }

    #[test]
    fn truncated_json_falls_back() {
        let truncated = &CLEAN[..CLEAN.len() - 1];
        assert_fallback(&parse_challenge(truncated, 7), 7);
    }

    #[test]
    fn each_missing_field_falls_back() -> anyhow::Result<()> {
        for field in REQUIRED_FIELDS {
            let mut value: Value = serde_json::from_str(CLEAN)?;
            if let Some(object) = value.as_object_mut() {
                object.remove(field);
            }
            let challenge = parse_challenge(&value.to_string(), 5);
            assert_fallback(&challenge, 5);
        }
        Ok(())
    }

    #[test]
    fn wrongly_typed_field_falls_back() {
        let raw = CLEAN.replace("180", "\"three minutes\"");
        assert_fallback(&parse_challenge(&raw, 1), 1);
    }

    #[test]
    fn json_array_falls_back() {
        assert_fallback(&parse_challenge("[1, 2, 3]", 10), 10);
    }

    #[test]
    fn empty_output_falls_back() {
        assert_fallback(&parse_challenge("", 6), 6);
        assert_fallback(&parse_challenge("}{", 6), 6);
    }

    #[test]
    fn fallback_choice_is_repeatable() {
        let raw = "not json at all";
        for level in 1..=10 {
            assert_eq!(parse_challenge(raw, level), parse_challenge(raw, level));
        }
    }
}
