use std::collections::BTreeMap;
use std::sync::LazyLock;

use super::Challenge;

/// Marker stamped on every substituted challenge.
pub const FALLBACK_ERROR: &str = "fallback_response";
pub const FALLBACK_DURATION_SECONDS: u64 = 120;

struct FallbackTemplate {
    title: &'static str,
    text: &'static str,
    rationale: &'static str,
}

// Sparse on purpose: levels in between borrow their nearest neighbour.
static FALLBACKS: LazyLock<BTreeMap<i64, FallbackTemplate>> = LazyLock::new(|| {
    BTreeMap::from([
        (
            1,
            FallbackTemplate {
                title: "Deep Gaze",
                text: "Sit face to face and look into each other's eyes for 60 seconds in silence, holding hands.",
                rationale: "Sustained eye contact releases oxytocin and builds connection.",
            },
        ),
        (
            3,
            FallbackTemplate {
                title: "Guided Caress",
                text: "One partner guides the other's hand across their own body, showing where they like to be touched while describing the sensations.",
                rationale: "Saying what you like out loud strengthens intimacy.",
            },
        ),
        (
            5,
            FallbackTemplate {
                title: "Sensory Exploration",
                text: "One partner closes their eyes while the other runs objects of different textures over their skin: ice, a feather, silk.",
                rationale: "Surprising the senses builds anticipation.",
            },
        ),
        (
            7,
            FallbackTemplate {
                title: "Blindfold Discoveries",
                text: "Blindfolded, one partner must guess which part of their body the other is kissing.",
                rationale: "The blindfold heightens sensation and sparks curiosity.",
            },
        ),
        (
            10,
            FallbackTemplate {
                title: "Fantasy Fulfilled",
                text: "Share a fantasy out loud and choose one action from it to carry out together right now.",
                rationale: "Vulnerability followed by follow-through deepens intimacy.",
            },
        ),
    ])
});

/// Table level closest to `level`; ties go to the lower level.
pub fn nearest_fallback_level(level: i64) -> i64 {
    FALLBACKS
        .keys()
        .copied()
        .min_by_key(|candidate| candidate.abs_diff(level))
        .unwrap_or(1)
}

/// Pre-written challenge for `level`, stamped with that level and the
/// fallback marker.
pub fn fallback_challenge(level: i64) -> Challenge {
    let closest = nearest_fallback_level(level);
    let (title, text, rationale) = FALLBACKS
        .get(&closest)
        .map(|template| (template.title, template.text, template.rationale))
        .unwrap_or_default();
    Challenge {
        challenge_title: title.to_string(),
        challenge_text: text.to_string(),
        rationale: rationale.to_string(),
        duration_seconds: FALLBACK_DURATION_SECONDS,
        intensity: level,
        error: Some(FALLBACK_ERROR.to_string()),
    }
}
