use std::sync::LazyLock;

use regex::Regex;

/// Longest user-supplied text, in characters, that reaches a prompt.
pub const MAX_INPUT_CHARS: usize = 2000;

/// Neutral text substituted for anything that looks like an injection attempt.
/// It must never match one of the patterns below.
pub const SANITIZED_PLACEHOLDER: &str = "[CONTEXT]";

static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)ignore\s*(?:todas?|all|previous|anterior|the\s+above)",
        r"(?i)esqueça\s*(?:tudo|instruções|instrucoes)",
        r"(?i)forget\s*(?:everything|all|your\s+instructions)",
        r"(?i)(?:novo|new)\s*system\s*prompt",
        r"(?i)você\s*agora\s*é",
        r"(?i)voce\s*agora\s*e",
        r"(?i)you\s*are\s*now",
        r"(?i)mude\s*de\s*papel",
        r"(?i)change\s*(?:your\s*)?role",
        r"(?i)desconsidere",
        r"(?i)disregard",
        r"<\|im_start\|>",
        r"<\|im_end\|>",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("invalid injection regex"))
    .collect()
});

/// Neutralize injection phrases and cap the length of free text before it is
/// embedded in a prompt.
pub fn sanitize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut cleaned = text.to_string();
    for pattern in INJECTION_PATTERNS.iter() {
        if pattern.is_match(&cleaned) {
            cleaned = pattern
                .replace_all(&cleaned, SANITIZED_PLACEHOLDER)
                .into_owned();
        }
    }

    let truncated: String = cleaned.chars().take(MAX_INPUT_CHARS).collect();
    truncated.trim().to_string()
}
