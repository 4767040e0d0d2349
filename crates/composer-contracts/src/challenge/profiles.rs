/// Level used when a lookup misses the table.
pub const DEFAULT_PROFILE_LEVEL: i64 = 5;

const DEFAULT_PROFILE_INDEX: usize = DEFAULT_PROFILE_LEVEL as usize - 1;

/// Style descriptors the generation prompt uses for one intensity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntensityProfile {
    pub level: i64,
    pub summary: &'static str,
    pub tone: &'static str,
    pub focus: &'static str,
    pub language: &'static str,
    pub example_actions: &'static str,
}

/// One entry per level, in level order.
static PROFILES: [IntensityProfile; 10] = [
    IntensityProfile {
        level: 1,
        summary: "First sparks: long looks, holding hands, light hugs",
        tone: "tenderness and delicacy",
        focus: "eye contact, caresses on the face, intertwined hands",
        language: "poetic and affectionate",
        example_actions: "stroke your partner's face, whisper in their ear",
    },
    IntensityProfile {
        level: 2,
        summary: "Tenderness: caresses on the face, soft kisses",
        tone: "romance and complicity",
        focus: "long embraces, soft kisses, physical closeness",
        language: "intimate but restrained",
        example_actions: "kiss the neck, hug from behind",
    },
    IntensityProfile {
        level: 3,
        summary: "Connection: light massages, lingering embraces",
        tone: "awakening sensuality",
        focus: "touches on the back, thighs and hips over clothing",
        language: "suggestive, with playful double meanings",
        example_actions: "massage the shoulders, brush lips without kissing",
    },
    IntensityProfile {
        level: 4,
        summary: "Warming up: deeper kisses, caresses over clothing",
        tone: "rising erotic tension",
        focus: "light nibbles, hands exploring beneath clothing",
        language: "teasing and direct",
        example_actions: "nibble the earlobe, slide a hand along the bare back",
    },
    IntensityProfile {
        level: 5,
        summary: "Exploration: bolder touches, clothing partly removed",
        tone: "openly shared desire",
        focus: "erogenous zones, clothing coming off",
        language: "clear commands about touch",
        example_actions: "remove one piece of your partner's clothing, kiss along the torso",
    },
    IntensityProfile {
        level: 6,
        summary: "Intensity: intimate caresses, sensual whispers",
        tone: "surrender and vulnerability",
        focus: "partial nudity, slow attention to the most sensitive spots",
        language: "descriptive about where and how to touch",
        example_actions: "caress the chest, kiss the inner thighs",
    },
    IntensityProfile {
        level: 7,
        summary: "Passion: freer exploration of each other's bodies",
        tone: "explicit eroticism",
        focus: "full-body exploration with lips and hands, specific positions",
        language: "anatomically precise instructions",
        example_actions: "blindfold your partner and guide their hands, kiss slowly downward",
    },
    IntensityProfile {
        level: 8,
        summary: "Surrender: explicit intimacy with tenderness",
        tone: "light dominance and submission",
        focus: "commands, blindfolds, soft restraint, whispered directions",
        language: "assertive and frank",
        example_actions: "tell your partner to kneel, tie their wrists loosely with fabric",
    },
    IntensityProfile {
        level: 9,
        summary: "Ardor: peak intensity with ongoing consent",
        tone: "explicit intimacy with variety",
        focus: "rhythm, detailed positions, building toward climax",
        language: "graphic description of what the partners do",
        example_actions: "set a slow rhythm, change positions, hand over control of the pace",
    },
    IntensityProfile {
        level: 10,
        summary: "Fantasy: acting out the couple's own wishes",
        tone: "fantasy without limits",
        focus: "any consensual act, specific fantasies, toys",
        language: "maximum frankness, plain words",
        example_actions: "bring a toy into play, act out an agreed fantasy",
    },
];

/// Profile for `level`, or the mid-range default when the table has no entry.
pub fn profile_for(level: i64) -> &'static IntensityProfile {
    match PROFILES.iter().find(|profile| profile.level == level) {
        Some(profile) => profile,
        None => &PROFILES[DEFAULT_PROFILE_INDEX],
    }
}
