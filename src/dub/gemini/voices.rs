use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Gender {
    Male,
    Female,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gender::Male => f.write_str("male"),
            Gender::Female => f.write_str("female"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Voice {
    pub name: &'static str,
    /// Inferred from the voice name; Gemini does not publish it.
    pub gender: Gender,
}

const fn voice(name: &'static str, gender: Gender) -> Voice {
    Voice { name, gender }
}

pub const DEFAULT_VOICE: &str = "Charon";

/// Prebuilt voices accepted by the Gemini speech models.
pub const PREBUILT_VOICES: &[Voice] = &[
    voice("Zephyr", Gender::Female),
    voice("Puck", Gender::Male),
    voice("Charon", Gender::Male),
    voice("Kore", Gender::Female),
    voice("Fenrir", Gender::Male),
    voice("Leda", Gender::Female),
    voice("Orus", Gender::Male),
    voice("Aoede", Gender::Female),
    voice("Callirrhoe", Gender::Female),
    voice("Autonoe", Gender::Female),
    voice("Enceladus", Gender::Male),
    voice("Iapetus", Gender::Male),
    voice("Umbriel", Gender::Male),
    voice("Algieba", Gender::Male),
    voice("Despina", Gender::Female),
    voice("Erinome", Gender::Female),
    voice("Algenib", Gender::Male),
    voice("Rasalgethi", Gender::Male),
    voice("Laomedeia", Gender::Female),
    voice("Achernar", Gender::Male),
    voice("Alnilam", Gender::Male),
    voice("Schedar", Gender::Male),
    voice("Gacrux", Gender::Male),
    voice("Pulcherrima", Gender::Female),
    voice("Achird", Gender::Male),
    voice("Zubenelgenubi", Gender::Male),
    voice("Vindemiatrix", Gender::Female),
    voice("Sadachbia", Gender::Female),
    voice("Sadaltager", Gender::Male),
    voice("Sulafat", Gender::Female),
];

/// Case-insensitive lookup returning the canonical spelling.
pub fn find_voice(name: &str) -> Option<&'static Voice> {
    PREBUILT_VOICES
        .iter()
        .find(|voice| voice.name.eq_ignore_ascii_case(name))
}
