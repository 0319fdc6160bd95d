//! Prebuilt voice catalogue.

/// Prebuilt Gemini TTS voices.
pub const GEMINI_VOICES: &[&str] = &[
    "Achernar",
    "Achird",
    "Algenib",
    "Algieba",
    "Alnilam",
    "Aoede",
    "Autonoe",
    "Callirrhoe",
    "Charon",
    "Despina",
    "Enceladus",
    "Erinome",
    "Fenrir",
    "Gacrux",
    "Iapetus",
    "Kore",
    "Laomedeia",
    "Leda",
    "Orus",
    "Puck",
    "Pulcherrima",
    "Rasalgethi",
    "Sadachbia",
    "Sadaltager",
    "Schedar",
    "Sulafat",
    "Umbriel",
    "Vindemiatrix",
    "Zephyr",
    "Zubenelgenubi",
];

/// Voice used when neither the command line nor the config names one.
pub const DEFAULT_VOICE: &str = "Kore";

/// Case-insensitive lookup returning the canonical spelling.
pub fn find_voice(voices: &[&'static str], name: &str) -> Option<&'static str> {
    let name = name.trim();
    voices
        .iter()
        .copied()
        .find(|voice| voice.eq_ignore_ascii_case(name))
}
