//! Emotion labels attached to assistant replies.
//!
//! The dialogue service annotates each reply with a free-form label. Only a
//! closed set is meaningful to the session core; anything else (including the
//! service's `"crisis"` label) collapses to [`Emotion::Neutral`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of emotional tones understood by the session core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    /// Neutral or unrecognised tone.
    Neutral,
}

impl Emotion {
    /// All members, in table order.
    pub const ALL: [Emotion; 6] = [
        Emotion::Joy,
        Emotion::Sadness,
        Emotion::Anger,
        Emotion::Fear,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    /// Parse a service label. Case and surrounding whitespace are ignored;
    /// unknown labels map to [`Emotion::Neutral`].
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "joy" => Self::Joy,
            "sadness" => Self::Sadness,
            "anger" => Self::Anger,
            "fear" => Self::Fear,
            "surprise" => Self::Surprise,
            _ => Self::Neutral,
        }
    }

    /// Lowercase label as used on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Joy => "joy",
            Self::Sadness => "sadness",
            Self::Anger => "anger",
            Self::Fear => "fear",
            Self::Surprise => "surprise",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
