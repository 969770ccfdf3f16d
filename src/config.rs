//! Configuration types for the conversation session.

use crate::emotion::Emotion;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for a chat session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Remote dialogue service settings.
    pub service: ServiceConfig,
    /// Conversation behaviour settings.
    pub conversation: ConversationConfig,
    /// Ambient mood audio settings.
    pub ambient: AmbientConfig,
    /// Speech capture settings.
    pub capture: CaptureConfig,
    /// Spoken reply settings.
    pub playback: PlaybackConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Remote dialogue service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Chat endpoint URL.
    pub endpoint: String,
    /// User identifier sent with every request.
    pub user_id: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/api/chat".to_owned(),
            user_id: "user1".to_owned(),
            timeout_secs: 30,
        }
    }
}

/// Conversation behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Assistant text appended when the service cannot be reached.
    pub fallback_text: String,
    /// Speak assistant replies aloud.
    pub speak_replies: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            fallback_text: "Server error. Please try again.".to_owned(),
            speak_replies: true,
        }
    }
}

/// Ambient mood audio configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientConfig {
    /// Looping background track (None = no ambient output).
    pub track: Option<PathBuf>,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
    /// Volume used when playback starts and for tones without a mapping.
    pub baseline_volume: f32,
    /// Number of equal steps a fade is divided into.
    pub fade_steps: u32,
    /// Fade duration when the mood changes, in ms.
    pub retarget_fade_ms: u64,
    /// Fade-out duration when ambient audio is switched off, in ms.
    pub stop_fade_ms: u64,
    /// Target volume per emotional tone.
    pub volumes: MoodVolumes,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            track: None,
            output_device: None,
            baseline_volume: 0.4,
            fade_steps: 20,
            retarget_fade_ms: 1500,
            stop_fade_ms: 800,
            volumes: MoodVolumes::default(),
        }
    }
}

impl AmbientConfig {
    /// Target volume for `emotion`, clamped to `[0, 1]`.
    #[must_use]
    pub fn volume_for(&self, emotion: Emotion) -> f32 {
        self.volumes.for_emotion(emotion, self.baseline_volume)
    }
}

/// Emotion → ambient volume table.
///
/// Subdued tones sit below the baseline, uplifting tones above it. Anger and
/// neutral follow `baseline_volume` unless set here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MoodVolumes {
    pub joy: f32,
    pub sadness: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anger: Option<f32>,
    pub fear: f32,
    pub surprise: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neutral: Option<f32>,
}

impl Default for MoodVolumes {
    fn default() -> Self {
        Self {
            joy: 0.6,
            sadness: 0.2,
            anger: None,
            fear: 0.2,
            surprise: 0.55,
            neutral: None,
        }
    }
}

impl MoodVolumes {
    /// Target volume for `emotion`, clamped to `[0, 1]`. Unset entries use `baseline`.
    #[must_use]
    pub fn for_emotion(&self, emotion: Emotion, baseline: f32) -> f32 {
        let v = match emotion {
            Emotion::Joy => self.joy,
            Emotion::Sadness => self.sadness,
            Emotion::Anger => self.anger.unwrap_or(baseline),
            Emotion::Fear => self.fear,
            Emotion::Surprise => self.surprise,
            Emotion::Neutral => self.neutral.unwrap_or(baseline),
        };
        v.clamp(0.0, 1.0)
    }
}

/// Speech capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Recognition locale (BCP 47).
    pub locale: String,
    /// Keep listening after the first utterance.
    pub continuous: bool,
    /// Ask the engine for interim (non-final) results.
    pub interim_results: bool,
    /// Wait after force-stopping a stale session before starting a new one, in ms.
    ///
    /// Engines refuse to start while a previous session is still tearing down.
    pub restart_delay_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".to_owned(),
            continuous: false,
            interim_results: false,
            restart_delay_ms: 300,
        }
    }
}

/// Spoken reply configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Utterance locale (BCP 47).
    pub locale: String,
    /// Speaking rate (1.0 = engine default).
    pub rate: f32,
    /// Voice pitch (1.0 = engine default).
    pub pitch: f32,
    /// Utterance volume in `[0, 1]`.
    pub volume: f32,
    /// Case-insensitive substrings matched against English voice names.
    ///
    /// `english` catches engines (espeak-ng) whose voices are named after the
    /// language rather than a speaker.
    pub preferred_voices: Vec<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".to_owned(),
            rate: 0.9,
            pitch: 1.1,
            volume: 1.0,
            preferred_voices: vec![
                "rishi".to_owned(),
                "daniel".to_owned(),
                "google uk english male".to_owned(),
                "english".to_owned(),
            ],
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Also write a daily-rolling log file under the app log directory.
    pub file_logging: bool,
}

impl ChatConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::ChatError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ChatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path (see [`crate::app_dirs::config_file`]).
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_file()
    }
}
