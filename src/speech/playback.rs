//! Spoken replies.
//!
//! [`SpeechPlayback`] turns reply text into an [`Utterance`] with the
//! configured tuning and a voice picked by [`select_voice`], then hands it to
//! whatever [`SpeechSynthesizer`] is present. Failures are logged and
//! swallowed; a reply that cannot be spoken is still shown.

use crate::config::PlaybackConfig;
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A synthesis voice offered by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    pub lang: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }

    /// `en`, `en-*` or `en_*`, any case.
    pub fn is_english(&self) -> bool {
        let lang = self.lang.to_ascii_lowercase();
        lang == "en" || lang.starts_with("en-") || lang.starts_with("en_")
    }
}

/// Everything the engine needs to speak one piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<Voice>,
    pub lang: String,
    /// Relative speaking rate, 1.0 is the engine default.
    pub rate: f32,
    /// Relative pitch, 1.0 is the engine default.
    pub pitch: f32,
    /// 0.0 to 1.0.
    pub volume: f32,
}

/// Native speech synthesis contract.
pub trait SpeechSynthesizer: Send + Sync {
    fn voices(&self) -> Vec<Voice>;

    /// Queue or start speaking `utterance`. Returns once playback has begun.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot start speaking.
    fn speak(&self, utterance: Utterance) -> Result<()>;
}

/// First English voice whose name contains any of `preferred`
/// (case-insensitive), else the first voice, else `None`.
pub fn select_voice<'a>(voices: &'a [Voice], preferred: &[String]) -> Option<&'a Voice> {
    let wanted: Vec<String> = preferred.iter().map(|p| p.to_lowercase()).collect();
    voices
        .iter()
        .find(|voice| {
            if !voice.is_english() {
                return false;
            }
            let name = voice.name.to_lowercase();
            wanted.iter().any(|w| !w.is_empty() && name.contains(w.as_str()))
        })
        .or_else(|| voices.first())
}

/// Reply voice for the session.
pub struct SpeechPlayback {
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    config: PlaybackConfig,
}

impl SpeechPlayback {
    pub fn new(synthesizer: Option<Arc<dyn SpeechSynthesizer>>, config: PlaybackConfig) -> Self {
        if synthesizer.is_none() {
            info!("no speech synthesizer available; replies will not be spoken");
        }
        Self {
            synthesizer,
            config,
        }
    }

    pub fn silent(config: PlaybackConfig) -> Self {
        Self::new(None, config)
    }

    pub fn is_available(&self) -> bool {
        self.synthesizer.is_some()
    }

    /// Build the utterance for `text` against the engine's current voices.
    pub fn utterance_for(&self, text: &str, voices: &[Voice]) -> Utterance {
        Utterance {
            text: text.to_owned(),
            voice: select_voice(voices, &self.config.preferred_voices).cloned(),
            lang: self.config.locale.clone(),
            rate: self.config.rate,
            pitch: self.config.pitch,
            volume: self.config.volume.clamp(0.0, 1.0),
        }
    }

    /// Speak `text`. Blank text and a missing engine are no-ops.
    pub fn speak(&self, text: &str) {
        let Some(synthesizer) = self.synthesizer.as_ref() else {
            return;
        };
        if text.trim().is_empty() {
            debug!("skipping blank utterance");
            return;
        }
        let utterance = self.utterance_for(text, &synthesizer.voices());
        debug!(
            voice = utterance.voice.as_ref().map(|v| v.name.as_str()),
            chars = text.len(),
            "speaking reply"
        );
        if let Err(e) = synthesizer.speak(utterance) {
            warn!("speech playback failed: {e}");
        }
    }
}


#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::testing::RecordingSynthesizer;
    use super::*;

    fn preferred() -> Vec<String> {
        PlaybackConfig::default().preferred_voices
    }

    #[test]
    fn prefers_matching_english_voice() {
        let voices = vec![
            Voice::new("Amelie", "fr-CA"),
            Voice::new("Samantha", "en-US"),
            Voice::new("Daniel", "en-GB"),
        ];
        assert_eq!(
            select_voice(&voices, &preferred()).unwrap().name,
            "Daniel"
        );
    }

    #[test]
    fn matching_name_in_other_language_is_skipped() {
        let voices = vec![
            Voice::new("Rishi", "hi-IN"),
            Voice::new("Google UK English Male", "en_GB"),
        ];
        assert_eq!(
            select_voice(&voices, &preferred()).unwrap().name,
            "Google UK English Male"
        );
    }

    #[test]
    fn female_voice_is_not_mistaken_for_male() {
        let voices = vec![
            Voice::new("Victoria Female", "en-US"),
            Voice::new("Daniel", "en-GB"),
        ];
        assert_eq!(select_voice(&voices, &preferred()).unwrap().name, "Daniel");
    }

    #[test]
    fn falls_back_to_first_voice() {
        let voices = vec![Voice::new("Amelie", "fr-CA"), Voice::new("Samantha", "en-US")];
        assert_eq!(select_voice(&voices, &preferred()).unwrap().name, "Amelie");
    }

    #[test]
    fn no_voices_selects_none() {
        assert!(select_voice(&[], &preferred()).is_none());
    }

    #[test]
    fn bare_en_counts_as_english() {
        assert!(Voice::new("x", "EN").is_english());
        assert!(Voice::new("x", "en-in").is_english());
        assert!(!Voice::new("x", "eng").is_english());
    }

    #[test]
    fn utterance_carries_configured_tuning() {
        let playback = SpeechPlayback::silent(PlaybackConfig::default());
        let u = playback.utterance_for("hello", &[Voice::new("Rishi", "en-IN")]);
        assert_eq!(u.text, "hello");
        assert_eq!(u.lang, "en-US");
        assert_eq!(u.rate, 0.9);
        assert_eq!(u.pitch, 1.1);
        assert_eq!(u.volume, 1.0);
        assert_eq!(u.voice.unwrap().name, "Rishi");
    }

    #[test]
    fn speak_forwards_text_to_synthesizer() {
        let synth = Arc::new(RecordingSynthesizer {
            voices: vec![Voice::new("Daniel", "en-GB")],
            ..Default::default()
        });
        let playback = SpeechPlayback::new(
            Some(Arc::clone(&synth) as Arc<dyn SpeechSynthesizer>),
            PlaybackConfig::default(),
        );
        playback.speak("Breathe slowly.");
        assert_eq!(synth.spoken_texts(), vec!["Breathe slowly."]);
    }

    #[test]
    fn blank_text_is_not_spoken() {
        let synth = Arc::new(RecordingSynthesizer::default());
        let playback = SpeechPlayback::new(
            Some(Arc::clone(&synth) as Arc<dyn SpeechSynthesizer>),
            PlaybackConfig::default(),
        );
        playback.speak("   ");
        assert!(synth.spoken_texts().is_empty());
    }

    #[test]
    fn engine_failure_is_swallowed() {
        let synth = Arc::new(RecordingSynthesizer {
            fail: true,
            ..Default::default()
        });
        let playback = SpeechPlayback::new(
            Some(Arc::clone(&synth) as Arc<dyn SpeechSynthesizer>),
            PlaybackConfig::default(),
        );
        playback.speak("still fine");
        assert_eq!(synth.spoken_texts().len(), 1);
    }

    #[test]
    fn silent_playback_is_a_no_op() {
        let playback = SpeechPlayback::silent(PlaybackConfig::default());
        assert!(!playback.is_available());
        playback.speak("nobody hears this");
    }
}
