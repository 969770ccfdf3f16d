//! `espeak-ng` synthesizer backend.
//!
//! Each utterance runs as one `espeak-ng` child process writing straight to
//! the default audio device. Starting a new utterance kills the previous one
//! if it is still talking.

use super::playback::{SpeechSynthesizer, Utterance, Voice};
use crate::error::{ChatError, Result};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Words per minute at rate 1.0.
const BASE_WPM: f32 = 175.0;
/// espeak pitch (0-99) at pitch 1.0.
const BASE_PITCH: f32 = 50.0;

pub struct EspeakSynthesizer {
    program: PathBuf,
    voices: Vec<Voice>,
    current: Mutex<Option<Child>>,
}

impl EspeakSynthesizer {
    /// Find `espeak-ng` (or `espeak`) on `PATH`.
    pub fn locate() -> Option<Self> {
        let program = which::which("espeak-ng")
            .or_else(|_| which::which("espeak"))
            .ok()?;
        match Self::with_program(&program) {
            Ok(synth) => Some(synth),
            Err(e) => {
                warn!("found {} but could not use it: {e}", program.display());
                None
            }
        }
    }

    /// Use the binary at `program`, querying its voice list once.
    ///
    /// # Errors
    ///
    /// Returns an error if the binary cannot be run.
    pub fn with_program(program: &Path) -> Result<Self> {
        let output = Command::new(program)
            .arg("--voices")
            .stderr(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Err(ChatError::Playback(format!(
                "{} --voices exited with {}",
                program.display(),
                output.status
            )));
        }
        let voices = parse_voice_list(&String::from_utf8_lossy(&output.stdout));
        info!(
            "using {} for spoken replies ({} voices)",
            program.display(),
            voices.len()
        );
        Ok(Self {
            program: program.to_path_buf(),
            voices,
            current: Mutex::new(None),
        })
    }
}

impl SpeechSynthesizer for EspeakSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn speak(&self, utterance: Utterance) -> Result<()> {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut previous) = current.take()
            && matches!(previous.try_wait(), Ok(None))
        {
            debug!("interrupting previous utterance");
            let _ = previous.kill();
            let _ = previous.wait();
        }

        let child = Command::new(&self.program)
            .args(command_args(&utterance))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ChatError::Playback(format!("failed to run espeak: {e}")))?;
        *current = Some(child);
        Ok(())
    }
}

impl Drop for EspeakSynthesizer {
    fn drop(&mut self) {
        let current = match self.current.get_mut() {
            Ok(current) => current,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut child) = current.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn command_args(utterance: &Utterance) -> Vec<String> {
    // The listed names are display names; espeak-ng selects by language code.
    let voice = utterance
        .voice
        .as_ref()
        .map_or_else(|| utterance.lang.to_lowercase(), |v| v.lang.clone());
    let wpm = (BASE_WPM * utterance.rate).round().clamp(80.0, 450.0) as u32;
    let pitch = (BASE_PITCH * utterance.pitch).round().clamp(0.0, 99.0) as u32;
    let amplitude = (100.0 * utterance.volume).round().clamp(0.0, 200.0) as u32;
    vec![
        "-v".into(),
        voice,
        "-s".into(),
        wpm.to_string(),
        "-p".into(),
        pitch.to_string(),
        "-a".into(),
        amplitude.to_string(),
        "--".into(),
        utterance.text.clone(),
    ]
}

/// Parse the table printed by `espeak-ng --voices`.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  2  en-gb           --/M      English_(Great_Britain) gmw/en          (en 2)
/// ```
fn parse_voice_list(output: &str) -> Vec<Voice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let _priority = cols.next()?;
            let lang = cols.next()?;
            let _age_gender = cols.next()?;
            let name = cols.next()?;
            Some(Voice::new(name, lang))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    const VOICES: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 2  en-gb           --/M      English_(Great_Britain) gmw/en           (en 2)
 5  en-us           --/M      English_(America)  gmw/en-US            (en 3)
 5  hi              --/M      Hindi              inc/hi
";

    #[test]
    fn parses_voice_table() {
        let voices = parse_voice_list(VOICES);
        assert_eq!(voices.len(), 4);
        assert_eq!(voices[1], Voice::new("English_(Great_Britain)", "en-gb"));
        assert!(voices[2].is_english());
        assert!(!voices[3].is_english());
    }

    #[test]
    fn empty_output_has_no_voices() {
        assert!(parse_voice_list("").is_empty());
        assert!(parse_voice_list("Pty Language Age/Gender VoiceName File\n").is_empty());
    }

    fn utterance(voice: Option<Voice>) -> Utterance {
        Utterance {
            text: "-be calm".into(),
            voice,
            lang: "en-US".into(),
            rate: 1.2,
            pitch: 1.1,
            volume: 1.0,
        }
    }

    #[test]
    fn args_scale_tuning_to_espeak_units() {
        let args = command_args(&utterance(Some(Voice::new("English_(America)", "en-us"))));
        assert_eq!(
            args,
            vec![
                "-v",
                "en-us",
                "-s",
                "210",
                "-p",
                "55",
                "-a",
                "100",
                "--",
                "-be calm"
            ]
        );
    }

    #[test]
    fn args_fall_back_to_locale_without_voice() {
        let args = command_args(&utterance(None));
        assert_eq!(args[1], "en-us");
    }

    #[test]
    fn default_playback_picks_an_english_espeak_voice() {
        use crate::config::PlaybackConfig;
        use crate::speech::SpeechPlayback;

        let playback = SpeechPlayback::silent(PlaybackConfig::default());
        let utterance = playback.utterance_for("Breathe with me.", &parse_voice_list(VOICES));
        let voice = utterance.voice.as_ref().unwrap();
        assert!(voice.is_english(), "picked {voice:?}");
        assert_eq!(voice.lang, "en-gb");
        assert_eq!(command_args(&utterance)[1], "en-gb");
    }

    #[test]
    fn missing_binary_is_an_error() {
        assert!(EspeakSynthesizer::with_program(Path::new("/nonexistent/espeak-ng")).is_err());
    }
}
