//! Speech in and out: recognition of the user's voice and spoken replies.

pub mod capture;
pub mod espeak;
pub mod playback;

pub use capture::{
    CaptureEvent, CaptureState, RecognitionOptions, RecognizerEvent, SpeechCapture,
    SpeechRecognizer,
};
pub use espeak::EspeakSynthesizer;
pub use playback::{SpeechPlayback, SpeechSynthesizer, Utterance, Voice, select_voice};
