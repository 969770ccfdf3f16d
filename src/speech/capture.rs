//! Speech capture adapter.
//!
//! Wraps a native recognition engine behind [`SpeechRecognizer`] and enforces
//! single-flight capture: at most one listening session exists at a time.
//! Starting while a session is live tears the old one down, waits a short
//! fixed delay (engines refuse to restart while still shutting down), and
//! then starts fresh. Every session carries an id; events from superseded
//! sessions are dropped, and a superseded session's forwarding task exits
//! as soon as its id is retired.
//!
//! Results reach the consumer through a single-subscriber channel handed out
//! by [`SpeechCapture::observe`].

use crate::config::CaptureConfig;
use crate::error::{ChatError, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Engine settings for one recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    pub locale: String,
    pub continuous: bool,
    pub interim_results: bool,
}

impl From<&CaptureConfig> for RecognitionOptions {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            locale: config.locale.clone(),
            continuous: config.continuous,
            interim_results: config.interim_results,
        }
    }
}

/// One candidate transcript, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    pub transcript: String,
    pub confidence: f32,
}

/// Callback-style events produced by a native engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// Recognised utterance; alternatives are ranked best first.
    Result {
        alternatives: Vec<Alternative>,
        is_final: bool,
    },
    /// Engine-level failure (e.g. `no-speech`, `not-allowed`).
    Error {
        error: String,
        message: Option<String>,
    },
    /// Session ended on the engine side.
    End,
}

/// Sender a native engine uses to deliver events for one session.
pub type RecognizerSink = mpsc::UnboundedSender<RecognizerEvent>;

/// Native speech recognition contract.
pub trait SpeechRecognizer: Send + Sync {
    /// Begin a session, delivering its events to `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine refuses to start (e.g. still tearing
    /// down a previous session).
    fn start(&self, options: &RecognitionOptions, events: RecognizerSink) -> Result<()>;

    /// Abort the current session.
    fn stop(&self);
}

/// Adapter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Listening,
}

/// What the adapter reports to its subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Best transcript of a recognised utterance.
    Transcript { text: String, confidence: f32 },
    /// Capture failed; the adapter is idle again.
    Error {
        error: String,
        message: Option<String>,
    },
}

#[derive(Debug)]
struct CaptureInner {
    state: CaptureState,
    session: u64,
    /// Cancelled when `session` is retired.
    live: CancellationToken,
}

impl CaptureInner {
    /// Retire the current session id and release its forwarding task.
    fn retire(&mut self) {
        self.state = CaptureState::Idle;
        self.session += 1;
        self.live.cancel();
    }
}

/// Single-flight wrapper around a native recognizer.
pub struct SpeechCapture {
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    options: RecognitionOptions,
    restart_delay: Duration,
    inner: Arc<Mutex<CaptureInner>>,
    events_tx: mpsc::UnboundedSender<CaptureEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<CaptureEvent>>>,
    /// Serialises `start` so two restarts never interleave.
    start_gate: tokio::sync::Mutex<()>,
}

impl SpeechCapture {
    pub fn new(recognizer: Option<Arc<dyn SpeechRecognizer>>, config: &CaptureConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            recognizer,
            options: RecognitionOptions::from(config),
            restart_delay: Duration::from_millis(config.restart_delay_ms),
            inner: Arc::new(Mutex::new(CaptureInner {
                state: CaptureState::Idle,
                session: 0,
                live: CancellationToken::new(),
            })),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            start_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// An adapter for an environment without speech recognition.
    pub fn unsupported(config: &CaptureConfig) -> Self {
        Self::new(None, config)
    }

    pub fn is_supported(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn state(&self) -> CaptureState {
        lock(&self.inner).state
    }

    /// Take the event receiver. Only the first caller gets it.
    pub fn observe(&self) -> Option<mpsc::UnboundedReceiver<CaptureEvent>> {
        match self.events_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Start listening, replacing any live session.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::CaptureUnsupported`] when no engine is present,
    /// or the engine's error if it refuses to start. In the latter case an
    /// error event is also delivered and the adapter is idle.
    pub async fn start(&self) -> Result<()> {
        let Some(recognizer) = self.recognizer.as_ref() else {
            return Err(ChatError::CaptureUnsupported);
        };
        let _gate = self.start_gate.lock().await;

        let was_listening = {
            let mut inner = lock(&self.inner);
            let live = inner.state == CaptureState::Listening;
            if live {
                inner.retire();
            }
            live
        };
        if was_listening {
            info!(
                delay_ms = self.restart_delay.as_millis() as u64,
                "capture already listening; restarting"
            );
            recognizer.stop();
            tokio::time::sleep(self.restart_delay).await;
        }

        let (session, live) = {
            let mut inner = lock(&self.inner);
            inner.session += 1;
            inner.state = CaptureState::Listening;
            inner.live = CancellationToken::new();
            (inner.session, inner.live.clone())
        };

        let (sink, engine_events) = mpsc::unbounded_channel();
        if let Err(e) = recognizer.start(&self.options, sink) {
            warn!("speech capture failed to start: {e}");
            {
                let mut inner = lock(&self.inner);
                if inner.session == session {
                    inner.retire();
                }
            }
            let _ = self.events_tx.send(CaptureEvent::Error {
                error: "start-failed".to_owned(),
                message: Some(e.to_string()),
            });
            return Err(e);
        }
        info!(session, locale = %self.options.locale, "speech capture listening");

        tokio::spawn(pump_session(
            session,
            live,
            engine_events,
            Arc::clone(&self.inner),
            Arc::clone(recognizer),
            self.options.continuous,
            self.events_tx.clone(),
        ));
        Ok(())
    }

    /// Abort the live session, if any. Its remaining events are dropped.
    pub fn stop(&self) {
        let Some(recognizer) = self.recognizer.as_ref() else {
            return;
        };
        let was_listening = {
            let mut inner = lock(&self.inner);
            let live = inner.state == CaptureState::Listening;
            if live {
                inner.retire();
            }
            live
        };
        if was_listening {
            recognizer.stop();
            info!("speech capture stopped");
        }
    }
}

/// Forward one session's engine events until it produces an outcome.
async fn pump_session(
    session: u64,
    live: CancellationToken,
    mut engine_events: mpsc::UnboundedReceiver<RecognizerEvent>,
    inner: Arc<Mutex<CaptureInner>>,
    recognizer: Arc<dyn SpeechRecognizer>,
    continuous: bool,
    events_tx: mpsc::UnboundedSender<CaptureEvent>,
) {
    // Returns false if the session has been superseded.
    let finish = || {
        let mut inner = lock(&inner);
        if inner.session != session {
            return false;
        }
        inner.state = CaptureState::Idle;
        true
    };

    loop {
        let event = tokio::select! {
            biased;
            () = live.cancelled() => {
                debug!(session, "capture session superseded");
                return;
            }
            event = engine_events.recv() => event,
        };
        // Engine dropped its sink without ending the session.
        let Some(event) = event else {
            finish();
            return;
        };
        match event {
            RecognizerEvent::Result {
                alternatives,
                is_final,
            } => {
                if !is_final {
                    continue;
                }
                let Some(best) = alternatives.into_iter().next() else {
                    continue;
                };
                if !finish() {
                    debug!(session, "dropping transcript from superseded session");
                    return;
                }
                if continuous {
                    recognizer.stop();
                }
                let _ = events_tx.send(CaptureEvent::Transcript {
                    text: best.transcript,
                    confidence: best.confidence,
                });
                return;
            }
            RecognizerEvent::Error { error, message } => {
                if !finish() {
                    debug!(session, %error, "dropping error from superseded session");
                    return;
                }
                warn!(%error, "speech capture error");
                let _ = events_tx.send(CaptureEvent::Error { error, message });
                return;
            }
            RecognizerEvent::End => {
                finish();
                debug!(session, "capture session ended without a result");
                return;
            }
        }
    }
}

fn lock(inner: &Mutex<CaptureInner>) -> MutexGuard<'_, CaptureInner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Scriptable recognizer that tracks overlapping sessions.
    #[derive(Default)]
    pub(crate) struct ScriptedRecognizer {
        pub(crate) sinks: Mutex<Vec<RecognizerSink>>,
        pub(crate) active: Mutex<usize>,
        pub(crate) max_active: Mutex<usize>,
        pub(crate) stops: Mutex<usize>,
        pub(crate) refuse_start: Mutex<bool>,
    }

    impl ScriptedRecognizer {
        /// Deliver `event` on the sink of the `index`-th started session.
        pub(crate) fn emit(&self, index: usize, event: RecognizerEvent) {
            let sinks = self.sinks.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(sink) = sinks.get(index) {
                let _ = sink.send(event);
            }
        }

        pub(crate) fn started(&self) -> usize {
            self.sinks.lock().unwrap_or_else(|p| p.into_inner()).len()
        }

        /// True once nothing is reading the `index`-th session's events.
        pub(crate) fn sink_closed(&self, index: usize) -> bool {
            let sinks = self.sinks.lock().unwrap_or_else(|p| p.into_inner());
            sinks.get(index).is_some_and(|sink| sink.is_closed())
        }
    }

    impl SpeechRecognizer for ScriptedRecognizer {
        fn start(&self, _options: &RecognitionOptions, events: RecognizerSink) -> Result<()> {
            if *self.refuse_start.lock().unwrap_or_else(|p| p.into_inner()) {
                return Err(ChatError::Capture("recognition has already started".into()));
            }
            let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
            *active += 1;
            let mut max = self.max_active.lock().unwrap_or_else(|p| p.into_inner());
            *max = (*max).max(*active);
            self.sinks
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(events);
            Ok(())
        }

        fn stop(&self) {
            let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
            *active = active.saturating_sub(1);
            *self.stops.lock().unwrap_or_else(|p| p.into_inner()) += 1;
        }
    }

    pub(crate) fn result(text: &str) -> RecognizerEvent {
        RecognizerEvent::Result {
            alternatives: vec![
                Alternative {
                    transcript: text.to_owned(),
                    confidence: 0.9,
                },
                Alternative {
                    transcript: format!("{text} (alt)"),
                    confidence: 0.4,
                },
            ],
            is_final: true,
        }
    }
}
