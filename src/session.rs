//! Session interaction controller.
//!
//! Orchestrates one conversation: accepts user input (typed or dictated),
//! calls the dialogue service, appends turns to the [`ConversationStore`],
//! speaks replies, and steers the ambient audio toward each reply's tone.
//!
//! Only one request may be outstanding. [`RequestState`] makes that explicit:
//! [`SessionController::submit`] is the only `Idle -> AwaitingReply`
//! transition, and the reply (or its failure) is the only way back.

use crate::audio::AudioMoodEngine;
use crate::config::{AmbientConfig, ChatConfig, ConversationConfig, ServiceConfig};
use crate::conversation::{ConversationStore, Message};
use crate::emotion::Emotion;
use crate::error::{ChatError, Result};
use crate::service::{ChatRequest, DialogueService};
use crate::speech::{CaptureEvent, SpeechCapture, SpeechPlayback};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Whether a dialogue request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    AwaitingReply,
}

/// Why a submission was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Text was empty or whitespace only.
    EmptyInput,
    /// A previous submission is still waiting for its reply.
    RequestPending,
}

/// Which assistant turn a completed submission produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Reply,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Rejected(RejectReason),
    Completed(ReplyKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Speech recognition is not available at all.
    CaptureUnsupported,
    /// A capture session failed.
    CaptureFailed,
}

/// State changes a renderer can follow.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    MessageAppended { index: usize, message: Message },
    /// A request started (`true`) or resolved (`false`).
    PendingChanged { pending: bool },
    DraftChanged { text: String },
    MoodRetargeted { emotion: Emotion, volume: f32 },
    AmbientToggled { enabled: bool },
    /// Something the user should be told about.
    Notice { kind: NoticeKind, text: String },
}

#[derive(Debug)]
struct SessionState {
    conversation: ConversationStore,
    draft: String,
    request: RequestState,
    audio_enabled: bool,
}

pub struct SessionController {
    service: Arc<dyn DialogueService>,
    mood: Arc<AudioMoodEngine>,
    capture: SpeechCapture,
    playback: Arc<SpeechPlayback>,
    service_config: ServiceConfig,
    conversation_config: ConversationConfig,
    ambient_config: AmbientConfig,
    state: Arc<Mutex<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    /// A controller with no audio, no capture, and no spoken replies.
    pub fn new(service: Arc<dyn DialogueService>, config: &ChatConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            service,
            mood: Arc::new(AudioMoodEngine::silent(config.ambient.clone())),
            capture: SpeechCapture::unsupported(&config.capture),
            playback: Arc::new(SpeechPlayback::silent(config.playback.clone())),
            service_config: config.service.clone(),
            conversation_config: config.conversation.clone(),
            ambient_config: config.ambient.clone(),
            state: Arc::new(Mutex::new(SessionState {
                conversation: ConversationStore::new(),
                draft: String::new(),
                request: RequestState::Idle,
                audio_enabled: false,
            })),
            events,
        }
    }

    pub fn with_mood(mut self, mood: AudioMoodEngine) -> Self {
        self.mood = Arc::new(mood);
        self
    }

    pub fn with_capture(mut self, capture: SpeechCapture) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_playback(mut self, playback: SpeechPlayback) -> Self {
        self.playback = Arc::new(playback);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn mood(&self) -> &AudioMoodEngine {
        &self.mood
    }

    pub fn capture(&self) -> &SpeechCapture {
        &self.capture
    }

    /// Snapshot of the conversation, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().conversation.messages().to_vec()
    }

    pub fn draft(&self) -> String {
        self.lock().draft.clone()
    }

    pub fn request_state(&self) -> RequestState {
        self.lock().request
    }

    pub fn is_pending(&self) -> bool {
        self.request_state() == RequestState::AwaitingReply
    }

    pub fn audio_enabled(&self) -> bool {
        self.lock().audio_enabled
    }

    /// Replace the draft buffer.
    pub fn set_draft(&self, text: impl Into<String>) {
        let text = text.into();
        self.lock().draft.clone_from(&text);
        self.emit(SessionEvent::DraftChanged { text });
    }

    /// Send `text` to the dialogue service and record both turns.
    ///
    /// Empty input and input while a reply is pending are ignored. A failed
    /// request is answered with the configured fallback text instead.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        if text.trim().is_empty() {
            debug!("ignoring empty submission");
            return SubmitOutcome::Rejected(RejectReason::EmptyInput);
        }

        let (index, message, pending) = {
            let mut st = self.lock();
            if st.request == RequestState::AwaitingReply {
                debug!("ignoring submission while a reply is pending");
                return SubmitOutcome::Rejected(RejectReason::RequestPending);
            }
            st.request = RequestState::AwaitingReply;
            st.draft.clear();
            let message = Message::user(text);
            let index = st.conversation.append(message.clone());
            (index, message, PendingGuard::new(self))
        };
        self.emit(SessionEvent::MessageAppended { index, message });
        self.emit(SessionEvent::DraftChanged {
            text: String::new(),
        });
        self.emit(SessionEvent::PendingChanged { pending: true });

        // The turn runs detached so its reply lands even if this future is dropped.
        let turn = ReplyTurn {
            service: Arc::clone(&self.service),
            request: ChatRequest {
                user_id: self.service_config.user_id.clone(),
                message: text.to_owned(),
            },
            mood: Arc::clone(&self.mood),
            playback: Arc::clone(&self.playback),
            fallback_text: self.conversation_config.fallback_text.clone(),
            speak_replies: self.conversation_config.speak_replies,
            retarget_fade_ms: self.ambient_config.retarget_fade_ms,
            pending,
        };
        match tokio::spawn(turn.run()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("reply task failed: {e}");
                SubmitOutcome::Completed(ReplyKind::Fallback)
            }
        }
    }

    /// Start dictation. A transcript arrives later through [`Self::run`].
    ///
    /// # Errors
    ///
    /// Returns the capture error. An unsupported engine is also reported as a
    /// [`SessionEvent::Notice`].
    pub async fn capture_speech(&self) -> Result<()> {
        match self.capture.start().await {
            Ok(()) => Ok(()),
            Err(ChatError::CaptureUnsupported) => {
                self.emit(SessionEvent::Notice {
                    kind: NoticeKind::CaptureUnsupported,
                    text: "Speech recognition is not supported on this system.".to_owned(),
                });
                Err(ChatError::CaptureUnsupported)
            }
            // The adapter reports start failures on its event stream.
            Err(e) => Err(e),
        }
    }

    /// Turn ambient audio on or off. Returns the new setting.
    pub fn toggle_ambient_audio(&self) -> bool {
        let enabled = {
            let mut st = self.lock();
            st.audio_enabled = !st.audio_enabled;
            st.audio_enabled
        };
        if enabled {
            self.mood.start();
        } else {
            self.mood.stop(self.ambient_config.stop_fade_ms);
        }
        info!(enabled, "ambient audio toggled");
        self.emit(SessionEvent::AmbientToggled { enabled });
        enabled
    }

    /// Consume capture results until `cancel` fires or capture shuts down.
    ///
    /// Transcripts replace the draft; they are never submitted automatically.
    pub async fn run(&self, cancel: CancellationToken) {
        let Some(mut captures) = self.capture.observe() else {
            warn!("capture events are already being consumed");
            return;
        };
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = captures.recv() => match event {
                    Some(CaptureEvent::Transcript { text, confidence }) => {
                        debug!(confidence, "transcript received");
                        self.set_draft(text);
                    }
                    Some(CaptureEvent::Error { error, message }) => {
                        let text = match message {
                            Some(message) if !message.is_empty() => {
                                format!("Speech recognition failed ({error}): {message}")
                            }
                            _ => format!("Speech recognition failed ({error})"),
                        };
                        self.emit(SessionEvent::Notice {
                            kind: NoticeKind::CaptureFailed,
                            text,
                        });
                    }
                    None => break,
                },
            }
        }
        self.capture.stop();
        debug!("session event loop finished");
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        lock_state(&self.state)
    }
}

/// One accepted submission: the service call and the turns it produces.
struct ReplyTurn {
    service: Arc<dyn DialogueService>,
    request: ChatRequest,
    mood: Arc<AudioMoodEngine>,
    playback: Arc<SpeechPlayback>,
    fallback_text: String,
    speak_replies: bool,
    retarget_fade_ms: u64,
    pending: PendingGuard,
}

impl ReplyTurn {
    async fn run(self) -> SubmitOutcome {
        match self.service.chat(&self.request).await {
            Ok(reply) => {
                let message = Message::assistant(&reply);
                let emotion = message.emotion();
                self.pending.append(message);
                if self.speak_replies {
                    self.playback.speak(&reply.text);
                }
                if let Some(emotion) = emotion
                    && let Some(volume) = self.mood.retarget(emotion, self.retarget_fade_ms)
                {
                    self.pending
                        .emit(SessionEvent::MoodRetargeted { emotion, volume });
                }
                SubmitOutcome::Completed(ReplyKind::Reply)
            }
            Err(e) => {
                error!("dialogue request failed: {e}");
                self.pending.append(Message::fallback(self.fallback_text));
                SubmitOutcome::Completed(ReplyKind::Fallback)
            }
        }
    }
}

/// Returns the session to `Idle` when dropped, even if the reply task panics.
struct PendingGuard {
    state: Arc<Mutex<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
}

impl PendingGuard {
    fn new(controller: &SessionController) -> Self {
        Self {
            state: Arc::clone(&controller.state),
            events: controller.events.clone(),
        }
    }

    fn append(&self, message: Message) {
        let index = lock_state(&self.state).conversation.append(message.clone());
        self.emit(SessionEvent::MessageAppended { index, message });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock_state(&self.state).request = RequestState::Idle;
        let _ = self.events.send(SessionEvent::PendingChanged { pending: false });
    }
}

fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
