//! Kanha: a mood-reactive conversational session.
//!
//! The user talks to a remote dialogue service by typing or dictating. Each
//! reply is shown, optionally spoken aloud, and its emotional tone steers a
//! looping ambient track up or down in volume.
//!
//! # Architecture
//!
//! - **Session** ([`session`]): the controller that owns the conversation and
//!   the single-outstanding-request discipline
//! - **Service** ([`service`]): the remote dialogue endpoint (HTTP JSON)
//! - **Audio** ([`audio`]): ambient track output and mood-driven fades
//! - **Speech** ([`speech`]): recognition in, synthesis out
//!
//! Every external capability sits behind a trait so the controller runs the
//! same with real devices, with fakes in tests, or with nothing at all.

pub mod app_dirs;
pub mod audio;
pub mod config;
pub mod conversation;
pub mod emotion;
pub mod error;
pub mod logging;
pub mod service;
pub mod session;
pub mod speech;

pub use audio::AudioMoodEngine;
pub use config::ChatConfig;
pub use conversation::{ConversationStore, Message, Role};
pub use emotion::Emotion;
pub use error::{ChatError, Result};
pub use service::{ChatReply, ChatRequest, DialogueService, HttpDialogueService};
pub use session::{
    NoticeKind, RejectReason, ReplyKind, RequestState, SessionController, SessionEvent,
    SubmitOutcome,
};
