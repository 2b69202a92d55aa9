//! # chat-widget
//!
//! Core of an embeddable chat widget. A widget takes user text, POSTs it to
//! a configured endpoint and reconciles the reply into an ordered
//! conversation that a presentation layer renders.
//!
//! ```text
//! user input ──▶ Transport ──▶ Reconciler ──▶ Conversation ──▶ subscribers
//!                  (POST)      (atomic or       (ordered log,     (events)
//!                               streamed)        thread id)
//! ```
//!
//! Replies come back either as one JSON envelope or as a byte stream that is
//! folded into a single growing assistant message. Widgets are independent
//! objects; a host can drive one directly or spawn it and talk to it through
//! a [`WidgetHandle`].

pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod markdown;
pub mod reconciler;
pub mod speech;
pub mod transport;
pub mod widget;

pub use config::{SpeechConfig, ThreadIdConvention, WidgetConfig};
pub use conversation::Conversation;
pub use error::{WidgetError, WidgetResult};
pub use events::{ConversationEvent, Message, Role, WidgetCommand};
pub use transport::Transport;
pub use widget::{ChatWidget, ERROR_ALERT_MESSAGE, SubmitOutcome, VoiceOutcome, WidgetHandle};
