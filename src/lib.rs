//! Sinsay: voice control for a music discovery site.
//!
//! The assistant listens for one spoken command at a time, routes the
//! transcript to a page action and answers with short spoken feedback.
//!
//! # Architecture
//!
//! - **Audio monitor**: tracks page audio so speech never talks over music
//! - **Speak queue**: serializes utterances behind page audio and the engine
//! - **Router**: custom phrases first, then the built-in Spanish grammar
//! - **Actions**: navigation, search, mood and playback on the page
//! - **Session**: idle/listening state machine around platform recognition
//! - **Host**: newline-delimited JSON bridge for native shells

pub mod actions;
pub mod assistant;
pub mod audio;
pub mod config;
pub mod error;
pub mod host;
pub mod router;
pub mod session;
pub mod speech;
pub mod store;

pub use actions::{ActionDispatcher, Mood, Page, PageAction};
pub use assistant::{Assistant, Platform};
pub use audio::{AudioActivityMonitor, AudioRegistry, AudioSource, IdleWait, TrackedAudio};
pub use config::AssistantConfig;
pub use error::{AssistantError, Result};
pub use router::{CommandRouter, CustomCommand, RoutingOutcome};
pub use session::{SessionController, SessionState};
pub use speech::{SpeakQueue, SpeechRequest, SpeechSynthesizer};
pub use store::{FileStore, KeyValueStore, MemoryStore, Preferences};
