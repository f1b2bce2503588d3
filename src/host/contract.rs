//! Line-delimited JSON contract between the assistant and a host shell.
//!
//! The host sends one [`HostCommand`] per line and receives one
//! [`HostEvent`] per line.

use crate::actions::{Mood, PageAction};
use crate::router::{CustomCommand, RoutingOutcome};
use crate::session::SessionState;
use serde::{Deserialize, Serialize};

/// Playback state reported by the host for one page audio element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioState {
    Playing,
    Paused,
    Ended,
    /// The element left the page.
    Removed,
}

/// Commands accepted from the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
    /// Press the microphone button.
    Toggle,
    /// The recogniser produced a transcript.
    Transcript { text: String },
    /// The recogniser reported an error.
    RecognitionError { message: String },
    /// The recognition session ended on its own.
    Ended,
    Speak {
        text: String,
        #[serde(default)]
        lang: Option<String>,
    },
    AddCustom { phrase: String, action: PageAction },
    RemoveCustom { phrase: String },
    ListCustom,
    /// A page audio element changed state.
    Audio {
        id: String,
        state: AudioState,
        #[serde(default)]
        position: Option<f64>,
    },
    SetPreference { key: String, value: serde_json::Value },
    Quit,
}

/// Events emitted to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    /// Listening state changed; redraw the microphone button.
    State { state: SessionState },
    /// Speak this now.
    Utterance { text: String, lang: String },
    Navigate { path: String },
    Search { query: String },
    Mood { mood: Mood },
    Play,
    Routed {
        transcript: String,
        outcome: RoutingOutcome,
    },
    CustomCommands { commands: Vec<CustomCommand> },
    Error { message: String },
}
