//! Transcript routing.
//!
//! A transcript is lowercased and then matched, in order, against:
//!
//! 1. the user's custom commands (substring match, first entry wins),
//! 2. the built-in [`IntentGrammar`],
//!
//! and the matching action is dispatched. Routing never fails; an
//! unmatched transcript is the ordinary [`RoutingOutcome::None`].

pub mod intent;

pub use intent::{BuiltinIntent, IntentGrammar};

use crate::actions::{ActionDispatcher, Mood, PageAction};
use crate::error::{AssistantError, Result};
use crate::store::{self, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// A user-defined phrase and the action it triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCommand {
    /// Lowercased; matched as a substring of the lowercased transcript.
    pub phrase: String,
    pub action: PageAction,
}

/// What a routed transcript turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingOutcome {
    #[serde(rename = "custom")]
    Custom,
    #[serde(rename = "mood:relax")]
    MoodRelax,
    #[serde(rename = "mood:energy")]
    MoodEnergy,
    #[serde(rename = "search")]
    Search,
    #[serde(rename = "openPlayer")]
    OpenPlayer,
    #[serde(rename = "playToggle")]
    PlayToggle,
    #[serde(rename = "none")]
    None,
}

impl RoutingOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::MoodRelax => "mood:relax",
            Self::MoodEnergy => "mood:energy",
            Self::Search => "search",
            Self::OpenPlayer => "openPlayer",
            Self::PlayToggle => "playToggle",
            Self::None => "none",
        }
    }

    /// Whether a command was recognised.
    #[must_use]
    pub fn is_match(self) -> bool {
        self != Self::None
    }
}

impl std::fmt::Display for RoutingOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps transcripts to page actions.
pub struct CommandRouter {
    grammar: IntentGrammar,
    commands: RwLock<Vec<CustomCommand>>,
    store: Arc<dyn KeyValueStore>,
    actions: ActionDispatcher,
}

impl CommandRouter {
    /// Create a router, loading the persisted custom commands from `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in grammar cannot be compiled.
    pub fn new(actions: ActionDispatcher, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let commands: Vec<CustomCommand> = store::load_custom_commands(store.as_ref())
            .into_iter()
            .filter_map(|command| {
                let Some(phrase) = normalize_phrase(&command.phrase) else {
                    warn!("ignoring stored custom command with a blank phrase");
                    return None;
                };
                Some(CustomCommand {
                    phrase,
                    action: command.action,
                })
            })
            .collect();
        debug!("loaded {} custom commands", commands.len());
        Ok(Self {
            grammar: IntentGrammar::spanish()?,
            commands: RwLock::new(commands),
            store,
            actions,
        })
    }

    /// Append a custom command and persist the list.
    ///
    /// The phrase is trimmed and lowercased. New commands go to the end of
    /// the list, so earlier commands keep priority.
    ///
    /// # Errors
    ///
    /// Returns an error if the phrase is blank or the list cannot be
    /// persisted. A command that failed to persist stays active for this
    /// session.
    pub fn add_custom_command(&self, phrase: &str, action: PageAction) -> Result<()> {
        let Some(phrase) = normalize_phrase(phrase) else {
            return Err(AssistantError::Command(
                "custom command phrase is empty".into(),
            ));
        };
        let snapshot = {
            let mut commands = self.write_commands()?;
            commands.push(CustomCommand { phrase, action });
            commands.clone()
        };
        store::save_custom_commands(self.store.as_ref(), &snapshot)
    }

    /// Remove every custom command with `phrase`. Returns `true` if any was
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be persisted.
    pub fn remove_custom_command(&self, phrase: &str) -> Result<bool> {
        let Some(phrase) = normalize_phrase(phrase) else {
            return Ok(false);
        };
        let snapshot = {
            let mut commands = self.write_commands()?;
            let before = commands.len();
            commands.retain(|c| c.phrase != phrase);
            if commands.len() == before {
                return Ok(false);
            }
            commands.clone()
        };
        store::save_custom_commands(self.store.as_ref(), &snapshot)?;
        Ok(true)
    }

    /// The custom commands in priority order.
    pub fn custom_commands(&self) -> Vec<CustomCommand> {
        self.commands.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// The first custom command matching `transcript`, without running it.
    pub fn match_custom(&self, transcript: &str) -> Option<CustomCommand> {
        let text = transcript.to_lowercase();
        let commands = self.commands.read().ok()?;
        commands.iter().find(|c| text.contains(&c.phrase)).cloned()
    }

    /// Classify `transcript` against the built-in grammar only.
    pub fn classify(&self, transcript: &str) -> Option<BuiltinIntent> {
        self.grammar.classify(&transcript.to_lowercase())
    }

    /// Route a transcript and dispatch the matching action.
    pub fn route(&self, transcript: &str) -> RoutingOutcome {
        if let Some(command) = self.match_custom(transcript) {
            info!("custom command {:?} matched", command.phrase);
            self.actions.dispatch(&command.action);
            return RoutingOutcome::Custom;
        }

        let outcome = match self.classify(transcript) {
            Some(BuiltinIntent::Mood(mood)) => {
                self.actions.mood_via_discover(mood);
                match mood {
                    Mood::Relax => RoutingOutcome::MoodRelax,
                    Mood::Energy => RoutingOutcome::MoodEnergy,
                }
            }
            Some(BuiltinIntent::Search { query }) => {
                self.actions.search(&query);
                RoutingOutcome::Search
            }
            Some(BuiltinIntent::OpenPlayer) => {
                self.actions.open_player();
                RoutingOutcome::OpenPlayer
            }
            Some(BuiltinIntent::PlayToggle) => {
                self.actions.play();
                RoutingOutcome::PlayToggle
            }
            None => RoutingOutcome::None,
        };
        info!("routed {transcript:?} -> {outcome}");
        outcome
    }

    fn write_commands(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<CustomCommand>>> {
        self.commands
            .write()
            .map_err(|e| AssistantError::Command(format!("command list lock poisoned: {e}")))
    }
}

/// Trimmed, lowercased phrase, or `None` if nothing is left.
fn normalize_phrase(phrase: &str) -> Option<String> {
    let phrase = phrase.trim().to_lowercase();
    (!phrase.is_empty()).then_some(phrase)
}
