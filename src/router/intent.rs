//! Built-in intent grammar.
//!
//! Patterns are tested in a fixed priority order and the first match wins.
//! Overlaps are resolved by that order alone: "reproduce algo energizante"
//! is a mood request, not a play/pause toggle, because moods are tested
//! first.

use crate::actions::Mood;
use crate::error::{AssistantError, Result};
use regex::Regex;

/// A hardcoded command recognised in a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinIntent {
    /// Switch the discovery view to a mood.
    Mood(Mood),
    /// Search the library.
    Search { query: String },
    /// Go to the player view.
    OpenPlayer,
    /// Press play/pause.
    PlayToggle,
}

/// Compiled Spanish intent patterns.
#[derive(Debug, Clone)]
pub struct IntentGrammar {
    relax: Regex,
    energy: Regex,
    search: Regex,
    open_player: Regex,
    play_toggle: Regex,
}

impl IntentGrammar {
    /// The built-in grammar.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn spanish() -> Result<Self> {
        Ok(Self {
            relax: compile(r"(reproduce|pon|play).*(relajante|relajación|tranquilo|calma)")?,
            energy: compile(r"(reproduce|pon|play).*(energ[íi]a|energizante|activ[oa])")?,
            search: compile(r"(busca|buscar|encuentra) (.+)")?,
            open_player: compile(r"reproductor|player|escuchar ahora")?,
            play_toggle: compile(r"pausa|reanuda|play|reproduce")?,
        })
    }

    /// Classify an already-lowercased transcript.
    pub fn classify(&self, transcript: &str) -> Option<BuiltinIntent> {
        if self.relax.is_match(transcript) {
            return Some(BuiltinIntent::Mood(Mood::Relax));
        }
        if self.energy.is_match(transcript) {
            return Some(BuiltinIntent::Mood(Mood::Energy));
        }
        if let Some(query) = self
            .search
            .captures(transcript)
            .and_then(|c| c.get(2))
            .map(|m| m.as_str().trim())
            .filter(|q| !q.is_empty())
        {
            return Some(BuiltinIntent::Search {
                query: query.to_owned(),
            });
        }
        if self.open_player.is_match(transcript) {
            return Some(BuiltinIntent::OpenPlayer);
        }
        if self.play_toggle.is_match(transcript) {
            return Some(BuiltinIntent::PlayToggle);
        }
        None
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| AssistantError::Config(format!("bad intent pattern {pattern:?}: {e}")))
}
