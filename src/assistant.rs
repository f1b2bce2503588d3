//! The assistant context.
//!
//! [`Assistant`] owns every piece of assistant state for one page or app
//! session: the speak queue, the command router with its custom commands,
//! the recognition session controller and the preferences blob. Hosts
//! build one from an [`AssistantConfig`] plus the [`Platform`] adapters and
//! keep it for the lifetime of the session.

use crate::actions::{ActionDispatcher, Page, PageAction};
use crate::audio::{AudioActivityMonitor, AudioRegistry};
use crate::config::AssistantConfig;
use crate::error::{AssistantError, Result};
use crate::router::{CommandRouter, CustomCommand, RoutingOutcome};
use crate::session::{SessionController, SessionState, SpeechRecognition};
use crate::speech::{SpeakQueue, SpeechSynthesizer};
use crate::store::{self, KeyValueStore, Preferences};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Platform adapters the assistant runs on.
pub struct Platform {
    pub recognition: Arc<dyn SpeechRecognition>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub page: Arc<dyn Page>,
    pub audio: Arc<AudioRegistry>,
    pub store: Arc<dyn KeyValueStore>,
}

/// Voice assistant for one page/app session.
pub struct Assistant {
    config: AssistantConfig,
    monitor: AudioActivityMonitor,
    speaker: SpeakQueue,
    router: Arc<CommandRouter>,
    session: SessionController,
    store: Arc<dyn KeyValueStore>,
    preferences: Mutex<Preferences>,
}

impl Assistant {
    /// Build the assistant and start its speech worker on the current tokio
    /// runtime. Custom commands and preferences are loaded from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the command grammar cannot be built.
    pub fn new(config: AssistantConfig, platform: Platform) -> Result<Self> {
        let monitor =
            AudioActivityMonitor::new(platform.audio, config.speech.audio_poll_interval());
        let speaker = SpeakQueue::spawn(platform.synthesizer, monitor.clone(), &config.speech);
        let actions = ActionDispatcher::new(platform.page, config.routes.clone(), &config.router);
        let router = Arc::new(CommandRouter::new(actions, Arc::clone(&platform.store))?);
        let session = SessionController::new(
            platform.recognition,
            Arc::clone(&router),
            speaker.clone(),
            config.feedback.clone(),
        );
        let preferences = store::load_preferences(platform.store.as_ref());

        info!(
            "assistant ready ({} custom commands, lang {})",
            router.custom_commands().len(),
            config.speech.lang
        );

        Ok(Self {
            config,
            monitor,
            speaker,
            router,
            session,
            store: platform.store,
            preferences: Mutex::new(preferences),
        })
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// Start or stop listening. Returns the new session state.
    pub fn toggle(&self) -> SessionState {
        self.session.toggle()
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Queue speech in the configured language.
    pub fn speak(&self, text: impl Into<String>) {
        self.speaker.speak(text);
    }

    /// Queue speech in `lang`.
    pub fn speak_in(&self, text: impl Into<String>, lang: impl Into<String>) {
        self.speaker.speak_in(text, lang);
    }

    /// Wait for everything queued so far to be spoken.
    pub async fn flush_speech(&self) {
        self.speaker.flush().await;
    }

    /// Register a custom command.
    ///
    /// # Errors
    ///
    /// See [`CommandRouter::add_custom_command`].
    pub fn add_custom_command(&self, phrase: &str, action: PageAction) -> Result<()> {
        self.router.add_custom_command(phrase, action)
    }

    /// Remove a custom command.
    ///
    /// # Errors
    ///
    /// See [`CommandRouter::remove_custom_command`].
    pub fn remove_custom_command(&self, phrase: &str) -> Result<bool> {
        self.router.remove_custom_command(phrase)
    }

    pub fn custom_commands(&self) -> Vec<CustomCommand> {
        self.router.custom_commands()
    }

    /// Route a transcript without going through the recognition session
    /// and without spoken feedback.
    pub fn route(&self, transcript: &str) -> RoutingOutcome {
        self.router.route(transcript)
    }

    pub fn preferences(&self) -> Preferences {
        self.preferences
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    /// Set one preference and persist the blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the preferences cannot be persisted.
    pub fn set_preference(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let snapshot = {
            let mut prefs = self
                .preferences
                .lock()
                .map_err(|e| AssistantError::Storage(format!("preferences lock poisoned: {e}")))?;
            prefs.set(key, value);
            prefs.clone()
        };
        store::save_preferences(self.store.as_ref(), &snapshot)
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn speaker(&self) -> &SpeakQueue {
        &self.speaker
    }

    pub fn monitor(&self) -> &AudioActivityMonitor {
        &self.monitor
    }
}
