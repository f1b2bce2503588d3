//! Configuration types for the voice assistant.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Speech output and audio-idle settings.
    pub speech: SpeechConfig,
    /// Page paths the built-in intents navigate to.
    pub routes: RouteConfig,
    /// Deferred action timings.
    pub router: RouterConfig,
    /// Spoken feedback phrases.
    pub feedback: FeedbackConfig,
    /// Persistence settings.
    pub storage: StorageConfig,
}

/// Speech output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Locale tag used when a caller does not pass one.
    pub lang: String,
    /// Upper bound on waiting for page audio to go quiet, in ms.
    pub audio_idle_timeout_ms: u64,
    /// Poll interval for audio sources that do not fire pause/ended events, in ms.
    pub audio_poll_interval_ms: u64,
    /// Poll interval while the synthesizer reports it is still speaking, in ms.
    pub synthesis_poll_interval_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            lang: "es-ES".to_owned(),
            audio_idle_timeout_ms: 120_000,
            audio_poll_interval_ms: 500,
            synthesis_poll_interval_ms: 100,
        }
    }
}

impl SpeechConfig {
    pub fn audio_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.audio_idle_timeout_ms)
    }

    pub fn audio_poll_interval(&self) -> Duration {
        Duration::from_millis(self.audio_poll_interval_ms.max(1))
    }

    pub fn synthesis_poll_interval(&self) -> Duration {
        Duration::from_millis(self.synthesis_poll_interval_ms.max(1))
    }
}

/// Page paths used by the built-in intents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Discovery view, where the mood handler lives.
    pub discover: String,
    /// Library view, where the search field lives.
    pub library: String,
    /// Player view.
    pub player: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            discover: "/descubrir".to_owned(),
            library: "/biblioteca".to_owned(),
            player: "/reproductor".to_owned(),
        }
    }
}

/// Timings for the single-shot deferred page actions.
///
/// Both are best-effort: if the destination view is not ready when the
/// delay elapses, the action is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Delay between navigating to the discovery view and applying a mood, in ms.
    pub mood_apply_delay_ms: u64,
    /// Delay between navigating to the view that owns a control and retrying
    /// a search or a custom mood action there, in ms.
    #[serde(alias = "search_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            mood_apply_delay_ms: 600,
            retry_delay_ms: 500,
        }
    }
}

impl RouterConfig {
    pub fn mood_apply_delay(&self) -> Duration {
        Duration::from_millis(self.mood_apply_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Phrases spoken back to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Spoken when a recognition session starts.
    pub listening: String,
    /// Spoken when the user stops the session.
    pub stopped: String,
    /// Spoken after a transcript was routed to an action.
    pub done: String,
    /// Spoken when no command matched the transcript.
    pub not_understood: String,
    /// Spoken when the platform has no speech recognition.
    pub unsupported: String,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            listening: "Te escucho".to_owned(),
            stopped: "Listo".to_owned(),
            done: "Hecho".to_owned(),
            not_understood: "No entendí, intenta de nuevo".to_owned(),
            unsupported: "Tu navegador no soporta reconocimiento de voz.".to_owned(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the custom-command list and preferences.
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    if let Some(home) = dirs::home_dir() {
        home.join(".sinsay")
    } else {
        PathBuf::from("/tmp").join(".sinsay")
    }
}

impl AssistantConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::AssistantError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AssistantError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/sinsay/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("sinsay").join("config.toml")
        } else if let Some(home) = dirs::home_dir() {
            home.join(".config").join("sinsay").join("config.toml")
        } else {
            PathBuf::from("/tmp/sinsay-config/config.toml")
        }
    }
}
