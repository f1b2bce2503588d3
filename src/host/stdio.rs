//! Stdin/stdout JSON bridge.
//!
//! Reads newline-delimited [`HostCommand`]s, drives an [`Assistant`] built
//! on the event adapters, and writes newline-delimited [`HostEvent`]s.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::assistant::{Assistant, Platform};
use crate::audio::{AudioRegistry, AudioSource, TrackedAudio};
use crate::config::AssistantConfig;
use crate::error::{AssistantError, Result};
use crate::host::adapters::{EventPage, EventSynthesizer, EventTx, FeedRecognition};
use crate::host::contract::{AudioState, HostCommand, HostEvent};
use crate::session::{RecognitionEvent, SessionState};
use crate::store::KeyValueStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;

/// How long to keep draining queued events after the reader stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Run the bridge on the process stdin/stdout until stdin closes or a
/// `quit` command is received.
pub async fn run_stdio_bridge(config: AssistantConfig, store: Arc<dyn KeyValueStore>) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    run_bridge(config, store, stdin, stdout).await
}

/// Run the bridge over arbitrary line-oriented streams.
pub async fn run_bridge<R, W>(
    config: AssistantConfig,
    store: Arc<dyn KeyValueStore>,
    input: R,
    output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (events_tx, events_rx) = mpsc::unbounded_channel::<HostEvent>();
    let writer_handle = tokio::spawn(write_events(events_rx, output));

    let recognition = Arc::new(FeedRecognition::new(true));
    let audio = Arc::new(AudioRegistry::new());
    let platform = Platform {
        recognition: recognition.clone(),
        synthesizer: Arc::new(EventSynthesizer::new(events_tx.clone(), Duration::ZERO)),
        page: Arc::new(EventPage::new(
            events_tx.clone(),
            config.routes.clone(),
            "/",
        )),
        audio: Arc::clone(&audio),
        store,
    };
    let assistant = Assistant::new(config, platform)?;

    let mut bridge = Bridge {
        assistant,
        recognition,
        audio,
        tracks: HashMap::new(),
        events: events_tx,
        last_state: SessionState::Idle,
    };
    let reader_result = bridge.run_reader(input).await;

    bridge.assistant.flush_speech().await;
    drop(bridge);

    match tokio::time::timeout(DRAIN_TIMEOUT, writer_handle).await {
        Ok(Ok(write_result)) => write_result?,
        Ok(Err(e)) => tracing::warn!(error = %e, "event writer task failed"),
        Err(_) => tracing::warn!("event writer did not drain in time"),
    }

    reader_result
}

struct Bridge {
    assistant: Assistant,
    recognition: Arc<FeedRecognition>,
    audio: Arc<AudioRegistry>,
    tracks: HashMap<String, Arc<TrackedAudio>>,
    events: EventTx,
    last_state: SessionState,
}

impl Bridge {
    async fn run_reader<R: AsyncBufRead + Unpin>(&mut self, mut reader: R) -> Result<()> {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await.map_err(|e| {
                AssistantError::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to read command: {e}"),
                ))
            })?;

            // EOF
            if bytes_read == 0 {
                tracing::info!("input closed (EOF); shutting down bridge");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let command: HostCommand = match serde_json::from_str(trimmed) {
                Ok(command) => command,
                Err(e) => {
                    tracing::warn!(error = %e, raw_line = %trimmed, "failed to parse host command");
                    self.emit(HostEvent::Error {
                        message: format!("failed to parse command: {e}"),
                    });
                    continue;
                }
            };

            if command == HostCommand::Quit {
                tracing::info!("quit received; shutting down bridge");
                break;
            }
            self.apply(command);
            self.publish_state();
        }

        Ok(())
    }

    fn apply(&mut self, command: HostCommand) {
        match command {
            HostCommand::Toggle => {
                self.assistant.toggle();
            }
            HostCommand::Transcript { text } => {
                if !self.recognition.is_listening() {
                    self.emit(HostEvent::Error {
                        message: "transcript received while not listening".into(),
                    });
                    return;
                }
                let session = self.assistant.session();
                let outcome = session.handle_event(RecognitionEvent::Result {
                    transcript: text.clone(),
                });
                // Sessions are single-utterance: a result always ends them.
                self.recognition.mark_ended();
                session.handle_event(RecognitionEvent::Ended);
                if let Some(outcome) = outcome {
                    self.emit(HostEvent::Routed {
                        transcript: text,
                        outcome,
                    });
                }
            }
            HostCommand::RecognitionError { message } => {
                self.assistant
                    .session()
                    .handle_event(RecognitionEvent::Error { message });
            }
            HostCommand::Ended => {
                self.recognition.mark_ended();
                self.assistant.session().handle_event(RecognitionEvent::Ended);
            }
            HostCommand::Speak { text, lang } => match lang {
                Some(lang) => self.assistant.speak_in(text, lang),
                None => self.assistant.speak(text),
            },
            HostCommand::AddCustom { phrase, action } => {
                if let Err(e) = self.assistant.add_custom_command(&phrase, action) {
                    self.emit(HostEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
            HostCommand::RemoveCustom { phrase } => {
                if let Err(e) = self.assistant.remove_custom_command(&phrase) {
                    self.emit(HostEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
            HostCommand::ListCustom => {
                let commands = self.assistant.custom_commands();
                self.emit(HostEvent::CustomCommands { commands });
            }
            HostCommand::Audio {
                id,
                state,
                position,
            } => self.update_audio(id, state, position),
            HostCommand::SetPreference { key, value } => {
                if let Err(e) = self.assistant.set_preference(&key, value) {
                    self.emit(HostEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
            HostCommand::Quit => {}
        }
    }

    fn update_audio(&mut self, id: String, state: AudioState, position: Option<f64>) {
        if state == AudioState::Removed {
            if let Some(track) = self.tracks.remove(&id) {
                let source: Arc<dyn AudioSource> = track;
                self.audio.untrack(&source);
            }
            return;
        }

        let track = self
            .tracks
            .entry(id)
            .or_insert_with(|| {
                let track = Arc::new(TrackedAudio::new());
                self.audio.track(track.clone());
                track
            })
            .clone();

        match state {
            // Hosts that omit the position report something already audible.
            AudioState::Playing => track.play_from(position.unwrap_or(f64::EPSILON)),
            AudioState::Paused => {
                if let Some(position) = position {
                    track.seek(position);
                }
                track.pause();
            }
            AudioState::Ended => track.end(),
            AudioState::Removed => {}
        }
    }

    fn publish_state(&mut self) {
        let state = self.assistant.state();
        if state != self.last_state {
            self.last_state = state;
            self.emit(HostEvent::State { state });
        }
    }

    fn emit(&self, event: HostEvent) {
        if self.events.send(event).is_err() {
            tracing::warn!("event writer gone; dropping event");
        }
    }
}

/// Serialize events to `output`, one JSON object per line.
async fn write_events<W: AsyncWrite + Unpin>(
    mut events: mpsc::UnboundedReceiver<HostEvent>,
    output: W,
) -> Result<()> {
    let mut writer = BufWriter::new(output);
    while let Some(event) = events.recv().await {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize host event; skipping");
                continue;
            }
        };
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
