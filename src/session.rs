//! Speech recognition session control.
//!
//! [`SessionController`] is a two-state machine (idle / listening) around a
//! single platform recognition session. The session is created on the
//! first toggle and reused afterwards. Transcripts it produces are routed
//! through the [`CommandRouter`] and answered with spoken feedback.

use crate::config::FeedbackConfig;
use crate::error::Result;
use crate::router::{CommandRouter, RoutingOutcome};
use crate::speech::SpeakQueue;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

/// Capacity of the routed-transcript broadcast channel.
const ROUTED_CAPACITY: usize = 32;

/// Whether the assistant is listening.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Listening,
}

/// Signals delivered by a platform recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Best transcript for one utterance.
    Result { transcript: String },
    /// Recognition error reported by the platform. The platform still sends
    /// `Ended` afterwards.
    Error { message: String },
    /// The session stopped, for any reason.
    Ended,
}

/// One platform recognition session.
pub trait RecognitionSession: Send + Sync {
    fn start(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
}

/// A freshly created session and its event stream.
pub struct RecognitionHandle {
    pub session: Arc<dyn RecognitionSession>,
    pub events: mpsc::UnboundedReceiver<RecognitionEvent>,
}

/// Platform speech recognition capability.
pub trait SpeechRecognition: Send + Sync {
    /// Create a session, or `None` if the platform cannot recognise speech.
    fn create_session(&self) -> Option<RecognitionHandle>;
}

/// A transcript and what the router made of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedTranscript {
    pub transcript: String,
    pub outcome: RoutingOutcome,
}

struct Shared {
    recognition: Arc<dyn SpeechRecognition>,
    router: Arc<CommandRouter>,
    speaker: SpeakQueue,
    feedback: FeedbackConfig,
    session: Mutex<Option<Arc<dyn RecognitionSession>>>,
    state: watch::Sender<SessionState>,
    routed: broadcast::Sender<RoutedTranscript>,
}

/// Idle/listening state machine for voice input.
#[derive(Clone)]
pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(
        recognition: Arc<dyn SpeechRecognition>,
        router: Arc<CommandRouter>,
        speaker: SpeakQueue,
        feedback: FeedbackConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let (routed, _) = broadcast::channel(ROUTED_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                recognition,
                router,
                speaker,
                feedback,
                session: Mutex::new(None),
                state,
                routed,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Observe state changes, e.g. to redraw the microphone button.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Observe every routed transcript.
    pub fn subscribe_routed(&self) -> broadcast::Receiver<RoutedTranscript> {
        self.shared.routed.subscribe()
    }

    /// Start listening when idle, stop when listening.
    ///
    /// A session start/stop failure leaves the state unchanged. Returns the
    /// state after the toggle.
    pub fn toggle(&self) -> SessionState {
        let Some(session) = self.ensure_session() else {
            warn!("speech recognition is not supported on this platform");
            self.shared.speaker.speak(&self.shared.feedback.unsupported);
            return self.state();
        };

        match self.state() {
            SessionState::Idle => match session.start() {
                Ok(()) => {
                    self.set_state(SessionState::Listening);
                    self.shared.speaker.speak(&self.shared.feedback.listening);
                }
                Err(e) => warn!("cannot start recognition: {e}"),
            },
            SessionState::Listening => match session.stop() {
                Ok(()) => {
                    self.set_state(SessionState::Idle);
                    self.shared.speaker.speak(&self.shared.feedback.stopped);
                }
                Err(e) => warn!("cannot stop recognition: {e}"),
            },
        }
        self.state()
    }

    /// React to one recognition signal. Returns the routing outcome for
    /// transcript results.
    pub fn handle_event(&self, event: RecognitionEvent) -> Option<RoutingOutcome> {
        handle_event(&self.shared, event)
    }

    fn set_state(&self, next: SessionState) {
        set_state(&self.shared, next);
    }

    fn ensure_session(&self) -> Option<Arc<dyn RecognitionSession>> {
        let mut slot = match self.shared.session.lock() {
            Ok(slot) => slot,
            Err(e) => {
                warn!("recognition session lock poisoned: {e}");
                return None;
            }
        };
        if let Some(session) = slot.as_ref() {
            return Some(Arc::clone(session));
        }

        let handle = self.shared.recognition.create_session()?;
        debug!("created recognition session");
        *slot = Some(Arc::clone(&handle.session));
        tokio::spawn(pump_events(Arc::downgrade(&self.shared), handle.events));
        Some(handle.session)
    }
}

fn set_state(shared: &Shared, next: SessionState) {
    let previous = shared.state.send_replace(next);
    if previous != next {
        info!("recognition session {previous:?} -> {next:?}");
    }
}

fn handle_event(shared: &Shared, event: RecognitionEvent) -> Option<RoutingOutcome> {
    match event {
        RecognitionEvent::Result { transcript } => {
            let outcome = shared.router.route(&transcript);
            let reply = if outcome.is_match() {
                &shared.feedback.done
            } else {
                &shared.feedback.not_understood
            };
            shared.speaker.speak(reply);
            let _ = shared.routed.send(RoutedTranscript {
                transcript,
                outcome,
            });
            Some(outcome)
        }
        RecognitionEvent::Error { message } => {
            warn!("recognition error: {message}");
            None
        }
        RecognitionEvent::Ended => {
            set_state(shared, SessionState::Idle);
            None
        }
    }
}

/// Forward session events until the platform closes the stream or the
/// controller is dropped.
async fn pump_events(shared: Weak<Shared>, mut events: mpsc::UnboundedReceiver<RecognitionEvent>) {
    while let Some(event) = events.recv().await {
        let Some(strong) = shared.upgrade() else {
            break;
        };
        handle_event(&strong, event);
    }
    debug!("recognition event stream closed");
}
