//! Platform adapters that turn assistant activity into [`HostEvent`]s.
//!
//! The host shell owns the real page, speech engine and microphone; these
//! adapters stand in for them inside the assistant and report what should
//! happen on the other side of the bridge.

use crate::actions::{Mood, Page};
use crate::config::RouteConfig;
use crate::error::{AssistantError, Result};
use crate::host::contract::HostEvent;
use crate::session::{RecognitionEvent, RecognitionHandle, RecognitionSession, SpeechRecognition};
use crate::speech::{SpeechRequest, SpeechSynthesizer};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub type EventTx = mpsc::UnboundedSender<HostEvent>;

fn emit(events: &EventTx, event: HostEvent) -> Result<()> {
    events
        .send(event)
        .map_err(|_| AssistantError::Page("host event channel closed".into()))
}

/// Page model that tracks the current path.
///
/// The search field only exists on the library view and the mood handler
/// only on the discovery view; the play/pause control is always present.
pub struct EventPage {
    events: EventTx,
    routes: RouteConfig,
    path: Mutex<String>,
}

impl EventPage {
    pub fn new(events: EventTx, routes: RouteConfig, initial_path: impl Into<String>) -> Self {
        Self {
            events,
            routes,
            path: Mutex::new(initial_path.into()),
        }
    }

    pub fn current_path(&self) -> String {
        self.path.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn is_on(&self, path: &str) -> bool {
        self.path.lock().is_ok_and(|p| *p == path)
    }
}

impl Page for EventPage {
    fn navigate(&self, path: &str) -> Result<()> {
        if let Ok(mut current) = self.path.lock() {
            *current = path.to_owned();
        }
        emit(
            &self.events,
            HostEvent::Navigate {
                path: path.to_owned(),
            },
        )
    }

    fn fill_search(&self, query: &str) -> Result<bool> {
        if !self.is_on(&self.routes.library) {
            return Ok(false);
        }
        emit(
            &self.events,
            HostEvent::Search {
                query: query.to_owned(),
            },
        )?;
        Ok(true)
    }

    fn apply_mood(&self, mood: Mood) -> Result<bool> {
        if !self.is_on(&self.routes.discover) {
            return Ok(false);
        }
        emit(&self.events, HostEvent::Mood { mood })?;
        Ok(true)
    }

    fn click_play(&self) -> Result<bool> {
        emit(&self.events, HostEvent::Play)?;
        Ok(true)
    }
}

/// Synthesizer that hands each utterance to the host.
///
/// Holds the "speaking" flag for `per_char` times the text length so hosts
/// that play the text themselves get a rough pacing.
pub struct EventSynthesizer {
    events: EventTx,
    speaking: AtomicBool,
    per_char: Duration,
}

impl EventSynthesizer {
    pub fn new(events: EventTx, per_char: Duration) -> Self {
        Self {
            events,
            speaking: AtomicBool::new(false),
            per_char,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for EventSynthesizer {
    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    async fn speak(&self, request: &SpeechRequest) -> Result<()> {
        self.speaking.store(true, Ordering::SeqCst);
        let sent = self
            .events
            .send(HostEvent::Utterance {
                text: request.text.clone(),
                lang: request.lang.clone(),
            })
            .map_err(|_| AssistantError::Synthesis("host event channel closed".into()));
        if sent.is_ok() {
            let chars = u32::try_from(request.text.chars().count()).unwrap_or(u32::MAX);
            tokio::time::sleep(self.per_char.saturating_mul(chars)).await;
        }
        self.speaking.store(false, Ordering::SeqCst);
        sent
    }
}

struct FeedSession {
    listening: Arc<AtomicBool>,
    // Keeps the controller's event pump open for the session's lifetime.
    _events: mpsc::UnboundedSender<RecognitionEvent>,
}

impl RecognitionSession for FeedSession {
    fn start(&self) -> Result<()> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(AssistantError::Recognition("session already started".into()));
        }
        Ok(())
    }

    /// The controller is already idle once `stop` returns, so no `Ended`
    /// is queued; a late one could cancel the next start.
    fn stop(&self) -> Result<()> {
        self.listening.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Recognition capability whose transcripts come from the host.
pub struct FeedRecognition {
    available: bool,
    listening: Arc<AtomicBool>,
}

impl FeedRecognition {
    /// `available = false` models a platform without speech recognition.
    pub fn new(available: bool) -> Self {
        Self {
            available,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the session is started.
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Mark the session as ended by the platform.
    pub fn mark_ended(&self) {
        self.listening.store(false, Ordering::SeqCst);
    }
}

impl SpeechRecognition for FeedRecognition {
    fn create_session(&self) -> Option<RecognitionHandle> {
        if !self.available {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        Some(RecognitionHandle {
            session: Arc::new(FeedSession {
                listening: Arc::clone(&self.listening),
                _events: tx,
            }),
            events: rx,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<HostEvent>) -> Vec<HostEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn page_controls_depend_on_current_view() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let page = EventPage::new(tx, RouteConfig::default(), "/");

        assert!(!page.fill_search("rock").unwrap());
        assert!(!page.apply_mood(Mood::Relax).unwrap());
        assert!(page.click_play().unwrap());

        page.navigate("/biblioteca").unwrap();
        assert!(page.fill_search("rock").unwrap());
        assert_eq!(page.current_path(), "/biblioteca");

        page.navigate("/descubrir").unwrap();
        assert!(page.apply_mood(Mood::Relax).unwrap());

        assert_eq!(
            drain(&mut rx),
            [
                HostEvent::Play,
                HostEvent::Navigate {
                    path: "/biblioteca".into()
                },
                HostEvent::Search {
                    query: "rock".into()
                },
                HostEvent::Navigate {
                    path: "/descubrir".into()
                },
                HostEvent::Mood { mood: Mood::Relax },
            ]
        );
    }

    #[test]
    fn closed_channel_is_a_page_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let page = EventPage::new(tx, RouteConfig::default(), "/");
        assert!(matches!(page.click_play(), Err(AssistantError::Page(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn synthesizer_reports_speaking_while_paced() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let synth = Arc::new(EventSynthesizer::new(tx, Duration::from_millis(10)));

        let speaking = Arc::clone(&synth);
        let task = tokio::spawn(async move {
            speaking
                .speak(&SpeechRequest::new("hola", "es-ES"))
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(synth.is_speaking());
        task.await.unwrap().unwrap();
        assert!(!synth.is_speaking());

        assert_eq!(
            drain(&mut rx),
            [HostEvent::Utterance {
                text: "hola".into(),
                lang: "es-ES".into()
            }]
        );
    }

    #[test]
    fn feed_session_start_stop() {
        let recognition = FeedRecognition::new(true);
        let mut handle = recognition.create_session().unwrap();

        handle.session.start().unwrap();
        assert!(recognition.is_listening());
        assert!(handle.session.start().is_err(), "double start rejected");

        handle.session.stop().unwrap();
        assert!(!recognition.is_listening());
        assert!(
            handle.events.try_recv().is_err(),
            "stop must not queue a late Ended"
        );

        handle.session.start().unwrap();
        assert!(recognition.is_listening());
    }

    #[test]
    fn unavailable_recognition_has_no_session() {
        assert!(FeedRecognition::new(false).create_session().is_none());
    }
}
