//! Page audio activity tracking.
//!
//! The assistant must never talk over media that is already playing on the
//! page. [`AudioActivityMonitor`] answers "is anything audible right now?"
//! and can wait until the answer becomes "no".
//!
//! Waiting races three triggers so that sources with unreliable event
//! delivery still resolve:
//!
//! 1. pause/ended events from every tracked source,
//! 2. a periodic poll of all sources,
//! 3. an overall timeout.

use futures_util::stream::{self, StreamExt};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// Capacity of the per-source playback event channel.
const EVENT_CAPACITY: usize = 16;

/// Playback transitions emitted by an audio source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Playing,
    Paused,
    Ended,
}

/// A media element on the page that can produce sound.
pub trait AudioSource: Send + Sync {
    fn is_paused(&self) -> bool;
    fn is_ended(&self) -> bool;
    /// Current playback position in seconds.
    fn position_secs(&self) -> f64;
    /// Subscribe to playback transitions. Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent>;

    /// Unpaused, not ended, and past the start of the media.
    fn is_audible(&self) -> bool {
        !self.is_paused() && !self.is_ended() && self.position_secs() > 0.0
    }
}

#[derive(Debug, Clone, Copy)]
struct TrackState {
    paused: bool,
    ended: bool,
    position_secs: f64,
}

/// An in-memory [`AudioSource`] whose state is driven by the host.
///
/// Starts paused at position zero, like a freshly created media element.
pub struct TrackedAudio {
    state: Mutex<TrackState>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl Default for TrackedAudio {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackedAudio {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(TrackState {
                paused: true,
                ended: false,
                position_secs: 0.0,
            }),
            events,
        }
    }

    /// Resume playback from `position_secs`.
    pub fn play_from(&self, position_secs: f64) {
        self.update(|s| {
            s.paused = false;
            s.ended = false;
            s.position_secs = position_secs;
        });
        let _ = self.events.send(PlaybackEvent::Playing);
    }

    pub fn pause(&self) {
        self.update(|s| s.paused = true);
        let _ = self.events.send(PlaybackEvent::Paused);
    }

    pub fn end(&self) {
        self.update(|s| {
            s.paused = true;
            s.ended = true;
        });
        let _ = self.events.send(PlaybackEvent::Ended);
    }

    /// Move the playback position without firing an event.
    pub fn seek(&self, position_secs: f64) {
        self.update(|s| s.position_secs = position_secs);
    }

    /// Number of live event subscriptions.
    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn update(&self, f: impl FnOnce(&mut TrackState)) {
        match self.state.lock() {
            Ok(mut state) => f(&mut state),
            Err(e) => warn!("audio source state lock poisoned: {e}"),
        }
    }

    fn snapshot(&self) -> Option<TrackState> {
        self.state.lock().ok().map(|s| *s)
    }
}

impl AudioSource for TrackedAudio {
    fn is_paused(&self) -> bool {
        self.snapshot().is_none_or(|s| s.paused)
    }

    fn is_ended(&self) -> bool {
        self.snapshot().is_some_and(|s| s.ended)
    }

    fn position_secs(&self) -> f64 {
        self.snapshot().map_or(0.0, |s| s.position_secs)
    }

    fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }
}

/// The set of audio sources currently present on the page.
#[derive(Default)]
pub struct AudioRegistry {
    sources: RwLock<Vec<Arc<dyn AudioSource>>>,
}

impl AudioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a source. Tracking the same source twice is a no-op.
    pub fn track(&self, source: Arc<dyn AudioSource>) {
        if let Ok(mut sources) = self.sources.write() {
            if !sources.iter().any(|s| Arc::ptr_eq(s, &source)) {
                sources.push(source);
            }
        }
    }

    /// Stop tracking a source. Returns `true` if it was tracked.
    pub fn untrack(&self, source: &Arc<dyn AudioSource>) -> bool {
        let Ok(mut sources) = self.sources.write() else {
            return false;
        };
        let before = sources.len();
        sources.retain(|s| !Arc::ptr_eq(s, source));
        sources.len() != before
    }

    /// Snapshot of the tracked sources.
    pub fn sources(&self) -> Vec<Arc<dyn AudioSource>> {
        self.sources.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sources.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How an audio-idle wait finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleWait {
    /// No source was audible.
    Quiet,
    /// The timeout elapsed while something was still playing.
    TimedOut,
}

/// Detects competing page audio.
#[derive(Clone)]
pub struct AudioActivityMonitor {
    registry: Arc<AudioRegistry>,
    poll_interval: Duration,
}

impl AudioActivityMonitor {
    pub fn new(registry: Arc<AudioRegistry>, poll_interval: Duration) -> Self {
        Self {
            registry,
            poll_interval,
        }
    }

    pub fn registry(&self) -> &Arc<AudioRegistry> {
        &self.registry
    }

    /// Returns `true` if at least one tracked source is audible.
    pub fn is_any_audio_playing(&self) -> bool {
        self.registry.sources().iter().any(|s| s.is_audible())
    }

    /// Wait until no tracked source is audible, or until `timeout` elapses.
    ///
    /// Event subscriptions and timers live only for the duration of the call
    /// and are released on return, whichever trigger wins.
    pub async fn wait_for_audio_idle(&self, timeout: Duration) -> IdleWait {
        if !self.is_any_audio_playing() {
            return IdleWait::Quiet;
        }

        let sources = self.registry.sources();
        let mut events = stream::select_all(
            sources
                .iter()
                .map(|s| BroadcastStream::new(s.subscribe()))
                .collect::<Vec<_>>(),
        );
        let mut events_open = !sources.is_empty();

        // A source may have stopped between the first check and subscribing.
        if !self.is_any_audio_playing() {
            return IdleWait::Quiet;
        }

        debug!(
            sources = sources.len(),
            "page audio active, waiting for idle"
        );

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut poll = tokio::time::interval_at(
            tokio::time::Instant::now() + self.poll_interval,
            self.poll_interval,
        );
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    debug!("audio idle wait timed out after {timeout:?}");
                    return IdleWait::TimedOut;
                }
                event = events.next(), if events_open => {
                    if event.is_none() {
                        events_open = false;
                    }
                }
                _ = poll.tick() => {}
            }

            if !self.is_any_audio_playing() {
                return IdleWait::Quiet;
            }
        }
    }
}
