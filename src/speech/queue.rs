//! Serialized speech output.
//!
//! All utterances go through one unbounded queue drained by a single worker
//! task, so they are spoken in call order and never overlap. Before each
//! utterance the worker waits for page audio to go quiet and for the
//! synthesizer to finish anything it is already saying. A failed utterance
//! is logged and skipped; the worker keeps draining.

use crate::audio::{AudioActivityMonitor, IdleWait};
use crate::config::SpeechConfig;
use crate::speech::{SpeechRequest, SpeechSynthesizer};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

enum SpeakJob {
    Utterance(SpeechRequest),
    Flush(oneshot::Sender<()>),
}

/// Handle to the process-wide speech queue.
///
/// Cloning the handle shares the same queue and worker. The worker exits
/// once every handle is dropped and the queue is drained.
#[derive(Clone)]
pub struct SpeakQueue {
    tx: mpsc::UnboundedSender<SpeakJob>,
    pending: Arc<AtomicUsize>,
    default_lang: String,
}

struct Worker {
    synth: Arc<dyn SpeechSynthesizer>,
    monitor: AudioActivityMonitor,
    idle_timeout: Duration,
    busy_poll: Duration,
    pending: Arc<AtomicUsize>,
}

impl SpeakQueue {
    /// Spawn the queue worker on the current tokio runtime.
    pub fn spawn(
        synth: Arc<dyn SpeechSynthesizer>,
        monitor: AudioActivityMonitor,
        config: &SpeechConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = Worker {
            synth,
            monitor,
            idle_timeout: config.audio_idle_timeout(),
            busy_poll: config.synthesis_poll_interval(),
            pending: Arc::clone(&pending),
        };
        tokio::spawn(worker.run(rx));

        Self {
            tx,
            pending,
            default_lang: config.lang.clone(),
        }
    }

    /// Queue `text` in the default language.
    pub fn speak(&self, text: impl Into<String>) {
        self.speak_in(text, self.default_lang.clone());
    }

    /// Queue `text` in `lang`. Returns immediately.
    pub fn speak_in(&self, text: impl Into<String>, lang: impl Into<String>) {
        let request = SpeechRequest::new(text, lang);
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(SpeakJob::Utterance(request)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!("speak queue worker is gone; dropping utterance");
        }
    }

    /// Wait until every utterance queued before this call has finished.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(SpeakJob::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    /// Utterances queued but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn default_lang(&self) -> &str {
        &self.default_lang
    }
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<SpeakJob>) {
        while let Some(job) = rx.recv().await {
            match job {
                SpeakJob::Utterance(request) => {
                    self.speak_one(request).await;
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                }
                SpeakJob::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("speak queue closed");
    }

    async fn speak_one(&self, request: SpeechRequest) {
        if self.monitor.wait_for_audio_idle(self.idle_timeout).await == IdleWait::TimedOut {
            warn!("page audio still playing after {:?}; speaking anyway", self.idle_timeout);
        }

        while self.synth_is_speaking() {
            tokio::time::sleep(self.busy_poll).await;
        }

        debug!(lang = %request.lang, "speaking: {}", request.text);
        // A panicking synthesizer must not take the worker down with it.
        match AssertUnwindSafe(self.synth.speak(&request)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("speech synthesis failed for {:?}: {e}", request.text),
            Err(_) => warn!("speech synthesizer panicked on {:?}", request.text),
        }
    }

    fn synth_is_speaking(&self) -> bool {
        std::panic::catch_unwind(AssertUnwindSafe(|| self.synth.is_speaking())).unwrap_or_else(
            |_| {
                warn!("speech synthesizer panicked reporting its state; assuming idle");
                false
            },
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::audio::{AudioRegistry, TrackedAudio};
    use crate::error::{AssistantError, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;
    use tokio::time::Instant;

    /// Records start/end of every utterance with the (paused) clock offset.
    struct ScriptedSynth {
        origin: Instant,
        log: Mutex<Vec<(String, Duration)>>,
        utterance_len: Duration,
        busy: AtomicBool,
    }

    impl ScriptedSynth {
        fn new(utterance_len: Duration) -> Self {
            Self {
                origin: Instant::now(),
                log: Mutex::new(Vec::new()),
                utterance_len,
                busy: AtomicBool::new(false),
            }
        }

        fn entries(&self) -> Vec<(String, Duration)> {
            self.log.lock().unwrap().clone()
        }

        fn labels(&self) -> Vec<String> {
            self.entries().into_iter().map(|(l, _)| l).collect()
        }

        fn record(&self, label: String) {
            self.log
                .lock()
                .unwrap()
                .push((label, self.origin.elapsed()));
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for ScriptedSynth {
        fn is_speaking(&self) -> bool {
            self.busy.load(Ordering::SeqCst)
        }

        async fn speak(&self, request: &SpeechRequest) -> Result<()> {
            self.record(format!("start:{}", request.text));
            if request.text == "boom" {
                panic!("synthesizer crashed");
            }
            if request.text == "bad" {
                self.record("error:bad".to_owned());
                return Err(AssistantError::Synthesis("voice unavailable".into()));
            }
            tokio::time::sleep(self.utterance_len).await;
            self.record(format!("end:{}", request.text));
            Ok(())
        }
    }

    fn queue_with(synth: Arc<ScriptedSynth>, registry: Arc<AudioRegistry>) -> SpeakQueue {
        let config = SpeechConfig::default();
        let monitor = AudioActivityMonitor::new(registry, config.audio_poll_interval());
        SpeakQueue::spawn(synth, monitor, &config)
    }

    #[tokio::test(start_paused = true)]
    async fn utterances_never_interleave() {
        let synth = Arc::new(ScriptedSynth::new(Duration::from_millis(800)));
        let queue = queue_with(Arc::clone(&synth), Arc::new(AudioRegistry::new()));

        queue.speak("A");
        queue.speak("B");
        queue.speak("C");
        queue.flush().await;

        assert_eq!(
            synth.labels(),
            ["start:A", "end:A", "start:B", "end:B", "start:C", "end:C"]
        );
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_utterance_waits_for_first_even_while_page_audio_plays() {
        let registry = Arc::new(AudioRegistry::new());
        let track = Arc::new(TrackedAudio::new());
        track.play_from(2.0);
        registry.track(track.clone());

        let synth = Arc::new(ScriptedSynth::new(Duration::from_millis(400)));
        let queue = queue_with(Arc::clone(&synth), registry);

        queue.speak("A");
        queue.speak("B");

        let pauser = Arc::clone(&track);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            pauser.pause();
        });

        queue.flush().await;

        let entries = synth.entries();
        let labels: Vec<_> = entries.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, ["start:A", "end:A", "start:B", "end:B"]);
        assert_eq!(entries[0].1, Duration::from_millis(1000), "A waits for quiet");
        assert_eq!(entries[2].1, Duration::from_millis(1400), "B waits for A");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_utterance_does_not_stall_queue() {
        let synth = Arc::new(ScriptedSynth::new(Duration::from_millis(100)));
        let queue = queue_with(Arc::clone(&synth), Arc::new(AudioRegistry::new()));

        queue.speak("bad");
        queue.speak("after");
        queue.flush().await;

        assert_eq!(
            synth.labels(),
            ["start:bad", "error:bad", "start:after", "end:after"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_synthesizer_does_not_kill_worker() {
        let synth = Arc::new(ScriptedSynth::new(Duration::from_millis(100)));
        let queue = queue_with(Arc::clone(&synth), Arc::new(AudioRegistry::new()));

        queue.speak("boom");
        queue.flush().await;
        assert_eq!(queue.pending(), 0);

        queue.speak("after");
        queue.flush().await;

        assert_eq!(synth.labels(), ["start:boom", "start:after", "end:after"]);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_while_synthesizer_is_busy_elsewhere() {
        let synth = Arc::new(ScriptedSynth::new(Duration::from_millis(100)));
        synth.busy.store(true, Ordering::SeqCst);
        let queue = queue_with(Arc::clone(&synth), Arc::new(AudioRegistry::new()));

        let releaser = Arc::clone(&synth);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            releaser.busy.store(false, Ordering::SeqCst);
        });

        queue.speak("hola");
        queue.flush().await;

        let entries = synth.entries();
        assert_eq!(entries[0].0, "start:hola");
        assert_eq!(entries[0].1, Duration::from_millis(300), "next 100 ms poll");
    }

    #[tokio::test(start_paused = true)]
    async fn default_and_explicit_language() {
        struct LangSynth(Mutex<Vec<String>>);

        #[async_trait]
        impl SpeechSynthesizer for LangSynth {
            fn is_speaking(&self) -> bool {
                false
            }
            async fn speak(&self, request: &SpeechRequest) -> Result<()> {
                self.0.lock().unwrap().push(request.lang.clone());
                Ok(())
            }
        }

        let synth = Arc::new(LangSynth(Mutex::new(Vec::new())));
        let config = SpeechConfig::default();
        let monitor = AudioActivityMonitor::new(
            Arc::new(AudioRegistry::new()),
            config.audio_poll_interval(),
        );
        let queue = SpeakQueue::spawn(synth.clone(), monitor, &config);

        queue.speak("uno");
        queue.speak_in("two", "en-US");
        queue.flush().await;

        assert_eq!(queue.default_lang(), "es-ES");
        assert_eq!(*synth.0.lock().unwrap(), ["es-ES", "en-US"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_counts_unfinished_utterances() {
        let synth = Arc::new(ScriptedSynth::new(Duration::from_secs(1)));
        let queue = queue_with(Arc::clone(&synth), Arc::new(AudioRegistry::new()));

        queue.speak("A");
        queue.speak("B");
        assert_eq!(queue.pending(), 2);

        queue.flush().await;
        assert_eq!(queue.pending(), 0);
    }
}
