//! Page actions the assistant can trigger.
//!
//! [`Page`] is the host page: navigation plus the handful of controls the
//! assistant pokes at. [`ActionDispatcher`] layers the assistant's behaviour
//! on top of it, including the single-shot deferred attempts used when a
//! control only exists on another view.
//!
//! Custom commands store a [`PageAction`] rather than executable text, so
//! everything a stored command can do is listed in that enum.

use crate::config::{RouteConfig, RouterConfig};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Named listening moods understood by the discovery view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Relax,
    Energy,
}

impl Mood {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relax => "relax",
            Self::Energy => "energy",
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action a custom command can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageAction {
    Navigate { path: String },
    Search { query: String },
    Mood { mood: Mood },
    Play,
    OpenPlayer,
}

/// The host page.
///
/// Methods returning `bool` report `false` when the control or handler they
/// need is not present on the current view.
pub trait Page: Send + Sync + 'static {
    fn navigate(&self, path: &str) -> Result<()>;
    /// Put `query` into the search field and fire its input handler.
    fn fill_search(&self, query: &str) -> Result<bool>;
    /// Hand `mood` to the view's mood handler.
    fn apply_mood(&self, mood: Mood) -> Result<bool>;
    /// Press the play/pause control.
    fn click_play(&self) -> Result<bool>;
}

/// Runs page actions on behalf of the router. Fire-and-forget: failures are
/// logged, never returned.
///
/// Deferred attempts run on the tokio runtime that was current when the
/// dispatcher was built, so actions may be dispatched from any thread. A
/// dispatcher built outside a runtime falls back to the caller's runtime and
/// drops deferred attempts when there is none.
#[derive(Clone)]
pub struct ActionDispatcher {
    page: Arc<dyn Page>,
    routes: RouteConfig,
    mood_delay: Duration,
    retry_delay: Duration,
    runtime: Option<Handle>,
}

impl ActionDispatcher {
    pub fn new(page: Arc<dyn Page>, routes: RouteConfig, timings: &RouterConfig) -> Self {
        Self {
            page,
            routes,
            mood_delay: timings.mood_apply_delay(),
            retry_delay: timings.retry_delay(),
            runtime: Handle::try_current().ok(),
        }
    }

    pub fn routes(&self) -> &RouteConfig {
        &self.routes
    }

    /// Run a stored custom-command action.
    pub fn dispatch(&self, action: &PageAction) {
        match action {
            PageAction::Navigate { path } => self.navigate(path),
            PageAction::Search { query } => self.search(query),
            PageAction::Mood { mood } => self.mood(*mood),
            PageAction::Play => self.play(),
            PageAction::OpenPlayer => self.open_player(),
        }
    }

    pub fn navigate(&self, path: &str) {
        debug!("navigate to {path}");
        if let Err(e) = self.page.navigate(path) {
            warn!("navigation to {path} failed: {e}");
        }
    }

    /// Search on the current view, or go to the library and try once more
    /// after the retry delay.
    pub fn search(&self, query: &str) {
        match self.page.fill_search(query) {
            Ok(true) => debug!("search dispatched: {query}"),
            Ok(false) => {
                debug!("no search field here; retrying from the library view");
                self.navigate(&self.routes.library);
                let page = Arc::clone(&self.page);
                let query = query.to_owned();
                self.defer(self.retry_delay, move || match page.fill_search(&query) {
                    Ok(true) => debug!("search dispatched after navigation: {query}"),
                    Ok(false) => debug!("search field still missing; dropping {query:?}"),
                    Err(e) => warn!("search retry failed: {e}"),
                });
            }
            Err(e) => warn!("search failed: {e}"),
        }
    }

    /// Apply a mood here if the view supports it, otherwise go to the
    /// discovery view and try once more after the retry delay.
    pub fn mood(&self, mood: Mood) {
        match self.page.apply_mood(mood) {
            Ok(true) => debug!("mood applied: {mood}"),
            Ok(false) => {
                self.navigate(&self.routes.discover);
                self.defer_mood(mood, self.retry_delay);
            }
            Err(e) => warn!("applying mood {mood} failed: {e}"),
        }
    }

    /// Navigate to the discovery view, then after the grace delay make one
    /// attempt at applying `mood`. Dropped silently if the view never
    /// registered its handler.
    pub fn mood_via_discover(&self, mood: Mood) {
        self.navigate(&self.routes.discover);
        self.defer_mood(mood, self.mood_delay);
    }

    pub fn play(&self) {
        match self.page.click_play() {
            Ok(true) => debug!("play/pause toggled"),
            Ok(false) => debug!("no play control on this view"),
            Err(e) => warn!("play toggle failed: {e}"),
        }
    }

    pub fn open_player(&self) {
        self.navigate(&self.routes.player);
    }

    fn defer_mood(&self, mood: Mood, delay: Duration) {
        let page = Arc::clone(&self.page);
        self.defer(delay, move || match page.apply_mood(mood) {
            Ok(true) => debug!("mood applied after navigation: {mood}"),
            Ok(false) => debug!("mood handler not ready; dropping {mood}"),
            Err(e) => warn!("deferred mood {mood} failed: {e}"),
        });
    }

    /// Run `attempt` once after `delay`.
    fn defer(&self, delay: Duration, attempt: impl FnOnce() + Send + 'static) {
        let runtime = self
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok());
        let Some(runtime) = runtime else {
            warn!("no tokio runtime available; dropping deferred page action");
            return;
        };
        runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            attempt();
        });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::error::AssistantError;
    use std::sync::Mutex;

    /// Page whose controls appear only on specific paths.
    #[derive(Default)]
    struct FakePage {
        path: Mutex<String>,
        log: Mutex<Vec<String>>,
        search_path: Option<&'static str>,
        mood_path: Option<&'static str>,
        broken: bool,
    }

    impl FakePage {
        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn on(&self, path: Option<&str>) -> bool {
            path.is_some_and(|p| *self.path.lock().unwrap() == p)
        }
    }

    impl Page for FakePage {
        fn navigate(&self, path: &str) -> Result<()> {
            *self.path.lock().unwrap() = path.to_owned();
            self.log.lock().unwrap().push(format!("navigate:{path}"));
            Ok(())
        }

        fn fill_search(&self, query: &str) -> Result<bool> {
            if !self.on(self.search_path) {
                return Ok(false);
            }
            self.log.lock().unwrap().push(format!("search:{query}"));
            Ok(true)
        }

        fn apply_mood(&self, mood: Mood) -> Result<bool> {
            if !self.on(self.mood_path) {
                return Ok(false);
            }
            self.log.lock().unwrap().push(format!("mood:{mood}"));
            Ok(true)
        }

        fn click_play(&self) -> Result<bool> {
            if self.broken {
                return Err(AssistantError::Page("button detached".into()));
            }
            self.log.lock().unwrap().push("play".to_owned());
            Ok(true)
        }
    }

    fn dispatcher(page: Arc<FakePage>) -> ActionDispatcher {
        ActionDispatcher::new(page, RouteConfig::default(), &RouterConfig::default())
    }

    #[test]
    fn page_action_serializes_with_kind_tag() {
        let action = PageAction::Mood { mood: Mood::Relax };
        let json = serde_json::to_string(&action).unwrap();
        assert_eq!(json, r#"{"kind":"mood","mood":"relax"}"#);

        let parsed: PageAction =
            serde_json::from_str(r#"{"kind":"navigate","path":"/novedades"}"#).unwrap();
        assert_eq!(
            parsed,
            PageAction::Navigate {
                path: "/novedades".into()
            }
        );

        let parsed: PageAction = serde_json::from_str(r#"{"kind":"open_player"}"#).unwrap();
        assert_eq!(parsed, PageAction::OpenPlayer);
    }

    #[test]
    fn unknown_action_kind_is_rejected() {
        let parsed = serde_json::from_str::<PageAction>(r#"{"kind":"eval","code":"alert(1)"}"#);
        assert!(parsed.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn search_on_current_view_is_immediate() {
        let page = Arc::new(FakePage {
            path: Mutex::new("/biblioteca".into()),
            search_path: Some("/biblioteca"),
            ..FakePage::default()
        });
        dispatcher(Arc::clone(&page)).search("rock");
        assert_eq!(page.log(), ["search:rock"]);
    }

    #[tokio::test(start_paused = true)]
    async fn search_elsewhere_navigates_then_retries_once() {
        let page = Arc::new(FakePage {
            search_path: Some("/biblioteca"),
            ..FakePage::default()
        });
        dispatcher(Arc::clone(&page)).search("jazz");
        assert_eq!(page.log(), ["navigate:/biblioteca"]);

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(page.log().len(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(page.log(), ["navigate:/biblioteca", "search:jazz"]);
    }

    #[tokio::test(start_paused = true)]
    async fn search_retry_gives_up_when_field_never_appears() {
        let page = Arc::new(FakePage::default());
        dispatcher(Arc::clone(&page)).search("jazz");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(page.log(), ["navigate:/biblioteca"]);
    }

    #[tokio::test(start_paused = true)]
    async fn mood_via_discover_applies_after_grace_delay() {
        let page = Arc::new(FakePage {
            mood_path: Some("/descubrir"),
            ..FakePage::default()
        });
        dispatcher(Arc::clone(&page)).mood_via_discover(Mood::Energy);
        assert_eq!(page.log(), ["navigate:/descubrir"]);

        tokio::time::sleep(Duration::from_millis(599)).await;
        assert_eq!(page.log().len(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(page.log(), ["navigate:/descubrir", "mood:energy"]);
    }

    #[tokio::test(start_paused = true)]
    async fn mood_here_skips_navigation() {
        let page = Arc::new(FakePage {
            path: Mutex::new("/descubrir".into()),
            mood_path: Some("/descubrir"),
            ..FakePage::default()
        });
        dispatcher(Arc::clone(&page)).dispatch(&PageAction::Mood { mood: Mood::Relax });
        assert_eq!(page.log(), ["mood:relax"]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_mood_handler_is_dropped_silently() {
        let page = Arc::new(FakePage::default());
        dispatcher(Arc::clone(&page)).mood(Mood::Relax);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(page.log(), ["navigate:/descubrir"]);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_mood_elsewhere_retries_after_retry_delay() {
        let page = Arc::new(FakePage {
            mood_path: Some("/descubrir"),
            ..FakePage::default()
        });
        dispatcher(Arc::clone(&page)).dispatch(&PageAction::Mood { mood: Mood::Energy });
        assert_eq!(page.log(), ["navigate:/descubrir"]);

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(page.log().len(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(page.log(), ["navigate:/descubrir", "mood:energy"]);
    }

    #[test]
    fn deferred_attempts_run_when_dispatched_off_runtime() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let page = Arc::new(FakePage {
            search_path: Some("/biblioteca"),
            ..FakePage::default()
        });
        let timings = RouterConfig {
            mood_apply_delay_ms: 10,
            retry_delay_ms: 10,
        };
        let actions = {
            let _guard = rt.enter();
            ActionDispatcher::new(page.clone(), RouteConfig::default(), &timings)
        };

        std::thread::spawn(move || actions.search("bolero"))
            .join()
            .expect("dispatch thread");
        rt.block_on(async { tokio::time::sleep(Duration::from_millis(100)).await });

        assert_eq!(page.log(), ["navigate:/biblioteca", "search:bolero"]);
    }

    #[test]
    fn deferred_attempt_without_runtime_is_dropped() {
        let page = Arc::new(FakePage::default());
        dispatcher(Arc::clone(&page)).search("tango");
        assert_eq!(page.log(), ["navigate:/biblioteca"]);
    }

    #[test]
    fn open_player_and_play_use_page_controls() {
        let page = Arc::new(FakePage::default());
        let actions = dispatcher(Arc::clone(&page));
        actions.dispatch(&PageAction::OpenPlayer);
        actions.dispatch(&PageAction::Play);
        assert_eq!(page.log(), ["navigate:/reproductor", "play"]);
    }

    #[test]
    fn page_errors_are_swallowed() {
        let page = Arc::new(FakePage {
            broken: true,
            ..FakePage::default()
        });
        dispatcher(Arc::clone(&page)).play();
        assert!(page.log().is_empty());
    }
}
