//! Player subprocess lifecycle and circular-navigation state machine.
//!
//! A [`PlaybackController`] owns at most one child process at a time. Every
//! user-visible action (`stop`/`next`/`previous`/`change_quality`/
//! `main_menu`/`quit`/`donate`) is modeled as a transition driven through
//! [`PlaybackController::handle_action`]; subprocess spawn/terminate and
//! hook invocation are the only I/O this module performs.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use process_utils::tokio_command;
use tokio::process::Child;
use tracing::{info, warn};

use crate::domain::StreamRecord;
use crate::probe::{self, ProbeOptions};
use crate::store::Store;

const DEFAULT_LAUNCH_GRACE: Duration = Duration::from_millis(500);
const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(3);
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Launching,
    Playing,
    Stopping,
    Navigating,
    Quitting,
}

/// Direction an auto-skip retry loop is searching in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationIntent {
    None,
    Next,
    Previous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Stop,
    Next,
    Previous,
    /// Carries the quality the UI selected from
    /// [`PlaybackController::fetch_available_qualities`]'s result.
    ChangeQuality(String),
    MainMenu,
    Quit,
    Donate,
}

/// What the caller (the out-of-scope UI) should do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Stayed in the playing state (e.g. after `donate`).
    Continue,
    /// Relaunched at a new record/quality; session fields already updated.
    Relaunched,
    /// Session ended, back to the main menu.
    ReturnToMainMenu,
    /// Session ended, the whole process should exit.
    Quit,
    /// `next`/`previous` requested but the live list has fewer than 2 entries.
    NavigationUnavailable,
}

/// Mutable playback session state, owned by the caller and threaded through
/// every controller call.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub current: StreamRecord,
    pub quality: String,
    pub live_list: Vec<StreamRecord>,
    pub index: usize,
    pub intent: NavigationIntent,
}

impl PlaybackSession {
    pub fn new(current: StreamRecord, quality: impl Into<String>, live_list: Vec<StreamRecord>) -> Option<Self> {
        let index = live_list.iter().position(|r| r.url == current.url)?;
        Some(Self {
            current,
            quality: quality.into(),
            live_list,
            index,
            intent: NavigationIntent::None,
        })
    }

    fn navigable(&self) -> bool {
        self.live_list.len() > 1
    }

    /// `(i - 1 + n) mod n`, the spec's required circular-navigation formula.
    fn index_after(&self, intent: NavigationIntent) -> usize {
        let n = self.live_list.len();
        match intent {
            NavigationIntent::Next => (self.index + 1) % n,
            NavigationIntent::Previous => (self.index + n - 1) % n,
            NavigationIntent::None => self.index,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub player_binary: String,
    pub launch_grace: Duration,
    pub terminate_grace: Duration,
    pub pre_hook: Option<PathBuf>,
    pub post_hook: Option<PathBuf>,
    /// Binary used for the `change_quality` action's out-of-band probe call.
    pub probe_binary: String,
    pub probe_timeout: Duration,
    pub twitch_disable_ads: bool,
    /// `misc.donation_link`, opened by the `donate` action.
    pub donate_url: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            player_binary: "streamlink".to_string(),
            launch_grace: DEFAULT_LAUNCH_GRACE,
            terminate_grace: DEFAULT_TERMINATE_GRACE,
            pre_hook: None,
            post_hook: None,
            probe_binary: "probe".to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            twitch_disable_ads: true,
            donate_url: "https://buymeacoffee.com/snowballons".to_string(),
        }
    }
}

/// Outcome of a (possibly auto-skipping) launch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Playing,
    /// Launch failed during a user-initiated play of a specific record.
    UserInitiatedFailure,
    /// Auto-skip circled the whole live list without finding a playable one.
    AutoSkipExhausted,
}

pub struct PlaybackController {
    config: PlaybackConfig,
    store: Store,
    child: Option<Child>,
}

impl PlaybackController {
    pub fn new(config: PlaybackConfig, store: Store) -> Self {
        Self {
            config,
            store,
            child: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        if self.child.is_some() {
            PlaybackState::Playing
        } else {
            PlaybackState::Idle
        }
    }

    /// Launches `session.current` at `session.quality`. On immediate failure
    /// while `session.intent` is `None`, reports `UserInitiatedFailure`
    /// without touching the session. While an intent is set, advances the
    /// index in that direction and retries, circling at most once around the
    /// live list before giving up.
    pub async fn launch(&mut self, session: &mut PlaybackSession) -> crate::Result<LaunchOutcome> {
        self.run_hook(self.config.pre_hook.clone(), &session.current, &session.quality).await;

        if self.try_spawn(&session.current, &session.quality).await? {
            session.intent = NavigationIntent::None;
            self.store.record_watch(&session.current.url).await?;
            info!(url = %session.current.url, "launched player");
            return Ok(LaunchOutcome::Playing);
        }

        self.run_hook(self.config.post_hook.clone(), &session.current, &session.quality).await;

        if session.intent == NavigationIntent::None {
            warn!(url = %session.current.url, "failed to launch player for user-initiated play");
            return Ok(LaunchOutcome::UserInitiatedFailure);
        }

        let attempts = session.live_list.len();
        for _ in 0..attempts {
            session.index = session.index_after(session.intent);
            session.current = session.live_list[session.index].clone();

            self.run_hook(self.config.pre_hook.clone(), &session.current, &session.quality).await;
            if self.try_spawn(&session.current, &session.quality).await? {
                self.store.record_watch(&session.current.url).await?;
                info!(url = %session.current.url, "auto-skip landed on a playable stream");
                return Ok(LaunchOutcome::Playing);
            }
            self.run_hook(self.config.post_hook.clone(), &session.current, &session.quality).await;
        }

        warn!("auto-skip exhausted the live list without finding a playable stream");
        Ok(LaunchOutcome::AutoSkipExhausted)
    }

    /// Spawns the player and waits `launch_grace` to detect immediate exit.
    /// Returns `true` iff the process is still alive after the grace period.
    async fn try_spawn(&mut self, record: &StreamRecord, quality: &str) -> crate::Result<bool> {
        let mut cmd = tokio_command(&self.config.player_binary);
        cmd.arg(&record.url).arg("--quality").arg(quality);
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(url = %record.url, error = %e, "failed to spawn player process");
                return Ok(false);
            }
        };

        tokio::time::sleep(self.config.launch_grace).await;

        match child.try_wait() {
            Ok(None) => {
                self.child = Some(child);
                Ok(true)
            }
            Ok(Some(status)) => {
                warn!(url = %record.url, %status, "player exited immediately");
                Ok(false)
            }
            Err(e) => {
                warn!(url = %record.url, error = %e, "failed to poll player process");
                Ok(false)
            }
        }
    }

    /// Applies one user action, mutating `session` as needed and returning
    /// what the caller should do next.
    pub async fn handle_action(&mut self, session: &mut PlaybackSession, action: Action) -> crate::Result<ActionOutcome> {
        match action {
            Action::Stop => {
                self.terminate(session).await?;
                self.launch(session).await?;
                Ok(ActionOutcome::Relaunched)
            }
            Action::MainMenu => {
                self.terminate(session).await?;
                Ok(ActionOutcome::ReturnToMainMenu)
            }
            Action::Quit => {
                self.terminate(session).await?;
                Ok(ActionOutcome::Quit)
            }
            Action::Donate => {
                self.open_donate_url();
                Ok(ActionOutcome::Continue)
            }
            Action::Next => self.navigate(session, NavigationIntent::Next).await,
            Action::Previous => self.navigate(session, NavigationIntent::Previous).await,
            Action::ChangeQuality(quality) => {
                self.terminate(session).await?;
                session.quality = quality;
                self.launch(session).await?;
                Ok(ActionOutcome::Relaunched)
            }
        }
    }

    /// The `change_quality` action's out-of-band probe call: lists the
    /// qualities `streamlink --json` reports for `record.url`. The caller
    /// (the UI) prompts with the result and re-invokes `handle_action` with
    /// `Action::ChangeQuality(chosen)`.
    pub async fn fetch_available_qualities(&self, record: &StreamRecord) -> crate::Result<Vec<String>> {
        let opts = ProbeOptions {
            binary_path: self.config.probe_binary.clone(),
            url: record.url.clone(),
            quality: "best".to_string(),
            timeout: self.config.probe_timeout,
            twitch_disable_ads: self.config.twitch_disable_ads,
            platform: record.platform.clone(),
        };

        probe::probe_qualities(&opts)
            .await
            .map_err(|e| crate::Error::Probe(e.to_string()))
    }

    /// Opens [`PlaybackConfig::donate_url`] in the system's default handler,
    /// fire-and-forget, without touching the running subprocess.
    fn open_donate_url(&self) {
        let url = self.config.donate_url.clone();

        #[cfg(target_os = "macos")]
        let mut cmd = tokio_command("open");
        #[cfg(target_os = "windows")]
        let mut cmd = {
            let mut cmd = tokio_command("cmd");
            cmd.arg("/C").arg("start");
            cmd
        };
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        let mut cmd = tokio_command("xdg-open");

        cmd.arg(&url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match cmd.spawn() {
            Ok(mut child) => {
                info!(url = %url, "opened donation link");
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
            Err(e) => warn!(url = %url, error = %e, "failed to open donation link"),
        }
    }

    async fn navigate(&mut self, session: &mut PlaybackSession, intent: NavigationIntent) -> crate::Result<ActionOutcome> {
        if !session.navigable() {
            return Ok(ActionOutcome::NavigationUnavailable);
        }
        self.terminate(session).await?;
        session.intent = intent;
        session.index = session.index_after(intent);
        session.current = session.live_list[session.index].clone();
        self.launch(session).await?;
        Ok(ActionOutcome::Relaunched)
    }

    /// Sends a terminate signal, waits `terminate_grace`, kills if still
    /// alive, then runs the post-playback hook. No-op if nothing is running.
    async fn terminate(&mut self, session: &PlaybackSession) -> crate::Result<()> {
        let Some(mut child) = self.child.take() else { return Ok(()) };

        let _ = child.start_kill();
        if tokio::time::timeout(self.config.terminate_grace, child.wait()).await.is_err() {
            let _ = child.kill().await;
        }

        self.run_hook(self.config.post_hook.clone(), &session.current, &session.quality).await;
        Ok(())
    }

    /// Fire-and-forget hook invocation: `<url> <alias> <handle> <platform>
    /// <quality>`, stdout/stderr discarded, never awaited by the caller.
    async fn run_hook(&self, hook: Option<PathBuf>, record: &StreamRecord, quality: &str) {
        let Some(hook) = hook else { return };
        let mut cmd = tokio_command(&hook);
        cmd.arg(&record.url)
            .arg(&record.alias)
            .arg(&record.handle)
            .arg(&record.platform)
            .arg(quality)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match cmd.spawn() {
            Ok(mut child) => {
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
            Err(e) => warn!(hook = %hook.display(), error = %e, "failed to spawn hook"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{init_pool, run_migrations};

    async fn test_store() -> Store {
        let pool = init_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        Store::new(pool)
    }

    fn record(url: &str) -> StreamRecord {
        StreamRecord::new(url, "alias", "Twitch", "handle")
    }

    #[test]
    fn circular_index_wraps_forward_and_backward() {
        let session = PlaybackSession {
            current: record("a"),
            quality: "best".to_string(),
            live_list: vec![record("a"), record("b"), record("c")],
            index: 0,
            intent: NavigationIntent::None,
        };
        assert_eq!(session.index_after(NavigationIntent::Previous), 2);
        assert_eq!(session.index_after(NavigationIntent::Next), 1);
    }

    #[tokio::test]
    async fn launch_reports_user_initiated_failure_for_missing_binary() {
        let store = test_store().await;
        let config = PlaybackConfig {
            player_binary: "/nonexistent/definitely-not-a-player".to_string(),
            ..Default::default()
        };
        let mut controller = PlaybackController::new(config, store);
        let mut session = PlaybackSession::new(record("https://twitch.tv/a"), "best", vec![record("https://twitch.tv/a")]).unwrap();

        let outcome = controller.launch(&mut session).await.unwrap();
        assert_eq!(outcome, LaunchOutcome::UserInitiatedFailure);
    }

    #[cfg(unix)]
    fn long_lived_player_script(dir: &std::path::Path) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake_player.sh");
        std::fs::write(&path, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launch_succeeds_and_terminate_reaps_the_child() {
        let store = test_store().await;
        let dir = tempfile::tempdir().unwrap();
        let config = PlaybackConfig {
            player_binary: long_lived_player_script(dir.path()).display().to_string(),
            ..Default::default()
        };
        let mut controller = PlaybackController::new(config, store);
        let mut session = PlaybackSession::new(record("https://twitch.tv/a"), "best", vec![record("https://twitch.tv/a")]).unwrap();

        let outcome = controller.launch(&mut session).await.unwrap();
        assert_eq!(outcome, LaunchOutcome::Playing);
        assert_eq!(controller.state(), PlaybackState::Playing);

        controller.terminate(&session).await.unwrap();
        assert!(controller.child.is_none());
    }

    #[test]
    fn session_new_returns_none_if_current_not_in_live_list() {
        let session = PlaybackSession::new(record("https://twitch.tv/x"), "best", vec![record("https://twitch.tv/y")]);
        assert!(session.is_none());
    }

    #[cfg(unix)]
    fn fake_probe_script(dir: &std::path::Path, json_body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake_probe.sh");
        std::fs::write(&path, format!("#!/bin/sh\necho '{json_body}'\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn fetch_available_qualities_reads_streams_keys() {
        let store = test_store().await;
        let dir = tempfile::tempdir().unwrap();
        let json_body = r#"{"metadata": {"title": "t"}, "streams": {"best": {}, "480p": {}, "worst-unfiltered": {}}}"#;
        let config = PlaybackConfig {
            probe_binary: fake_probe_script(dir.path(), json_body).display().to_string(),
            ..Default::default()
        };
        let controller = PlaybackController::new(config, store);

        let mut qualities = controller.fetch_available_qualities(&record("https://twitch.tv/a")).await.unwrap();
        qualities.sort();
        assert_eq!(qualities, vec!["480p".to_string(), "best".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn change_quality_updates_session_quality_before_relaunch() {
        let store = test_store().await;
        let dir = tempfile::tempdir().unwrap();
        let config = PlaybackConfig {
            player_binary: long_lived_player_script(dir.path()).display().to_string(),
            ..Default::default()
        };
        let mut controller = PlaybackController::new(config, store);
        let mut session = PlaybackSession::new(record("https://twitch.tv/a"), "best", vec![record("https://twitch.tv/a")]).unwrap();
        controller.launch(&mut session).await.unwrap();

        let outcome = controller
            .handle_action(&mut session, Action::ChangeQuality("720p".to_string()))
            .await
            .unwrap();

        assert_eq!(outcome, ActionOutcome::Relaunched);
        assert_eq!(session.quality, "720p");
    }

    #[tokio::test]
    async fn donate_leaves_session_untouched_and_continues() {
        let store = test_store().await;
        let config = PlaybackConfig {
            // No real subprocess is spawned for `donate`; any binary name works.
            player_binary: "/nonexistent/definitely-not-a-player".to_string(),
            ..Default::default()
        };
        let mut controller = PlaybackController::new(config, store);
        let mut session = PlaybackSession::new(record("https://twitch.tv/a"), "best", vec![record("https://twitch.tv/a")]).unwrap();

        let outcome = controller.handle_action(&mut session, Action::Donate).await.unwrap();
        assert_eq!(outcome, ActionOutcome::Continue);
        assert!(controller.child.is_none());
    }
}
