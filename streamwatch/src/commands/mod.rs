//! Uniform command envelope and invoker: every user-facing operation over
//! the stream manager (C9) or playback controller (C10) is wrapped in a
//! [`Command`] and dispatched through a [`CommandInvoker`], which records a
//! bounded history and offers a (currently unused) undo contract.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::manager::{AddRequest, StreamManager};
use crate::playback::{Action, ActionOutcome, PlaybackController, PlaybackSession};

const DEFAULT_MAX_HISTORY: usize = 50;

/// Result envelope every command returns. `data` carries an optional
/// free-form payload (e.g. a `List` command's record set) beyond the four
/// scalar fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    pub needs_refresh: bool,
    pub should_continue: bool,
    pub data: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            needs_refresh: true,
            should_continue: true,
            data: None,
        }
    }

    pub fn ok_with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::ok(message)
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            needs_refresh: false,
            should_continue: true,
            data: None,
        }
    }
}

/// A single user-facing operation. `execute` performs the side effect;
/// `can_execute` is a precondition check run before it.
#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &str;

    fn can_execute(&self) -> bool {
        true
    }

    async fn execute(&mut self) -> CommandResult;

    /// Commands that want undo support override this and [`supports_undo`].
    /// No concrete command currently implements it; this is the contract a
    /// future one hooks into.
    async fn undo(&mut self) -> CommandResult {
        CommandResult::failure(format!("{} does not support undo", self.name()))
    }

    fn supports_undo(&self) -> bool {
        false
    }
}

/// Executes commands, keeping a bounded FIFO history and an undo stack of
/// whatever undoable commands have run.
pub struct CommandInvoker {
    max_history: usize,
    history: VecDeque<String>,
    undo_stack: Vec<Box<dyn Command>>,
}

impl Default for CommandInvoker {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_HISTORY)
    }
}

impl CommandInvoker {
    pub fn with_capacity(max_history: usize) -> Self {
        Self {
            max_history,
            history: VecDeque::with_capacity(max_history),
            undo_stack: Vec::new(),
        }
    }

    pub async fn execute(&mut self, mut command: Box<dyn Command>) -> CommandResult {
        if !command.can_execute() {
            return CommandResult::failure(format!("{} cannot be executed", command.name()));
        }

        let result = command.execute().await;
        if result.success {
            self.push_history(command.name().to_string());
            if command.supports_undo() {
                self.undo_stack.push(command);
            }
        }
        result
    }

    pub async fn undo_last(&mut self) -> CommandResult {
        let Some(mut command) = self.undo_stack.pop() else {
            return CommandResult::failure("no commands available to undo");
        };
        command.undo().await
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    fn push_history(&mut self, name: String) {
        if self.history.len() == self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(name);
    }
}

/// Adds one or more streams via [`StreamManager::add_many`].
pub struct AddStreamsCommand {
    manager: StreamManager,
    requests: Vec<AddRequest>,
}

impl AddStreamsCommand {
    pub fn new(manager: StreamManager, requests: Vec<AddRequest>) -> Self {
        Self { manager, requests }
    }
}

#[async_trait]
impl Command for AddStreamsCommand {
    fn name(&self) -> &str {
        "Add Streams"
    }

    fn can_execute(&self) -> bool {
        !self.requests.is_empty()
    }

    async fn execute(&mut self) -> CommandResult {
        match self.manager.add_many(std::mem::take(&mut self.requests)).await {
            Ok(report) if report.failed == 0 => CommandResult::ok(format!("added {} stream(s)", report.added)),
            Ok(report) => CommandResult {
                success: report.added > 0,
                message: format!("added {}, failed {}", report.added, report.failed),
                needs_refresh: report.added > 0,
                should_continue: true,
                data: None,
            },
            Err(e) => CommandResult::failure(format!("failed to add streams: {e}")),
        }
    }
}

/// Soft-deletes the streams at `indices` via [`StreamManager::remove_by_indices`].
pub struct RemoveStreamsCommand {
    manager: StreamManager,
    indices: Vec<usize>,
}

impl RemoveStreamsCommand {
    pub fn new(manager: StreamManager, indices: Vec<usize>) -> Self {
        Self { manager, indices }
    }
}

#[async_trait]
impl Command for RemoveStreamsCommand {
    fn name(&self) -> &str {
        "Remove Streams"
    }

    fn can_execute(&self) -> bool {
        !self.indices.is_empty()
    }

    async fn execute(&mut self) -> CommandResult {
        match self.manager.remove_by_indices(&self.indices).await {
            Ok(removed) if removed > 0 => CommandResult::ok(format!("removed {removed} stream(s)")),
            Ok(_) => CommandResult::failure("no matching streams to remove"),
            Err(e) => CommandResult::failure(format!("failed to remove streams: {e}")),
        }
    }
}

/// Lists the active streams via [`StreamManager::list`], attaching the
/// record set as JSON so the caller can render it without a second fetch.
pub struct ListStreamsCommand {
    manager: StreamManager,
}

impl ListStreamsCommand {
    pub fn new(manager: StreamManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Command for ListStreamsCommand {
    fn name(&self) -> &str {
        "List Streams"
    }

    async fn execute(&mut self) -> CommandResult {
        match self.manager.list().await {
            Ok(records) => {
                let count = records.len();
                match serde_json::to_value(&records) {
                    Ok(data) => CommandResult {
                        success: true,
                        message: format!("{count} stream(s)"),
                        needs_refresh: false,
                        should_continue: true,
                        data: Some(data),
                    },
                    Err(e) => CommandResult::failure(format!("failed to serialize streams: {e}")),
                }
            }
            Err(e) => CommandResult::failure(format!("failed to list streams: {e}")),
        }
    }
}

/// Bulk-adds every non-blank, non-comment line of a text file via
/// [`StreamManager::import_from_text`].
pub struct ImportStreamsCommand {
    manager: StreamManager,
    path: PathBuf,
}

impl ImportStreamsCommand {
    pub fn new(manager: StreamManager, path: PathBuf) -> Self {
        Self { manager, path }
    }
}

#[async_trait]
impl Command for ImportStreamsCommand {
    fn name(&self) -> &str {
        "Import Streams"
    }

    async fn execute(&mut self) -> CommandResult {
        match self.manager.import_from_text(&self.path).await {
            Ok(report) => CommandResult::ok(format!("imported {}, failed {}", report.added, report.failed)),
            Err(e) => CommandResult::failure(format!("failed to import streams: {e}")),
        }
    }
}

/// Writes every active stream to a JSON file via [`StreamManager::export_to_json`].
pub struct ExportStreamsCommand {
    manager: StreamManager,
    path: PathBuf,
}

impl ExportStreamsCommand {
    pub fn new(manager: StreamManager, path: PathBuf) -> Self {
        Self { manager, path }
    }
}

#[async_trait]
impl Command for ExportStreamsCommand {
    fn name(&self) -> &str {
        "Export Streams"
    }

    async fn execute(&mut self) -> CommandResult {
        match self.manager.export_to_json(&self.path).await {
            Ok(count) => CommandResult {
                success: true,
                message: format!("exported {count} stream(s)"),
                needs_refresh: false,
                should_continue: true,
                data: None,
            },
            Err(e) => CommandResult::failure(format!("failed to export streams: {e}")),
        }
    }
}

/// Wraps a single [`PlaybackController::handle_action`] transition as a
/// `Command`. One struct covers all seven actions rather than duplicating
/// the lock-execute-map boilerplate per action; the constructors below are
/// what callers actually name.
pub struct PlaybackActionCommand {
    name: &'static str,
    action: Option<Action>,
    controller: Arc<Mutex<PlaybackController>>,
    session: Arc<Mutex<PlaybackSession>>,
}

impl PlaybackActionCommand {
    fn new(
        name: &'static str,
        action: Action,
        controller: Arc<Mutex<PlaybackController>>,
        session: Arc<Mutex<PlaybackSession>>,
    ) -> Self {
        Self {
            name,
            action: Some(action),
            controller,
            session,
        }
    }

    pub fn stop(controller: Arc<Mutex<PlaybackController>>, session: Arc<Mutex<PlaybackSession>>) -> Self {
        Self::new("Stop Playback", Action::Stop, controller, session)
    }

    pub fn next(controller: Arc<Mutex<PlaybackController>>, session: Arc<Mutex<PlaybackSession>>) -> Self {
        Self::new("Next Stream", Action::Next, controller, session)
    }

    pub fn previous(controller: Arc<Mutex<PlaybackController>>, session: Arc<Mutex<PlaybackSession>>) -> Self {
        Self::new("Previous Stream", Action::Previous, controller, session)
    }

    pub fn change_quality(
        quality: impl Into<String>,
        controller: Arc<Mutex<PlaybackController>>,
        session: Arc<Mutex<PlaybackSession>>,
    ) -> Self {
        Self::new("Change Quality", Action::ChangeQuality(quality.into()), controller, session)
    }

    pub fn main_menu(controller: Arc<Mutex<PlaybackController>>, session: Arc<Mutex<PlaybackSession>>) -> Self {
        Self::new("Return to Main Menu", Action::MainMenu, controller, session)
    }

    pub fn quit(controller: Arc<Mutex<PlaybackController>>, session: Arc<Mutex<PlaybackSession>>) -> Self {
        Self::new("Quit", Action::Quit, controller, session)
    }

    pub fn donate(controller: Arc<Mutex<PlaybackController>>, session: Arc<Mutex<PlaybackSession>>) -> Self {
        Self::new("Donate", Action::Donate, controller, session)
    }
}

#[async_trait]
impl Command for PlaybackActionCommand {
    fn name(&self) -> &str {
        self.name
    }

    fn can_execute(&self) -> bool {
        self.action.is_some()
    }

    async fn execute(&mut self) -> CommandResult {
        let Some(action) = self.action.take() else {
            return CommandResult::failure(format!("{} already executed", self.name));
        };

        let mut session = self.session.lock().await;
        let mut controller = self.controller.lock().await;
        match controller.handle_action(&mut session, action).await {
            Ok(outcome) => outcome_to_result(self.name, outcome),
            Err(e) => CommandResult::failure(format!("{} failed: {e}", self.name)),
        }
    }
}

fn outcome_to_result(name: &str, outcome: ActionOutcome) -> CommandResult {
    match outcome {
        ActionOutcome::Continue => CommandResult::ok(format!("{name}: continuing current playback")),
        ActionOutcome::Relaunched => CommandResult::ok(format!("{name}: relaunched")),
        ActionOutcome::ReturnToMainMenu => CommandResult {
            success: true,
            message: "returned to main menu".to_string(),
            needs_refresh: true,
            should_continue: true,
            data: None,
        },
        ActionOutcome::Quit => CommandResult {
            success: true,
            message: "quit requested".to_string(),
            needs_refresh: false,
            should_continue: false,
            data: None,
        },
        ActionOutcome::NavigationUnavailable => {
            CommandResult::failure("fewer than two live streams available to navigate")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCommand {
        calls: Arc<AtomicUsize>,
        succeed: bool,
    }

    #[async_trait]
    impl Command for CountingCommand {
        fn name(&self) -> &str {
            "counting"
        }

        async fn execute(&mut self) -> CommandResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                CommandResult::ok("done")
            } else {
                CommandResult::failure("failed")
            }
        }
    }

    struct UnexecutableCommand;

    #[async_trait]
    impl Command for UnexecutableCommand {
        fn name(&self) -> &str {
            "blocked"
        }

        fn can_execute(&self) -> bool {
            false
        }

        async fn execute(&mut self) -> CommandResult {
            CommandResult::ok("should never run")
        }
    }

    #[tokio::test]
    async fn successful_command_is_recorded_in_history() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut invoker = CommandInvoker::default();
        let result = invoker
            .execute(Box::new(CountingCommand {
                calls: calls.clone(),
                succeed: true,
            }))
            .await;

        assert!(result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(invoker.history().count(), 1);
    }

    #[tokio::test]
    async fn failed_command_is_not_recorded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut invoker = CommandInvoker::default();
        let result = invoker
            .execute(Box::new(CountingCommand {
                calls,
                succeed: false,
            }))
            .await;

        assert!(!result.success);
        assert_eq!(invoker.history().count(), 0);
    }

    #[tokio::test]
    async fn unexecutable_command_never_runs() {
        let mut invoker = CommandInvoker::default();
        let result = invoker.execute(Box::new(UnexecutableCommand)).await;
        assert!(!result.success);
        assert_eq!(invoker.history().count(), 0);
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut invoker = CommandInvoker::with_capacity(2);
        for _ in 0..5 {
            invoker
                .execute(Box::new(CountingCommand {
                    calls: calls.clone(),
                    succeed: true,
                }))
                .await;
        }
        assert_eq!(invoker.history().count(), 2);
    }

    #[tokio::test]
    async fn undo_with_empty_stack_fails() {
        let mut invoker = CommandInvoker::default();
        let result = invoker.undo_last().await;
        assert!(!result.success);
    }

    async fn test_manager() -> StreamManager {
        let pool = crate::store::init_pool("sqlite::memory:").await.unwrap();
        crate::store::run_migrations(&pool).await.unwrap();
        StreamManager::new(crate::store::Store::new(pool))
    }

    #[tokio::test]
    async fn add_streams_command_runs_through_the_invoker() {
        let mut invoker = CommandInvoker::default();
        let manager = test_manager().await;
        let command = AddStreamsCommand::new(
            manager.clone(),
            vec![AddRequest {
                url: "https://twitch.tv/someone".to_string(),
                alias: None,
            }],
        );

        let result = invoker.execute(Box::new(command)).await;
        assert!(result.success);
        assert_eq!(manager.list().await.unwrap().len(), 1);
        assert_eq!(invoker.history().count(), 1);
    }

    #[tokio::test]
    async fn add_streams_command_refuses_an_empty_request_list() {
        let manager = test_manager().await;
        let result = AddStreamsCommand::new(manager, Vec::new()).can_execute();
        assert!(!result);
    }

    #[tokio::test]
    async fn list_streams_command_attaches_records_as_data() {
        let manager = test_manager().await;
        manager
            .add_many(vec![AddRequest {
                url: "https://twitch.tv/someone".to_string(),
                alias: None,
            }])
            .await
            .unwrap();

        let mut command = ListStreamsCommand::new(manager);
        let result = command.execute().await;
        assert!(result.success);
        assert!(result.data.is_some());
    }

    #[tokio::test]
    async fn remove_streams_command_fails_when_nothing_matches() {
        let manager = test_manager().await;
        let mut command = RemoveStreamsCommand::new(manager, vec![0]);
        let result = command.execute().await;
        assert!(!result.success);
    }

    fn playback_record(url: &str) -> crate::domain::StreamRecord {
        crate::domain::StreamRecord::new(url, "alias", "Twitch", "handle")
    }

    async fn test_playback_controller() -> PlaybackController {
        let pool = crate::store::init_pool("sqlite::memory:").await.unwrap();
        crate::store::run_migrations(&pool).await.unwrap();
        PlaybackController::new(
            crate::playback::PlaybackConfig {
                player_binary: "/nonexistent/definitely-not-a-player".to_string(),
                ..Default::default()
            },
            crate::store::Store::new(pool),
        )
    }

    #[tokio::test]
    async fn donate_command_continues_and_is_recorded() {
        let controller = Arc::new(Mutex::new(test_playback_controller().await));
        let session = Arc::new(Mutex::new(
            PlaybackSession::new(playback_record("https://twitch.tv/a"), "best", vec![playback_record("https://twitch.tv/a")]).unwrap(),
        ));

        let mut invoker = CommandInvoker::default();
        let result = invoker
            .execute(Box::new(PlaybackActionCommand::donate(controller, session)))
            .await;

        assert!(result.success);
        assert!(result.should_continue);
        assert_eq!(invoker.history().count(), 1);
    }

    #[tokio::test]
    async fn playback_action_command_cannot_be_executed_twice() {
        let controller = Arc::new(Mutex::new(test_playback_controller().await));
        let session = Arc::new(Mutex::new(
            PlaybackSession::new(playback_record("https://twitch.tv/a"), "best", vec![playback_record("https://twitch.tv/a")]).unwrap(),
        ));

        let mut command = PlaybackActionCommand::donate(controller, session);
        let first = command.execute().await;
        assert!(first.success);

        let second = command.execute().await;
        assert!(!second.success);
    }
}
