//! Agent runtime
//!
//! Runs one turn per user input: loads the session from the store, feeds
//! events through the pure `transition` function and executes the effects it
//! returns until the turn reaches a terminal state.

use super::dispatcher::ToolDispatcher;
use super::traits::{LlmClient, MessageStore};
use super::turn::{TurnExecutor, DEFAULT_TEMPERATURE};
use crate::db::{Message, MessageContent, Role};
use crate::llm::{LlmErrorKind, LlmService};
use crate::state_machine::state::{DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_MODEL_ATTEMPTS};
use crate::state_machine::{
    transition, AbortReason, Effect, Event, TransitionError, TurnContext, TurnState,
};
use crate::system_prompt::build_system_prompt;
use crate::title_generator::{generate_title, DEFAULT_TITLE};
use crate::tools::{
    RulePolicy, ToolConfirmer, ToolContext, ToolExecutionPolicy, ToolRegistry, ToolSpec,
};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Why `process_input` did not complete a turn
#[derive(Debug, Error, PartialEq)]
pub enum AgentError {
    #[error("Model backend error: {message}")]
    ModelBackend { message: String, kind: LlmErrorKind },
    #[error("Turn exceeded the limit of {limit} model iterations")]
    TurnIterationLimitExceeded { limit: u32 },
    #[error("Failed to read session: {0}")]
    StoreRead(String),
    #[error("Failed to write session: {0}")]
    StoreWrite(String),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}

impl From<AbortReason> for AgentError {
    fn from(reason: AbortReason) -> Self {
        match reason {
            AbortReason::ModelBackend { message, kind } => AgentError::ModelBackend { message, kind },
            AbortReason::IterationLimit { limit } => {
                AgentError::TurnIterationLimitExceeded { limit }
            }
        }
    }
}

/// Everything the runtime needs, passed in at construction
pub struct AgentConfig {
    pub llm: Arc<dyn LlmClient>,
    pub tools: Arc<ToolRegistry>,
    pub policy: Arc<dyn ToolExecutionPolicy>,
    pub confirmer: Option<Arc<dyn ToolConfirmer>>,
    /// Model used for session titles; without one sessions keep the default
    pub title_model: Option<Arc<dyn LlmService>>,
    pub max_iterations: u32,
    pub max_model_attempts: u32,
    pub temperature: f32,
    /// Fixed system prompt. When unset a dated prompt is built per session.
    pub system_prompt: Option<String>,
    pub working_dir: PathBuf,
    pub artifact_dir: PathBuf,
}

impl AgentConfig {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            llm,
            tools,
            policy: Arc::new(RulePolicy::default()),
            confirmer: None,
            title_model: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_model_attempts: DEFAULT_MAX_MODEL_ATTEMPTS,
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: None,
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            artifact_dir: std::env::temp_dir(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn ToolExecutionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_confirmer(mut self, confirmer: Arc<dyn ToolConfirmer>) -> Self {
        self.confirmer = Some(confirmer);
        self
    }

    #[must_use]
    pub fn with_title_model(mut self, model: Option<Arc<dyn LlmService>>) -> Self {
        self.title_model = model;
        self
    }

    #[must_use]
    pub fn with_limits(mut self, max_iterations: u32, max_model_attempts: u32) -> Self {
        self.max_iterations = max_iterations;
        self.max_model_attempts = max_model_attempts;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn with_dirs(mut self, working_dir: PathBuf, artifact_dir: PathBuf) -> Self {
        self.working_dir = working_dir;
        self.artifact_dir = artifact_dir;
        self
    }
}

/// Messages of one turn in flight
#[derive(Default)]
struct TurnBuffer {
    /// Committed history, starting with the system message
    history: Vec<MessageContent>,
    /// Recorded but not yet committed
    staged: Vec<MessageContent>,
    /// What this turn has written to the store
    committed: Vec<Message>,
}

/// Orchestrates turns for any number of sessions
pub struct AgentRuntime<S> {
    store: Arc<S>,
    turns: TurnExecutor<Arc<dyn LlmClient>>,
    dispatcher: ToolDispatcher,
    tool_specs: Vec<ToolSpec>,
    config: AgentConfig,
    /// One lock per session; turns on the same session run one at a time
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: MessageStore + 'static> AgentRuntime<S> {
    pub fn new(store: S, config: AgentConfig) -> Self {
        let turns = TurnExecutor::new(Arc::clone(&config.llm), config.temperature);
        let dispatcher = ToolDispatcher::new(
            Arc::clone(&config.tools),
            Arc::clone(&config.policy),
            config.confirmer.clone(),
        );
        let tool_specs = config.tools.list_specs();

        Self {
            store: Arc::new(store),
            turns,
            dispatcher,
            tool_specs,
            config,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn tool_specs(&self) -> &[ToolSpec] {
        &self.tool_specs
    }

    /// Create a session with a fresh id, seeded with the system message
    pub async fn create_session(&self) -> Result<String, AgentError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.store
            .create_session(&session_id, &self.system_prompt())
            .await
            .map_err(AgentError::StoreWrite)?;
        tracing::info!(session_id = %session_id, "Created session");
        Ok(session_id)
    }

    /// Full stored history of a session
    pub async fn history(&self, session_id: &str) -> Result<Vec<Message>, AgentError> {
        self.store.read(session_id).await.map_err(AgentError::StoreRead)
    }

    pub async fn list_sessions(&self) -> Result<BTreeSet<String>, AgentError> {
        self.store.list_sessions().await.map_err(AgentError::StoreRead)
    }

    /// Run one turn and return the messages it appended.
    ///
    /// Unknown sessions are seeded with the system message first; that
    /// message is not part of the result. On error, only batches committed
    /// before the failure remain in the store.
    pub async fn process_input(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<Vec<Message>, AgentError> {
        let lock = self.session_lock(session_id).await;
        let guard = lock.lock().await;
        let result = self.run_turn(session_id, text).await;
        drop(guard);
        self.release_session_lock(session_id, lock).await;
        result
    }

    async fn run_turn(&self, session_id: &str, text: &str) -> Result<Vec<Message>, AgentError> {
        let history = self.load_or_seed(session_id).await?;
        let first_turn = !history.iter().any(|m| m.role() == Role::Human);

        tracing::info!(
            session_id = %session_id,
            history_len = history.len(),
            model = %self.turns.model_id(),
            "Turn started"
        );
        let start = Instant::now();

        let result = self.drive_turn(session_id, text, history).await;

        match &result {
            Ok(messages) => {
                tracing::info!(
                    session_id = %session_id,
                    messages = messages.len(),
                    duration_ms = %start.elapsed().as_millis(),
                    "Turn finished"
                );
                if first_turn {
                    self.spawn_title(session_id, text);
                }
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    duration_ms = %start.elapsed().as_millis(),
                    "Turn aborted"
                );
            }
        }

        result
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        Arc::clone(locks.entry(session_id.to_string()).or_default())
    }

    /// Forget the session's lock once no other turn holds or awaits it
    async fn release_session_lock(&self, session_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.session_locks.lock().await;
        drop(lock);
        if locks
            .get(session_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(session_id);
        }
    }

    fn system_prompt(&self) -> String {
        self.config
            .system_prompt
            .clone()
            .unwrap_or_else(|| build_system_prompt(&self.config.working_dir))
    }

    async fn load_or_seed(&self, session_id: &str) -> Result<Vec<MessageContent>, AgentError> {
        let stored = self
            .store
            .read(session_id)
            .await
            .map_err(AgentError::StoreRead)?;
        if !stored.is_empty() {
            return Ok(stored.into_iter().map(|m| m.content).collect());
        }

        let prompt = self.system_prompt();
        self.store
            .create_session(session_id, &prompt)
            .await
            .map_err(AgentError::StoreWrite)?;
        tracing::info!(session_id = %session_id, "Seeded new session");
        Ok(vec![MessageContent::system(prompt)])
    }

    async fn drive_turn(
        &self,
        session_id: &str,
        text: &str,
        history: Vec<MessageContent>,
    ) -> Result<Vec<Message>, AgentError> {
        let context = TurnContext::new(session_id)
            .with_limits(self.config.max_iterations, self.config.max_model_attempts);
        let mut turn = TurnBuffer {
            history,
            ..TurnBuffer::default()
        };

        // Dropping the turn (caller went away) cancels running tools
        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();

        let mut state = TurnState::AwaitingInput;
        let mut events = vec![Event::UserInput {
            text: text.to_string(),
        }];

        while let Some(event) = events.pop() {
            let result = transition(&state, &context, event)?;
            tracing::debug!(
                session_id = %session_id,
                from = state.name(),
                to = result.new_state.name(),
                effects = result.effects.len(),
                "Transition"
            );
            state = result.new_state;
            if state.is_terminal() {
                tracing::info!(session_id = %session_id, outcome = state.name(), "Turn finished");
            }

            for effect in result.effects {
                if let Some(next) = self
                    .execute_effect(&context, effect, &mut turn, &cancel)
                    .await?
                {
                    events.push(next);
                }
            }
        }

        match state {
            TurnState::Done => Ok(turn.committed),
            TurnState::Aborted { reason } => Err(reason.into()),
            other => Err(TransitionError::InvalidTransition(format!(
                "turn stopped in {}",
                other.name()
            ))
            .into()),
        }
    }

    async fn execute_effect(
        &self,
        context: &TurnContext,
        effect: Effect,
        turn: &mut TurnBuffer,
        cancel: &CancellationToken,
    ) -> Result<Option<Event>, AgentError> {
        match effect {
            Effect::RecordMessage { content } => {
                turn.staged.push(content);
                Ok(None)
            }

            Effect::CommitMessages => {
                let stored = self
                    .store
                    .append(&context.session_id, &turn.staged)
                    .await
                    .map_err(AgentError::StoreWrite)?;
                turn.history.append(&mut turn.staged);
                turn.committed.extend(stored);
                Ok(None)
            }

            Effect::DiscardPending => {
                if !turn.staged.is_empty() {
                    tracing::debug!(
                        session_id = %context.session_id,
                        discarded = turn.staged.len(),
                        "Discarding uncommitted messages"
                    );
                }
                turn.staged.clear();
                Ok(None)
            }

            Effect::RequestModel => {
                let view: Vec<MessageContent> =
                    turn.history.iter().chain(&turn.staged).cloned().collect();
                let event = match self.turns.run_turn(&view, &self.tool_specs).await {
                    Ok(message) => Event::ModelResponse { message },
                    Err(e) => Event::ModelError {
                        message: e.message,
                        kind: e.kind,
                        retry_after: e.retry_after,
                    },
                };
                Ok(Some(event))
            }

            Effect::DispatchTools { calls } => {
                let ctx = ToolContext::new(
                    cancel.child_token(),
                    context.session_id.as_str(),
                    self.config.working_dir.clone(),
                    self.config.artifact_dir.clone(),
                );
                let results = self.dispatcher.dispatch(&calls, &ctx).await;
                Ok(Some(Event::ToolsDispatched { results }))
            }

            Effect::ScheduleRetry { delay, attempt } => {
                tracing::warn!(
                    session_id = %context.session_id,
                    attempt,
                    delay_ms = %delay.as_millis(),
                    "Retrying model request"
                );
                tokio::time::sleep(delay).await;
                Ok(Some(Event::RetryTimeout { attempt }))
            }
        }
    }

    /// Title the session in the background after its first turn
    fn spawn_title(&self, session_id: &str, text: &str) {
        let store = Arc::clone(&self.store);
        let model = self.config.title_model.clone();
        let session_id = session_id.to_string();
        let text = text.to_string();

        tokio::spawn(async move {
            let generated = match model {
                Some(model) => generate_title(&text, model.as_ref()).await,
                None => None,
            };
            let title = generated.unwrap_or_else(|| DEFAULT_TITLE.to_string());
            if let Err(e) = store.set_title(&session_id, &title).await {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to set title");
            }
        });
    }
}
