//! Shared test helpers and a scripted agent service.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use deep_research::error::{RemoteErrorKind, ResearchError, Result};
use deep_research::research::{OrchestratorSettings, ResearchOrchestrator};
use deep_research::service::{
    Agent, AgentService, AgentSpec, Message, MessageRole, Run, RunError, Thread,
};
use deep_research::types::{RunState, UrlAnnotation};
use deep_research::util::retry::RetryPolicy;

pub const THREAD_ID: &str = "thread_1";
pub const RUN_ID: &str = "run_1";
/// Id of the first agent the fake creates; later ones count up.
pub const CREATED_AGENT_ID: &str = "asst_created_1";

struct ScriptedMessage {
    /// Visible once `get_run` has been called this many times.
    visible_after_polls: usize,
    message: Message,
}

#[derive(Default)]
struct FakeState {
    agents: Vec<Agent>,
    statuses: VecDeque<RunState>,
    run_error: Option<RunError>,
    failing_polls: usize,
    messages: Vec<ScriptedMessage>,
    polls: usize,
    calls: HashMap<&'static str, usize>,
    created_specs: Vec<AgentSpec>,
    deleted_agents: Vec<String>,
    posted: Vec<String>,
}

/// An [`AgentService`] that replays a scripted run.
///
/// `get_run` returns the queued statuses in order and repeats the last one.
/// `list_messages` returns visible messages newest first.
#[derive(Default)]
pub struct FakeAgentService {
    state: Mutex<FakeState>,
}

impl FakeAgentService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A run that completes on the `polls`-th status check with `response`.
    pub fn completing_after(polls: usize, response: &str) -> Self {
        let mut statuses = vec![RunState::InProgress; polls.saturating_sub(1)];
        statuses.push(RunState::Completed);
        Self::new()
            .with_statuses(statuses)
            .with_assistant_message("msg_final", response, vec![], polls)
    }

    pub fn with_agent(self, id: &str, name: &str) -> Self {
        self.state().agents.push(Agent {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_statuses(self, statuses: impl IntoIterator<Item = RunState>) -> Self {
        self.state().statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_run_error(self, code: &str, message: &str) -> Self {
        self.state().run_error = Some(RunError {
            code: code.to_string(),
            message: message.to_string(),
        });
        self
    }

    /// The first `count` status checks fail with a transient network error.
    pub fn with_failing_polls(self, count: usize) -> Self {
        self.state().failing_polls = count;
        self
    }

    pub fn with_assistant_message(
        self,
        id: &str,
        text: &str,
        annotations: Vec<UrlAnnotation>,
        visible_after_polls: usize,
    ) -> Self {
        self.state().messages.push(ScriptedMessage {
            visible_after_polls,
            message: Message {
                id: id.to_string(),
                role: MessageRole::Assistant,
                text_parts: vec![text.to_string()],
                annotations,
            },
        });
        self
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.state().calls.get(operation).copied().unwrap_or(0)
    }

    pub fn created_specs(&self) -> Vec<AgentSpec> {
        self.state().created_specs.clone()
    }

    pub fn deleted_agents(&self) -> Vec<String> {
        self.state().deleted_agents.clone()
    }

    pub fn posted_messages(&self) -> Vec<String> {
        self.state().posted.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, operation: &'static str) -> std::sync::MutexGuard<'_, FakeState> {
        let mut state = self.state();
        *state.calls.entry(operation).or_default() += 1;
        state
    }

    fn bump(&self, operation: &'static str) {
        drop(self.record(operation));
    }

    fn run(&self, status: RunState, last_error: Option<RunError>) -> Run {
        Run {
            id: RUN_ID.to_string(),
            thread_id: THREAD_ID.to_string(),
            status,
            last_error,
        }
    }
}

#[async_trait]
impl AgentService for FakeAgentService {
    async fn list_agents(&self) -> Result<Vec<Agent>> {
        Ok(self.record("list_agents").agents.clone())
    }

    async fn create_agent(&self, spec: &AgentSpec) -> Result<Agent> {
        let mut state = self.record("create_agent");
        state.created_specs.push(spec.clone());
        let agent = Agent {
            id: format!("asst_created_{}", state.created_specs.len()),
            name: spec.name.clone(),
        };
        state.agents.push(agent.clone());
        Ok(agent)
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<()> {
        let mut state = self.record("delete_agent");
        state.agents.retain(|a| a.id != agent_id);
        state.deleted_agents.push(agent_id.to_string());
        Ok(())
    }

    async fn connection_id(&self, name: &str) -> Result<String> {
        self.bump("connection_id");
        Ok(format!("/connections/{name}"))
    }

    async fn create_thread(&self) -> Result<Thread> {
        self.bump("create_thread");
        Ok(Thread {
            id: THREAD_ID.to_string(),
        })
    }

    async fn post_message(&self, _thread_id: &str, role: MessageRole, content: &str) -> Result<Message> {
        let mut state = self.record("post_message");
        state.posted.push(content.to_string());
        let message = Message {
            id: format!("msg_user_{}", state.posted.len()),
            role,
            text_parts: vec![content.to_string()],
            annotations: vec![],
        };
        state.messages.push(ScriptedMessage {
            visible_after_polls: 0,
            message: message.clone(),
        });
        Ok(message)
    }

    async fn create_run(&self, _thread_id: &str, _agent_id: &str) -> Result<Run> {
        self.bump("create_run");
        Ok(self.run(RunState::Queued, None))
    }

    async fn get_run(&self, _thread_id: &str, _run_id: &str) -> Result<Run> {
        let mut state = self.record("get_run");
        if state.failing_polls > 0 {
            state.failing_polls -= 1;
            return Err(ResearchError::remote(RemoteErrorKind::Network, "connection reset"));
        }
        state.polls += 1;
        let status = if state.statuses.len() > 1 {
            state.statuses.pop_front().unwrap_or(RunState::InProgress)
        } else {
            state.statuses.front().copied().unwrap_or(RunState::InProgress)
        };
        let last_error = if status.is_failure() {
            state.run_error.clone()
        } else {
            None
        };
        drop(state);
        Ok(self.run(status, last_error))
    }

    async fn cancel_run(&self, _thread_id: &str, _run_id: &str) -> Result<Run> {
        self.bump("cancel_run");
        Ok(self.run(RunState::Cancelling, None))
    }

    async fn list_messages(&self, _thread_id: &str) -> Result<Vec<Message>> {
        let state = self.record("list_messages");
        let mut visible: Vec<&ScriptedMessage> = state
            .messages
            .iter()
            .rev()
            .filter(|m| m.visible_after_polls <= state.polls)
            .collect();
        visible.sort_by_key(|m| std::cmp::Reverse(m.visible_after_polls));
        Ok(visible.into_iter().map(|m| m.message.clone()).collect())
    }
}

/// Settings with a short poll interval for paused-clock tests.
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings::default().with_poll_interval(Duration::from_millis(100))
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(10),
        multiplier: 1.0,
    }
}

pub fn orchestrator(service: Arc<FakeAgentService>) -> ResearchOrchestrator {
    ResearchOrchestrator::new(service, fast_settings()).with_retry_policy(fast_retry())
}

pub fn annotation(title: &str, url: &str) -> UrlAnnotation {
    UrlAnnotation {
        text: None,
        title: Some(title.to_string()),
        url: url.to_string(),
    }
}
