//! Drives one research request through a remote agent run.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::citations::{count_superscripts, CitationProcessor};
use crate::config::ResearchConfig;
use crate::error::{ResearchError, Result};
use crate::progress::{report_isolated, ProgressSink};
use crate::service::{Agent, AgentService, AgentSpec, Message, MessageRole, Run, ToolDefinition};
use crate::telemetry::{record_outcome, Telemetry};
use crate::types::{Citation, ProgressEvent, ResearchMetadata, ResearchRequest, ResearchResult, RunState};
use crate::util::retry::RetryPolicy;

/// Agents whose name contains this marker are reused.
pub const AGENT_NAME_MARKER: &str = "deep-research";
pub const DEFAULT_AGENT_NAME: &str = "deep-research-agent";
pub const DEFAULT_AGENT_INSTRUCTIONS: &str = "You are a helpful research assistant that provides comprehensive, well-researched answers with proper citations.";
/// Interim reasoning messages start with this prefix.
pub const REASONING_PREFIX: &str = "cot_summary:";

const SETUP_END: f64 = 0.2;
const POLL_SPAN: f64 = 0.7;

/// Agent and polling parameters for the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub model_deployment_name: String,
    pub deep_research_model: String,
    pub bing_resource_name: String,
    pub agent_name: String,
    pub instructions: String,
    pub poll_interval: Duration,
    /// Surface `cot_summary:` messages as progress while polling.
    pub report_reasoning: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&ResearchConfig::default())
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self {
            model_deployment_name: config.model_deployment_name.clone(),
            deep_research_model: config.deep_research_model_deployment_name.clone(),
            bing_resource_name: config.bing_resource_name.clone(),
            agent_name: DEFAULT_AGENT_NAME.to_string(),
            instructions: DEFAULT_AGENT_INSTRUCTIONS.to_string(),
            poll_interval: config.poll_interval(),
            report_reasoning: true,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Per-execute state that must survive an early return.
struct RunContext {
    metadata: ResearchMetadata,
    created_agent: Option<String>,
}

/// Takes a validated request through agent discovery, thread and run
/// creation, bounded polling and response processing.
pub struct ResearchOrchestrator {
    service: Arc<dyn AgentService>,
    settings: OrchestratorSettings,
    retry: RetryPolicy,
    telemetry: Telemetry,
    citations: CitationProcessor,
    /// Agents created by in-flight executions; never reused by others.
    owned_agents: Mutex<HashSet<String>>,
}

impl ResearchOrchestrator {
    pub fn new(service: Arc<dyn AgentService>, settings: OrchestratorSettings) -> Self {
        Self {
            service,
            settings,
            retry: RetryPolicy::default(),
            telemetry: Telemetry::default(),
            citations: CitationProcessor::default(),
            owned_agents: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_citation_processor(mut self, citations: CitationProcessor) -> Self {
        self.citations = citations;
        self
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry
    }

    /// Run `request` to a terminal outcome.
    ///
    /// Expected failures never surface as `Err`; they come back as a result
    /// with `success == false` and a [`crate::error::FailureKind`].
    pub async fn execute(
        &self,
        request: &ResearchRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ResearchResult {
        let started = Instant::now();
        let deadline = started + Duration::from_secs(request.timeout_seconds());
        let span = self
            .telemetry
            .execute_span(request.query().chars().count(), request.max_iterations());

        let mut ctx = RunContext {
            metadata: ResearchMetadata::for_request(request),
            created_agent: None,
        };

        let outcome = tokio::time::timeout_at(
            deadline,
            self.drive(request, progress, cancel, &mut ctx)
                .instrument(span.clone()),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ResearchError::Timeout(
                Duration::from_secs(request.timeout_seconds()).as_millis() as u64,
            ))
        });

        if let Err(ref e) = outcome {
            self.abandon_run(e, &mut ctx).instrument(span.clone()).await;
        }
        self.cleanup_agent(&mut ctx).instrument(span.clone()).await;

        for (field, value) in [
            ("agent_id", &ctx.metadata.agent_id),
            ("thread_id", &ctx.metadata.thread_id),
            ("run_id", &ctx.metadata.run_id),
        ] {
            if let Some(value) = value {
                span.record(field, value.as_str());
            }
        }

        let elapsed = started.elapsed();
        let seconds = elapsed.as_secs_f64();
        match outcome {
            Ok((content, citations)) => {
                record_outcome(&span, true, elapsed, None);
                self.emit(
                    progress,
                    ProgressEvent::new("Research completed successfully!", 1.0).with("success", true),
                );
                info!(seconds, citations = citations.len(), "Research completed successfully");
                ResearchResult::succeeded(content, citations, ctx.metadata, seconds)
            }
            Err(e) => {
                let detail = e.to_string();
                record_outcome(&span, false, elapsed, Some(&detail));
                self.emit(
                    progress,
                    ProgressEvent::new(format!("Research failed: {detail}"), 1.0)
                        .with("success", false)
                        .with("error", detail.clone()),
                );
                warn!(seconds, kind = %e.failure_kind(), error = %detail, "Research failed");
                ResearchResult::failed(&e, ctx.metadata, seconds)
            }
        }
    }

    async fn drive(
        &self,
        request: &ResearchRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
        ctx: &mut RunContext,
    ) -> Result<(String, Vec<Citation>)> {
        check_cancelled(cancel)?;
        self.emit(
            progress,
            ProgressEvent::new("Starting research...", 0.0).with("stage", "initialization"),
        );

        let agent = self.resolve_agent(ctx).await?;
        ctx.metadata.agent_id = Some(agent.id.clone());
        self.emit(
            progress,
            ProgressEvent::new("Agent ready, creating thread...", 0.1).with("agent_id", agent.id.clone()),
        );

        check_cancelled(cancel)?;
        let thread = self.service.create_thread().await?;
        ctx.metadata.thread_id = Some(thread.id.clone());
        self.service
            .post_message(&thread.id, MessageRole::User, request.query())
            .await?;
        debug!(thread_id = %thread.id, "Research thread created");
        self.emit(
            progress,
            ProgressEvent::new("Thread created, starting research...", SETUP_END)
                .with("thread_id", thread.id.clone()),
        );

        check_cancelled(cancel)?;
        let run = self.service.create_run(&thread.id, &agent.id).await?;
        ctx.metadata.run_id = Some(run.id.clone());
        ctx.metadata.run_status = Some(run.status);
        debug!(run_id = %run.id, status = %run.status, "Research run started");

        self.poll_run(request, progress, cancel, &run, ctx).await?;

        self.emit(progress, ProgressEvent::new("Research completed, processing results...", 0.9));
        let message = self.fetch_response(&thread.id, cancel).await?;
        let content = message.text().trim().to_string();

        if !request.enable_citations() {
            return Ok((content, Vec::new()));
        }
        Ok(self.process_citations(&content, &message))
    }

    /// Reuse an agent named after the research convention, or create one.
    async fn resolve_agent(&self, ctx: &mut RunContext) -> Result<Agent> {
        let agents = self.service.list_agents().await?;
        let existing = {
            let owned = lock_owned(&self.owned_agents);
            agents.into_iter().find(|agent| {
                agent.name.to_lowercase().contains(AGENT_NAME_MARKER) && !owned.contains(&agent.id)
            })
        };
        if let Some(agent) = existing {
            info!(agent_id = %agent.id, name = %agent.name, "Using existing research agent");
            return Ok(agent);
        }

        let connection_id = self
            .service
            .connection_id(&self.settings.bing_resource_name)
            .await?;
        debug!(connection_id = %connection_id, "Resolved grounding connection");

        let spec = AgentSpec {
            model: self.settings.model_deployment_name.clone(),
            name: self.settings.agent_name.clone(),
            instructions: self.settings.instructions.clone(),
            tools: vec![ToolDefinition::deep_research(
                connection_id,
                self.settings.deep_research_model.clone(),
            )],
        };
        let agent = self.service.create_agent(&spec).await?;
        lock_owned(&self.owned_agents).insert(agent.id.clone());
        ctx.created_agent = Some(agent.id.clone());
        info!(agent_id = %agent.id, "Created research agent");
        Ok(agent)
    }

    async fn poll_run(
        &self,
        request: &ResearchRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
        run: &Run,
        ctx: &mut RunContext,
    ) -> Result<()> {
        let span = self.telemetry.poll_span(&run.id, request.max_iterations());
        let result = self
            .poll_loop(request, progress, cancel, run, ctx)
            .instrument(span.clone())
            .await;
        span.record("iterations", ctx.metadata.iterations);
        if let Some(status) = ctx.metadata.run_status {
            span.record("final_status", status.to_string().as_str());
        }
        result
    }

    async fn poll_loop(
        &self,
        request: &ResearchRequest,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
        run: &Run,
        ctx: &mut RunContext,
    ) -> Result<()> {
        let max_iterations = request.max_iterations();
        let mut last_reasoning: Option<String> = None;

        for iteration in 0..max_iterations {
            check_cancelled(cancel)?;

            let current = self
                .retry
                .execute_cancellable(cancel, || self.service.get_run(&run.thread_id, &run.id))
                .await?;
            ctx.metadata.iterations = iteration + 1;
            ctx.metadata.run_status = Some(current.status);

            if current.status == RunState::Completed {
                debug!(iterations = iteration + 1, "Research run completed");
                return Ok(());
            }
            if current.status.is_failure() {
                let detail = current
                    .last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no error detail".to_string());
                return Err(ResearchError::RunTerminalFailure {
                    status: current.status,
                    detail,
                });
            }

            let fraction = SETUP_END + (iteration as f64 / max_iterations as f64) * POLL_SPAN;
            if self.settings.report_reasoning {
                self.report_reasoning(&run.thread_id, &mut last_reasoning, progress, fraction)
                    .await;
            }
            self.emit(
                progress,
                ProgressEvent::new(
                    format!("Research in progress... (iteration {})", iteration + 1),
                    fraction,
                )
                .with("iteration", iteration + 1)
                .with("status", current.status.to_string()),
            );

            if iteration + 1 < max_iterations {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ResearchError::Cancelled),
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                }
            }
        }

        Err(ResearchError::RunBudgetExceeded { max_iterations })
    }

    /// Forward a new `cot_summary:` message as progress. Failures only log.
    async fn report_reasoning(
        &self,
        thread_id: &str,
        last_seen: &mut Option<String>,
        progress: &dyn ProgressSink,
        fraction: f64,
    ) {
        let messages = match self.service.list_messages(thread_id).await {
            Ok(messages) => messages,
            Err(e) => {
                debug!(error = %e, "Could not fetch interim agent messages");
                return;
            }
        };
        let Some(latest) = messages.into_iter().find(Message::is_assistant) else {
            return;
        };
        if last_seen.as_deref() == Some(latest.id.as_str()) {
            return;
        }
        *last_seen = Some(latest.id.clone());

        let text = latest.text();
        let Some(summary) = text.trim_start().strip_prefix(REASONING_PREFIX) else {
            return;
        };
        let mut event = ProgressEvent::new(format!("Reasoning:{summary}"), fraction)
            .with("kind", "reasoning")
            .with("message_id", latest.id.clone());
        if !latest.annotations.is_empty() {
            if let Ok(annotations) = serde_json::to_value(&latest.annotations) {
                event = event.with("annotations", annotations);
            }
        }
        self.emit(progress, event);
    }

    /// Most recent assistant message with non-blank, non-reasoning text.
    async fn fetch_response(&self, thread_id: &str, cancel: &CancellationToken) -> Result<Message> {
        let span = self.telemetry.fetch_response_span(thread_id);
        async {
            let messages = self
                .retry
                .execute_cancellable(cancel, || self.service.list_messages(thread_id))
                .await?;
            span.record("message_count", messages.len());

            let message = messages
                .into_iter()
                .find(|m| {
                    let text = m.text();
                    m.is_assistant()
                        && !text.trim().is_empty()
                        && !text.trim_start().starts_with(REASONING_PREFIX)
                })
                .ok_or(ResearchError::NoContent)?;
            span.record("content_length", message.text().trim().len());
            debug!(message_id = %message.id, "Research content retrieved");
            Ok::<_, ResearchError>(message)
        }
        .instrument(span.clone())
        .await
    }

    fn process_citations(&self, content: &str, message: &Message) -> (String, Vec<Citation>) {
        let span = self.telemetry.citations_span(content.len());
        let _enter = span.enter();

        let extracted = self.citations.extract_citations(content);
        let citations = self.citations.merge_annotations(extracted, &message.annotations);
        let rendered = self.citations.convert_to_superscript(content);

        span.record("citation_count", citations.len());
        span.record("superscript_count", count_superscripts(&rendered));
        (rendered, citations)
    }

    /// Best-effort cancel of a run left in a non-terminal state.
    async fn abandon_run(&self, error: &ResearchError, ctx: &mut RunContext) {
        let abandoned = matches!(
            error,
            ResearchError::Cancelled | ResearchError::Timeout(_) | ResearchError::RunBudgetExceeded { .. }
        );
        let (Some(thread_id), Some(run_id)) = (&ctx.metadata.thread_id, &ctx.metadata.run_id) else {
            return;
        };
        if !abandoned || ctx.metadata.run_status.is_some_and(RunState::is_terminal) {
            return;
        }

        match self.service.cancel_run(thread_id, run_id).await {
            Ok(run) => debug!(run_id = %run.id, status = %run.status, "Remote run cancel requested"),
            Err(e) => warn!(run_id = %run_id, error = %e, "Failed to cancel remote run"),
        }
    }

    /// Delete an agent this execution created. Failures only log.
    async fn cleanup_agent(&self, ctx: &mut RunContext) {
        let Some(agent_id) = ctx.created_agent.take() else {
            return;
        };
        match self.service.delete_agent(&agent_id).await {
            Ok(()) => debug!(agent_id = %agent_id, "Deleted research agent"),
            Err(e) => warn!(agent_id = %agent_id, error = %e, "Failed to delete research agent"),
        }
        lock_owned(&self.owned_agents).remove(&agent_id);
    }

    fn emit(&self, progress: &dyn ProgressSink, event: ProgressEvent) {
        report_isolated(progress, &event);
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(ResearchError::Cancelled)
    } else {
        Ok(())
    }
}

fn lock_owned(owned: &Mutex<HashSet<String>>) -> std::sync::MutexGuard<'_, HashSet<String>> {
    match owned.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let config = ResearchConfig::default().with_poll_interval(Duration::from_millis(250));
        let settings = OrchestratorSettings::from_config(&config);
        assert_eq!(settings.model_deployment_name, "gpt-4o");
        assert_eq!(settings.deep_research_model, "o3-deep-research");
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert!(settings.agent_name.contains(AGENT_NAME_MARKER));
    }

    #[test]
    fn cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        assert!(check_cancelled(&token).is_ok());
        token.cancel();
        assert!(matches!(check_cancelled(&token), Err(ResearchError::Cancelled)));
    }
}
