//! Orchestrator and executor behavior against a scripted agent service.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{annotation, orchestrator, FakeAgentService, CREATED_AGENT_ID, RUN_ID, THREAD_ID};
use deep_research::error::FailureKind;
use deep_research::progress::{NoopProgress, ProgressRecorder};
use deep_research::research::{ResearchExecutor, AGENT_NAME_MARKER};
use deep_research::types::{ResearchRequest, RunState};
use tokio_util::sync::CancellationToken;

const REPORT: &str = "Solid-state cells now exceed 500 Wh/kg [1] and ship in 2026 [2].\n\n\
Sources:\n\
[1] Battery Review https://example.com/battery-review\n\
[2] Lab Report https://example.org/lab-report";

fn request(max_iterations: u32, timeout_seconds: u64) -> ResearchRequest {
    ResearchRequest::builder()
        .query("State of solid-state batteries")
        .max_iterations(max_iterations)
        .timeout_seconds(timeout_seconds)
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn completed_run_yields_cited_content() {
    let service = Arc::new(
        FakeAgentService::completing_after(2, REPORT)
            // Duplicate of an inline source plus one new annotation.
            .with_assistant_message(
                "msg_final",
                REPORT,
                vec![
                    annotation("Battery Review", "https://example.com/battery-review"),
                    annotation("Agency Data", "https://agency.gov/data"),
                ],
                2,
            ),
    );
    let orchestrator = orchestrator(service.clone());
    let recorder = ProgressRecorder::new();

    let result = orchestrator
        .execute(&request(10, 300), &recorder, &CancellationToken::new())
        .await;

    assert!(result.success, "unexpected failure: {:?}", result.error_message);
    assert!(result.failure.is_none());
    assert!(result.content.contains("500 Wh/kg <sup>1</sup>"));
    assert!(!result.content.contains("[1]"));
    let urls: Vec<&str> = result.citations.iter().map(|c| c.url()).collect();
    assert_eq!(
        urls,
        [
            "https://example.com/battery-review",
            "https://example.org/lab-report",
            "https://agency.gov/data",
        ]
    );
    let indices: Vec<u32> = result.citations.iter().map(|c| c.index()).collect();
    assert_eq!(indices, [1, 2, 3]);
    assert!(result.execution_time_seconds > 0.0);

    assert_eq!(result.metadata.agent_id.as_deref(), Some(CREATED_AGENT_ID));
    assert_eq!(result.metadata.thread_id.as_deref(), Some(THREAD_ID));
    assert_eq!(result.metadata.run_id.as_deref(), Some(RUN_ID));
    assert_eq!(result.metadata.iterations, 2);
    assert_eq!(result.metadata.run_status, Some(RunState::Completed));
    assert_eq!(service.posted_messages(), ["State of solid-state batteries"]);

    let values = recorder.progress_values();
    assert_eq!(values.first().copied(), Some(0.0));
    assert_eq!(values.last().copied(), Some(1.0));
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {values:?}");
    assert_eq!(recorder.last().unwrap().metadata["success"], true);
}

#[tokio::test(start_paused = true)]
async fn citations_disabled_keeps_raw_content() {
    let service = Arc::new(FakeAgentService::completing_after(1, &format!("  {REPORT}  ")));
    let request = ResearchRequest::builder()
        .query("State of solid-state batteries")
        .enable_citations(false)
        .build()
        .unwrap();

    let result = orchestrator(service)
        .execute(&request, &NoopProgress, &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.content, REPORT);
    assert!(result.citations.is_empty());
}

#[tokio::test(start_paused = true)]
async fn existing_research_agent_is_reused() {
    let service = Arc::new(
        FakeAgentService::completing_after(1, "Findings.").with_agent("asst_existing", "My Deep-Research Agent"),
    );

    let result = orchestrator(service.clone())
        .execute(&request(5, 300), &NoopProgress, &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.metadata.agent_id.as_deref(), Some("asst_existing"));
    assert_eq!(service.calls("create_agent"), 0);
    assert_eq!(service.calls("connection_id"), 0);
    assert!(service.deleted_agents().is_empty());
}

#[tokio::test(start_paused = true)]
async fn created_agent_is_deleted_afterwards() {
    let service = Arc::new(FakeAgentService::completing_after(1, "Findings.").with_agent("asst_other", "translator"));

    let result = orchestrator(service.clone())
        .execute(&request(5, 300), &NoopProgress, &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(service.calls("connection_id"), 1);
    let specs = service.created_specs();
    assert_eq!(specs.len(), 1);
    assert!(specs[0].name.contains(AGENT_NAME_MARKER));
    assert_eq!(specs[0].model, "gpt-4o");
    let tool = serde_json::to_value(&specs[0].tools[0]).unwrap();
    assert_eq!(tool["type"], "deep_research");
    assert_eq!(tool["deep_research"]["deep_research_model"], "o3-deep-research");
    assert_eq!(
        tool["deep_research"]["deep_research_bing_grounding_connections"][0]["connection_id"],
        "/connections/bingsearch"
    );
    assert_eq!(service.deleted_agents(), [CREATED_AGENT_ID]);
}

#[tokio::test(start_paused = true)]
async fn polling_budget_is_enforced() {
    let service = Arc::new(FakeAgentService::new().with_statuses([RunState::InProgress]));

    let result = orchestrator(service.clone())
        .execute(&request(3, 300), &NoopProgress, &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::RunBudgetExceeded));
    assert_eq!(result.metadata.iterations, 3);
    assert_eq!(service.calls("get_run"), 3);
    assert_eq!(service.calls("cancel_run"), 1);
    assert_eq!(
        result.error_message.as_deref(),
        Some("Research failed: Research did not complete within 3 iterations")
    );
    assert!(result.content.is_empty());
}

#[tokio::test(start_paused = true)]
async fn terminal_failure_reports_run_error() {
    let service = Arc::new(
        FakeAgentService::new()
            .with_statuses([RunState::InProgress, RunState::Failed])
            .with_run_error("server_error", "quota exhausted"),
    );
    let recorder = ProgressRecorder::new();

    let result = orchestrator(service.clone())
        .execute(&request(10, 300), &recorder, &CancellationToken::new())
        .await;

    assert_eq!(result.failure, Some(FailureKind::RunTerminalFailure));
    assert_eq!(result.metadata.run_status, Some(RunState::Failed));
    assert_eq!(result.metadata.iterations, 2);
    let message = result.error_message.unwrap();
    assert!(message.contains("quota exhausted"), "{message}");
    assert!(message.contains("failed"), "{message}");
    assert_eq!(service.calls("cancel_run"), 0);

    let last = recorder.last().unwrap();
    assert_eq!(last.progress, 1.0);
    assert_eq!(last.metadata["success"], false);
}

#[tokio::test(start_paused = true)]
async fn expired_run_without_detail() {
    let service = Arc::new(FakeAgentService::new().with_statuses([RunState::Expired]));

    let result = orchestrator(service)
        .execute(&request(10, 300), &NoopProgress, &CancellationToken::new())
        .await;

    assert_eq!(result.failure, Some(FailureKind::RunTerminalFailure));
    assert!(result.error_message.unwrap().ends_with("no error detail"));
}

#[tokio::test(start_paused = true)]
async fn missing_assistant_reply_is_no_content() {
    let service = Arc::new(FakeAgentService::new().with_statuses([RunState::Completed]));

    let result = orchestrator(service)
        .execute(&request(10, 300), &NoopProgress, &CancellationToken::new())
        .await;

    assert_eq!(result.failure, Some(FailureKind::NoContent));
    assert_eq!(result.metadata.run_status, Some(RunState::Completed));
}

#[tokio::test(start_paused = true)]
async fn transient_poll_errors_are_retried() {
    let service = Arc::new(FakeAgentService::completing_after(1, "Findings.").with_failing_polls(2));

    let result = orchestrator(service.clone())
        .execute(&request(10, 300), &NoopProgress, &CancellationToken::new())
        .await;

    assert!(result.success, "{:?}", result.error_message);
    assert_eq!(service.calls("get_run"), 3);
    assert_eq!(result.metadata.iterations, 1);
}

#[tokio::test(start_paused = true)]
async fn wall_clock_timeout_cancels_the_run() {
    let service = Arc::new(FakeAgentService::new().with_statuses([RunState::InProgress]));

    let result = orchestrator(service.clone())
        .execute(&request(50, 1), &NoopProgress, &CancellationToken::new())
        .await;

    assert_eq!(result.failure, Some(FailureKind::Timeout));
    assert!(result.metadata.iterations < 50);
    assert_eq!(service.calls("cancel_run"), 1);
    assert_eq!(service.deleted_agents(), [CREATED_AGENT_ID]);
}

#[tokio::test(start_paused = true)]
async fn reasoning_summaries_are_reported_once() {
    let service = Arc::new(
        FakeAgentService::new()
            .with_statuses([RunState::InProgress, RunState::InProgress, RunState::Completed])
            .with_assistant_message("msg_cot", "cot_summary: comparing cell chemistries", vec![], 1)
            .with_assistant_message("msg_final", "Final findings.", vec![], 3),
    );
    let recorder = ProgressRecorder::new();

    let result = orchestrator(service)
        .execute(&request(10, 300), &recorder, &CancellationToken::new())
        .await;

    assert!(result.success);
    assert_eq!(result.content, "Final findings.");
    let reasoning: Vec<_> = recorder
        .events()
        .into_iter()
        .filter(|e| e.message.starts_with("Reasoning:"))
        .collect();
    assert_eq!(reasoning.len(), 1);
    assert_eq!(reasoning[0].message, "Reasoning: comparing cell chemistries");
    assert_eq!(reasoning[0].metadata["kind"], "reasoning");
    assert_eq!(reasoning[0].metadata["message_id"], "msg_cot");
}

#[tokio::test(start_paused = true)]
async fn reasoning_message_alone_is_not_content() {
    let service = Arc::new(
        FakeAgentService::new()
            .with_statuses([RunState::Completed])
            .with_assistant_message("msg_cot", "cot_summary: still thinking", vec![], 1),
    );

    let result = orchestrator(service)
        .execute(&request(10, 300), &NoopProgress, &CancellationToken::new())
        .await;

    assert_eq!(result.failure, Some(FailureKind::NoContent));
}

#[tokio::test(start_paused = true)]
async fn pre_cancelled_token_never_contacts_the_service() {
    let service = Arc::new(FakeAgentService::completing_after(1, "Findings."));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = orchestrator(service.clone())
        .execute(&request(10, 300), &NoopProgress, &cancel)
        .await;

    assert_eq!(result.failure, Some(FailureKind::Cancelled));
    assert_eq!(result.metadata.run_status, Some(RunState::Cancelled));
    assert!(result.metadata.run_id.is_none());
    assert_eq!(service.calls("list_agents"), 0);
    assert_eq!(service.calls("create_thread"), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_polling_cancels_remote_run() {
    let service = Arc::new(FakeAgentService::new().with_statuses([RunState::InProgress]));
    let executor = ResearchExecutor::new(Arc::new(orchestrator(service.clone())));

    let handle = executor.submit(request(10, 300), Arc::new(NoopProgress));
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(handle.is_started());
    handle.cancel();
    let result = handle.wait().await;

    assert_eq!(result.failure, Some(FailureKind::Cancelled));
    assert_eq!(result.metadata.run_status, Some(RunState::Cancelled));
    assert!(result.metadata.iterations >= 1);
    assert_eq!(service.calls("cancel_run"), 1);
    assert_eq!(service.deleted_agents(), [CREATED_AGENT_ID]);
}

#[tokio::test(start_paused = true)]
async fn queued_task_cancelled_before_start() {
    let service = Arc::new(FakeAgentService::new().with_statuses([RunState::InProgress]));
    let executor = ResearchExecutor::new(Arc::new(orchestrator(service.clone()))).with_pool_size(1);

    let first = executor.submit(request(10, 300), Arc::new(NoopProgress));
    let second = executor.submit(request(10, 300), Arc::new(NoopProgress));
    let recorder = Arc::new(ProgressRecorder::new());
    let third = executor.submit(request(10, 300), recorder.clone());
    second.cancel();
    third.cancel();

    let second = second.wait().await;
    assert_eq!(second.failure, Some(FailureKind::Cancelled));
    assert!(second.metadata.thread_id.is_none());
    assert_eq!(second.metadata.run_status, Some(RunState::Cancelled));
    assert_eq!(second.execution_time_seconds, 0.0);

    let third = third.wait().await;
    assert_eq!(third.failure, Some(FailureKind::Cancelled));
    assert_eq!(recorder.len(), 1);
    assert_eq!(recorder.last().unwrap().progress, 1.0);

    first.cancel();
    assert_eq!(first.wait().await.failure, Some(FailureKind::Cancelled));
    assert!(service.calls("create_thread") <= 1);
}

#[tokio::test(start_paused = true)]
async fn pool_limits_concurrent_runs() {
    let service = Arc::new(FakeAgentService::new().with_statuses([RunState::InProgress]));
    let executor = ResearchExecutor::new(Arc::new(orchestrator(service.clone()))).with_pool_size(2);
    assert_eq!(executor.pool_size(), 2);

    let handles: Vec<_> = (0..3)
        .map(|_| executor.submit(request(50, 300), Arc::new(NoopProgress)))
        .collect();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let started = handles.iter().filter(|h| h.is_started()).count();
    assert_eq!(started, 2);
    assert_eq!(executor.available_slots(), 0);
    assert_eq!(service.calls("create_thread"), 2);

    for handle in &handles {
        handle.cancel();
    }
    for handle in handles {
        assert_eq!(handle.wait().await.failure, Some(FailureKind::Cancelled));
    }
    assert_eq!(executor.available_slots(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_runs_do_not_share_created_agents() {
    let service = Arc::new(FakeAgentService::completing_after(2, "Findings."));
    let executor = ResearchExecutor::new(Arc::new(orchestrator(service.clone())));

    let first = executor.submit(request(10, 300), Arc::new(NoopProgress));
    let second = executor.submit(request(10, 300), Arc::new(NoopProgress));
    let (first, second) = (first.wait().await, second.wait().await);

    assert!(first.success && second.success);
    assert_ne!(first.metadata.agent_id, second.metadata.agent_id);
    assert_eq!(service.calls("create_agent"), 2);
    let mut deleted = service.deleted_agents();
    deleted.sort();
    assert_eq!(deleted, ["asst_created_1", "asst_created_2"]);
}

#[test]
fn run_blocking_from_synchronous_code() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let service = Arc::new(FakeAgentService::completing_after(1, "Findings."));
    let executor = ResearchExecutor::with_runtime(
        Arc::new(orchestrator(service)),
        1,
        runtime.handle().clone(),
    );

    let result = executor.run_blocking(request(5, 60), Arc::new(NoopProgress));

    assert!(result.success);
    assert_eq!(result.content, "Findings.");
}
