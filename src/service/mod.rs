//! The remote agent service the orchestrator drives.

pub mod http;

pub use http::{HttpAgentService, DEFAULT_API_VERSION};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::Result;
use crate::types::{RunState, UrlAnnotation};

/// A hosted agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Tools attached to a newly created agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    DeepResearch {
        deep_research: DeepResearchTool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepResearchTool {
    pub deep_research_model: String,
    pub deep_research_bing_grounding_connections: Vec<GroundingConnection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingConnection {
    pub connection_id: String,
}

impl ToolDefinition {
    pub fn deep_research(
        grounding_connection_id: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self::DeepResearch {
            deep_research: DeepResearchTool {
                deep_research_model: model.into(),
                deep_research_bing_grounding_connections: vec![GroundingConnection {
                    connection_id: grounding_connection_id.into(),
                }],
            },
        }
    }
}

/// Parameters for creating an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSpec {
    pub model: String,
    pub name: String,
    pub instructions: String,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A thread message reduced to its text parts and URL citations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub text_parts: Vec<String>,
    pub annotations: Vec<UrlAnnotation>,
}

impl Message {
    /// All text parts concatenated.
    pub fn text(&self) -> String {
        self.text_parts.concat()
    }

    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }
}

/// Failure detail the service attaches to a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code.is_empty(), self.message.is_empty()) {
            (true, true) => write!(f, "no error detail"),
            (false, true) => write!(f, "{}", self.code),
            (true, false) => write!(f, "{}", self.message),
            (false, false) => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub status: RunState,
    pub last_error: Option<RunError>,
}

/// Agent, thread, message and run operations of the hosted service.
///
/// Implementations map transport and HTTP failures onto
/// [`crate::error::ResearchError::RemoteService`].
#[async_trait]
pub trait AgentService: Send + Sync {
    async fn list_agents(&self) -> Result<Vec<Agent>>;

    async fn create_agent(&self, spec: &AgentSpec) -> Result<Agent>;

    async fn delete_agent(&self, agent_id: &str) -> Result<()>;

    /// Resolve a named project connection (the search grounding resource) to its id.
    async fn connection_id(&self, name: &str) -> Result<String>;

    async fn create_thread(&self) -> Result<Thread>;

    async fn post_message(&self, thread_id: &str, role: MessageRole, content: &str)
        -> Result<Message>;

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<Run>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    /// Messages of a thread, newest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_research_tool_wire_shape() {
        let tool = ToolDefinition::deep_research("conn-1", "o3-deep-research");
        assert_eq!(
            serde_json::to_value(&tool).unwrap(),
            json!({
                "type": "deep_research",
                "deep_research": {
                    "deep_research_model": "o3-deep-research",
                    "deep_research_bing_grounding_connections": [{"connection_id": "conn-1"}]
                }
            })
        );
    }

    #[test]
    fn run_error_display() {
        let err = RunError {
            code: "server_error".into(),
            message: "upstream timeout".into(),
        };
        assert_eq!(err.to_string(), "server_error: upstream timeout");
        assert_eq!(
            RunError { code: String::new(), message: String::new() }.to_string(),
            "no error detail"
        );
    }

    #[test]
    fn message_text_concatenates_parts() {
        let message = Message {
            id: "msg_1".into(),
            role: MessageRole::Assistant,
            text_parts: vec!["Part one. ".into(), "Part two.".into()],
            annotations: vec![],
        };
        assert_eq!(message.text(), "Part one. Part two.");
        assert!(message.is_assistant());
    }
}
