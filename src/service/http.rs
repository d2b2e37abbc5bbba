//! REST client for the hosted agents API.

use std::str::FromStr;
use std::sync::OnceLock;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{Agent, AgentService, AgentSpec, Message, MessageRole, Run, RunError, Thread};
use crate::error::{RemoteErrorKind, ResearchError, Result};
use crate::types::{RunState, UrlAnnotation};

pub const DEFAULT_API_VERSION: &str = "v1";

static SHARED_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Get (or create) the shared reqwest client.
pub fn shared_client() -> &'static reqwest::Client {
    SHARED_CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .pool_max_idle_per_host(4)
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// JSON content type plus `Authorization: Bearer`.
pub fn bearer_headers(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {token}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Map an unsuccessful HTTP status onto a remote error.
pub fn status_to_error(operation: &str, status: u16, body: &str) -> ResearchError {
    let kind = match status {
        401 | 403 => RemoteErrorKind::Authentication,
        404 => RemoteErrorKind::NotFound,
        429 | 500..=599 => RemoteErrorKind::Service,
        _ => RemoteErrorKind::InvalidRequest,
    };
    ResearchError::remote(kind, format!("{operation} failed with HTTP {status}: {body}"))
}

/// Agents REST API client authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpAgentService {
    endpoint: String,
    token: String,
    api_version: String,
}

impl HttpAgentService {
    /// `endpoint` is the project endpoint, e.g.
    /// `https://<resource>.services.ai.azure.com/api/projects/<project>`.
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    async fn send<T: DeserializeOwned>(&self, operation: &str, request: RequestBuilder) -> Result<T> {
        debug!(operation, "agent service request");
        let resp = request
            .headers(bearer_headers(&self.token))
            .query(&[("api-version", self.api_version.as_str())])
            .send()
            .await
            .map_err(|e| {
                ResearchError::remote_with_source(
                    RemoteErrorKind::Network,
                    format!("{operation}: request failed"),
                    e,
                )
            })?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| {
            ResearchError::remote_with_source(
                RemoteErrorKind::Network,
                format!("{operation}: failed to read response"),
                e,
            )
        })?;
        if !(200..300).contains(&status) {
            return Err(status_to_error(operation, status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            ResearchError::remote_with_source(
                RemoteErrorKind::Service,
                format!("{operation}: malformed response"),
                e,
            )
        })
    }
}

#[derive(Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct WireId {
    id: String,
}

#[derive(Deserialize)]
struct WireRun {
    id: String,
    #[serde(default)]
    thread_id: String,
    status: String,
    #[serde(default)]
    last_error: Option<RunError>,
}

impl WireRun {
    fn into_run(self, thread_id: &str) -> Result<Run> {
        let status = RunState::from_str(&self.status).map_err(|_| {
            ResearchError::remote(
                RemoteErrorKind::Service,
                format!("unknown run status '{}'", self.status),
            )
        })?;
        Ok(Run {
            id: self.id,
            thread_id: if self.thread_id.is_empty() {
                thread_id.to_string()
            } else {
                self.thread_id
            },
            status,
            last_error: self.last_error,
        })
    }
}

#[derive(Deserialize)]
struct WireMessage {
    id: String,
    role: String,
    #[serde(default)]
    content: Vec<WireContent>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContent {
    Text {
        text: WireText,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct WireText {
    value: String,
    #[serde(default)]
    annotations: Vec<WireAnnotation>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireAnnotation {
    UrlCitation {
        #[serde(default)]
        text: Option<String>,
        url_citation: WireUrlCitation,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct WireUrlCitation {
    url: String,
    #[serde(default)]
    title: Option<String>,
}

impl WireMessage {
    fn into_message(self) -> Option<Message> {
        let role = match MessageRole::from_str(&self.role) {
            Ok(role) => role,
            Err(_) => {
                debug!(role = %self.role, "skipping message with unknown role");
                return None;
            }
        };
        let mut text_parts = Vec::new();
        let mut annotations = Vec::new();
        for part in self.content {
            if let WireContent::Text { text } = part {
                for annotation in text.annotations {
                    if let WireAnnotation::UrlCitation { text, url_citation } = annotation {
                        annotations.push(UrlAnnotation {
                            text,
                            title: url_citation.title,
                            url: url_citation.url,
                        });
                    }
                }
                text_parts.push(text.value);
            }
        }
        Some(Message {
            id: self.id,
            role,
            text_parts,
            annotations,
        })
    }
}

#[async_trait]
impl AgentService for HttpAgentService {
    async fn list_agents(&self) -> Result<Vec<Agent>> {
        let list: ListResponse<Agent> = self
            .send("list_agents", shared_client().get(self.url("assistants")))
            .await?;
        Ok(list.data)
    }

    async fn create_agent(&self, spec: &AgentSpec) -> Result<Agent> {
        self.send(
            "create_agent",
            shared_client().post(self.url("assistants")).json(spec),
        )
        .await
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .send(
                "delete_agent",
                shared_client().delete(self.url(&format!("assistants/{agent_id}"))),
            )
            .await?;
        Ok(())
    }

    async fn connection_id(&self, name: &str) -> Result<String> {
        let conn: WireId = self
            .send(
                "get_connection",
                shared_client().get(self.url(&format!("connections/{name}"))),
            )
            .await?;
        Ok(conn.id)
    }

    async fn create_thread(&self) -> Result<Thread> {
        self.send(
            "create_thread",
            shared_client().post(self.url("threads")).json(&json!({})),
        )
        .await
    }

    async fn post_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<Message> {
        let wire: WireMessage = self
            .send(
                "post_message",
                shared_client()
                    .post(self.url(&format!("threads/{thread_id}/messages")))
                    .json(&json!({ "role": role.to_string(), "content": content })),
            )
            .await?;
        wire.into_message().ok_or_else(|| {
            ResearchError::remote(RemoteErrorKind::Service, "post_message: unexpected role")
        })
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<Run> {
        let wire: WireRun = self
            .send(
                "create_run",
                shared_client()
                    .post(self.url(&format!("threads/{thread_id}/runs")))
                    .json(&json!({ "assistant_id": agent_id })),
            )
            .await?;
        wire.into_run(thread_id)
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let wire: WireRun = self
            .send(
                "get_run",
                shared_client().get(self.url(&format!("threads/{thread_id}/runs/{run_id}"))),
            )
            .await?;
        wire.into_run(thread_id)
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let wire: WireRun = self
            .send(
                "cancel_run",
                shared_client()
                    .post(self.url(&format!("threads/{thread_id}/runs/{run_id}/cancel")))
                    .json(&json!({})),
            )
            .await?;
        wire.into_run(thread_id)
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        let list: ListResponse<WireMessage> = self
            .send(
                "list_messages",
                shared_client()
                    .get(self.url(&format!("threads/{thread_id}/messages")))
                    .query(&[("order", "desc")]),
            )
            .await?;
        Ok(list
            .data
            .into_iter()
            .filter_map(WireMessage::into_message)
            .collect())
    }
}
