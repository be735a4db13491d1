//! Stateful conversation via the Assistants API
//!
//! A turn appends the user's text to a thread, starts a run of the assistant
//! against it and polls the run until it reaches a terminal status. The
//! assistant and each thread are created once, on first use, behind
//! `OnceCell`s so concurrent first turns cannot create duplicates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use tokio::sync::OnceCell;

use super::ApiClient;
use crate::config::{AssistantConfig, SessionScope};
use crate::{Error, Result};

/// Messages fetched when looking for the reply to a run
const REPLY_PAGE_SIZE: &str = "20";

/// Status of a remote assistant run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting to start
    Queued,
    /// Executing
    InProgress,
    /// Cancellation requested
    Cancelling,
    /// Waiting for tool output
    RequiresAction,
    /// Finished with a reply
    Completed,
    /// Failed remotely
    Failed,
    /// Cancelled
    Cancelled,
    /// Not completed in the remote time limit
    Expired,
    /// Ended early (token limits, content filter)
    Incomplete,
    /// A status this client does not know yet
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether polling should stop at this status
    ///
    /// `requires_action` counts as terminal: no tools are registered, so such
    /// a run can never continue.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed
                | Self::Failed
                | Self::Cancelled
                | Self::Expired
                | Self::Incomplete
                | Self::RequiresAction
        )
    }

    /// Wire name of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Cancelling => "cancelling",
            Self::RequiresAction => "requires_action",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Incomplete => "incomplete",
            Self::Unknown => "unknown",
        }
    }
}

/// A remote conversation thread plus the lock serializing turns on it
///
/// The API rejects new messages while a run is active on the thread, so
/// turns sharing a session wait for each other.
#[derive(Debug, Default)]
pub struct ConversationSession {
    thread_id: OnceCell<String>,
    turn: tokio::sync::Mutex<()>,
}

impl ConversationSession {
    /// Remote thread id, once created
    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.get().map(String::as_str)
    }
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Run {
    id: String,
    status: RunStatus,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessageContent {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct TextValue {
    value: String,
}

/// Assistants API client holding the conversation sessions
#[derive(Debug)]
pub struct Assistant {
    api: ApiClient,
    config: AssistantConfig,
    assistant_id: OnceCell<String>,
    global: Arc<ConversationSession>,
    per_chat: Mutex<HashMap<String, Arc<ConversationSession>>>,
}

impl Assistant {
    /// Create a client; nothing is created remotely until the first turn
    #[must_use]
    pub fn new(api: ApiClient, config: AssistantConfig) -> Self {
        Self {
            api,
            config,
            assistant_id: OnceCell::new(),
            global: Arc::new(ConversationSession::default()),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    /// Session used for `session_key` under the configured scope
    #[must_use]
    pub fn session(&self, session_key: &str) -> Arc<ConversationSession> {
        match self.config.session_scope {
            SessionScope::Global => Arc::clone(&self.global),
            SessionScope::PerChat => {
                let mut sessions = self.per_chat.lock().unwrap_or_else(|e| e.into_inner());
                Arc::clone(sessions.entry(session_key.to_string()).or_default())
            }
        }
    }

    /// Run one conversation turn and return the assistant's reply
    ///
    /// # Errors
    ///
    /// Returns a backend error if any call fails or the run ends in a
    /// non-success status, and a timeout if the run is still going after
    /// `max_poll_attempts` status checks
    pub async fn converse(&self, session_key: &str, user_text: &str) -> Result<String> {
        let session = self.session(session_key);
        let assistant_id = self.ensure_assistant().await?;
        let thread_id = session
            .thread_id
            .get_or_try_init(|| self.create_thread())
            .await?;

        let _turn = session.turn.lock().await;

        self.add_message(thread_id, user_text).await?;
        let run = self.start_run(thread_id, assistant_id).await?;
        tracing::debug!(thread_id = %thread_id, run_id = %run.id, "run started");

        // Unfinished runs are cancelled under the turn lock. The guard only
        // fires if this future is dropped mid-wait.
        let mut pending = PendingRun::new(self.api.clone(), thread_id, &run.id);
        let run_id = run.id.clone();
        let run = match self.wait_for_run(thread_id, run).await {
            Ok(run) => run,
            Err(e) => {
                self.cancel_run(thread_id, &run_id).await;
                pending.finished();
                return Err(e);
            }
        };
        // a run waiting on tool output still holds the thread
        if run.status == RunStatus::RequiresAction {
            self.cancel_run(thread_id, &run.id).await;
        }
        pending.finished();

        if run.status != RunStatus::Completed {
            let message = run.last_error.map_or_else(
                || format!("run {} ended with status {}", run.id, run.status.as_str()),
                |e| match e.code {
                    Some(code) => format!("{code}: {}", e.message),
                    None => e.message,
                },
            );
            tracing::warn!(run_id = %run.id, status = run.status.as_str(), %message, "run did not complete");
            return Err(Error::backend(run.status.as_str(), message));
        }

        self.latest_reply(thread_id, &run.id).await
    }

    /// Assistant id, creating the assistant on first use
    async fn ensure_assistant(&self) -> Result<&str> {
        self.assistant_id
            .get_or_try_init(|| async {
                if let Some(id) = &self.config.assistant_id {
                    return Ok(id.clone());
                }
                self.create_assistant().await
            })
            .await
            .map(String::as_str)
    }

    async fn create_assistant(&self) -> Result<String> {
        let body = serde_json::json!({
            "name": self.config.name,
            "instructions": self.config.instructions,
            "model": self.config.model,
        });
        let created: Created = self
            .api
            .send_json(self.beta(Method::POST, "/assistants").json(&body))
            .await?;

        tracing::info!(assistant_id = %created.id, model = %self.config.model, "assistant created");
        Ok(created.id)
    }

    async fn create_thread(&self) -> Result<String> {
        let created: Created = self
            .api
            .send_json(
                self.beta(Method::POST, "/threads")
                    .json(&serde_json::json!({})),
            )
            .await?;

        tracing::info!(thread_id = %created.id, "conversation thread created");
        Ok(created.id)
    }

    async fn add_message(&self, thread_id: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({ "role": "user", "content": text });
        self.api
            .send(
                self.beta(Method::POST, &format!("/threads/{thread_id}/messages"))
                    .json(&body),
            )
            .await?;
        Ok(())
    }

    async fn start_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        let body = serde_json::json!({ "assistant_id": assistant_id });
        self.api
            .send_json(
                self.beta(Method::POST, &format!("/threads/{thread_id}/runs"))
                    .json(&body),
            )
            .await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        self.api
            .send_json(self.beta(Method::GET, &format!("/threads/{thread_id}/runs/{run_id}")))
            .await
    }

    /// Poll until `run` is terminal or the attempt bound is spent
    async fn wait_for_run(&self, thread_id: &str, mut run: Run) -> Result<Run> {
        let mut attempts = 0u32;

        while !run.status.is_terminal() {
            if attempts >= self.config.max_poll_attempts {
                return Err(Error::Timeout(format!(
                    "run {} still {} after {attempts} status checks",
                    run.id,
                    run.status.as_str()
                )));
            }

            tokio::time::sleep(self.config.poll_interval).await;
            let run_id = run.id.clone();
            run = self.retrieve_run(thread_id, &run_id).await?;
            attempts += 1;
            tracing::trace!(run_id = %run.id, attempts, status = run.status.as_str(), "polled run");
        }

        Ok(run)
    }

    /// Cancel an unfinished run and wait for it to stop
    ///
    /// Best-effort: failures are logged. Waits at most `max_poll_attempts`
    /// status checks for the run to leave `cancelling`.
    async fn cancel_run(&self, thread_id: &str, run_id: &str) {
        if let Err(e) = request_cancel(&self.api, thread_id, run_id).await {
            tracing::warn!(%run_id, error = %e, "failed to cancel unfinished run");
            return;
        }
        tracing::info!(%run_id, "cancelled unfinished run");

        for _ in 0..self.config.max_poll_attempts {
            tokio::time::sleep(self.config.poll_interval).await;
            match self.retrieve_run(thread_id, run_id).await {
                Ok(run) if run.status.is_terminal() => {
                    tracing::debug!(%run_id, status = run.status.as_str(), "run stopped");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(%run_id, error = %e, "failed to check cancelled run");
                    return;
                }
            }
        }
        tracing::warn!(%run_id, "run still active after cancellation");
    }

    /// Text of the newest assistant message produced by `run_id`
    async fn latest_reply(&self, thread_id: &str, run_id: &str) -> Result<String> {
        let list: MessageList = self
            .api
            .send_json(
                self.beta(Method::GET, &format!("/threads/{thread_id}/messages"))
                    .query(&[
                        ("order", "desc"),
                        ("limit", REPLY_PAGE_SIZE),
                        ("run_id", run_id),
                    ]),
            )
            .await?;

        list.data
            .into_iter()
            .find(|m| m.role == "assistant")
            .map(|m| {
                m.content
                    .into_iter()
                    .filter_map(|c| match c {
                        MessageContent::Text { text } => Some(text.value),
                        MessageContent::Other => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .filter(|reply| !reply.trim().is_empty())
            .ok_or_else(|| {
                Error::backend(
                    "no_reply",
                    format!("run {run_id} completed without an assistant message"),
                )
            })
    }

    fn beta(&self, method: Method, path: &str) -> RequestBuilder {
        self.api
            .request(method, path)
            .header("OpenAI-Beta", "assistants=v2")
    }
}

/// Ask the API to cancel a run
async fn request_cancel(api: &ApiClient, thread_id: &str, run_id: &str) -> Result<()> {
    let request = api
        .request(Method::POST, &format!("/threads/{thread_id}/runs/{run_id}/cancel"))
        .header("OpenAI-Beta", "assistants=v2");
    api.send(request).await?;
    Ok(())
}

/// Cancels a started run if the turn is dropped before it settles
///
/// Covers the request deadline and shutdown aborting a turn mid-wait. The
/// cancel can only be spawned from `Drop`, so it is not ordered against
/// later turns.
struct PendingRun {
    api: ApiClient,
    thread_id: String,
    run_id: String,
    done: bool,
}

impl PendingRun {
    fn new(api: ApiClient, thread_id: &str, run_id: &str) -> Self {
        Self {
            api,
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
            done: false,
        }
    }

    const fn finished(&mut self) {
        self.done = true;
    }
}

impl Drop for PendingRun {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let api = self.api.clone();
        let thread_id = std::mem::take(&mut self.thread_id);
        let run_id = std::mem::take(&mut self.run_id);
        handle.spawn(async move {
            match request_cancel(&api, &thread_id, &run_id).await {
                Ok(()) => tracing::info!(%run_id, "cancelled abandoned run"),
                Err(e) => tracing::warn!(%run_id, error = %e, "failed to cancel abandoned run"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        for status in [
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Cancelled,
            RunStatus::Expired,
            RunStatus::Incomplete,
            RunStatus::RequiresAction,
        ] {
            assert!(status.is_terminal(), "{status:?}");
        }
        for status in [
            RunStatus::Queued,
            RunStatus::InProgress,
            RunStatus::Cancelling,
            RunStatus::Unknown,
        ] {
            assert!(!status.is_terminal(), "{status:?}");
        }
    }

    #[test]
    fn decodes_run_with_error() {
        let run: Run = serde_json::from_str(
            r#"{"id":"run_1","status":"failed","last_error":{"code":"rate_limit_exceeded","message":"slow down"}}"#,
        )
        .unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        let error = run.last_error.unwrap();
        assert_eq!(error.code.as_deref(), Some("rate_limit_exceeded"));
        assert_eq!(error.message, "slow down");
    }

    #[test]
    fn unknown_status_is_not_terminal() {
        let run: Run = serde_json::from_str(r#"{"id":"run_1","status":"paused"}"#).unwrap();
        assert_eq!(run.status, RunStatus::Unknown);
        assert!(!run.status.is_terminal());
    }

    #[test]
    fn decodes_mixed_message_content() {
        let list: MessageList = serde_json::from_str(
            r#"{"data":[{"role":"assistant","content":[
                {"type":"image_file","image_file":{"file_id":"f"}},
                {"type":"text","text":{"value":"hi there","annotations":[]}}
            ]}]}"#,
        )
        .unwrap();
        assert_eq!(list.data.len(), 1);
        assert!(matches!(list.data[0].content[0], MessageContent::Other));
        assert!(matches!(&list.data[0].content[1], MessageContent::Text { text } if text.value == "hi there"));
    }

    fn assistant(scope: SessionScope) -> Assistant {
        let api = ApiClient::new("http://localhost", &secrecy::SecretString::from("k".to_string()));
        Assistant::new(
            api,
            AssistantConfig {
                session_scope: scope,
                ..AssistantConfig::default()
            },
        )
    }

    #[test]
    fn global_scope_shares_one_session() {
        let assistant = assistant(SessionScope::Global);
        assert!(Arc::ptr_eq(&assistant.session("1"), &assistant.session("2")));
    }

    #[test]
    fn per_chat_scope_separates_chats() {
        let assistant = assistant(SessionScope::PerChat);
        let a = assistant.session("1");
        assert!(Arc::ptr_eq(&a, &assistant.session("1")));
        assert!(!Arc::ptr_eq(&a, &assistant.session("2")));
        assert!(a.thread_id().is_none());
    }
}
