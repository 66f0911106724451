//! Client for the remote video-indexing service (TwelveLabs tasks API).

use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::config::IndexingConfig;

pub type IndexingResult<T> = Result<T, IndexingError>;

#[derive(Debug, Error)]
pub enum IndexingError {
    #[error("Indexing service not configured (TWELVELABS_API_KEY / TWELVELABS_INDEX_ID)")]
    NotConfigured,

    #[error("Indexing API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Indexing failed with status {0}")]
    TaskFailed(TaskStatus),

    #[error("Indexing timed out after {0} seconds")]
    TimedOut(u64),

    #[error("Indexing cancelled by shutdown")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote task state. Unknown values are kept verbatim and treated as in-flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    Validating,
    Queued,
    Indexing,
    Ready,
    Failed,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Validating => "validating",
            TaskStatus::Queued => "queued",
            TaskStatus::Indexing => "indexing",
            TaskStatus::Ready => "ready",
            TaskStatus::Failed => "failed",
            TaskStatus::Other(s) => s,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Ready | TaskStatus::Failed)
    }
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "pending" => TaskStatus::Pending,
            "validating" => TaskStatus::Validating,
            "queued" => TaskStatus::Queued,
            "indexing" => TaskStatus::Indexing,
            "ready" => TaskStatus::Ready,
            "failed" => TaskStatus::Failed,
            _ => TaskStatus::Other(value),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(value: TaskStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IndexingTask {
    #[serde(rename = "_id")]
    pub id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateTaskResponse {
    #[serde(rename = "_id")]
    id: String,
}

/// Task-creation and task-status operations of the indexing service
#[async_trait]
pub trait IndexingClient: Send + Sync {
    /// Uploads the file and returns the remote task id
    async fn create_task(&self, path: &Path) -> IndexingResult<String>;

    async fn task_status(&self, task_id: &str) -> IndexingResult<IndexingTask>;
}

pub struct TwelveLabsClient {
    http: Client,
    base_url: String,
    api_key: String,
    index_id: String,
}

impl TwelveLabsClient {
    pub fn new(config: &IndexingConfig) -> IndexingResult<Self> {
        let (Some(api_key), Some(index_id)) = (&config.api_key, &config.index_id) else {
            return Err(IndexingError::NotConfigured);
        };
        if !config.is_configured() {
            return Err(IndexingError::NotConfigured);
        }

        // No overall timeout: uploads of long videos can take a while
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.clone(),
            index_id: index_id.clone(),
        })
    }

    async fn error_for_status(response: reqwest::Response) -> IndexingResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(IndexingError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl IndexingClient for TwelveLabsClient {
    async fn create_task(&self, path: &Path) -> IndexingResult<String> {
        let url = format!("{}/tasks", self.base_url);
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(ReaderStream::new(file)), len)
            .file_name(file_name);
        let form = Form::new()
            .text("index_id", self.index_id.clone())
            .part("video_file", part);

        debug!("Creating indexing task for {} ({} bytes)", path.display(), len);

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await?;
        let response = Self::error_for_status(response).await?;

        let created: CreateTaskResponse = response
            .json()
            .await
            .map_err(|e| IndexingError::InvalidResponse(e.to_string()))?;
        Ok(created.id)
    }

    async fn task_status(&self, task_id: &str) -> IndexingResult<IndexingTask> {
        let url = format!("{}/tasks/{}", self.base_url, task_id);

        let response = self
            .http
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await?;
        let response = Self::error_for_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| IndexingError::InvalidResponse(e.to_string()))
    }
}

/// Resolves once the shutdown flag turns true. Never resolves if the sender is gone.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if *shutdown.borrow() {
        return;
    }
    while shutdown.changed().await.is_ok() {
        if *shutdown.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await
}

/// Polls `task_id` every `interval` until it reaches a terminal status.
/// Bounded by `timeout`, and aborted when shutdown is requested.
pub async fn wait_for_done(
    client: &dyn IndexingClient,
    task_id: &str,
    interval: Duration,
    timeout: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> IndexingResult<IndexingTask> {
    let poll = async {
        loop {
            let task = client.task_status(task_id).await?;
            info!("Task {} status: {}", task_id, task.status);
            if task.status.is_terminal() {
                return Ok(task);
            }
            tokio::time::sleep(interval).await;
        }
    };

    tokio::select! {
        result = tokio::time::timeout(timeout, poll) => {
            result.map_err(|_| IndexingError::TimedOut(timeout.as_secs()))?
        }
        _ = shutdown_requested(shutdown) => Err(IndexingError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct ScriptedClient {
        statuses: Mutex<VecDeque<TaskStatus>>,
    }

    impl ScriptedClient {
        fn new(statuses: Vec<TaskStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
            }
        }
    }

    #[async_trait]
    impl IndexingClient for ScriptedClient {
        async fn create_task(&self, _path: &Path) -> IndexingResult<String> {
            Ok("task-1".to_string())
        }

        async fn task_status(&self, task_id: &str) -> IndexingResult<IndexingTask> {
            let mut statuses = self.statuses.lock().unwrap();
            // Repeat the last status forever once the script runs out
            let status = if statuses.len() > 1 {
                statuses.pop_front().unwrap()
            } else {
                statuses.front().cloned().unwrap()
            };
            let video_id = (status == TaskStatus::Ready).then(|| "video-1".to_string());
            Ok(IndexingTask {
                id: task_id.to_string(),
                status,
                video_id,
            })
        }
    }

    fn configured(base_url: &str) -> IndexingConfig {
        IndexingConfig {
            api_key: Some("test-key".to_string()),
            index_id: Some("index-1".to_string()),
            base_url: base_url.to_string(),
            ..IndexingConfig::default()
        }
    }

    #[test]
    fn test_task_status_parsing() {
        assert_eq!(TaskStatus::from("ready".to_string()), TaskStatus::Ready);
        assert_eq!(TaskStatus::from("FAILED".to_string()), TaskStatus::Failed);
        assert_eq!(TaskStatus::from("indexing".to_string()), TaskStatus::Indexing);
        assert_eq!(
            TaskStatus::from("uploading".to_string()),
            TaskStatus::Other("uploading".to_string())
        );
        assert!(TaskStatus::Ready.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Other("uploading".to_string()).is_terminal());
    }

    #[test]
    fn test_client_requires_credentials() {
        assert!(matches!(
            TwelveLabsClient::new(&IndexingConfig::default()),
            Err(IndexingError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_wait_for_done_returns_terminal_task() {
        let client = ScriptedClient::new(vec![
            TaskStatus::Pending,
            TaskStatus::Indexing,
            TaskStatus::Ready,
        ]);
        let (_tx, mut rx) = watch::channel(false);

        let task = wait_for_done(
            &client,
            "task-1",
            Duration::from_millis(1),
            Duration::from_secs(5),
            &mut rx,
        )
        .await
        .unwrap();

        assert_eq!(task.status, TaskStatus::Ready);
        assert_eq!(task.video_id.as_deref(), Some("video-1"));
    }

    #[tokio::test]
    async fn test_wait_for_done_times_out() {
        let client = ScriptedClient::new(vec![TaskStatus::Indexing]);
        let (_tx, mut rx) = watch::channel(false);

        let err = wait_for_done(
            &client,
            "task-1",
            Duration::from_millis(5),
            Duration::from_millis(50),
            &mut rx,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, IndexingError::TimedOut(_)));
    }

    #[tokio::test]
    async fn test_wait_for_done_observes_shutdown() {
        let client = ScriptedClient::new(vec![TaskStatus::Queued]);
        let (tx, mut rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            wait_for_done(
                &client,
                "task-1",
                Duration::from_millis(5),
                Duration::from_secs(60),
                &mut rx,
            )
            .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, IndexingError::Cancelled));
    }

    #[tokio::test]
    async fn test_create_task_posts_multipart_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tasks"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "_id": "task-42",
                "video_id": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("clip.mp4");
        std::fs::write(&file, b"fake video bytes").unwrap();

        let client = TwelveLabsClient::new(&configured(&server.uri())).unwrap();
        let task_id = client.create_task(&file).await.unwrap();
        assert_eq!(task_id, "task-42");
    }

    #[tokio::test]
    async fn test_task_status_and_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks/task-42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "_id": "task-42",
                "status": "ready",
                "video_id": "video-99"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tasks/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("task not found"))
            .mount(&server)
            .await;

        let client = TwelveLabsClient::new(&configured(&server.uri())).unwrap();

        let task = client.task_status("task-42").await.unwrap();
        assert_eq!(task.status, TaskStatus::Ready);
        assert_eq!(task.video_id.as_deref(), Some("video-99"));

        match client.task_status("missing").await.unwrap_err() {
            IndexingError::Api { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "task not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
