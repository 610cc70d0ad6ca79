use crate::contracts::{
    map_queue, CommandAck, ConfigSnapshot, DayCommand, QueueItem, StatusPayload, StatusReport,
};
use chrono::Utc;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOperation {
    Status,
    Config,
    Queue,
    Command(DayCommand),
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteOperation::Status => f.write_str("status"),
            RemoteOperation::Config => f.write_str("config"),
            RemoteOperation::Queue => f.write_str("queue"),
            RemoteOperation::Command(command) => write!(f, "command {command}"),
        }
    }
}

/// The only failure the core ever sees from the bridge: the call did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{operation} request did not succeed")]
pub struct RemoteFailure {
    pub operation: RemoteOperation,
}

impl RemoteFailure {
    pub fn new(operation: RemoteOperation) -> Self {
        Self { operation }
    }

    pub fn command(command: DayCommand) -> Self {
        Self::new(RemoteOperation::Command(command))
    }
}

/// Underlying cause, kept for tracing before it is collapsed into [`RemoteFailure`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("http client setup failed: {0}")]
    Setup(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("bridge responded with status {0}")]
    Protocol(u16),
    #[error("malformed payload: {0}")]
    Payload(String),
}

impl RemoteError {
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteError::Setup(_) => "setup",
            RemoteError::Transport(_) => "transport",
            RemoteError::Protocol(_) => "protocol",
            RemoteError::Payload(_) => "payload",
        }
    }
}

/// The four bridge operations. Each is a single round trip with no retry.
pub trait BridgeApi: Send + Sync + 'static {
    fn fetch_status(&self) -> impl Future<Output = Result<StatusReport, RemoteFailure>> + Send;

    fn fetch_config(&self) -> impl Future<Output = Result<ConfigSnapshot, RemoteFailure>> + Send;

    fn fetch_queue(&self) -> impl Future<Output = Result<Vec<QueueItem>, RemoteFailure>> + Send;

    fn submit_command(
        &self,
        command: DayCommand,
    ) -> impl Future<Output = Result<CommandAck, RemoteFailure>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpBridge {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBridge {
    pub fn new(base_url: &str, request_timeout: Option<Duration>) -> Result<Self, RemoteError> {
        let mut builder = reqwest::Client::builder().pool_max_idle_per_host(0);
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| RemoteError::Setup(err.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json(&self, path: &str) -> Result<Value, RemoteError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        read_json(response).await
    }

    async fn post_json(&self, path: &str) -> Result<Value, RemoteError> {
        let response = self
            .client
            .post(self.url(path))
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        read_json(response).await
    }

    async fn load_status(&self) -> Result<StatusReport, RemoteError> {
        let body = expect_object(self.get_json("/status").await?)?;
        let payload: StatusPayload =
            serde_json::from_value(body).map_err(|err| RemoteError::Payload(err.to_string()))?;
        Ok(payload.into_report())
    }

    async fn load_config(&self) -> Result<ConfigSnapshot, RemoteError> {
        let body = self.get_json("/get-config").await?;
        ConfigSnapshot::from_value(body).map_err(RemoteError::Payload)
    }

    async fn load_queue(&self) -> Result<Vec<QueueItem>, RemoteError> {
        let body = self.get_json("/queue").await?;
        map_queue(body, Utc::now()).map_err(RemoteError::Payload)
    }

    async fn post_command(&self, command: DayCommand) -> Result<CommandAck, RemoteError> {
        let body = expect_object(self.post_json(command.path()).await?)?;
        serde_json::from_value(body).map_err(|err| RemoteError::Payload(err.to_string()))
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, RemoteError> {
    let status = response.status();
    if !status.is_success() {
        return Err(RemoteError::Protocol(status.as_u16()));
    }
    let body = response
        .bytes()
        .await
        .map_err(|err| RemoteError::Transport(err.to_string()))?;
    serde_json::from_slice(&body).map_err(|err| RemoteError::Payload(err.to_string()))
}

fn expect_object(body: Value) -> Result<Value, RemoteError> {
    if body.is_object() {
        Ok(body)
    } else {
        Err(RemoteError::Payload("expected a json object".to_string()))
    }
}

fn collapse<T>(operation: RemoteOperation, result: Result<T, RemoteError>) -> Result<T, RemoteFailure> {
    match result {
        Ok(value) => {
            debug!(event = "bridge_call_ok", operation = %operation);
            Ok(value)
        }
        Err(err) => {
            warn!(
                event = "bridge_call_failed",
                operation = %operation,
                kind = err.kind(),
                error = %err
            );
            Err(RemoteFailure::new(operation))
        }
    }
}

impl BridgeApi for HttpBridge {
    async fn fetch_status(&self) -> Result<StatusReport, RemoteFailure> {
        collapse(RemoteOperation::Status, self.load_status().await)
    }

    async fn fetch_config(&self) -> Result<ConfigSnapshot, RemoteFailure> {
        collapse(RemoteOperation::Config, self.load_config().await)
    }

    async fn fetch_queue(&self) -> Result<Vec<QueueItem>, RemoteFailure> {
        collapse(RemoteOperation::Queue, self.load_queue().await)
    }

    async fn submit_command(&self, command: DayCommand) -> Result<CommandAck, RemoteFailure> {
        collapse(
            RemoteOperation::Command(command),
            self.post_command(command).await,
        )
    }
}
