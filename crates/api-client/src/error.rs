use serde_json::Value;

/// Which step of a request produced a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// HTTP 504; the message is the raw response text.
    GatewayTimeout,
    /// Any other non-2xx response.
    Http,
    /// The upload transport failed before a response arrived.
    UploadTransport,
    /// The upload completed with a status other than 200.
    UploadHttp,
    /// The refresh endpoint rejected the session.
    Refresh,
    /// The request could not be sent or its response could not be read.
    Transport,
    /// A body could not be encoded to or decoded from JSON.
    Json,
}

/// Uniform error for every client path.
///
/// Cloneable because a single refresh outcome is handed to every caller that
/// was waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ClientError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub body: Value,
    pub message: String,
}

impl ClientError {
    pub fn gateway_timeout(text: String) -> Self {
        Self {
            kind: ErrorKind::GatewayTimeout,
            status: Some(504),
            body: Value::String(text.clone()),
            message: text,
        }
    }

    pub fn http(status: u16, body: Value, message: String) -> Self {
        Self {
            kind: ErrorKind::Http,
            status: Some(status),
            body,
            message,
        }
    }

    pub fn transport(err: &reqwest::Error) -> Self {
        Self {
            kind: ErrorKind::Transport,
            status: err.status().map(|s| s.as_u16()),
            body: Value::Null,
            message: err.to_string(),
        }
    }

    pub fn json_decode(status: u16, text: String, err: &serde_json::Error) -> Self {
        Self {
            kind: ErrorKind::Json,
            status: Some(status),
            message: format!("invalid JSON in {status} response: {err}"),
            body: Value::String(text),
        }
    }

    pub fn json_encode(err: &serde_json::Error) -> Self {
        Self {
            kind: ErrorKind::Json,
            status: None,
            body: Value::Null,
            message: format!("failed to encode request body: {err}"),
        }
    }

    pub fn upload_transport(message: String) -> Self {
        Self {
            kind: ErrorKind::UploadTransport,
            status: None,
            body: Value::Null,
            message,
        }
    }

    pub fn upload_http(status: u16, body: Value, message: String) -> Self {
        Self {
            kind: ErrorKind::UploadHttp,
            status: Some(status),
            body,
            message,
        }
    }

    /// The detached refresh task panicked or was cancelled.
    pub fn refresh_task(err: &tokio::task::JoinError) -> Self {
        Self {
            kind: ErrorKind::Refresh,
            status: None,
            body: Value::Null,
            message: format!("refresh task failed: {err}"),
        }
    }

    /// Re-tag an error that came back from the refresh endpoint.
    pub fn into_refresh(self) -> Self {
        Self {
            kind: ErrorKind::Refresh,
            ..self
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
