//! Multipart uploads with progress reporting.
//!
//! The file part is streamed to the transport in fixed-size chunks; each
//! chunk handed over advances the shared `upload_progress` observable. Other
//! form fields are sent as JSON-encoded strings ahead of the file.

use std::path::Path;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use reqwest::header::{CACHE_CONTROL, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::client::SessionClient;
use crate::error::{ClientError, Result};
use crate::request::{error_message, parse_json_body};
use crate::state::StateHandle;

const CHUNK_SIZE: usize = 64 * 1024;

/// A file to attach to an upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Form field name, `file` by default.
    pub field: String,
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            field: "file".to_string(),
            file_name: file_name.into(),
            mime: None,
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, naming the part after the file.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(file_name, bytes))
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// Form fields and gate control for an upload.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Sent as JSON-encoded text parts ahead of the file.
    pub fields: Map<String, Value>,
    /// Bypass the freshness gate entirely.
    pub skip_refresh: bool,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn skip_refresh(mut self) -> Self {
        self.skip_refresh = true;
        self
    }
}

impl From<Map<String, Value>> for UploadOptions {
    fn from(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            skip_refresh: false,
        }
    }
}

impl SessionClient {
    /// Upload as user activity. See [`Self::upload_with`].
    pub async fn upload(
        &self,
        path: &str,
        file: UploadFile,
        options: impl Into<UploadOptions>,
    ) -> Result<Value> {
        self.upload_with(path, file, options, true).await
    }

    /// Upload `file` as multipart form data.
    ///
    /// The freshness gate runs unless `options.skip_refresh` is set or
    /// `record_activity` is false, as for [`Self::fetch_with`]. Progress and
    /// errors are published on the client's shared state, so concurrent
    /// uploads overwrite each other's progress.
    pub async fn upload_with(
        &self,
        path: &str,
        file: UploadFile,
        options: impl Into<UploadOptions>,
        record_activity: bool,
    ) -> Result<Value> {
        let options = options.into();
        if record_activity && !options.skip_refresh {
            self.refresher.refresh().await?;
        }

        self.state.update(|s| {
            s.upload_progress = 0;
            s.upload_error.clear();
        });

        let form = build_form(file, options.fields, &self.state)?;
        let url = self.url(path);
        let resp = self
            .http
            .post(&url)
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .multipart(form)
            .send()
            .await;
        let resp = match resp {
            Ok(resp) => resp,
            Err(e) => return Err(self.upload_failed(e.to_string())),
        };

        let status = resp.status();
        debug!("upload {} -> {}", url, status);
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => return Err(self.upload_failed(e.to_string())),
        };

        if status == StatusCode::OK {
            return parse_json_body(status.as_u16(), text.clone()).map_err(|err| {
                self.state.set_upload_error(text);
                err
            });
        }

        self.state.set_upload_error(text.clone());
        let body = serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.clone()));
        let message = error_message(status.as_u16(), &body, &text);
        Err(ClientError::upload_http(status.as_u16(), body, message))
    }

    fn upload_failed(&self, message: String) -> ClientError {
        warn!("Upload failed: {message}");
        self.state.set_upload_error(message.clone());
        ClientError::upload_transport(message)
    }
}

fn build_form(file: UploadFile, fields: Map<String, Value>, state: &StateHandle) -> Result<Form> {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name, value.to_string());
    }

    let total = file.bytes.len() as u64;
    let body = reqwest::Body::wrap_stream(progress_stream(file.bytes, state.clone()));
    let mut part = Part::stream_with_length(body, total).file_name(file.file_name);
    if let Some(mime) = &file.mime {
        part = part
            .mime_str(mime)
            .map_err(|e| ClientError::upload_transport(format!("invalid mime type {mime:?}: {e}")))?;
    }
    Ok(form.part(file.field, part))
}

/// Chunks of `bytes` that report cumulative progress as they are consumed.
fn progress_stream(
    bytes: Bytes,
    state: StateHandle,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static {
    let total = bytes.len();
    let chunks: Vec<Bytes> = if total == 0 {
        vec![Bytes::new()]
    } else {
        (0..total)
            .step_by(CHUNK_SIZE)
            .map(|start| bytes.slice(start..(start + CHUNK_SIZE).min(total)))
            .collect()
    };

    let mut loaded = 0usize;
    futures::stream::iter(chunks).map(move |chunk| {
        loaded += chunk.len();
        state.set_upload_progress(percent(loaded as u64, total as u64));
        Ok(chunk)
    })
}

/// `loaded / total * 100`, rounded. An empty payload is complete.
pub(crate) fn percent(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((loaded as f64 / total as f64) * 100.0).round().min(100.0) as u8
}
