use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::path::Path;
use tether_api_client::UploadFile;
use tether_api_client::tether_runtime_config::ClientConfig;

use crate::session::{build_client, login};

/// `tether upload`: log in, then upload `file` to `path` with a progress line.
pub async fn run_upload(
    config: ClientConfig,
    email: String,
    password: String,
    path: &str,
    file: &Path,
    fields: &[String],
) -> Result<()> {
    if !file.exists() {
        bail!("File not found: {}", file.display());
    }
    let fields = parse_fields(fields)?;
    let upload = UploadFile::from_path(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let client = build_client(config)?;
    login(&client, email, password).await?;

    let mut changes = client.subscribe();
    let progress = tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let percent = changes.borrow_and_update().upload_progress;
            eprint!("\rUploading... {percent:>3}%");
        }
    });

    println!("Uploading {} ({} bytes)...", upload.file_name, upload.bytes.len());
    let result = client.upload(path, upload, fields).await;
    progress.abort();
    eprintln!();

    let response = result.context("Upload failed")?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Parse `key=value` pairs. Values that are valid JSON keep their type;
/// anything else is sent as a string.
fn parse_fields(raw: &[String]) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid field {pair:?}: expected key=value");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid field {pair:?}: empty key");
        }
        let value =
            serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}
