//! Best-effort archival of rendered quotes to path-addressable cloud storage.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use quotedesk_core::config::ArchiveConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;

pub const DROPBOX_CONTENT_URL: &str = "https://content.dropboxapi.com";

/// Destination of one archived quote, `{folder}/quote-{reference}.pdf`. The same reference
/// always maps to the same path, so a resubmission replaces the earlier file.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchivePath(String);

impl ArchivePath {
    pub fn for_quote(folder: &str, reference: &str) -> Self {
        Self(format!("{}/quote-{reference}.pdf", folder.trim_end_matches('/')))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveReceipt {
    pub stored_path: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("archive request failed: {0}")]
    Transport(String),
    #[error("archive provider rejected the upload with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("archive upload did not finish within {seconds}s")]
    Timeout { seconds: u64 },
}

#[async_trait]
pub trait ArchiveSink: Send + Sync {
    async fn archive(&self, pdf: &[u8], path: &ArchivePath) -> Result<ArchiveReceipt, ArchiveError>;
}

/// Dropbox `files/upload` in overwrite mode.
///
/// `select_user` acts as a team member; `root_namespace` scopes paths to a team namespace
/// through the `Dropbox-API-Path-Root` header using the `namespace_id` tag.
pub struct DropboxArchive {
    client: Client,
    access_token: SecretString,
    select_user: Option<String>,
    root_namespace: Option<String>,
    base_url: String,
    timeout: Duration,
}

impl DropboxArchive {
    /// Builds the sink, or `None` when no access token is configured.
    pub fn from_config(config: &ArchiveConfig) -> Result<Option<Self>, ArchiveError> {
        if !config.is_configured() {
            return Ok(None);
        }
        let Some(access_token) = config.access_token.clone() else {
            return Ok(None);
        };

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ArchiveError::Transport(error.to_string()))?;

        Ok(Some(Self {
            client,
            access_token,
            select_user: non_blank(config.select_user.as_deref()),
            root_namespace: non_blank(config.root_namespace.as_deref()),
            base_url: config.base_url.clone().unwrap_or_else(|| DROPBOX_CONTENT_URL.to_string()),
            timeout,
        }))
    }

    pub fn upload_request(
        &self,
        pdf: &[u8],
        path: &ArchivePath,
    ) -> Result<reqwest::Request, ArchiveError> {
        let url = format!("{}/2/files/upload", self.base_url.trim_end_matches('/'));
        let mut builder = self
            .client
            .post(url)
            .bearer_auth(self.access_token.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header("Dropbox-API-Arg", upload_arg(path))
            .body(pdf.to_vec());

        if let Some(member) = &self.select_user {
            builder = builder.header("Dropbox-API-Select-User", member.as_str());
        }
        if let Some(namespace) = &self.root_namespace {
            builder = builder.header("Dropbox-API-Path-Root", path_root(namespace));
        }

        builder.build().map_err(|error| ArchiveError::Transport(error.to_string()))
    }
}

#[async_trait]
impl ArchiveSink for DropboxArchive {
    async fn archive(&self, pdf: &[u8], path: &ArchivePath) -> Result<ArchiveReceipt, ArchiveError> {
        let request = self.upload_request(pdf, path)?;
        let response = self.client.execute(request).await.map_err(|error| {
            if error.is_timeout() {
                ArchiveError::Timeout { seconds: self.timeout.as_secs() }
            } else {
                ArchiveError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<Value> = serde_json::from_str(&body).ok();
        if !status.is_success() {
            let message = parsed
                .as_ref()
                .and_then(|value| value.get("error_summary").and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| body.trim().to_string());
            return Err(ArchiveError::Rejected { status: status.as_u16(), message });
        }

        let stored_path = parsed
            .as_ref()
            .and_then(|value| value.get("path_display").and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| path.to_string());
        Ok(ArchiveReceipt { stored_path })
    }
}

/// `Dropbox-API-Arg` value. Header values must be ASCII, so non-ASCII characters are written
/// as JSON `\u` escapes.
pub fn upload_arg(path: &ArchivePath) -> String {
    let arg = json!({
        "path": path.as_str(),
        "mode": "overwrite",
        "autorename": false,
        "mute": true,
    });
    ascii_json(&arg.to_string())
}

pub fn path_root(namespace: &str) -> String {
    ascii_json(&json!({ ".tag": "namespace_id", "namespace_id": namespace }).to_string())
}

fn ascii_json(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    let mut units = [0_u16; 2];
    for ch in text.chars() {
        if ch.is_ascii() {
            escaped.push(ch);
        } else {
            for unit in ch.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    escaped
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}
