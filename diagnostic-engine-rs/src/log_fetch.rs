// diagnostic-engine-rs/src/log_fetch.rs
//
// Task log probe: fetches logs from the workflow web UI by URL.
//
// HTML pages are reduced to the contents of their <pre> block, common
// entities are unescaped and only the tail of very long logs is kept.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, warn};

use crate::credentials::CredentialSet;
use crate::planner::ProbeArgs;
use crate::probes::{Probe, ProbeError, ProbeOutput};

/// Characters of log tail kept
pub const MAX_LOG_CHARS: usize = 50_000;

#[derive(Debug, Clone)]
pub struct HttpLogProbe {
    client: Client,
    pre_block: Regex,
    credential_scope: Option<String>,
    max_chars: usize,
}

impl HttpLogProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Http(e.to_string()))?;
        let pre_block = Regex::new(r"(?i)<pre[^>]*>([\s\S]*?)</pre>")
            .map_err(|e| ProbeError::Failed(e.to_string()))?;

        Ok(Self {
            client,
            pre_block,
            credential_scope: None,
            max_chars: MAX_LOG_CHARS,
        })
    }

    /// Send a bearer token from `scope` with every request
    pub fn with_credential_scope(mut self, scope: impl Into<String>) -> Self {
        self.credential_scope = Some(scope.into());
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Reduce a log page to plain log text
    pub fn extract_log_text(&self, body: &str) -> String {
        let content = self
            .pre_block
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map_or(body, |m| m.as_str());

        let content = content
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&")
            .replace("&quot;", "\"");

        let total = content.chars().count();
        if total <= self.max_chars {
            return content;
        }

        let tail: String = content.chars().skip(total - self.max_chars).collect();
        format!(
            "[Log truncated - showing last {} characters]\n\n{}",
            self.max_chars, tail
        )
    }
}

#[async_trait]
impl Probe for HttpLogProbe {
    fn credential_scope(&self) -> Option<&str> {
        self.credential_scope.as_deref()
    }

    async fn invoke(&self, args: &ProbeArgs, credentials: &CredentialSet) -> Result<ProbeOutput, ProbeError> {
        let log_url = match args {
            ProbeArgs::TaskLogs { log_url } => log_url,
            other => return Err(ProbeError::UnsupportedArgs(other.kind())),
        };
        if !log_url.starts_with("http") {
            return Ok(ProbeOutput::Logs(None));
        }

        let mut request = self.client.get(log_url);
        if let Some(scope) = &self.credential_scope {
            let token = credentials
                .token(scope)
                .ok_or_else(|| ProbeError::MissingCredential(scope.clone()))?;
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                ProbeError::Http(format!("Request timed out: {}", err))
            } else if err.is_connect() {
                ProbeError::Http(format!("Connection failed: {}", err))
            } else {
                ProbeError::Http(err.to_string())
            }
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!(status = status.as_u16(), url = %log_url, "Failed to fetch task logs");
            return Err(ProbeError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unexpected status").to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::Http(format!("Failed to read log body: {}", e)))?;
        let logs = self.extract_log_text(&body);
        debug!(url = %log_url, chars = logs.len(), "Fetched task logs");

        Ok(ProbeOutput::Logs(Some(logs)))
    }
}
