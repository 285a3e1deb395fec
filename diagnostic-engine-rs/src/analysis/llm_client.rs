// diagnostic-engine-rs/src/analysis/llm_client.rs
//
// HTTP client for an OpenAI-compatible chat completion API.
//
// One request per analysis, no retries: a failed call falls back to the
// basic troubleshooting summary. Status codes are classified so the caller
// can tell client-side mistakes from provider trouble.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::prompt::{truncate_chars, PromptBuilder};
use super::{AnalysisError, AnalysisProvider};
use crate::config::LlmConfig;
use crate::credentials::CredentialSet;
use crate::model::{ContextClues, DiagnosticContext};

/// Credential scope holding the API key
pub const LLM_SCOPE: &str = "llm";

const MAX_RESPONSE_CHARS: usize = 4000;
const TRUNCATED_RESPONSE_CHARS: usize = 3900;

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
    prompts: PromptBuilder,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        info!(api_url = %config.api_url, model = %config.model, "LLM client initialized");

        Ok(Self {
            client,
            config,
            prompts: PromptBuilder::new(),
        })
    }

    async fn execute_request(&self, api_key: &str, request_body: &ChatCompletionRequest) -> Result<String, AnalysisError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(request_body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AnalysisError::Network(format!("Request timed out: {}", err))
                } else if err.is_connect() {
                    AnalysisError::Network(format!("Connection failed: {}", err))
                } else {
                    AnalysisError::Network(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                400 => AnalysisError::InvalidRequest(format!("Bad request: {}", text)),
                401 => AnalysisError::InvalidRequest(format!("Unauthorized: {}", text)),
                403 => AnalysisError::InvalidRequest(format!("Forbidden: {}", text)),
                404 => AnalysisError::InvalidRequest(format!("Not found: {}", text)),
                429 => AnalysisError::RateLimited(text),
                _ => AnalysisError::Server(format!("({}): {}", status, text)),
            });
        }

        let data: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(format!("Failed to parse response: {}", e)))?;

        if let Some(usage) = &data.usage {
            debug!(total_tokens = usage.total_tokens, "LLM request completed");
        }

        data.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AnalysisError::Parse("No choices returned in response".to_string()))
    }
}

/// Trim a response to message size and stamp it
pub fn format_response(response: &str) -> String {
    let response = response.trim();
    let mut formatted = if response.chars().count() > MAX_RESPONSE_CHARS {
        format!(
            "{}\n\n*[Response truncated due to length]*",
            truncate_chars(response, TRUNCATED_RESPONSE_CHARS)
        )
    } else {
        response.to_string()
    };

    let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    formatted.push_str(&format!("\n\n---\n*Analysis generated at {} by DE-Bot*", timestamp));
    formatted
}

#[async_trait]
impl AnalysisProvider for LlmClient {
    fn name(&self) -> &str {
        "llm"
    }

    fn credential_scope(&self) -> Option<&str> {
        Some(LLM_SCOPE)
    }

    async fn analyze(
        &self,
        context: &DiagnosticContext,
        clues: &ContextClues,
        credentials: &CredentialSet,
    ) -> Result<String, AnalysisError> {
        let api_key = credentials
            .token(LLM_SCOPE)
            .ok_or_else(|| AnalysisError::MissingCredential(LLM_SCOPE.to_string()))?;

        let request_body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: self.prompts.system_prompt(context.failure.error_type).to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: self.prompts.build(context, clues),
                },
            ],
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
        };

        debug!(model = %self.config.model, error_type = %context.failure.error_type, "Requesting analysis");

        let text = self.execute_request(api_key, &request_body).await.map_err(|err| {
            warn!(error = %err, "LLM analysis request failed");
            err
        })?;

        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }

        Ok(format_response(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ErrorType, ParsedFailure};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn context() -> DiagnosticContext {
        DiagnosticContext::new(ParsedFailure {
            dag_id: "sales_dbt".to_string(),
            task_id: None,
            execution_date: None,
            error_type: ErrorType::Dbt,
            error_message: "Database Error in model dim_customers".to_string(),
            log_url: None,
            channel: String::new(),
            thread_ref: None,
            original_text: String::new(),
        })
    }

    fn client(server: &MockServer) -> LlmClient {
        LlmClient::new(LlmConfig {
            api_url: format!("{}/v1/chat/completions", server.uri()),
            model: "test-model".to_string(),
            timeout: Duration::from_secs(5),
            ..LlmConfig::default()
        })
        .unwrap()
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }],
            "usage": { "total_tokens": 42 }
        })
    }

    #[tokio::test]
    async fn returns_formatted_analysis() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "test-model", "max_tokens": 2000 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("## Root Cause Analysis\nbad join")))
            .expect(1)
            .mount(&server)
            .await;

        let credentials = CredentialSet::new().with(LLM_SCOPE, "sk-test");
        let analysis = client(&server)
            .analyze(&context(), &ContextClues::default(), &credentials)
            .await
            .unwrap();

        assert!(analysis.starts_with("## Root Cause Analysis\nbad join"));
        assert!(analysis.contains("*Analysis generated at "));
    }

    #[tokio::test]
    async fn classifies_status_codes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(1)
            .mount(&server)
            .await;

        let credentials = CredentialSet::new().with(LLM_SCOPE, "sk-test");
        let err = client(&server)
            .analyze(&context(), &ContextClues::default(), &credentials)
            .await
            .unwrap_err();
        assert_eq!(err, AnalysisError::RateLimited("slow down".to_string()));
    }

    #[tokio::test]
    async fn unauthorized_is_invalid_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let credentials = CredentialSet::new().with(LLM_SCOPE, "sk-test");
        let err = client(&server)
            .analyze(&context(), &ContextClues::default(), &credentials)
            .await
            .unwrap_err();
        assert_eq!(err, AnalysisError::InvalidRequest("Unauthorized: bad key".to_string()));
    }

    #[tokio::test]
    async fn empty_choices_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let credentials = CredentialSet::new().with(LLM_SCOPE, "sk-test");
        let err = client(&server)
            .analyze(&context(), &ContextClues::default(), &credentials)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Parse(_)));
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server)
            .analyze(&context(), &ContextClues::default(), &CredentialSet::new())
            .await
            .unwrap_err();
        assert_eq!(err, AnalysisError::MissingCredential("llm".to_string()));
    }

    #[test]
    fn long_responses_are_truncated() {
        let formatted = format_response(&"a".repeat(4500));
        assert!(formatted.starts_with(&"a".repeat(3900)));
        assert!(formatted.contains("\n\n*[Response truncated due to length]*"));
        assert!(!formatted.contains(&"a".repeat(3901)));
    }
}
