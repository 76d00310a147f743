//! Gemini implementation of [`ChatBackend`] / [`ChatSession`].
//!
//! Talks to the Generative Language REST API
//! (`POST {base_url}/v1beta/models/{model}:generateContent`).  The service is
//! stateless, so [`GeminiSession`] keeps the running conversation itself and
//! resends it with every turn, together with the system instruction.
//! All connection details come from [`ChatConfig`]; nothing is hardcoded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::llm::session::{ChatBackend, ChatSession, LlmError};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Part {
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

impl Content {
    fn user(text: &str) -> Self {
        Self {
            role: "user".into(),
            parts: vec![Part { text: text.into() }],
        }
    }

    fn model(text: &str) -> Self {
        Self {
            role: "model".into(),
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: [PartRef<'a>; 1],
}

#[derive(Debug, Serialize)]
struct PartRef<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: SystemInstruction<'a>,
    contents: &'a [Content],
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// `{"error": {"code": 400, "message": "...", "status": "INVALID_ARGUMENT"}}`
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ---------------------------------------------------------------------------
// GeminiBackend
// ---------------------------------------------------------------------------

/// Creates [`GeminiSession`]s that share one HTTP connection pool.
pub struct GeminiBackend {
    client: reqwest::Client,
    config: ChatConfig,
}

impl GeminiBackend {
    /// Build a backend from application config.
    ///
    /// The HTTP client is pre-configured with the per-request timeout from
    /// `config.timeout_secs`.  A missing API key is not an error here; it is
    /// reported by [`ChatBackend::start_session`].
    pub fn from_config(config: &ChatConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }
}

impl ChatBackend for GeminiBackend {
    fn start_session(
        &self,
        model: &str,
        system_instruction: &str,
    ) -> Result<Box<dyn ChatSession>, LlmError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                LlmError::NotInitialized("Gemini API key is not set (GEMINI_API_KEY)".into())
            })?;

        log::info!("chat: starting Gemini session with model {model}");

        Ok(Box::new(GeminiSession {
            client: self.client.clone(),
            base_url: self.config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            system_instruction: system_instruction.to_string(),
            history: Vec::new(),
        }))
    }
}

// ---------------------------------------------------------------------------
// GeminiSession
// ---------------------------------------------------------------------------

/// One Gemini conversation: model, persona and the turns exchanged so far.
pub struct GeminiSession {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    system_instruction: String,
    history: Vec<Content>,
}

impl GeminiSession {
    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl ChatSession for GeminiSession {
    async fn send(&mut self, text: &str) -> Result<String, LlmError> {
        let mut contents = self.history.clone();
        contents.push(Content::user(text));

        let body = GenerateRequest {
            system_instruction: SystemInstruction {
                parts: [PartRef {
                    text: &self.system_instruction,
                }],
            },
            contents: &contents,
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&raw)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| {
                    if raw.trim().is_empty() {
                        status.canonical_reason().unwrap_or("unknown error").to_string()
                    } else {
                        raw
                    }
                });
            log::warn!("chat: Gemini returned {status}: {message}");
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let reply: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        let reply = reply.trim().to_string();
        if reply.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        // Only a completed exchange becomes part of the context.
        self.history.push(Content::user(text));
        self.history.push(Content::model(&reply));

        Ok(reply)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
