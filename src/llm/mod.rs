//! Hosted LLM completion client with total failure containment.
//!
//! `complete` never returns an error and never panics: any provider failure
//! is folded into a sentinel string carrying the `[LLM ERROR]` prefix, so a
//! calling workflow is never interrupted by a flaky model endpoint.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrafficRagError};

/// Model used when a call does not name one.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Environment variable `from_env` reads the API credential from.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Prefix carried by every contained-error result.
pub const ERROR_PREFIX: &str = "[LLM ERROR]";

/// Fixed sentinel returned when the provider yields no usable text.
pub const NO_TEXT_SENTINEL: &str = "[LLM returned no text response]";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Client for a hosted generative model.
///
/// The API credential is an explicit constructor input — there is no
/// process-global configuration, so differently-configured clients can
/// coexist (and tests can point one at a dead endpoint).
///
/// # Panics
///
/// Construction panics if the HTTP client cannot be built (should not happen
/// in normal operation).
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl LlmClient {
    /// Create a client with an explicit API credential.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a client from the `GEMINI_API_KEY` environment variable
    /// (loading `.env` first if present).
    ///
    /// Fails fast with `Config` when the variable is absent: crashing at
    /// startup beats failing mid-request.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv::dotenv();
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| {
            TrafficRagError::Config(format!(
                "{} is not set. Add it to a .env file or your environment variables.",
                API_KEY_ENV
            ))
        })?;
        Ok(Self::new(api_key))
    }

    /// Point the client at a different provider host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Send a prompt to the hosted model and return the response text,
    /// trimmed.
    ///
    /// `system_instruction` optionally scopes the model's behavior for this
    /// call; `model` overrides the client default. Returns
    /// [`NO_TEXT_SENTINEL`] when the provider answers without usable text,
    /// and `"[LLM ERROR] ..."` when the call fails for any reason — the
    /// caller always gets a `String`, distinguishable only by prefix (see
    /// [`is_error_response`]).
    pub async fn complete(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
        model: Option<&str>,
    ) -> String {
        match self.generate(prompt, system_instruction, model).await {
            Ok(Some(text)) => text,
            Ok(None) => NO_TEXT_SENTINEL.to_string(),
            Err(e) => {
                log::warn!("LLM call failed: {}", e);
                format!("{} {}", ERROR_PREFIX, e)
            }
        }
    }

    /// One `generateContent` round-trip. `Ok(None)` means the provider
    /// replied without any text parts.
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
        model: Option<&str>,
    ) -> Result<Option<String>> {
        let model = model.unwrap_or(&self.default_model);
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let request = GenerateContentRequest {
            contents: vec![ContentPayload {
                parts: vec![TextPart { text: prompt }],
            }],
            system_instruction: system_instruction.map(|text| ContentPayload {
                parts: vec![TextPart { text }],
            }),
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TrafficRagError::Llm(format!("network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            return Err(TrafficRagError::Llm(format!(
                "provider returned {}: {}",
                status, body
            )));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| TrafficRagError::Llm(format!("malformed response: {}", e)))?;

        Ok(extract_text(body))
    }
}

/// True when `response` is a contained-error sentinel rather than model text.
pub fn is_error_response(response: &str) -> bool {
    response.starts_with(ERROR_PREFIX)
}

/// Concatenate the text parts of the first candidate; None when there are
/// none or they are blank.
fn extract_text(body: GenerateContentResponse) -> Option<String> {
    let candidate = body.candidates.into_iter().next()?;
    let parts = candidate.content?.parts;
    let text = parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<ContentPayload<'a>>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ContentPayload<'a>>,
}

#[derive(Serialize)]
struct ContentPayload<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}
