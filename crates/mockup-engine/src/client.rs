use std::env;

use mockup_contracts::generation::GenerationFailure;
use mockup_contracts::settings::Credential;
use reqwest::blocking::Client as HttpClient;
use serde_json::Value;

use crate::request::GenerationRequest;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.0-flash-preview-image-generation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_base: String,
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
        }
    }
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(api_base) = non_empty_env("GEMINI_API_BASE") {
            config.api_base = api_base;
        }
        if let Some(model) = non_empty_env("MOCKUP_IMAGE_MODEL") {
            config.model = model;
        }
        config
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model.trim().to_string();
        }
        self
    }

    pub fn endpoint(&self) -> String {
        let base = self.api_base.trim().trim_end_matches('/');
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{base}/{model_path}:generateContent")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

// Implementations must not retry; every call is billed.
pub trait GenerationTransport: Send + Sync {
    fn send(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<RawResponse, GenerationFailure>;
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }
}

impl GenerationTransport for GeminiClient {
    fn send(
        &self,
        request: &GenerationRequest,
        credential: &Credential,
    ) -> Result<RawResponse, GenerationFailure> {
        let endpoint = self.config.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", credential.key_value())])
            .json(&request.payload())
            .send()
            .map_err(|err| {
                GenerationFailure::transport(format!(
                    "Gemini request failed ({endpoint}): {}",
                    err.without_url()
                ))
            })?;

        let status = response.status();
        let code = status.as_u16();
        let body = response.text().map_err(|err| {
            GenerationFailure::transport(format!(
                "Gemini response body read failed: {}",
                err.without_url()
            ))
        })?;
        if !status.is_success() {
            let message = provider_error_message(&body).unwrap_or_else(|| {
                let reason = status.canonical_reason().unwrap_or("error");
                let detail = truncate_text(body.trim(), 512);
                if detail.is_empty() {
                    format!("Gemini request failed ({code} {reason})")
                } else {
                    format!("Gemini request failed ({code} {reason}): {detail}")
                }
            });
            return Err(GenerationFailure::network(code, message));
        }
        Ok(RawResponse { status: code, body })
    }
}

fn provider_error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .get("error")
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use httpmock::{Method::POST, MockServer};
    use mockup_contracts::generation::{EncodedImage, ErrorKind};
    use mockup_contracts::settings::{CredentialStore, MemoryStorage};
    use serde_json::json;

    use super::*;
    use crate::request::{build_request, GenerationOptions};

    fn credential(key: &str) -> anyhow::Result<Credential> {
        let (mut store, _) = CredentialStore::load(MemoryStorage::new());
        store.set(key);
        store
            .get()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("credential missing"))
    }

    fn sample_request() -> anyhow::Result<GenerationRequest> {
        let image = EncodedImage {
            media_type: "image/png".to_string(),
            data: "AAAA".to_string(),
        };
        Ok(build_request(
            "sticker on a skateboard",
            &image,
            &GenerationOptions::default(),
        )?)
    }

    fn client_for(server: &MockServer) -> GeminiClient {
        GeminiClient::new(GeminiConfig {
            api_base: server.url("/v1beta"),
            model: "test-image-model".to_string(),
        })
    }

    #[test]
    fn endpoint_prefixes_models_path() {
        let config = GeminiConfig {
            api_base: "https://example.test/v1beta/".to_string(),
            model: "gemini-x".to_string(),
        };
        assert_eq!(
            config.endpoint(),
            "https://example.test/v1beta/models/gemini-x:generateContent"
        );
        let prefixed = config.with_model("models/gemini-y");
        assert_eq!(
            prefixed.endpoint(),
            "https://example.test/v1beta/models/gemini-y:generateContent"
        );
    }

    #[test]
    fn with_model_ignores_blank_override() {
        let config = GeminiConfig::default().with_model("  ");
        assert_eq!(config.model, DEFAULT_IMAGE_MODEL);
    }

    #[test]
    fn posts_payload_with_key_query_param() -> anyhow::Result<()> {
        let server = MockServer::start();
        let request = sample_request()?;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1beta/models/test-image-model:generateContent")
                .query_param("key", "abc")
                .header("content-type", "application/json")
                .json_body(request.payload());
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"candidates":[]}"#);
        });

        let raw = client_for(&server).send(&request, &credential("abc")?)?;
        mock.assert();
        assert_eq!(raw.status, 200);
        assert_eq!(raw.body, r#"{"candidates":[]}"#);
        Ok(())
    }

    #[test]
    fn quota_error_surfaces_provider_message() -> anyhow::Result<()> {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(429)
                .header("content-type", "application/json")
                .json_body(json!({"error": {"message": "quota exceeded"}}));
        });

        let failure = client_for(&server)
            .send(&sample_request()?, &credential("abc")?)
            .err();
        assert_eq!(
            failure,
            Some(GenerationFailure::network(429, "quota exceeded"))
        );
        Ok(())
    }

    #[test]
    fn error_without_provider_message_uses_status_line() -> anyhow::Result<()> {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(503).body("upstream unavailable");
        });

        let failure = client_for(&server)
            .send(&sample_request()?, &credential("abc")?)
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected failure"))?;
        assert_eq!(failure.kind, ErrorKind::Network);
        assert_eq!(failure.status, Some(503));
        assert!(failure.message.contains("503"));
        assert!(failure.message.contains("upstream unavailable"));
        Ok(())
    }

    #[test]
    fn unreachable_host_is_transport_error_without_key() -> anyhow::Result<()> {
        let client = GeminiClient::new(GeminiConfig {
            api_base: "http://127.0.0.1:1/v1beta".to_string(),
            model: "test-image-model".to_string(),
        });
        let failure = client
            .send(&sample_request()?, &credential("secret-key-value")?)
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected failure"))?;
        assert_eq!(failure.kind, ErrorKind::Transport);
        assert_eq!(failure.status, None);
        assert!(!failure.message.contains("secret-key-value"));
        Ok(())
    }

    #[test]
    fn provider_error_message_requires_non_empty_text() {
        assert_eq!(
            provider_error_message(r#"{"error":{"message":"  bad key "}}"#).as_deref(),
            Some("bad key")
        );
        assert_eq!(provider_error_message(r#"{"error":{"message":""}}"#), None);
        assert_eq!(provider_error_message("<html>"), None);
    }
}
