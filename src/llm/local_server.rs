use serde::{Deserialize, Serialize};

use super::backend::{GenerationOptions, read_json_body};
use super::error::BackendError;

/// Client for a locally running Ollama server.
#[derive(Debug, Clone)]
pub struct LocalServer {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: ModelOptions,
}

#[derive(Serialize)]
struct ModelOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl LocalServer {
    pub fn new(base_url: &str, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Checks `/api/tags`; a refused connection means the server is not running.
    pub async fn health_check(&self) -> Result<(), BackendError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(e, &self.base_url))?;

        if !response.status().is_success() {
            return Err(BackendError::Unavailable(format!(
                "model server at {} answered HTTP {}",
                self.base_url,
                response.status().as_u16()
            )));
        }
        Ok(())
    }

    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: ModelOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::from_transport(e, &self.base_url))?;

        // Ollama answers 404 when the model has not been pulled
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BackendError::Unavailable(format!(
                "model '{}' is not available on {}",
                self.model, self.base_url
            )));
        }

        let body = read_json_body(response).await?;
        let parsed: GenerateResponse = serde_json::from_value(body)
            .map_err(|e| BackendError::MalformedBody(format!("missing `response` field: {e}")))?;
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn options() -> GenerationOptions {
        GenerationOptions {
            temperature: 0.2,
            max_tokens: 64,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn generate_posts_native_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama2",
                "prompt": "hello",
                "stream": false,
                "options": { "num_predict": 64 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama2",
                "response": "Q: Hi?|A: Hello.",
                "done": true
            })))
            .mount(&server)
            .await;

        let backend = LocalServer::new(&format!("{}/", server.uri()), "llama2");
        let text = backend.generate("hello", &options()).await.unwrap();
        assert_eq!(text, "Q: Hi?|A: Hello.");
    }

    #[tokio::test]
    async fn missing_model_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": "model 'nope' not found"
            })))
            .mount(&server)
            .await;

        let backend = LocalServer::new(&server.uri(), "nope");
        let err = backend.generate("hello", &options()).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn server_error_is_recoverable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let backend = LocalServer::new(&server.uri(), "llama2");
        let err = backend.generate("hello", &options()).await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn health_check_passes_when_tags_respond() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": []
            })))
            .mount(&server)
            .await;

        let backend = LocalServer::new(&server.uri(), "llama2");
        backend.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend = LocalServer::new(&format!("http://{addr}"), "llama2");
        let err = backend.health_check().await.unwrap_err();
        assert!(err.is_fatal(), "unexpected error: {err}");
    }
}
