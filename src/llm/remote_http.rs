use serde::Serialize;
use serde_json::Value;

use super::backend::{GenerationOptions, read_json_body};
use super::error::BackendError;

// Field names used by common completion servers for the generated text.
const TEXT_FIELDS: [&str; 4] = ["response", "text", "generated_text", "output"];

/// Generic JSON-over-HTTP completion endpoint.
#[derive(Debug, Clone)]
pub struct RemoteHttp {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
    temperature: f64,
}

impl RemoteHttp {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        let request = CompletionRequest {
            prompt,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::from_transport(e, &self.url))?;

        let body = read_json_body(response).await?;
        extract_text(&body).ok_or_else(|| {
            BackendError::MalformedBody(format!(
                "no text field ({}) in response",
                TEXT_FIELDS.join(", ")
            ))
        })
    }
}

fn extract_text(body: &Value) -> Option<String> {
    if let Some(text) = TEXT_FIELDS
        .iter()
        .find_map(|field| body.get(*field).and_then(Value::as_str))
    {
        return Some(text.to_string());
    }

    // [{"generated_text": ...}] and {"choices": [{"text": ...}]}
    let first = match body {
        Value::Array(items) => items.first(),
        _ => body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first()),
    }?;
    TEXT_FIELDS
        .iter()
        .find_map(|field| first.get(*field).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn options() -> GenerationOptions {
        GenerationOptions {
            temperature: 0.7,
            max_tokens: 1024,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn posts_prompt_body_and_reads_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(json!({
                "prompt": "make cards",
                "max_tokens": 1024,
                "temperature": 0.7
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "text": "Q: A?|A: B."
            })))
            .mount(&server)
            .await;

        let backend = RemoteHttp::new(format!("{}/generate", server.uri()), Some("secret".into()));
        let text = backend.generate("make cards", &options()).await.unwrap();
        assert_eq!(text, "Q: A?|A: B.");
    }

    #[tokio::test]
    async fn non_success_status_is_recoverable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let backend = RemoteHttp::new(server.uri(), None);
        let err = backend.generate("p", &options()).await.unwrap_err();
        assert!(!err.is_fatal());
        match err {
            BackendError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_recoverable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let backend = RemoteHttp::new(server.uri(), None);
        let err = backend.generate("p", &options()).await.unwrap_err();
        assert!(matches!(err, BackendError::MalformedBody(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn json_without_text_field_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tokens": 12 })))
            .mount(&server)
            .await;

        let backend = RemoteHttp::new(server.uri(), None);
        let err = backend.generate("p", &options()).await.unwrap_err();
        assert!(matches!(err, BackendError::MalformedBody(_)));
    }

    #[test]
    fn extract_text_understands_common_shapes() {
        assert_eq!(
            extract_text(&json!({ "response": "a" })).as_deref(),
            Some("a")
        );
        assert_eq!(
            extract_text(&json!([{ "generated_text": "b" }])).as_deref(),
            Some("b")
        );
        assert_eq!(
            extract_text(&json!({ "choices": [{ "text": "c" }] })).as_deref(),
            Some("c")
        );
        assert_eq!(extract_text(&json!({ "output": 3 })), None);
    }
}
