use std::fmt;
use std::time::Duration;

use serde_json::Value;

use super::error::BackendError;
use super::local_inference::LocalInference;
use super::local_server::LocalServer;
use super::remote_http::RemoteHttp;
use crate::config::{BackendConfig, GenerationSettings};

#[cfg(test)]
use super::mock::MockBackend;

const HEALTH_CHECK_PROMPT: &str = "Reply with the single word OK.";

/// Sampling and timeout parameters shared by every backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::from(&GenerationSettings::default())
    }
}

impl From<&GenerationSettings> for GenerationOptions {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

/// Text returned by a backend for one prompt, before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse(String);

impl RawResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// The model transport, chosen once from configuration.
#[derive(Debug)]
pub enum Backend {
    LocalInference(LocalInference),
    LocalServer(LocalServer),
    RemoteHttp(RemoteHttp),
    #[cfg(test)]
    Mock(MockBackend),
}

impl Backend {
    /// `api_key` is only used by the remote backend; see [`super::resolve_api_key`].
    pub fn from_config(config: &BackendConfig, api_key: Option<String>) -> Result<Self, BackendError> {
        let backend = match config {
            BackendConfig::LocalInference {
                model_path,
                tokenizer_path,
                device,
            } => {
                let Some(model_path) = model_path else {
                    return Err(BackendError::Unavailable(
                        "local inference needs `model_path` in the [backend] settings".into(),
                    ));
                };
                Backend::LocalInference(LocalInference::new(
                    model_path.clone(),
                    tokenizer_path.clone(),
                    *device,
                ))
            }
            BackendConfig::LocalServer { base_url, model } => {
                Backend::LocalServer(LocalServer::new(base_url, model.clone()))
            }
            BackendConfig::RemoteHttp { url, .. } => {
                let Some(url) = url.as_deref().filter(|url| !url.trim().is_empty()) else {
                    return Err(BackendError::Unavailable(
                        "remote HTTP backend needs `url` in the [backend] settings".into(),
                    ));
                };
                Backend::RemoteHttp(RemoteHttp::new(url, api_key))
            }
        };
        Ok(backend)
    }

    /// Build the backend and make sure a local server is reachable before
    /// any document is processed. A server that accepts the connection but
    /// never answers within the call timeout counts as unavailable.
    pub async fn connect(
        config: &BackendConfig,
        api_key: Option<String>,
        options: &GenerationOptions,
    ) -> Result<Self, BackendError> {
        let backend = Self::from_config(config, api_key)?;
        if let Backend::LocalServer(server) = &backend {
            tokio::time::timeout(options.timeout, server.health_check())
                .await
                .map_err(|_| {
                    BackendError::Unavailable(format!(
                        "model server did not answer within {}s",
                        options.timeout.as_secs_f64()
                    ))
                })??;
        }
        Ok(backend)
    }

    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<RawResponse, BackendError> {
        let call = async {
            match self {
                Backend::LocalInference(backend) => backend.generate(prompt, options).await,
                Backend::LocalServer(backend) => backend.generate(prompt, options).await,
                Backend::RemoteHttp(backend) => backend.generate(prompt, options).await,
                #[cfg(test)]
                Backend::Mock(backend) => backend.generate(prompt).await,
            }
        };

        let text = tokio::time::timeout(options.timeout, call)
            .await
            .map_err(|_| BackendError::Timeout(options.timeout))??;

        Ok(RawResponse::new(strip_echoed_prompt(text, prompt)))
    }

    /// Verify the backend can serve a request.
    pub async fn health_check(&self, options: &GenerationOptions) -> Result<(), BackendError> {
        match self {
            Backend::LocalServer(server) => {
                tokio::time::timeout(options.timeout, server.health_check())
                    .await
                    .map_err(|_| BackendError::Timeout(options.timeout))?
            }
            Backend::LocalInference(local) => local.warm_up().await,
            _ => self.generate(HEALTH_CHECK_PROMPT, options).await.map(|_| ()),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::LocalInference(local) => {
                write!(f, "local inference ({})", local.model_path().display())
            }
            Backend::LocalServer(server) => write!(f, "local server (model {})", server.model()),
            Backend::RemoteHttp(remote) => write!(f, "remote HTTP ({})", remote.url()),
            #[cfg(test)]
            Backend::Mock(_) => write!(f, "mock"),
        }
    }
}

// Some servers return the prompt followed by the completion.
fn strip_echoed_prompt(text: String, prompt: &str) -> String {
    match text.strip_prefix(prompt) {
        Some(rest) if !prompt.is_empty() => rest.to_string(),
        _ => text,
    }
}

/// Read a JSON body, mapping non-2xx statuses and unparsable bodies to
/// their recoverable error kinds.
pub(crate) async fn read_json_body(response: reqwest::Response) -> Result<Value, BackendError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(BackendError::Status {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| BackendError::MalformedBody(format!("invalid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::llm::local_inference::DeviceKind;
    use crate::llm::mock::MockReply;

    fn fast_options() -> GenerationOptions {
        GenerationOptions {
            timeout: Duration::from_millis(50),
            ..GenerationOptions::default()
        }
    }

    #[test]
    fn default_options_match_settings() {
        let options = GenerationOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(60));
        assert_eq!(options.max_tokens, 1024);
        assert!((options.temperature - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn remote_http_requires_url() {
        let config = BackendConfig::RemoteHttp {
            url: None,
            api_key: None,
        };
        let err = Backend::from_config(&config, None).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn local_inference_requires_model_path() {
        let config = BackendConfig::LocalInference {
            model_path: None,
            tokenizer_path: None,
            device: DeviceKind::Cpu,
        };
        assert!(Backend::from_config(&config, None).unwrap_err().is_fatal());

        let config = BackendConfig::LocalInference {
            model_path: Some(PathBuf::from("weights.gguf")),
            tokenizer_path: None,
            device: DeviceKind::Cpu,
        };
        let backend = Backend::from_config(&config, None).unwrap();
        assert_eq!(backend.to_string(), "local inference (weights.gguf)");
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let backend = Backend::Mock(MockBackend::new([MockReply::Slow(
            Duration::from_millis(500),
            "late".into(),
        )]));
        let err = backend.generate("p", &fast_options()).await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn remote_http_timeout_uses_shared_policy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "text": "late" }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let backend = Backend::RemoteHttp(RemoteHttp::new(server.uri(), None));
        let err = backend.generate("p", &fast_options()).await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
    }

    #[tokio::test]
    async fn echoed_prompt_is_removed() {
        let backend = Backend::Mock(MockBackend::new([MockReply::Text(
            "PROMPT\nQ: a?|A: b.".into(),
        )]));
        let raw = backend
            .generate("PROMPT", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(raw.as_str(), "\nQ: a?|A: b.");
    }

    #[tokio::test]
    async fn connect_fails_fast_when_server_is_down() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = BackendConfig::LocalServer {
            base_url: format!("http://{addr}"),
            model: "llama2".into(),
        };
        let err = Backend::connect(&config, None, &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn connect_gives_up_on_a_silent_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "models": [] }))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let config = BackendConfig::LocalServer {
            base_url: server.uri(),
            model: "llama2".into(),
        };
        let started = std::time::Instant::now();
        let err = Backend::connect(&config, None, &fast_options())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
