use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend cannot serve any request: server down, weights missing,
    /// or the transport was not compiled in.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend call timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed backend response: {0}")]
    MalformedBody(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[cfg(feature = "local-inference")]
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl BackendError {
    /// Fatal errors mean every later call would fail the same way, so the
    /// run stops instead of skipping to the next chunk.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }

    /// Classify a transport error, promoting refused connections to
    /// [`BackendError::Unavailable`].
    pub(crate) fn from_transport(err: reqwest::Error, target: &str) -> Self {
        if err.is_connect() {
            BackendError::Unavailable(format!("cannot connect to {target}: {err}"))
        } else {
            BackendError::Request(err)
        }
    }
}
