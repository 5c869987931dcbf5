//! In-process inference over a quantized GGUF model.
//!
//! The candle engine is compiled only with the `local-inference` feature;
//! without it this backend reports itself as unavailable.

#[cfg(feature = "local-inference")]
mod engine;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::backend::GenerationOptions;
use super::error::BackendError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Cuda,
}

#[derive(Debug, Clone)]
pub struct LocalInference {
    model_path: PathBuf,
    tokenizer_path: Option<PathBuf>,
    device: DeviceKind,
}

impl LocalInference {
    pub fn new(model_path: PathBuf, tokenizer_path: Option<PathBuf>, device: DeviceKind) -> Self {
        Self {
            model_path,
            tokenizer_path,
            device,
        }
    }

    pub fn model_path(&self) -> &std::path::Path {
        &self.model_path
    }

    /// Tokenizer location: explicit path, else `tokenizer.json` beside the weights.
    pub fn tokenizer_path(&self) -> PathBuf {
        self.tokenizer_path.clone().unwrap_or_else(|| {
            self.model_path
                .parent()
                .map(|dir| dir.join("tokenizer.json"))
                .unwrap_or_else(|| PathBuf::from("tokenizer.json"))
        })
    }

    /// Load the model into the process-wide cache without generating.
    pub async fn warm_up(&self) -> Result<(), BackendError> {
        #[cfg(feature = "local-inference")]
        {
            let backend = self.clone();
            tokio::task::spawn_blocking(move || engine::shared_model(&backend).map(|_| ()))
                .await
                .map_err(|e| BackendError::Inference(format!("model load task failed: {e}")))?
        }

        #[cfg(not(feature = "local-inference"))]
        {
            Err(not_compiled())
        }
    }

    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        #[cfg(feature = "local-inference")]
        {
            let backend = self.clone();
            let prompt = prompt.to_owned();
            let options = options.clone();
            // the blocking task outlives a cancelled future, so it keeps its own clock
            let deadline = Deadline::after(options.timeout);
            tokio::task::spawn_blocking(move || {
                let model = engine::shared_model(&backend)?;
                engine::generate_blocking(&model, &prompt, &options, &deadline)
            })
            .await
            .map_err(|e| BackendError::Inference(format!("inference task failed: {e}")))?
        }

        #[cfg(not(feature = "local-inference"))]
        {
            let _ = (prompt, options);
            Err(not_compiled())
        }
    }
}

/// Wall-clock limit for one generation, checked between decode steps.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }

    pub fn check(&self) -> Result<(), BackendError> {
        if Instant::now() >= self.at {
            return Err(BackendError::Timeout(self.limit));
        }
        Ok(())
    }
}

#[cfg(not(feature = "local-inference"))]
fn not_compiled() -> BackendError {
    BackendError::Unavailable(
        "local inference requires building flashgen with the `local-inference` feature".into(),
    )
}
