use std::path::Path;
use std::sync::{Arc, Mutex};

use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::quantized_llama::ModelWeights;
use tokenizers::Tokenizer;

use super::{Deadline, DeviceKind, LocalInference};
use crate::llm::backend::GenerationOptions;
use crate::llm::error::BackendError;
use crate::llm::model_cache::ModelCache;

const SEED: u64 = 42;
const TOP_K: usize = 40;
const TOP_P: f64 = 0.9;
const REPEAT_PENALTY: f32 = 1.1;
const REPEAT_LAST_N: usize = 64;

pub struct LoadedModel {
    weights: ModelWeights,
    tokenizer: Tokenizer,
    eos_token_id: u32,
    device: Device,
}

static MODEL: ModelCache<Mutex<LoadedModel>> = ModelCache::new();

/// The process-wide model, loading it on first use.
///
/// Only the first configuration loads; later calls reuse that model even if
/// they name different weights.
pub fn shared_model(backend: &LocalInference) -> Result<Arc<Mutex<LoadedModel>>, BackendError> {
    MODEL.get_or_load(|| {
        tracing::info!(model = %backend.model_path().display(), "loading local model");
        load_model(backend).map(Mutex::new)
    })
}

fn load_model(backend: &LocalInference) -> Result<LoadedModel, BackendError> {
    let device = match backend.device {
        DeviceKind::Cpu => Device::Cpu,
        DeviceKind::Cuda => Device::new_cuda(0)
            .map_err(|e| BackendError::Unavailable(format!("CUDA device unavailable: {e}")))?,
    };

    let weights = load_gguf_weights(backend.model_path(), &device)?;
    let tokenizer_path = backend.tokenizer_path();
    let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
        BackendError::Unavailable(format!(
            "failed to load tokenizer from {}: {e}",
            tokenizer_path.display()
        ))
    })?;
    let eos_token_id = resolve_eos_token(&tokenizer);

    Ok(LoadedModel {
        weights,
        tokenizer,
        eos_token_id,
        device,
    })
}

fn load_gguf_weights(path: &Path, device: &Device) -> Result<ModelWeights, BackendError> {
    let mut file = std::fs::File::open(path).map_err(|e| {
        BackendError::Unavailable(format!("failed to open model weights {}: {e}", path.display()))
    })?;
    let content = gguf_file::Content::read(&mut file)
        .map_err(|e| BackendError::Unavailable(format!("failed to parse GGUF file: {e}")))?;
    ModelWeights::from_gguf(content, &mut file, device)
        .map_err(|e| BackendError::Unavailable(format!("failed to load model weights: {e}")))
}

fn resolve_eos_token(tokenizer: &Tokenizer) -> u32 {
    // Common EOS tokens across model families
    const EOS_CANDIDATES: &[&str] = &["</s>", "<|endoftext|>", "<|eot_id|>", "<|im_end|>"];

    EOS_CANDIDATES
        .iter()
        .find_map(|candidate| tokenizer.token_to_id(candidate))
        .unwrap_or(2)
}

pub fn generate_blocking(
    model: &Mutex<LoadedModel>,
    prompt: &str,
    options: &GenerationOptions,
    deadline: &Deadline,
) -> Result<String, BackendError> {
    let mut guard = model
        .lock()
        .map_err(|e| BackendError::Inference(format!("model lock poisoned: {e}")))?;
    deadline.check()?;
    let LoadedModel {
        weights,
        tokenizer,
        eos_token_id,
        device,
    } = &mut *guard;

    let encoding = tokenizer
        .encode(prompt, true)
        .map_err(|e| BackendError::Inference(format!("tokenizer encode failed: {e}")))?;
    let prompt_tokens = encoding.get_ids().to_vec();

    let sampling = if options.temperature <= 0.0 {
        Sampling::ArgMax
    } else {
        Sampling::TopKThenTopP {
            k: TOP_K,
            p: TOP_P,
            temperature: options.temperature,
        }
    };
    let mut logits_processor = LogitsProcessor::from_sampling(SEED, sampling);

    let mut all_tokens = prompt_tokens.clone();
    let mut generated: Vec<u32> = Vec::with_capacity(options.max_tokens as usize);

    let input = Tensor::new(prompt_tokens.as_slice(), device)?.unsqueeze(0)?;
    let logits = weights.forward(&input, 0)?.squeeze(0)?;
    let mut next_token = logits_processor.sample(&logits)?;

    for index in 0..options.max_tokens as usize {
        if next_token == *eos_token_id {
            break;
        }
        deadline.check()?;
        generated.push(next_token);
        all_tokens.push(next_token);

        let input = Tensor::new(&[next_token], device)?.unsqueeze(0)?;
        let logits = weights
            .forward(&input, prompt_tokens.len() + index)?
            .squeeze(0)?;
        let start = all_tokens.len().saturating_sub(REPEAT_LAST_N);
        let logits = candle_transformers::utils::apply_repeat_penalty(
            &logits,
            REPEAT_PENALTY,
            &all_tokens[start..],
        )?;
        next_token = logits_processor.sample(&logits)?;
    }

    tracing::debug!(tokens = generated.len(), "local generation finished");
    tokenizer
        .decode(&generated, true)
        .map_err(|e| BackendError::Inference(format!("tokenizer decode failed: {e}")))
}
