pub mod backend;
pub mod error;
pub mod local_inference;
pub mod local_server;
#[cfg(test)]
pub mod mock;
pub mod model_cache;
pub mod prompt;
pub mod remote_http;
pub mod secrets;

pub use backend::{Backend, GenerationOptions, RawResponse};
pub use error::BackendError;
pub use prompt::build_prompt;
pub use secrets::{clear_api_key, resolve_api_key, store_api_key};
