use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::error::BackendError;

#[derive(Debug)]
pub enum MockReply {
    Text(String),
    Slow(Duration, String),
    Fail(BackendError),
}

/// Scripted backend for tests. Replies are served in order; once they run
/// out every call returns an empty string.
#[derive(Debug, Default)]
pub struct MockBackend {
    replies: Mutex<VecDeque<MockReply>>,
    prompts: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            None => Ok(String::new()),
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Slow(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Some(MockReply::Fail(err)) => Err(err),
        }
    }
}
