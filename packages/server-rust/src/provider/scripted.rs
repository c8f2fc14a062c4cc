//! In-memory provider for tests. Records every request it receives.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::GenerationRequest;

use crate::traits::{Completion, GenerationProvider, ProviderError, TokenUsage};

/// What the provider does when called.
#[derive(Debug, Clone)]
pub enum Script {
    /// Fixed reply.
    Reply {
        text: String,
        finish_reason: Option<String>,
    },
    /// Replies with the prompt, so concurrent callers can check they got their own answer.
    Echo,
    Fail(ProviderError),
    Panic(&'static str),
}

pub struct ScriptedProvider {
    script: Script,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str, finish_reason: Option<&str>) -> Self {
        Self::new(Script::Reply {
            text: text.to_string(),
            finish_reason: finish_reason.map(str::to_string),
        })
    }

    pub fn echo() -> Self {
        Self::new(Script::Echo)
    }

    pub fn failing(err: ProviderError) -> Self {
        Self::new(Script::Fail(err))
    }

    pub fn panicking(message: &'static str) -> Self {
        Self::new(Script::Panic(message))
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.script {
            Script::Reply {
                text,
                finish_reason,
            } => Ok(Completion {
                text: text.clone(),
                finish_reason: finish_reason.clone(),
                provider_model: Some("scripted-model".to_string()),
                usage: Some(TokenUsage {
                    prompt_tokens: 1,
                    completion_tokens: 1,
                    total_tokens: 2,
                }),
            }),
            Script::Echo => Ok(Completion {
                text: request.prompt.clone(),
                finish_reason: Some("stop".to_string()),
                provider_model: None,
                usage: None,
            }),
            Script::Fail(err) => Err(err.clone()),
            Script::Panic(message) => panic!("{message}"),
        }
    }
}
