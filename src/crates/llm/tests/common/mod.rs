//! Shared helpers for llm integration tests

use async_trait::async_trait;
use llm::{ChatBackend, ChatRequest, ChatResponse, ServiceError};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

/// Backend replaying a fixed sequence of outcomes and recording when it was called
pub struct SequenceBackend {
    outcomes: Mutex<VecDeque<Result<ChatResponse, ServiceError>>>,
    pub calls: Mutex<Vec<(Instant, ChatRequest)>>,
}

impl SequenceBackend {
    pub fn new(outcomes: Vec<Result<ChatResponse, ServiceError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Backend failing transiently forever
    pub fn always(error: ServiceError) -> Self {
        Self::new(vec![Err(error); 64])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }
}

#[async_trait]
impl ChatBackend for SequenceBackend {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ServiceError> {
        self.calls.lock().unwrap().push((Instant::now(), request));
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::permanent("script exhausted")))
    }

    fn name(&self) -> &str {
        "sequence"
    }
}
