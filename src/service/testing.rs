//! Test doubles for the text-generation collaborator

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::model::TokenUsage;
use crate::service::llm::{Generation, GenerationRequest, LlmError, TextGenerator};
use crate::service::run_log::{RunLog, RunMetadata};

type Responder = Box<dyn Fn(&GenerationRequest) -> Result<String, LlmError> + Send + Sync>;

/// Replays canned completions and records every request
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    /// Answer calls in order from `responses`
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            responder: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answer each call by inspecting its request
    pub fn with_responder(
        responder: impl Fn(&GenerationRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(responder)),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn provider_name(&self) -> &str {
        "Scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    /// One cent per thousand tokens, either direction
    fn calculate_cost(&self, usage: &TokenUsage) -> f64 {
        (usage.input_tokens + usage.output_tokens) as f64 * 0.00001
    }

    async fn generate(&self, request: GenerationRequest) -> Result<Generation, LlmError> {
        self.requests.lock().unwrap().push(request.clone());

        let content = match &self.responder {
            Some(responder) => responder(&request),
            None => self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse)),
        }?;

        Ok(Generation {
            content,
            usage: TokenUsage::new(100, 20),
        })
    }
}

pub fn test_run_log() -> Arc<RunLog> {
    RunLog::open(RunMetadata {
        run_name: "test_run".to_string(),
        exp_group: "test".to_string(),
        provider: "Scripted".to_string(),
        model: "scripted-model".to_string(),
        estimated_cost: 0.0,
        comments: 0,
    })
}
