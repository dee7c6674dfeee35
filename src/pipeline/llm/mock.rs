use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{Generation, GenerationRequest, GenerativeClient, TokenUsage};
use super::LlmError;

/// Mock LLM client for testing: returns a configurable response.
pub struct MockLlmClient {
    response: String,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
        }
    }
}

#[async_trait]
impl GenerativeClient for MockLlmClient {
    async fn generate(&self, _request: &GenerationRequest) -> Result<Generation, LlmError> {
        Ok(Generation::text_only(self.response.clone()))
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

type Scripted = Result<Generation, LlmError>;

/// Scripted client keyed by template id.
///
/// Each template has its own queue of outcomes, so concurrent calls for
/// different templates are deterministic regardless of scheduling. When a
/// queue is down to its last entry, that entry is repeated for every
/// further call.
pub struct ScriptedLlmClient {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<GenerationRequest>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Simulated per-call latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue a text response without usage metadata.
    pub fn respond(self, template_id: &str, text: &str) -> Self {
        self.push(template_id, Ok(Generation::text_only(text)))
    }

    /// Queue a text response that reports usage metadata.
    pub fn respond_with_usage(self, template_id: &str, text: &str, usage: TokenUsage) -> Self {
        self.push(
            template_id,
            Ok(Generation {
                text: text.to_string(),
                usage: Some(usage),
            }),
        )
    }

    /// Queue a transport failure.
    pub fn fail(self, template_id: &str, error: LlmError) -> Self {
        self.push(template_id, Err(error))
    }

    fn push(self, template_id: &str, outcome: Scripted) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(template_id.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Every request received, in arrival order.
    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of requests received for one template.
    pub fn call_count(&self, template_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.template_id == template_id)
            .count()
    }

    /// Highest number of calls observed in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, template_id: &str) -> Scripted {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(template_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Err(LlmError::HttpClient(format!(
                "no scripted response for template {template_id}"
            ))),
        }
    }
}

#[async_trait]
impl GenerativeClient for ScriptedLlmClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, LlmError> {
        self.calls.lock().unwrap().push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.next_outcome(&request.template_id)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(template_id: &str) -> GenerationRequest {
        GenerationRequest {
            template_id: template_id.into(),
            prompt: "prompt".into(),
            temperature: 0.0,
            json_mode: true,
        }
    }

    #[tokio::test]
    async fn mock_client_returns_configured_response() {
        let client = MockLlmClient::new("test response");
        let result = client.generate(&request("any")).await.unwrap();
        assert_eq!(result.text, "test response");
        assert!(result.usage.is_none());
    }

    #[tokio::test]
    async fn scripted_queue_pops_then_repeats_last() {
        let client = ScriptedLlmClient::new()
            .respond("evaluate", "first")
            .respond("evaluate", "second");
        assert_eq!(client.generate(&request("evaluate")).await.unwrap().text, "first");
        assert_eq!(client.generate(&request("evaluate")).await.unwrap().text, "second");
        assert_eq!(client.generate(&request("evaluate")).await.unwrap().text, "second");
        assert_eq!(client.call_count("evaluate"), 3);
    }

    #[tokio::test]
    async fn unscripted_template_is_a_transport_error() {
        let client = ScriptedLlmClient::new();
        let err = client.generate(&request("parse")).await.unwrap_err();
        assert!(matches!(err, LlmError::HttpClient(_)));
    }

    #[tokio::test]
    async fn scripted_failure_is_returned() {
        let client = ScriptedLlmClient::new().fail("parse", LlmError::Timeout(5));
        assert_eq!(
            client.generate(&request("parse")).await.unwrap_err(),
            LlmError::Timeout(5)
        );
    }
}
