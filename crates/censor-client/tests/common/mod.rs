//! Shared fixtures for client tests

#![allow(dead_code)]

use async_trait::async_trait;
use censor_client::{Client, ClientConfig, Hooks};
use censor_core::{
    Decision, Error, Mode, NetworkErrorKind, Reason, ResourceType, Result, ReviewResult,
};
use censor_policy::{SceneCapability, Translator, UnifiedScene};
use censor_providers::{
    CallbackData, Capability, Provider, QueryResponse, SubmitRequest, SubmitResponse,
};
use censor_store::MemoryStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A configurable mock provider
pub struct MockProvider {
    name: String,
    decision: Decision,
    reasons: Vec<Reason>,
    mode: Mode,
    trigger: Option<String>,
    failing: bool,
    call_count: AtomicU32,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            decision: Decision::Pass,
            reasons: Vec::new(),
            mode: Mode::Sync,
            trigger: None,
            failing: false,
            call_count: AtomicU32::new(0),
        }
    }

    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = decision;
        self
    }

    pub fn with_reason(mut self, reason: Reason) -> Self {
        self.reasons.push(reason);
        self
    }

    /// Accept tasks instead of answering inline
    pub fn with_async(mut self) -> Self {
        self.mode = Mode::Async;
        self
    }

    /// Only texts containing `needle` get the configured decision; the
    /// rest pass
    pub fn with_trigger(mut self, needle: &str) -> Self {
        self.trigger = Some(needle.to_string());
        self
    }

    /// Every submit fails with a network error
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    fn result_for(&self, text: &str) -> ReviewResult {
        let hit = self.trigger.as_deref().map_or(true, |needle| text.contains(needle));
        if hit {
            ReviewResult::new(self.name.clone(), self.decision, 0.9)
                .with_reasons(self.reasons.clone())
        } else {
            ReviewResult::new(self.name.clone(), Decision::Pass, 0.9)
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::new(ResourceType::Text, [self.mode])]
    }

    fn scene_capability(&self) -> SceneCapability {
        SceneCapability::new(self.name.clone())
            .with_scenes(ResourceType::Text, [UnifiedScene::Pornography, UnifiedScene::Politics])
            .with_sync(self.mode == Mode::Sync)
            .with_async(self.mode == Mode::Async)
    }

    fn translate_scenes(&self, scenes: &[UnifiedScene], _resource_type: ResourceType) -> Vec<String> {
        scenes.iter().map(|s| s.to_string()).collect()
    }

    async fn submit(&self, req: SubmitRequest) -> Result<SubmitResponse> {
        let n = self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.failing {
            return Err(Error::network(NetworkErrorKind::ConnectionRefused, "mock provider unavailable"));
        }

        let task_id = format!("{}_{}_{}", self.name, req.resource.resource_id, n);
        Ok(match self.mode {
            Mode::Sync => SubmitResponse::sync(task_id, self.result_for(&req.resource.content_text)),
            Mode::Async => SubmitResponse::pending(task_id),
        })
    }

    async fn query(&self, _task_id: &str) -> Result<QueryResponse> {
        Ok(QueryResponse::done(
            ReviewResult::new(self.name.clone(), self.decision, 0.9)
                .with_reasons(self.reasons.clone()),
        ))
    }

    async fn verify_callback(&self, _headers: &HashMap<String, String>, _body: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn parse_callback(&self, body: &[u8]) -> Result<CallbackData> {
        Ok(CallbackData {
            task_id: String::from_utf8_lossy(body).to_string(),
            done: true,
            result: Some(
                ReviewResult::new(self.name.clone(), self.decision, 0.9)
                    .with_reasons(self.reasons.clone()),
            ),
            raw: Default::default(),
        })
    }

    fn translator(&self) -> Option<Arc<dyn Translator>> {
        None
    }
}

/// Client over a fresh memory store with `primary` as the primary provider
pub fn client_with(primary: Arc<MockProvider>, config: ClientConfig) -> Client {
    Client::builder()
        .with_store(Arc::new(MemoryStore::new()))
        .with_provider(primary.clone())
        .with_config(config.with_primary(primary.name()))
        .build()
        .unwrap()
}

pub fn client_with_hooks(
    primary: Arc<MockProvider>,
    config: ClientConfig,
    hooks: Arc<dyn Hooks>,
) -> Client {
    Client::builder()
        .with_store(Arc::new(MemoryStore::new()))
        .with_provider(primary.clone())
        .with_hooks(hooks)
        .with_config(config.with_primary(primary.name()))
        .build()
        .unwrap()
}
