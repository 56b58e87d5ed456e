//! Provider trait and common types

use async_trait::async_trait;
use censor_core::{BizContext, Mode, Resource, ResourceType, Result, ReviewResult};
use censor_policy::{SceneCapability, Translator, UnifiedScene};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Raw provider payload, trimmed to what is worth persisting
pub type RawMap = HashMap<String, Value>;

/// A resource type and the modes a provider offers for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub resource_type: ResourceType,
    pub modes: Vec<Mode>,
}

impl Capability {
    pub fn new(resource_type: ResourceType, modes: impl IntoIterator<Item = Mode>) -> Self {
        Self {
            resource_type,
            modes: modes.into_iter().collect(),
        }
    }
}

/// Content submitted for review
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub resource: Resource,
    pub biz: BizContext,

    /// Required detection scenes
    pub scenes: Vec<UnifiedScene>,

    /// Upper bound for the provider call
    pub timeout: Option<Duration>,
}

impl SubmitRequest {
    pub fn new(resource: Resource, biz: BizContext) -> Self {
        Self {
            resource,
            biz,
            scenes: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_scenes(mut self, scenes: impl IntoIterator<Item = UnifiedScene>) -> Self {
        self.scenes = scenes.into_iter().collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of a submit call
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitResponse {
    pub mode: Mode,

    /// Provider-side task ID
    pub task_id: String,

    /// Present for sync reviews
    pub immediate: Option<ReviewResult>,

    pub raw: RawMap,
}

impl SubmitResponse {
    /// A completed sync review
    pub fn sync(task_id: impl Into<String>, result: ReviewResult) -> Self {
        Self {
            mode: Mode::Sync,
            task_id: task_id.into(),
            immediate: Some(result),
            raw: RawMap::new(),
        }
    }

    /// An accepted async task
    pub fn pending(task_id: impl Into<String>) -> Self {
        Self {
            mode: Mode::Async,
            task_id: task_id.into(),
            immediate: None,
            raw: RawMap::new(),
        }
    }

    pub fn with_raw(mut self, key: impl Into<String>, value: Value) -> Self {
        self.raw.insert(key.into(), value);
        self
    }
}

/// Status of an async task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    pub done: bool,
    pub result: Option<ReviewResult>,
    pub raw: RawMap,
}

impl QueryResponse {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn done(result: ReviewResult) -> Self {
        Self {
            done: true,
            result: Some(result),
            raw: RawMap::new(),
        }
    }

    pub fn with_raw(mut self, key: impl Into<String>, value: Value) -> Self {
        self.raw.insert(key.into(), value);
        self
    }
}

/// Parsed provider callback
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallbackData {
    pub task_id: String,
    pub done: bool,
    pub result: Option<ReviewResult>,
    pub raw: RawMap,
}

/// A content moderation provider.
///
/// Vendors differ in wire format, label vocabulary, and whether results
/// arrive inline or later. The engine only sees this trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name, used as registry key and in persisted tasks
    fn name(&self) -> &str;

    /// Supported resource types and modes
    fn capabilities(&self) -> Vec<Capability>;

    /// Detection scenes the provider can satisfy
    fn scene_capability(&self) -> SceneCapability;

    /// Provider-specific scene codes for the unified scenes
    fn translate_scenes(&self, scenes: &[UnifiedScene], resource_type: ResourceType) -> Vec<String>;

    /// Submit content for review
    async fn submit(&self, req: SubmitRequest) -> Result<SubmitResponse>;

    /// Query an async task
    async fn query(&self, task_id: &str) -> Result<QueryResponse>;

    /// Verify a callback signature; fails with `CallbackInvalid`
    async fn verify_callback(&self, headers: &HashMap<String, String>, body: &[u8]) -> Result<()>;

    /// Parse a callback body
    async fn parse_callback(&self, body: &[u8]) -> Result<CallbackData>;

    /// Label translator, if the provider has one
    fn translator(&self) -> Option<Arc<dyn Translator>>;
}

fn has_mode(provider: &dyn Provider, resource_type: ResourceType, mode: Mode) -> bool {
    provider
        .capabilities()
        .iter()
        .any(|c| c.resource_type == resource_type && c.modes.contains(&mode))
}

/// Whether the provider reviews this resource type inline
pub fn supports_sync(provider: &dyn Provider, resource_type: ResourceType) -> bool {
    has_mode(provider, resource_type, Mode::Sync)
}

/// Whether the provider reviews this resource type asynchronously
pub fn supports_async(provider: &dyn Provider, resource_type: ResourceType) -> bool {
    has_mode(provider, resource_type, Mode::Async)
}

pub fn supports_resource_type(provider: &dyn Provider, resource_type: ResourceType) -> bool {
    provider
        .capabilities()
        .iter()
        .any(|c| c.resource_type == resource_type)
}

/// Header lookup ignoring ASCII case
pub fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
