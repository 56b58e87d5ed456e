//! Client configuration

use censor_core::{Decision, Error, Result, TextMergeStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Top-level client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Budget used whenever texts are merged into one submission
    #[serde(default)]
    pub text_merge: TextMergeStrategy,

    #[serde(default)]
    pub dedup: DedupConfig,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub poller: PollerConfig,

    /// Provider that receives `review` outcomes for human confirmation
    #[serde(default)]
    pub manual_provider: Option<String>,

    /// Per-call provider deadline
    #[serde(default)]
    pub provider_timeout_ms: Option<u64>,
}

impl ClientConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse client config: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read client config {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn with_primary(mut self, provider: impl Into<String>) -> Self {
        self.pipeline.primary = provider.into();
        self
    }

    pub fn with_secondary(mut self, provider: impl Into<String>) -> Self {
        self.pipeline.secondary = Some(provider.into());
        self
    }

    pub fn with_merge_policy(mut self, merge: MergePolicy) -> Self {
        self.pipeline.merge = merge;
        self
    }

    pub fn with_manual_provider(mut self, provider: impl Into<String>) -> Self {
        self.manual_provider = Some(provider.into());
        self
    }

    pub fn with_text_merge(mut self, strategy: TextMergeStrategy) -> Self {
        self.text_merge = strategy;
        self
    }

    pub fn without_dedup(mut self) -> Self {
        self.dedup.enabled = false;
        self
    }

    pub fn provider_timeout(&self) -> Option<Duration> {
        self.provider_timeout_ms.map(Duration::from_millis)
    }
}

/// Provider chain and merge strategy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Provider every resource is submitted to
    #[serde(default)]
    pub primary: String,

    /// Provider consulted when the primary's decision is in the trigger set
    #[serde(default)]
    pub secondary: Option<String>,

    #[serde(default)]
    pub trigger: TriggerRule,

    #[serde(default)]
    pub merge: MergePolicy,
}

/// When to run the secondary provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRule {
    #[serde(default = "default_trigger_decisions")]
    pub on_decisions: HashSet<Decision>,
}

fn default_trigger_decisions() -> HashSet<Decision> {
    [Decision::Block, Decision::Review, Decision::Error]
        .into_iter()
        .collect()
}

impl Default for TriggerRule {
    fn default() -> Self {
        Self {
            on_decisions: default_trigger_decisions(),
        }
    }
}

impl TriggerRule {
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            on_decisions: decisions.into_iter().collect(),
        }
    }

    pub fn should_trigger(&self, decision: Decision) -> bool {
        self.on_decisions.contains(&decision)
    }
}

/// How decisions from several providers combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Strictest decision wins
    #[default]
    MostStrict,
    /// Most frequent decision; ties go to the stricter one
    Majority,
    /// First non-pass decision
    Any,
    /// Block or review only when every provider agrees
    All,
}

impl MergePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MostStrict => "most_strict",
            Self::Majority => "majority",
            Self::Any => "any",
            Self::All => "all",
        }
    }
}

/// Content deduplication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Defaults for field and batch submissions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Locator confidence needed to trust a located violation
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: f64,

    /// Items per merged request
    #[serde(default = "default_max_merge_count")]
    pub max_merge_count: usize,

    /// Mark every item instead of re-reviewing individually
    #[serde(default)]
    pub disable_fallback: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            fallback_threshold: default_fallback_threshold(),
            max_merge_count: default_max_merge_count(),
            disable_fallback: false,
        }
    }
}

/// Async task poller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,

    /// Pending tasks fetched per provider per tick
    #[serde(default = "default_poll_batch_size")]
    pub batch_size: usize,

    /// Concurrent queries per provider
    #[serde(default = "default_poll_workers")]
    pub workers: usize,

    /// Providers to poll; empty means every async-capable provider
    #[serde(default)]
    pub providers: Vec<String>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            batch_size: default_poll_batch_size(),
            workers: default_poll_workers(),
            providers: Vec::new(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_secs = interval.as_secs().max(1);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.providers = providers.into_iter().map(Into::into).collect();
        self
    }
}

fn default_true() -> bool {
    true
}

fn default_fallback_threshold() -> f64 {
    0.8
}

fn default_max_merge_count() -> usize {
    10
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_poll_batch_size() -> usize {
    50
}

fn default_poll_workers() -> usize {
    3
}
