//! Censor Providers
//!
//! Moderation providers behind a single async trait.
//!
//! Providers differ in vocabulary and timing: some answer inline, others
//! accept a task and deliver the result later through polling or a
//! callback. This crate provides:
//! - The [`Provider`] trait and its request/response types
//! - A name-keyed [`ProviderRegistry`]
//! - Retry with exponential backoff and structured API call logging
//! - A resilience wrapper combining both around any provider
//! - Built-in providers: a local keyword matcher and a human review queue

pub mod api_log;
pub mod keyword;
pub mod manual;
pub mod provider;
pub mod registry;
pub mod resilient;
pub mod retry;

pub use api_log::{
    ApiLogEntry, ApiLogger, ChannelApiLogger, LogTimer, MemoryApiLogger, NopApiLogger,
    TracingApiLogger,
};
pub use censor_core::Mode;
pub use censor_policy::SceneCapability;
pub use keyword::{KeywordConfig, KeywordProvider, KeywordRule};
pub use manual::{
    ManualConfig, ManualProvider, ManualResult, ManualTask, ManualTaskStore, MemoryTaskStore,
};
pub use provider::{
    supports_async, supports_resource_type, supports_sync, CallbackData, Capability, Provider,
    QueryResponse, RawMap, SubmitRequest, SubmitResponse,
};
pub use registry::ProviderRegistry;
pub use resilient::{
    wrap_with_logging, wrap_with_resilience, wrap_with_retry, ResilientConfig, ResilientProvider,
};
pub use retry::{RetryConfig, Retried, Retryer};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::keyword::KeywordProvider;
    pub use crate::manual::ManualProvider;
    pub use crate::provider::{
        CallbackData, Provider, QueryResponse, SubmitRequest, SubmitResponse,
    };
    pub use crate::registry::ProviderRegistry;
    pub use crate::resilient::{wrap_with_resilience, ResilientProvider};
}
