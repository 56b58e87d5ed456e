//! Censor Client
//!
//! The orchestration layer of the censor moderation engine.
//!
//! This crate provides:
//! - The [`Client`] submission flow: dedup, provider pipeline, persistence
//!   and decision aggregation
//! - Field and batch submissions that merge short texts and locate
//!   violations back to the originating item
//! - Callback handling and a background [`Poller`] for async providers
//! - Field bindings with revision history and violation snapshots
//! - Lifecycle [`Hooks`]

pub mod batch;
pub mod client;
pub mod config;
pub mod fields;
mod grouped;
pub mod hooks;
pub mod locator;
pub mod pipeline;
pub mod poller;

pub use batch::{BatchItem, BatchItemResult, SubmitBatchInput, SubmitBatchResult};
pub use client::{
    aggregate_decision, Client, ClientBuilder, CompletionSource, DecisionInput, QueryResult,
    SubmitInput, SubmitResult, MERGED_FIELD,
};
pub use config::{
    BatchConfig, ClientConfig, DedupConfig, MergePolicy, PipelineConfig, PollerConfig, TriggerRule,
};
pub use fields::{BlockAction, FieldInput, FieldResult, SubmitFieldsInput, SubmitFieldsResult};
pub use hooks::{
    BizDecisionChangedEvent, ChainHooks, DecisionChange, FnHooks, Hooks, ManualReviewRequiredEvent,
    NopHooks, ResourceReviewedEvent, TracingHooks, ViolationDetectedEvent,
};
pub use locator::{locate, LocatedBy, Location};
pub use pipeline::{merge_decisions, PipelineExecutor, PipelineOutput};
pub use poller::{PollStats, Poller};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::batch::{BatchItem, SubmitBatchInput};
    pub use crate::client::{Client, SubmitInput};
    pub use crate::config::ClientConfig;
    pub use crate::fields::{BlockAction, FieldInput, SubmitFieldsInput};
    pub use crate::hooks::Hooks;
    pub use crate::poller::Poller;
}
