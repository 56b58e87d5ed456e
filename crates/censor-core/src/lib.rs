//! Censor Core
//!
//! Core types and utilities shared across the censor moderation engine.
//!
//! This crate provides:
//! - The decision vocabulary (decisions, replace policies, review status, risk levels)
//! - Request descriptors and persisted review entities
//! - The error taxonomy and result handling
//! - Content hashing for deduplication
//! - The text-merge engine used for batched and field-grouped review

pub mod error;
pub mod hash;
pub mod id;
pub mod textmerge;
pub mod types;

pub use error::{
    AuthErrorKind, ConfigErrorKind, Error, ErrorCategory, NetworkErrorKind, ProviderError,
    Result, StoreError, ValidationError,
};
pub use textmerge::{MergedText, PartIndex, TextMergeStrategy};
pub use types::{
    BindingChange, BizContext, BizReview, BizType, CensorBinding, CensorBindingHistory,
    Decision, FinalOutcome, HistorySource, Mode, PendingTask, ProviderTask, Reason, ReplacePolicy,
    Resource, ResourceReview, ResourceType, ReviewResult, ReviewStatus, RiskLevel,
    ViolationSnapshot,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::textmerge::{merge_texts, MergedText, PartIndex, TextMergeStrategy};
    pub use crate::types::{
        BizContext, BizType, Decision, FinalOutcome, Reason, ReplacePolicy, Resource,
        ResourceType, ReviewResult, RiskLevel,
    };
}
