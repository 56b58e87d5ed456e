//! Store trait

use async_trait::async_trait;
use censor_core::{
    BizContext, BizReview, BizType, CensorBinding, CensorBindingHistory, Decision, FinalOutcome,
    Mode, PendingTask, ProviderTask, Resource, ResourceReview, Result, ReviewResult, ReviewStatus,
    ViolationSnapshot,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;

pub use censor_core::BindingChange;

/// Work run inside [`Store::with_tx`]
pub type TxFn<'a> =
    Box<dyn for<'s> FnOnce(&'s dyn Store) -> BoxFuture<'s, Result<()>> + Send + 'a>;

/// Build a [`TxFn`] from a closure.
///
/// ```ignore
/// store.with_tx(tx(move |s| Box::pin(async move {
///     s.upsert_binding(binding).await?;
///     s.create_binding_history(history).await
/// }))).await?;
/// ```
pub fn tx<'a, F>(f: F) -> TxFn<'a>
where
    F: for<'s> FnOnce(&'s dyn Store) -> BoxFuture<'s, Result<()>> + Send + 'a,
{
    Box::new(f)
}

/// Persistence for review records, bindings, and audit history.
///
/// Writes for different IDs may run concurrently. Same-ID writes are
/// last-writer-wins except where a method says otherwise.
#[async_trait]
pub trait Store: Send + Sync {
    // Business reviews

    /// Create a review in `pending` status with a `pending` decision
    async fn create_biz_review(&self, biz: &BizContext) -> Result<String>;

    async fn get_biz_review(&self, id: &str) -> Result<Option<BizReview>>;

    /// Returns whether the decision actually changed
    async fn update_biz_decision(&self, id: &str, decision: Decision) -> Result<bool>;

    async fn update_biz_status(&self, id: &str, status: ReviewStatus) -> Result<()>;

    // Resource reviews

    async fn create_resource_review(&self, biz_review_id: &str, resource: &Resource) -> Result<String>;

    async fn get_resource_review(&self, id: &str) -> Result<Option<ResourceReview>>;

    async fn update_resource_outcome(&self, id: &str, outcome: &FinalOutcome) -> Result<()>;

    /// Resource reviews of a business review, in creation order
    async fn list_resource_reviews(&self, biz_review_id: &str) -> Result<Vec<ResourceReview>>;

    // Provider tasks

    async fn create_provider_task(
        &self,
        resource_review_id: &str,
        provider: &str,
        mode: Mode,
        remote_task_id: &str,
        raw: &HashMap<String, Value>,
    ) -> Result<String>;

    async fn get_provider_task(&self, id: &str) -> Result<Option<ProviderTask>>;

    async fn get_provider_task_by_remote_id(
        &self,
        provider: &str,
        remote_task_id: &str,
    ) -> Result<Option<ProviderTask>>;

    /// Record a provider result.
    ///
    /// Returns true only for the call that moves the task from not-done to
    /// done. Updates to a task that is already done are ignored, so the
    /// callback and poller paths can race on the same task safely.
    async fn update_provider_task_result(
        &self,
        id: &str,
        done: bool,
        result: Option<&ReviewResult>,
        raw: &HashMap<String, Value>,
    ) -> Result<bool>;

    /// Unfinished async tasks of a provider, oldest first
    async fn list_pending_async_tasks(&self, provider: &str, limit: usize) -> Result<Vec<PendingTask>>;

    // Bindings (current state)

    async fn get_binding(
        &self,
        biz_type: &BizType,
        biz_id: &str,
        field: &str,
    ) -> Result<Option<CensorBinding>>;

    /// Insert or replace the binding for (biz_type, biz_id, field)
    async fn upsert_binding(&self, binding: CensorBinding) -> Result<()>;

    async fn list_bindings_by_biz(&self, biz_type: &BizType, biz_id: &str) -> Result<Vec<CensorBinding>>;

    // Binding history (append-only)

    async fn create_binding_history(&self, history: CensorBindingHistory) -> Result<()>;

    /// Newest revision first
    async fn list_binding_history(
        &self,
        biz_type: &BizType,
        biz_id: &str,
        field: &str,
        limit: usize,
    ) -> Result<Vec<CensorBindingHistory>>;

    // Violation snapshots (write-once)

    async fn save_violation_snapshot(
        &self,
        biz: &BizContext,
        resource: &Resource,
        outcome: &FinalOutcome,
    ) -> Result<String>;

    async fn get_violation_snapshot(&self, id: &str) -> Result<Option<ViolationSnapshot>>;

    /// Newest first
    async fn list_violations_by_biz(
        &self,
        biz_type: &BizType,
        biz_id: &str,
        limit: usize,
    ) -> Result<Vec<ViolationSnapshot>>;

    // Utility

    /// Store clock
    fn now(&self) -> DateTime<Utc>;

    /// Run `f` atomically: either all of its writes land or none do
    async fn with_tx(&self, f: TxFn<'_>) -> Result<()>;

    async fn ping(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
