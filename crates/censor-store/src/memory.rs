//! In-memory store
//!
//! Keeps every table in process memory behind a single lock. Intended for
//! tests, development, and single-node deployments that can afford to lose
//! state on restart.

use crate::store::{Store, TxFn};
use async_trait::async_trait;
use censor_core::id::{self, prefix};
use censor_core::{
    BizContext, BizReview, BizType, CensorBinding, CensorBindingHistory, Decision, Error,
    FinalOutcome, Mode, PendingTask, ProviderTask, Resource, ResourceReview, Result,
    ReviewResult, ReviewStatus, ViolationSnapshot,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

type BindingKey = (BizType, String, String);

#[derive(Debug, Clone, Default)]
struct Tables {
    biz_reviews: HashMap<String, BizReview>,
    resource_reviews: HashMap<String, ResourceReview>,
    /// Resource review IDs per business review, in creation order
    resources_by_biz: HashMap<String, Vec<String>>,
    provider_tasks: HashMap<String, ProviderTask>,
    /// Provider task IDs in creation order
    task_order: Vec<String>,
    bindings: HashMap<BindingKey, CensorBinding>,
    history: Vec<CensorBindingHistory>,
    snapshots: HashMap<String, ViolationSnapshot>,
    /// Snapshot IDs in creation order
    snapshot_order: Vec<String>,
}

/// Store backed by process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    tx_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self, operation: &str, table: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::store(operation, table, "store is closed"));
        }
        Ok(())
    }

    /// Number of provider tasks, for diagnostics and tests
    pub fn provider_task_count(&self) -> usize {
        self.tables.read().provider_tasks.len()
    }

    /// Number of history rows, for diagnostics and tests
    pub fn history_count(&self) -> usize {
        self.tables.read().history.len()
    }
}

fn not_found(table: &str, id: &str) -> Error {
    Error::task_not_found(format!("{} {}", table, id))
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_biz_review(&self, biz: &BizContext) -> Result<String> {
        self.ensure_open("create", "biz_review")?;
        let now = self.now();
        let review = BizReview {
            id: id::generate(prefix::BIZ_REVIEW),
            biz_type: biz.biz_type.clone(),
            biz_id: biz.biz_id.clone(),
            field: biz.field.clone(),
            submitter_id: biz.submitter_id.clone(),
            trace_id: biz.trace_id.clone(),
            decision: Decision::Pending,
            status: ReviewStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let id = review.id.clone();
        self.tables.write().biz_reviews.insert(id.clone(), review);
        Ok(id)
    }

    async fn get_biz_review(&self, id: &str) -> Result<Option<BizReview>> {
        self.ensure_open("get", "biz_review")?;
        Ok(self.tables.read().biz_reviews.get(id).cloned())
    }

    async fn update_biz_decision(&self, id: &str, decision: Decision) -> Result<bool> {
        self.ensure_open("update", "biz_review")?;
        let now = self.now();
        let mut tables = self.tables.write();
        let review = tables
            .biz_reviews
            .get_mut(id)
            .ok_or_else(|| not_found("biz_review", id))?;
        if review.decision == decision {
            return Ok(false);
        }
        review.decision = decision;
        review.updated_at = now;
        Ok(true)
    }

    async fn update_biz_status(&self, id: &str, status: ReviewStatus) -> Result<()> {
        self.ensure_open("update", "biz_review")?;
        let now = self.now();
        let mut tables = self.tables.write();
        let review = tables
            .biz_reviews
            .get_mut(id)
            .ok_or_else(|| not_found("biz_review", id))?;
        review.status = status;
        review.updated_at = now;
        Ok(())
    }

    async fn create_resource_review(&self, biz_review_id: &str, resource: &Resource) -> Result<String> {
        self.ensure_open("create", "resource_review")?;
        let now = self.now();
        let review = ResourceReview {
            id: id::generate(prefix::RESOURCE_REVIEW),
            biz_review_id: biz_review_id.to_string(),
            resource_id: resource.resource_id.clone(),
            resource_type: resource.resource_type,
            content_hash: resource.content_hash.clone(),
            content_text: resource.content_text.clone(),
            content_url: resource.content_url.clone(),
            decision: Decision::Pending,
            outcome_json: String::new(),
            created_at: now,
            updated_at: now,
        };
        let id = review.id.clone();

        let mut tables = self.tables.write();
        tables
            .resources_by_biz
            .entry(biz_review_id.to_string())
            .or_default()
            .push(id.clone());
        tables.resource_reviews.insert(id.clone(), review);
        Ok(id)
    }

    async fn get_resource_review(&self, id: &str) -> Result<Option<ResourceReview>> {
        self.ensure_open("get", "resource_review")?;
        Ok(self.tables.read().resource_reviews.get(id).cloned())
    }

    async fn update_resource_outcome(&self, id: &str, outcome: &FinalOutcome) -> Result<()> {
        self.ensure_open("update", "resource_review")?;
        let outcome_json = serde_json::to_string(outcome)?;
        let now = self.now();
        let mut tables = self.tables.write();
        let review = tables
            .resource_reviews
            .get_mut(id)
            .ok_or_else(|| not_found("resource_review", id))?;
        review.decision = outcome.decision;
        review.outcome_json = outcome_json;
        review.updated_at = now;
        Ok(())
    }

    async fn list_resource_reviews(&self, biz_review_id: &str) -> Result<Vec<ResourceReview>> {
        self.ensure_open("list", "resource_review")?;
        let tables = self.tables.read();
        Ok(tables
            .resources_by_biz
            .get(biz_review_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.resource_reviews.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_provider_task(
        &self,
        resource_review_id: &str,
        provider: &str,
        mode: Mode,
        remote_task_id: &str,
        raw: &HashMap<String, Value>,
    ) -> Result<String> {
        self.ensure_open("create", "provider_task")?;
        let raw_json = serde_json::to_string(raw)?;
        let now = self.now();
        let task = ProviderTask {
            id: id::generate(prefix::PROVIDER_TASK),
            resource_review_id: resource_review_id.to_string(),
            provider: provider.to_string(),
            mode,
            remote_task_id: remote_task_id.to_string(),
            done: false,
            result_json: String::new(),
            raw_json,
            created_at: now,
            updated_at: now,
        };
        let id = task.id.clone();

        let mut tables = self.tables.write();
        tables.task_order.push(id.clone());
        tables.provider_tasks.insert(id.clone(), task);
        Ok(id)
    }

    async fn get_provider_task(&self, id: &str) -> Result<Option<ProviderTask>> {
        self.ensure_open("get", "provider_task")?;
        Ok(self.tables.read().provider_tasks.get(id).cloned())
    }

    async fn get_provider_task_by_remote_id(
        &self,
        provider: &str,
        remote_task_id: &str,
    ) -> Result<Option<ProviderTask>> {
        self.ensure_open("get", "provider_task")?;
        Ok(self
            .tables
            .read()
            .provider_tasks
            .values()
            .find(|t| t.provider == provider && t.remote_task_id == remote_task_id)
            .cloned())
    }

    async fn update_provider_task_result(
        &self,
        id: &str,
        done: bool,
        result: Option<&ReviewResult>,
        raw: &HashMap<String, Value>,
    ) -> Result<bool> {
        self.ensure_open("update", "provider_task")?;
        let result_json = result.map(serde_json::to_string).transpose()?;
        let raw_json = serde_json::to_string(raw)?;
        let now = self.now();

        let mut tables = self.tables.write();
        let task = tables
            .provider_tasks
            .get_mut(id)
            .ok_or_else(|| not_found("provider_task", id))?;

        if task.done {
            debug!(task_id = %id, "Ignoring result for completed task");
            return Ok(false);
        }

        if let Some(json) = result_json {
            task.result_json = json;
        }
        task.raw_json = raw_json;
        task.done = done;
        task.updated_at = now;
        Ok(done)
    }

    async fn list_pending_async_tasks(&self, provider: &str, limit: usize) -> Result<Vec<PendingTask>> {
        self.ensure_open("list", "provider_task")?;
        let tables = self.tables.read();
        Ok(tables
            .task_order
            .iter()
            .filter_map(|id| tables.provider_tasks.get(id))
            .filter(|t| t.provider == provider && !t.done && t.mode == Mode::Async)
            .take(limit)
            .map(|t| PendingTask {
                provider_task_id: t.id.clone(),
                provider: t.provider.clone(),
                remote_task_id: t.remote_task_id.clone(),
            })
            .collect())
    }

    async fn get_binding(
        &self,
        biz_type: &BizType,
        biz_id: &str,
        field: &str,
    ) -> Result<Option<CensorBinding>> {
        self.ensure_open("get", "censor_binding")?;
        let key = (biz_type.clone(), biz_id.to_string(), field.to_string());
        Ok(self.tables.read().bindings.get(&key).cloned())
    }

    async fn upsert_binding(&self, mut binding: CensorBinding) -> Result<()> {
        self.ensure_open("upsert", "censor_binding")?;
        binding.updated_at = self.now();

        let key = (
            binding.biz_type.clone(),
            binding.biz_id.clone(),
            binding.field.clone(),
        );
        let mut tables = self.tables.write();
        // The row keeps its identity across upserts
        match tables.bindings.get(&key) {
            Some(existing) => binding.id = existing.id.clone(),
            None if binding.id.is_empty() => binding.id = id::generate(prefix::BINDING),
            None => {}
        }
        tables.bindings.insert(key, binding);
        Ok(())
    }

    async fn list_bindings_by_biz(&self, biz_type: &BizType, biz_id: &str) -> Result<Vec<CensorBinding>> {
        self.ensure_open("list", "censor_binding")?;
        let mut bindings: Vec<CensorBinding> = self
            .tables
            .read()
            .bindings
            .values()
            .filter(|b| &b.biz_type == biz_type && b.biz_id == biz_id)
            .cloned()
            .collect();
        bindings.sort_by(|a, b| a.field.cmp(&b.field));
        Ok(bindings)
    }

    async fn create_binding_history(&self, mut history: CensorBindingHistory) -> Result<()> {
        self.ensure_open("create", "censor_binding_history")?;
        if history.id.is_empty() {
            history.id = id::generate(prefix::BINDING_HISTORY);
        }
        self.tables.write().history.push(history);
        Ok(())
    }

    async fn list_binding_history(
        &self,
        biz_type: &BizType,
        biz_id: &str,
        field: &str,
        limit: usize,
    ) -> Result<Vec<CensorBindingHistory>> {
        self.ensure_open("list", "censor_binding_history")?;
        let mut rows: Vec<CensorBindingHistory> = self
            .tables
            .read()
            .history
            .iter()
            .filter(|h| &h.biz_type == biz_type && h.biz_id == biz_id && h.field == field)
            .cloned()
            .collect();
        // Stable sort keeps insertion order between equal revisions
        rows.reverse();
        rows.sort_by(|a, b| b.review_revision.cmp(&a.review_revision));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn save_violation_snapshot(
        &self,
        biz: &BizContext,
        resource: &Resource,
        outcome: &FinalOutcome,
    ) -> Result<String> {
        self.ensure_open("create", "violation_snapshot")?;
        let snapshot = ViolationSnapshot {
            id: id::generate(prefix::SNAPSHOT),
            biz_type: biz.biz_type.clone(),
            biz_id: biz.biz_id.clone(),
            field: biz.field.clone(),
            resource_id: resource.resource_id.clone(),
            resource_type: resource.resource_type,
            content_hash: resource.content_hash.clone(),
            content_text: resource.content_text.clone(),
            content_url: resource.content_url.clone(),
            outcome_json: serde_json::to_string(outcome)?,
            created_at: self.now(),
        };
        let id = snapshot.id.clone();

        let mut tables = self.tables.write();
        tables.snapshot_order.push(id.clone());
        tables.snapshots.insert(id.clone(), snapshot);
        Ok(id)
    }

    async fn get_violation_snapshot(&self, id: &str) -> Result<Option<ViolationSnapshot>> {
        self.ensure_open("get", "violation_snapshot")?;
        Ok(self.tables.read().snapshots.get(id).cloned())
    }

    async fn list_violations_by_biz(
        &self,
        biz_type: &BizType,
        biz_id: &str,
        limit: usize,
    ) -> Result<Vec<ViolationSnapshot>> {
        self.ensure_open("list", "violation_snapshot")?;
        let tables = self.tables.read();
        Ok(tables
            .snapshot_order
            .iter()
            .rev()
            .filter_map(|id| tables.snapshots.get(id))
            .filter(|s| &s.biz_type == biz_type && s.biz_id == biz_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Transactions are serialized. A rollback restores every table to its
    /// state at the start of the transaction, which also discards writes made
    /// concurrently outside it. Must not be nested.
    async fn with_tx(&self, f: TxFn<'_>) -> Result<()> {
        self.ensure_open("begin", "tx")?;
        let _guard = self.tx_lock.lock().await;
        let snapshot = self.tables.read().clone();

        let result = f(self).await;
        if let Err(e) = &result {
            warn!(error = %e, "Rolling back transaction");
            *self.tables.write() = snapshot;
        }
        result
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_open("ping", "store")
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
