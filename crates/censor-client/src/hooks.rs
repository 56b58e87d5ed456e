//! Hooks for reacting to review events
//!
//! Hooks are a best-effort side channel. The client logs a failing hook and
//! carries on; it never rolls back committed state because of one.

use async_trait::async_trait;
use censor_core::{BizContext, Decision, FinalOutcome, Resource, Result, ReviewResult};
use censor_policy::UnifiedList;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// A business object's aggregate decision changed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BizDecisionChangedEvent {
    pub biz: BizContext,

    /// Resource that triggered the change
    pub resource: Resource,

    pub outcome: FinalOutcome,

    /// Decision before this change
    pub previous_decision: Decision,

    pub biz_review_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_review_id: String,

    #[serde(default)]
    pub violations: UnifiedList,

    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
}

impl BizDecisionChangedEvent {
    pub fn change(&self) -> DecisionChange {
        DecisionChange::new(self.previous_decision, self.outcome.decision)
    }
}

/// A single resource review completed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceReviewedEvent {
    pub resource: Resource,
    pub biz: BizContext,
    pub result: ReviewResult,
    pub outcome: FinalOutcome,

    /// Provider that produced the result
    pub provider: String,

    pub biz_review_id: String,
    pub resource_review_id: String,
    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Violating content was found
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationDetectedEvent {
    pub resource: Resource,
    pub biz: BizContext,
    pub violations: UnifiedList,

    /// Evidence snapshot, when one was saved
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub snapshot_id: String,

    pub provider: String,
    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
}

/// An automatic result needs a human decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualReviewRequiredEvent {
    pub resource: Resource,
    pub biz: BizContext,

    /// Automatic result that asked for review
    pub auto_result: ReviewResult,

    /// Higher is more urgent
    pub priority: i32,

    /// When the automatic decision stands if nobody reviews
    pub expires_at: DateTime<Utc>,

    pub biz_review_id: String,
    pub resource_review_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub manual_task_id: String,

    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A decision transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionChange {
    pub from: Decision,
    pub to: Decision,
}

impl DecisionChange {
    pub fn new(from: Decision, to: Decision) -> Self {
        Self { from, to }
    }

    /// The decision became stricter
    pub fn is_escalation(&self) -> bool {
        self.to.severity() > self.from.severity()
    }

    /// The decision became more lenient
    pub fn is_deescalation(&self) -> bool {
        self.to.severity() < self.from.severity()
    }
}

/// Receiver of review events
#[async_trait]
pub trait Hooks: Send + Sync {
    async fn on_biz_decision_changed(&self, _event: &BizDecisionChangedEvent) -> Result<()> {
        Ok(())
    }

    async fn on_resource_reviewed(&self, _event: &ResourceReviewedEvent) -> Result<()> {
        Ok(())
    }

    async fn on_violation_detected(&self, _event: &ViolationDetectedEvent) -> Result<()> {
        Ok(())
    }

    async fn on_manual_review_required(&self, _event: &ManualReviewRequiredEvent) -> Result<()> {
        Ok(())
    }
}

/// Ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NopHooks;

impl Hooks for NopHooks {}

/// Runs hooks in order, stopping at the first error
#[derive(Clone, Default)]
pub struct ChainHooks {
    hooks: Vec<Arc<dyn Hooks>>,
}

impl ChainHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks.push(hooks);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

#[async_trait]
impl Hooks for ChainHooks {
    async fn on_biz_decision_changed(&self, event: &BizDecisionChangedEvent) -> Result<()> {
        for hooks in &self.hooks {
            hooks.on_biz_decision_changed(event).await?;
        }
        Ok(())
    }

    async fn on_resource_reviewed(&self, event: &ResourceReviewedEvent) -> Result<()> {
        for hooks in &self.hooks {
            hooks.on_resource_reviewed(event).await?;
        }
        Ok(())
    }

    async fn on_violation_detected(&self, event: &ViolationDetectedEvent) -> Result<()> {
        for hooks in &self.hooks {
            hooks.on_violation_detected(event).await?;
        }
        Ok(())
    }

    async fn on_manual_review_required(&self, event: &ManualReviewRequiredEvent) -> Result<()> {
        for hooks in &self.hooks {
            hooks.on_manual_review_required(event).await?;
        }
        Ok(())
    }
}

type HookFn<E> = Arc<dyn Fn(&E) -> Result<()> + Send + Sync>;

/// Hooks built from closures; unset events are ignored
#[derive(Clone, Default)]
pub struct FnHooks {
    biz_decision_changed: Option<HookFn<BizDecisionChangedEvent>>,
    resource_reviewed: Option<HookFn<ResourceReviewedEvent>>,
    violation_detected: Option<HookFn<ViolationDetectedEvent>>,
    manual_review_required: Option<HookFn<ManualReviewRequiredEvent>>,
}

impl FnHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_biz_decision_changed(
        mut self,
        f: impl Fn(&BizDecisionChangedEvent) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.biz_decision_changed = Some(Arc::new(f));
        self
    }

    pub fn on_resource_reviewed(
        mut self,
        f: impl Fn(&ResourceReviewedEvent) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.resource_reviewed = Some(Arc::new(f));
        self
    }

    pub fn on_violation_detected(
        mut self,
        f: impl Fn(&ViolationDetectedEvent) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.violation_detected = Some(Arc::new(f));
        self
    }

    pub fn on_manual_review_required(
        mut self,
        f: impl Fn(&ManualReviewRequiredEvent) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.manual_review_required = Some(Arc::new(f));
        self
    }
}

#[async_trait]
impl Hooks for FnHooks {
    async fn on_biz_decision_changed(&self, event: &BizDecisionChangedEvent) -> Result<()> {
        self.biz_decision_changed.as_ref().map_or(Ok(()), |f| f(event))
    }

    async fn on_resource_reviewed(&self, event: &ResourceReviewedEvent) -> Result<()> {
        self.resource_reviewed.as_ref().map_or(Ok(()), |f| f(event))
    }

    async fn on_violation_detected(&self, event: &ViolationDetectedEvent) -> Result<()> {
        self.violation_detected.as_ref().map_or(Ok(()), |f| f(event))
    }

    async fn on_manual_review_required(&self, event: &ManualReviewRequiredEvent) -> Result<()> {
        self.manual_review_required.as_ref().map_or(Ok(()), |f| f(event))
    }
}

/// Logs every event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHooks;

#[async_trait]
impl Hooks for TracingHooks {
    async fn on_biz_decision_changed(&self, event: &BizDecisionChangedEvent) -> Result<()> {
        info!(
            biz_type = %event.biz.biz_type,
            biz_id = %event.biz.biz_id,
            biz_review_id = %event.biz_review_id,
            from = %event.previous_decision,
            to = %event.outcome.decision,
            trace_id = %event.trace_id,
            "Biz decision changed"
        );
        Ok(())
    }

    async fn on_resource_reviewed(&self, event: &ResourceReviewedEvent) -> Result<()> {
        info!(
            resource_id = %event.resource.resource_id,
            resource_review_id = %event.resource_review_id,
            provider = %event.provider,
            decision = %event.outcome.decision,
            trace_id = %event.trace_id,
            "Resource reviewed"
        );
        Ok(())
    }

    async fn on_violation_detected(&self, event: &ViolationDetectedEvent) -> Result<()> {
        warn!(
            biz_type = %event.biz.biz_type,
            biz_id = %event.biz.biz_id,
            resource_id = %event.resource.resource_id,
            provider = %event.provider,
            violations = event.violations.len(),
            snapshot_id = %event.snapshot_id,
            "Violation detected"
        );
        Ok(())
    }

    async fn on_manual_review_required(&self, event: &ManualReviewRequiredEvent) -> Result<()> {
        info!(
            resource_review_id = %event.resource_review_id,
            manual_task_id = %event.manual_task_id,
            priority = event.priority,
            expires_at = %event.expires_at,
            "Manual review required"
        );
        Ok(())
    }
}
