//! Moderation client
//!
//! Owns the store, the hooks, and the provider pipeline. Every review,
//! synchronous or not, ends in the same place: the resource outcome is
//! persisted, violations update the field binding, and the business
//! decision is re-aggregated from all resource reviews.

use crate::config::ClientConfig;
use crate::hooks::{
    BizDecisionChangedEvent, Hooks, ManualReviewRequiredEvent, NopHooks, ResourceReviewedEvent,
    ViolationDetectedEvent,
};
use crate::pipeline::{PipelineExecutor, PipelineOutput};
use censor_core::textmerge::merge_texts;
use censor_core::{
    BindingChange, BizContext, BizReview, BizType, CensorBinding, CensorBindingHistory, Decision,
    Error, FinalOutcome, HistorySource, Mode, ProviderTask, Reason, ReplacePolicy, Resource,
    ResourceReview, Result, ReviewResult, ReviewStatus, ViolationSnapshot,
};
use censor_policy::{
    merge_violations, ReviewRequirements, TranslationContext, UnifiedList, UnifiedScene,
};
use censor_providers::{manual, Provider, ProviderRegistry, RawMap, SubmitRequest};
use censor_store::{tx, Store};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Field name used for the merged part of a field submission
pub const MERGED_FIELD: &str = "_merged_";

/// How long an unreviewed manual task stays valid when the provider does not say
const DEFAULT_MANUAL_EXPIRY_HOURS: i64 = 24;

/// Content submitted for review
#[derive(Debug, Clone)]
pub struct SubmitInput {
    pub biz: BizContext,
    pub resources: Vec<Resource>,

    /// Scenes to detect; empty uses the business type's requirements
    pub scenes: Vec<UnifiedScene>,

    /// Merge text resources into a single submission
    pub enable_text_merge: bool,

    /// Manual review priority; derived from the business type when unset
    pub priority: Option<i32>,
}

impl SubmitInput {
    pub fn new(biz: BizContext, resources: Vec<Resource>) -> Self {
        Self {
            biz,
            resources,
            scenes: Vec::new(),
            enable_text_merge: false,
            priority: None,
        }
    }

    pub fn with_scenes(mut self, scenes: impl IntoIterator<Item = UnifiedScene>) -> Self {
        self.scenes = scenes.into_iter().collect();
        self
    }

    pub fn with_text_merge(mut self) -> Self {
        self.enable_text_merge = true;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Result of [`Client::submit`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitResult {
    pub biz_review_id: String,

    /// Resource ID → resource review ID
    pub resource_review_ids: HashMap<String, String>,

    /// Resource ID → outcome, for everything decided synchronously
    pub immediate_results: HashMap<String, FinalOutcome>,

    /// Some resource waits for an async provider or a human
    pub pending_async: bool,
}

impl SubmitResult {
    fn new(biz_review_id: String) -> Self {
        Self {
            biz_review_id,
            ..Default::default()
        }
    }

    /// Strictest immediate decision, `Pending` when nothing was decided
    pub fn overall_decision(&self) -> Decision {
        if self.immediate_results.is_empty() {
            return Decision::Pending;
        }
        self.immediate_results
            .values()
            .fold(Decision::Pass, |acc, o| acc.stricter(o.decision))
    }
}

/// Current state of a business review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub biz_review: BizReview,
    pub resource_reviews: Vec<ResourceReview>,

    /// No resource review is pending
    pub all_complete: bool,

    /// Strictest resource outcome, once complete
    pub final_outcome: Option<FinalOutcome>,
}

/// Which path delivered an async result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSource {
    Callback,
    Poller,
}

impl CompletionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Callback => "callback",
            Self::Poller => "poller",
        }
    }
}

/// A decision applied to a binding from outside the automatic pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionInput {
    pub biz_type: BizType,
    pub biz_id: String,
    #[serde(default)]
    pub field: String,

    pub decision: Decision,

    #[serde(default)]
    pub replace_policy: ReplacePolicy,
    #[serde(default)]
    pub replace_value: String,

    /// Manual, appeal, recheck, or policy upgrade
    pub source: HistorySource,

    #[serde(default)]
    pub reviewer_id: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub reasons: Vec<Reason>,
}

/// Builder for [`Client`]
#[derive(Default)]
pub struct ClientBuilder {
    store: Option<Arc<dyn Store>>,
    hooks: Option<Arc<dyn Hooks>>,
    registry: ProviderRegistry,
    requirements: Option<ReviewRequirements>,
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn Hooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.registry.register(provider);
        self
    }

    pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_requirements(mut self, requirements: ReviewRequirements) -> Self {
        self.requirements = Some(requirements);
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the client; a store is required
    pub fn build(self) -> Result<Client> {
        let store = self.store.ok_or(Error::StoreNotConfigured)?;

        if let Some(name) = &self.config.manual_provider {
            if !self.registry.contains(name) {
                return Err(Error::ProviderNotFound(name.clone()));
            }
        }

        Ok(Client {
            store,
            hooks: self.hooks.unwrap_or_else(|| Arc::new(NopHooks)),
            pipeline: PipelineExecutor::new(self.registry, self.config.pipeline.clone()),
            requirements: Arc::new(self.requirements.unwrap_or_default()),
            config: Arc::new(self.config),
        })
    }
}

/// The moderation client
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn Store>,
    hooks: Arc<dyn Hooks>,
    pipeline: PipelineExecutor,
    requirements: Arc<ReviewRequirements>,
    config: Arc<ClientConfig>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &ProviderRegistry {
        self.pipeline.registry()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn requirements(&self) -> &ReviewRequirements {
        &self.requirements
    }

    /// Submit content for review.
    ///
    /// Fails only on setup problems: no resources or a store failure while
    /// creating records. A provider failure becomes an `error` outcome for
    /// that resource and the remaining resources are still reviewed.
    pub async fn submit(&self, input: SubmitInput) -> Result<SubmitResult> {
        if input.resources.is_empty() {
            return Err(Error::NoResources);
        }
        metrics::counter!("censor_submissions_total").increment(1);

        let biz = &input.biz;
        let scenes = if input.scenes.is_empty() {
            self.requirements.scenes_for(&biz.biz_type)
        } else {
            input.scenes.clone()
        };

        let biz_review_id = self.store.create_biz_review(biz).await?;
        self.store
            .update_biz_status(&biz_review_id, ReviewStatus::Running)
            .await?;

        let resources = if input.enable_text_merge {
            self.merge_text_resources(input.resources.clone())
        } else {
            input.resources.clone()
        };

        let mut result = SubmitResult::new(biz_review_id.clone());
        let mut violation_lists: Vec<UnifiedList> = Vec::new();

        for mut resource in resources {
            resource.ensure_hash();
            let resource_id = resource.resource_id.clone();

            if self.config.dedup.enabled {
                if let Some(binding) = self.check_dedup(biz, &resource).await {
                    let outcome = binding_outcome(&binding);
                    let review_id = self
                        .store
                        .create_resource_review(&biz_review_id, &resource)
                        .await?;
                    self.store.update_resource_outcome(&review_id, &outcome).await?;
                    debug!(
                        resource_id = %resource_id,
                        binding_review_id = %binding.review_id,
                        decision = %outcome.decision,
                        "Content already reviewed, reusing bound decision"
                    );
                    metrics::counter!("censor_dedup_hits_total").increment(1);
                    result.resource_review_ids.insert(resource_id.clone(), review_id);
                    result.immediate_results.insert(resource_id, outcome);
                    continue;
                }
            }

            let review_id = self
                .store
                .create_resource_review(&biz_review_id, &resource)
                .await?;
            result
                .resource_review_ids
                .insert(resource_id.clone(), review_id.clone());

            let mut req = SubmitRequest::new(resource.clone(), biz.clone()).with_scenes(scenes.clone());
            if let Some(timeout) = self.config.provider_timeout() {
                req = req.with_timeout(timeout);
            }

            let output = match self.pipeline.execute(req).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(resource_id = %resource_id, error = %e, "Pipeline failed for resource");
                    let outcome = self.record_error(&review_id, &e).await;
                    result.immediate_results.insert(resource_id, outcome);
                    continue;
                }
            };

            self.create_provider_tasks(&review_id, &output).await?;
            metrics::histogram!("censor_pipeline_latency_us").record(output.latency_us as f64);

            let outcome = match (output.is_complete(), &output.final_outcome) {
                (true, Some(outcome)) => outcome.clone(),
                _ => {
                    result.pending_async = true;
                    continue;
                }
            };

            self.store.update_resource_outcome(&review_id, &outcome).await?;
            metrics::counter!("censor_resource_decisions_total", "decision" => outcome.decision.as_str())
                .increment(1);

            if outcome.decision.is_violation() {
                let snapshot_id = match self
                    .handle_violation(biz, &resource, &outcome, &review_id, HistorySource::Auto)
                    .await
                {
                    Ok(id) => id,
                    Err(e) => {
                        warn!(resource_id = %resource_id, error = %e, "Failed to record violation");
                        String::new()
                    }
                };
                self.fire_violation_detected(ViolationDetectedEvent {
                    resource: resource.clone(),
                    biz: biz.clone(),
                    violations: output.violations.clone(),
                    snapshot_id,
                    provider: self.config.pipeline.primary.clone(),
                    trace_id: biz.trace_id.clone(),
                    timestamp: Utc::now(),
                })
                .await;
            }

            let auto_result = output.review_result();
            self.fire_resource_reviewed(ResourceReviewedEvent {
                resource: resource.clone(),
                biz: biz.clone(),
                result: auto_result.clone(),
                outcome: outcome.clone(),
                provider: self.config.pipeline.primary.clone(),
                biz_review_id: biz_review_id.clone(),
                resource_review_id: review_id.clone(),
                trace_id: biz.trace_id.clone(),
                timestamp: Utc::now(),
            })
            .await;

            if outcome.decision == Decision::Review {
                let target = ManualTarget {
                    biz,
                    resource: &resource,
                    biz_review_id: &biz_review_id,
                    resource_review_id: &review_id,
                };
                match self.request_manual_review(target, auto_result, input.priority).await {
                    Ok(true) => result.pending_async = true,
                    Ok(false) => {}
                    Err(e) => warn!(resource_id = %resource_id, error = %e, "Failed to request manual review"),
                }
            }

            violation_lists.push(output.violations);
            result.immediate_results.insert(resource_id, outcome);
        }

        let violations = merge_violations(violation_lists.iter());
        self.aggregate_biz_decision(&biz_review_id, biz, violations).await?;

        info!(
            biz_type = %biz.biz_type,
            biz_id = %biz.biz_id,
            biz_review_id = %biz_review_id,
            resources = result.resource_review_ids.len(),
            pending_async = result.pending_async,
            "Submission processed"
        );
        Ok(result)
    }

    /// Current state of a business review, optionally narrowed to one resource review
    pub async fn query(
        &self,
        biz_review_id: &str,
        resource_review_id: Option<&str>,
    ) -> Result<QueryResult> {
        let biz_review = self
            .store
            .get_biz_review(biz_review_id)
            .await?
            .ok_or_else(|| Error::task_not_found(format!("biz review {}", biz_review_id)))?;

        let mut resource_reviews = self.store.list_resource_reviews(biz_review_id).await?;
        if let Some(id) = resource_review_id {
            resource_reviews.retain(|r| r.id == id);
        }

        let all_complete = resource_reviews.iter().all(|r| !r.decision.is_pending());
        let final_outcome = if all_complete {
            strictest_review(&resource_reviews)
                .map(|r| r.outcome())
                .transpose()?
                .flatten()
        } else {
            None
        };

        Ok(QueryResult {
            biz_review,
            resource_reviews,
            all_complete,
            final_outcome,
        })
    }

    /// Handle a provider callback delivery
    pub async fn handle_callback(
        &self,
        provider_name: &str,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> Result<()> {
        let provider = self.registry().require(provider_name)?;
        provider.verify_callback(headers, body).await?;
        let data = provider.parse_callback(body).await?;

        let task = self
            .store
            .get_provider_task_by_remote_id(provider_name, &data.task_id)
            .await?
            .ok_or_else(|| {
                Error::task_not_found(format!("{} task {}", provider_name, data.task_id))
            })?;

        let processed = self
            .complete_provider_task(&task, data.done, data.result, &data.raw, CompletionSource::Callback)
            .await?;
        debug!(
            provider = %provider_name,
            task_id = %data.task_id,
            done = data.done,
            processed,
            "Callback handled"
        );
        Ok(())
    }

    /// Record an async provider result.
    ///
    /// Returns true when this call completed the task. A task that is
    /// already done is left alone, so callback and poller deliveries of the
    /// same result are processed once.
    pub async fn complete_provider_task(
        &self,
        task: &ProviderTask,
        done: bool,
        result: Option<ReviewResult>,
        raw: &RawMap,
        source: CompletionSource,
    ) -> Result<bool> {
        let transitioned = self
            .store
            .update_provider_task_result(&task.id, done, result.as_ref(), raw)
            .await?;
        if !transitioned {
            return Ok(false);
        }

        self.process_async_completion(task, result).await?;
        metrics::counter!("censor_async_completions_total", "source" => source.as_str()).increment(1);
        Ok(true)
    }

    async fn process_async_completion(
        &self,
        task: &ProviderTask,
        result: Option<ReviewResult>,
    ) -> Result<()> {
        let review = self
            .store
            .get_resource_review(&task.resource_review_id)
            .await?
            .ok_or_else(|| Error::task_not_found(format!("resource review {}", task.resource_review_id)))?;
        let biz_review = self
            .store
            .get_biz_review(&review.biz_review_id)
            .await?
            .ok_or_else(|| Error::task_not_found(format!("biz review {}", review.biz_review_id)))?;

        let biz = biz_context(&biz_review);
        let resource = review.to_resource();

        let (outcome, violations, result) = match result {
            Some(result) => {
                let (outcome, violations) = self.outcome_from_result(&task.provider, &biz, &resource, &result);
                (outcome, violations, result)
            }
            None => {
                let message = format!("{} completed without a result", task.provider);
                (
                    FinalOutcome::from_error(&message),
                    UnifiedList::new(),
                    ReviewResult::new(task.provider.clone(), Decision::Error, 0.0),
                )
            }
        };

        self.store.update_resource_outcome(&review.id, &outcome).await?;
        metrics::counter!("censor_resource_decisions_total", "decision" => outcome.decision.as_str())
            .increment(1);

        let history_source = if self.config.manual_provider.as_deref() == Some(task.provider.as_str()) {
            HistorySource::Manual
        } else {
            HistorySource::Auto
        };

        if outcome.decision.is_violation() {
            let snapshot_id = match self
                .handle_violation(&biz, &resource, &outcome, &review.id, history_source)
                .await
            {
                Ok(id) => id,
                Err(e) => {
                    warn!(resource_review_id = %review.id, error = %e, "Failed to record violation");
                    String::new()
                }
            };
            self.fire_violation_detected(ViolationDetectedEvent {
                resource: resource.clone(),
                biz: biz.clone(),
                violations: violations.clone(),
                snapshot_id,
                provider: task.provider.clone(),
                trace_id: biz.trace_id.clone(),
                timestamp: Utc::now(),
            })
            .await;
        } else if let Err(e) = self
            .resolve_bound_content(&biz, &resource, &outcome, &review.id, history_source)
            .await
        {
            warn!(resource_review_id = %review.id, error = %e, "Failed to update binding");
        }

        self.fire_resource_reviewed(ResourceReviewedEvent {
            resource,
            biz: biz.clone(),
            result,
            outcome,
            provider: task.provider.clone(),
            biz_review_id: review.biz_review_id.clone(),
            resource_review_id: review.id.clone(),
            trace_id: biz.trace_id.clone(),
            timestamp: Utc::now(),
        })
        .await;

        self.aggregate_biz_decision(&review.biz_review_id, &biz, violations).await
    }

    /// Outcome for one provider result: translated violations set the
    /// replace policy and risk, the provider's own decision stands.
    fn outcome_from_result(
        &self,
        provider: &str,
        biz: &BizContext,
        resource: &Resource,
        result: &ReviewResult,
    ) -> (FinalOutcome, UnifiedList) {
        let ctx = TranslationContext::new(resource.resource_type, biz.biz_type.clone());
        let violations = self
            .pipeline
            .translate(&ctx, provider, &result.reasons)
            .unwrap_or_default();

        let mut outcome = if violations.is_empty() {
            FinalOutcome::new(result.decision)
        } else {
            violations.decide_outcome()
        };
        outcome.decision = result.decision;
        outcome.reasons = result.reasons.clone();
        (outcome, violations)
    }

    /// Re-aggregate the business decision from its resource reviews
    async fn aggregate_biz_decision(
        &self,
        biz_review_id: &str,
        biz: &BizContext,
        violations: UnifiedList,
    ) -> Result<()> {
        let reviews = self.store.list_resource_reviews(biz_review_id).await?;
        let decision = aggregate_decision(&reviews);

        let previous = self
            .store
            .get_biz_review(biz_review_id)
            .await?
            .map(|b| b.decision)
            .unwrap_or_default();

        let changed = self.store.update_biz_decision(biz_review_id, decision).await?;
        if !decision.is_pending() {
            self.store
                .update_biz_status(biz_review_id, ReviewStatus::Done)
                .await?;
        }

        if changed {
            let strictest = strictest_review(&reviews);
            let mut outcome = match strictest.map(|r| r.outcome()) {
                Some(Ok(Some(outcome))) => outcome,
                _ => FinalOutcome::default(),
            };
            outcome.decision = decision;

            self.fire_biz_decision_changed(BizDecisionChangedEvent {
                biz: biz.clone(),
                resource: strictest.map(|r| r.to_resource()).unwrap_or_else(|| Resource::text("", "")),
                outcome,
                previous_decision: previous,
                biz_review_id: biz_review_id.to_string(),
                resource_review_id: strictest.map(|r| r.id.clone()).unwrap_or_default(),
                violations,
                trace_id: biz.trace_id.clone(),
                timestamp: Utc::now(),
            })
            .await;
        }
        Ok(())
    }

    /// Merge text resources into one, keeping non-text resources as they are.
    ///
    /// Texts beyond the merge budget stay separate resources.
    fn merge_text_resources(&self, resources: Vec<Resource>) -> Vec<Resource> {
        let (texts, others): (Vec<Resource>, Vec<Resource>) =
            resources.into_iter().partition(Resource::is_text);
        if texts.len() <= 1 {
            return texts.into_iter().chain(others).collect();
        }

        let contents: Vec<&str> = texts.iter().map(|r| r.content_text.as_str()).collect();
        let Some(merged) = merge_texts(&contents, &self.config.text_merge) else {
            return texts.into_iter().chain(others).collect();
        };

        let count = merged.parts.len();
        let merged_resource = Resource::text(format!("{}_merged", texts[0].resource_id), merged.merged)
            .with_extra("merged", "true")
            .with_extra("count", count.to_string());

        std::iter::once(merged_resource)
            .chain(texts.into_iter().skip(count))
            .chain(others)
            .collect()
    }

    async fn check_dedup(&self, biz: &BizContext, resource: &Resource) -> Option<CensorBinding> {
        match self.store.get_binding(&biz.biz_type, &biz.biz_id, &biz.field).await {
            Ok(Some(binding))
                if binding.content_hash == resource.content_hash && !binding.decision.is_pending() =>
            {
                Some(binding)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(biz_id = %biz.biz_id, error = %e, "Dedup lookup failed, reviewing again");
                None
            }
        }
    }

    async fn create_provider_tasks(&self, review_id: &str, output: &PipelineOutput) -> Result<()> {
        let primary = &self.config.pipeline.primary;
        let task_id = self
            .store
            .create_provider_task(review_id, primary, output.mode, &output.primary_task_id, &output.primary_raw)
            .await?;
        if let Some(result) = provider_result(output, primary) {
            let mut raw = output.primary_raw.clone();
            raw.insert("pipeline".to_string(), output.to_json());
            self.store
                .update_provider_task_result(&task_id, true, Some(result), &raw)
                .await?;
        }

        // The secondary only runs behind a synchronous primary whose outcome
        // is already final, so its task takes the primary's mode and is closed
        // here even when the secondary itself answered asynchronously.
        if let (Some(secondary), Some(remote_id)) =
            (&self.config.pipeline.secondary, &output.secondary_task_id)
        {
            let task_id = self
                .store
                .create_provider_task(review_id, secondary, output.mode, remote_id, &RawMap::new())
                .await?;
            let mut raw = RawMap::new();
            if let Some(mode) = output.secondary_mode {
                raw.insert("secondary_mode".to_string(), serde_json::json!(mode));
            }
            self.store
                .update_provider_task_result(&task_id, true, provider_result(output, secondary), &raw)
                .await?;
        }
        Ok(())
    }

    async fn record_error(&self, review_id: &str, err: &Error) -> FinalOutcome {
        let outcome = FinalOutcome::from_error(err.to_string());
        if let Err(e) = self.store.update_resource_outcome(review_id, &outcome).await {
            warn!(resource_review_id = %review_id, error = %e, "Failed to record error outcome");
        }
        metrics::counter!("censor_resource_decisions_total", "decision" => Decision::Error.as_str())
            .increment(1);
        outcome
    }

    /// Save evidence and bind the violation to the field; returns the snapshot ID
    async fn handle_violation(
        &self,
        biz: &BizContext,
        resource: &Resource,
        outcome: &FinalOutcome,
        review_id: &str,
        source: HistorySource,
    ) -> Result<String> {
        let snapshot_id = self
            .store
            .save_violation_snapshot(biz, resource, outcome)
            .await?;

        let binding = new_binding(biz, resource, outcome, review_id, Some(snapshot_id.clone()));
        self.commit_binding(binding, &outcome.reasons, source, "", "").await?;
        Ok(snapshot_id)
    }

    /// A clean result for content that is already bound updates the binding
    async fn resolve_bound_content(
        &self,
        biz: &BizContext,
        resource: &Resource,
        outcome: &FinalOutcome,
        review_id: &str,
        source: HistorySource,
    ) -> Result<()> {
        let existing = self
            .store
            .get_binding(&biz.biz_type, &biz.biz_id, &biz.field)
            .await?;
        match existing {
            Some(old) if old.content_hash == resource.content_hash => {
                let binding = new_binding(biz, resource, outcome, review_id, old.violation_ref_id.clone());
                self.commit_binding(binding, &outcome.reasons, source, "", "").await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Upsert a binding and, when it changed, append its history row in
    /// the same transaction.
    async fn commit_binding(
        &self,
        mut binding: CensorBinding,
        reasons: &[Reason],
        source: HistorySource,
        reviewer_id: &str,
        comment: &str,
    ) -> Result<CensorBinding> {
        let existing = self
            .store
            .get_binding(&binding.biz_type, &binding.biz_id, &binding.field)
            .await?;
        let changed = BindingChange::new(existing.as_ref(), &binding).has_changed();

        binding.review_revision = match &existing {
            Some(old) if changed => old.review_revision + 1,
            Some(old) => old.review_revision,
            None => 1,
        };
        if let Some(old) = &existing {
            binding.id = old.id.clone();
        }
        binding.updated_at = self.store.now();

        let history = if changed {
            let reason_json = serde_json::to_string(reasons)?;
            Some(binding.to_history(reason_json, source, reviewer_id, comment, binding.updated_at))
        } else {
            None
        };

        let stored = binding.clone();
        self.store
            .with_tx(tx(move |s| {
                Box::pin(async move {
                    s.upsert_binding(binding).await?;
                    if let Some(history) = history {
                        s.create_binding_history(history).await?;
                    }
                    Ok(())
                })
            }))
            .await?;

        if changed {
            debug!(
                biz_type = %stored.biz_type,
                biz_id = %stored.biz_id,
                field = %stored.field,
                decision = %stored.decision,
                revision = stored.review_revision,
                "Binding updated"
            );
        }
        Ok(stored)
    }

    /// Queue a `review` outcome for human confirmation.
    ///
    /// Returns false when no manual provider is configured.
    async fn request_manual_review(
        &self,
        target: ManualTarget<'_>,
        auto_result: ReviewResult,
        priority: Option<i32>,
    ) -> Result<bool> {
        let Some(name) = self.config.manual_provider.as_deref() else {
            return Ok(false);
        };
        if name == self.config.pipeline.primary {
            return Ok(false);
        }

        let provider = self.registry().require(name)?;
        let resp = provider
            .submit(SubmitRequest::new(target.resource.clone(), target.biz.clone()))
            .await?;
        self.store
            .create_provider_task(target.resource_review_id, name, Mode::Async, &resp.task_id, &resp.raw)
            .await?;

        let expires_at = resp
            .raw
            .get("expires_at")
            .and_then(Value::as_i64)
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(|| Utc::now() + ChronoDuration::hours(DEFAULT_MANUAL_EXPIRY_HOURS));

        self.fire_manual_review_required(ManualReviewRequiredEvent {
            resource: target.resource.clone(),
            biz: target.biz.clone(),
            auto_result,
            priority: priority.unwrap_or_else(|| manual::priority_for(target.biz)),
            expires_at,
            biz_review_id: target.biz_review_id.to_string(),
            resource_review_id: target.resource_review_id.to_string(),
            manual_task_id: resp.task_id,
            trace_id: target.biz.trace_id.clone(),
            timestamp: Utc::now(),
        })
        .await;
        Ok(true)
    }

    // Bindings

    pub async fn get_binding(
        &self,
        biz_type: &BizType,
        biz_id: &str,
        field: &str,
    ) -> Result<Option<CensorBinding>> {
        self.store.get_binding(biz_type, biz_id, field).await
    }

    pub async fn get_bindings(&self, biz_type: &BizType, biz_id: &str) -> Result<Vec<CensorBinding>> {
        self.store.list_bindings_by_biz(biz_type, biz_id).await
    }

    /// Newest revision first
    pub async fn get_binding_history(
        &self,
        biz_type: &BizType,
        biz_id: &str,
        field: &str,
        limit: usize,
    ) -> Result<Vec<CensorBindingHistory>> {
        self.store
            .list_binding_history(biz_type, biz_id, field, limit)
            .await
    }

    pub async fn get_violation_snapshot(&self, id: &str) -> Result<Option<ViolationSnapshot>> {
        self.store.get_violation_snapshot(id).await
    }

    /// Newest first
    pub async fn list_violations(
        &self,
        biz_type: &BizType,
        biz_id: &str,
        limit: usize,
    ) -> Result<Vec<ViolationSnapshot>> {
        self.store.list_violations_by_biz(biz_type, biz_id, limit).await
    }

    /// Apply a manual, appeal, recheck, or policy-upgrade decision to an
    /// existing binding and return the updated binding.
    pub async fn apply_decision(&self, input: DecisionInput) -> Result<CensorBinding> {
        let existing = self
            .store
            .get_binding(&input.biz_type, &input.biz_id, &input.field)
            .await?
            .ok_or_else(|| {
                Error::task_not_found(format!(
                    "binding {}/{}/{}",
                    input.biz_type, input.biz_id, input.field
                ))
            })?;

        let mut binding = existing;
        binding.decision = input.decision;
        binding.replace_policy = input.replace_policy;
        binding.replace_value = input.replace_value;

        let binding = self
            .commit_binding(binding, &input.reasons, input.source, &input.reviewer_id, &input.comment)
            .await?;
        info!(
            biz_type = %binding.biz_type,
            biz_id = %binding.biz_id,
            field = %binding.field,
            decision = %binding.decision,
            revision = binding.review_revision,
            reviewer_id = %input.reviewer_id,
            "Decision applied"
        );
        Ok(binding)
    }

    // Hooks

    async fn fire_biz_decision_changed(&self, event: BizDecisionChangedEvent) {
        if let Err(e) = self.hooks.on_biz_decision_changed(&event).await {
            warn!(hook = "on_biz_decision_changed", biz_review_id = %event.biz_review_id, error = %e, "Hook failed");
        }
    }

    async fn fire_resource_reviewed(&self, event: ResourceReviewedEvent) {
        if let Err(e) = self.hooks.on_resource_reviewed(&event).await {
            warn!(hook = "on_resource_reviewed", resource_review_id = %event.resource_review_id, error = %e, "Hook failed");
        }
    }

    async fn fire_violation_detected(&self, event: ViolationDetectedEvent) {
        if let Err(e) = self.hooks.on_violation_detected(&event).await {
            warn!(hook = "on_violation_detected", resource_id = %event.resource.resource_id, error = %e, "Hook failed");
        }
    }

    async fn fire_manual_review_required(&self, event: ManualReviewRequiredEvent) {
        if let Err(e) = self.hooks.on_manual_review_required(&event).await {
            warn!(hook = "on_manual_review_required", resource_review_id = %event.resource_review_id, error = %e, "Hook failed");
        }
    }
}

/// Where a manual review request belongs
struct ManualTarget<'a> {
    biz: &'a BizContext,
    resource: &'a Resource,
    biz_review_id: &'a str,
    resource_review_id: &'a str,
}

/// `Pending` while any review is pending, else the strictest decision
pub fn aggregate_decision(reviews: &[ResourceReview]) -> Decision {
    if reviews.iter().any(|r| r.decision.is_pending()) {
        return Decision::Pending;
    }
    reviews
        .iter()
        .fold(Decision::Pass, |acc, r| acc.stricter(r.decision))
}

fn strictest_review(reviews: &[ResourceReview]) -> Option<&ResourceReview> {
    reviews
        .iter()
        .reduce(|best, r| if r.decision.severity() > best.decision.severity() { r } else { best })
}

fn provider_result<'a>(output: &'a PipelineOutput, provider: &str) -> Option<&'a ReviewResult> {
    output
        .provider_results
        .iter()
        .find(|(name, _)| name == provider)
        .map(|(_, r)| r)
}

fn binding_outcome(binding: &CensorBinding) -> FinalOutcome {
    FinalOutcome {
        decision: binding.decision,
        replace_policy: binding.replace_policy,
        replace_value: binding.replace_value.clone(),
        ..Default::default()
    }
}

fn new_binding(
    biz: &BizContext,
    resource: &Resource,
    outcome: &FinalOutcome,
    review_id: &str,
    violation_ref_id: Option<String>,
) -> CensorBinding {
    CensorBinding {
        id: String::new(),
        biz_type: biz.biz_type.clone(),
        biz_id: biz.biz_id.clone(),
        field: biz.field.clone(),
        resource_id: resource.resource_id.clone(),
        resource_type: resource.resource_type,
        content_hash: resource.content_hash.clone(),
        review_id: review_id.to_string(),
        decision: outcome.decision,
        replace_policy: outcome.replace_policy,
        replace_value: outcome.replace_value.clone(),
        violation_ref_id,
        review_revision: 0,
        updated_at: Utc::now(),
    }
}

fn biz_context(review: &BizReview) -> BizContext {
    BizContext {
        biz_type: review.biz_type.clone(),
        biz_id: review.biz_id.clone(),
        field: review.field.clone(),
        submitter_id: review.submitter_id.clone(),
        trace_id: review.trace_id.clone(),
        created_at: review.created_at,
    }
}
