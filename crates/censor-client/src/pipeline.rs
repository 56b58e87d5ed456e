//! Provider pipeline
//!
//! Runs the primary provider, conditionally chains the secondary provider,
//! and folds every synchronous result into one [`FinalOutcome`]:
//! - Primary failures fail the whole execution
//! - Secondary failures are recorded and otherwise ignored
//! - Provider labels are translated to unified violations for the
//!   replace policy and risk level, while the decision itself comes from
//!   the configured [`MergePolicy`]

use crate::config::{MergePolicy, PipelineConfig};
use censor_core::{Decision, Error, FinalOutcome, Mode, Reason, Result, ReviewResult};
use censor_policy::{merge_violations, TranslationContext, UnifiedList, UnifiedScene};
use censor_providers::{Provider, ProviderRegistry, SubmitRequest, SubmitResponse};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

/// Result of running the pipeline for one resource
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Mode reported by the primary provider
    pub mode: Mode,

    pub primary_task_id: String,

    /// Raw payload of the primary submission
    pub primary_raw: HashMap<String, Value>,

    pub secondary_task_id: Option<String>,

    /// Mode reported by the secondary provider, when it ran
    pub secondary_mode: Option<Mode>,

    /// Secondary failure; the primary result stands on its own
    pub secondary_error: Option<String>,

    /// Synchronous results keyed by provider, primary first
    pub provider_results: Vec<(String, ReviewResult)>,

    /// Unified violations across all contributing providers
    pub violations: UnifiedList,

    /// Present once every synchronous result is in
    pub final_outcome: Option<FinalOutcome>,

    /// Requested scenes the primary provider does not cover
    pub missing_scenes: Vec<UnifiedScene>,

    pub latency_us: u64,
}

impl PipelineOutput {
    fn new(mode: Mode, primary_task_id: String, primary_raw: HashMap<String, Value>) -> Self {
        Self {
            mode,
            primary_task_id,
            primary_raw,
            secondary_task_id: None,
            secondary_mode: None,
            secondary_error: None,
            provider_results: Vec::new(),
            violations: UnifiedList::new(),
            final_outcome: None,
            missing_scenes: Vec::new(),
            latency_us: 0,
        }
    }

    /// Whether the outcome is already final
    pub fn is_complete(&self) -> bool {
        self.mode == Mode::Sync && self.final_outcome.is_some()
    }

    /// First available provider result, or a pending placeholder
    pub fn review_result(&self) -> ReviewResult {
        self.provider_results
            .first()
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| ReviewResult::new("", Decision::Pending, 0.0))
    }

    /// Provider results and task bookkeeping as stored alongside the task
    pub fn to_json(&self) -> Value {
        let results: serde_json::Map<String, Value> = self
            .provider_results
            .iter()
            .map(|(name, r)| (name.clone(), serde_json::to_value(r).unwrap_or(Value::Null)))
            .collect();

        let mut data = json!({
            "mode": self.mode,
            "primary_task_id": self.primary_task_id,
            "provider_results": results,
        });
        if let Some(id) = &self.secondary_task_id {
            data["secondary_task_id"] = json!(id);
        }
        if let Some(err) = &self.secondary_error {
            data["secondary_error"] = json!(err);
        }
        data
    }
}

/// Executes the configured provider chain
#[derive(Clone)]
pub struct PipelineExecutor {
    registry: ProviderRegistry,
    config: PipelineConfig,
}

impl PipelineExecutor {
    pub fn new(registry: ProviderRegistry, config: PipelineConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline for one resource
    pub async fn execute(&self, req: SubmitRequest) -> Result<PipelineOutput> {
        let start = Instant::now();
        let primary = self.registry.require(&self.config.primary)?;

        let missing_scenes = if req.scenes.is_empty() {
            Vec::new()
        } else {
            primary
                .scene_capability()
                .missing_scenes(&req.scenes, req.resource.resource_type)
        };
        if !missing_scenes.is_empty() {
            warn!(
                provider = %primary.name(),
                resource_id = %req.resource.resource_id,
                missing = ?missing_scenes,
                "Primary provider does not cover every required scene"
            );
        }

        let req_type = req.resource.resource_type;
        let biz_type = req.biz.biz_type.clone();
        let resp = submit_with_timeout(primary.as_ref(), req.clone()).await?;
        let mut output = PipelineOutput::new(resp.mode, resp.task_id, resp.raw);
        output.missing_scenes = missing_scenes;

        if let (Mode::Sync, Some(result)) = (resp.mode, resp.immediate) {
            let decision = result.decision;
            output
                .provider_results
                .push((self.config.primary.clone(), result));

            if self.should_trigger_secondary(decision) {
                if let Err(e) = self.run_secondary(req, &mut output).await {
                    warn!(error = %e, "Secondary provider failed, keeping primary result");
                    output.secondary_error = Some(e.to_string());
                }
            }

            let ctx = TranslationContext::new(req_type, biz_type);
            let (outcome, violations) = self.compute_final_outcome(&ctx, &output.provider_results);
            output.final_outcome = outcome;
            output.violations = violations;
        }

        output.latency_us = start.elapsed().as_micros() as u64;
        debug!(
            provider = %self.config.primary,
            mode = %output.mode,
            complete = output.is_complete(),
            latency_us = output.latency_us,
            "Pipeline executed"
        );
        Ok(output)
    }

    fn should_trigger_secondary(&self, decision: Decision) -> bool {
        self.config.secondary.is_some() && self.config.trigger.should_trigger(decision)
    }

    async fn run_secondary(&self, req: SubmitRequest, output: &mut PipelineOutput) -> Result<()> {
        let Some(name) = &self.config.secondary else {
            return Ok(());
        };
        let secondary = self.registry.require(name)?;

        let resp = submit_with_timeout(secondary.as_ref(), req).await?;
        output.secondary_task_id = Some(resp.task_id);
        output.secondary_mode = Some(resp.mode);

        if let (Mode::Sync, Some(result)) = (resp.mode, resp.immediate) {
            output.provider_results.push((name.clone(), result));
        }
        Ok(())
    }

    /// Fold provider results into a final outcome.
    ///
    /// Returns `None` when no provider answered synchronously.
    pub fn compute_final_outcome(
        &self,
        ctx: &TranslationContext,
        results: &[(String, ReviewResult)],
    ) -> (Option<FinalOutcome>, UnifiedList) {
        if results.is_empty() {
            return (None, UnifiedList::new());
        }

        let mut lists = Vec::with_capacity(results.len());
        let mut reasons: Vec<Reason> = Vec::new();
        for (name, result) in results {
            if let Some(list) = self.translate(ctx, name, &result.reasons) {
                lists.push(list);
            }
            reasons.extend(result.reasons.iter().cloned());
        }

        let violations = merge_violations(lists.iter());
        let mut outcome = violations.decide_outcome();
        outcome.decision = merge_decisions(self.config.merge, results.iter().map(|(_, r)| r.decision));
        outcome.reasons = reasons;
        (Some(outcome), violations)
    }

    /// Translate reasons through a provider's translator, if it has one
    pub fn translate(
        &self,
        ctx: &TranslationContext,
        provider: &str,
        reasons: &[Reason],
    ) -> Option<UnifiedList> {
        let translator = self.registry.get(provider)?.translator()?;
        Some(translator.translate(
            ctx,
            &extract_labels(reasons),
            &extract_scores(reasons),
        ))
    }
}

async fn submit_with_timeout(provider: &dyn Provider, req: SubmitRequest) -> Result<SubmitResponse> {
    match req.timeout {
        Some(limit) => tokio::time::timeout(limit, provider.submit(req))
            .await
            .map_err(|_| Error::Timeout)?,
        None => provider.submit(req).await,
    }
}

/// Combine decisions under a merge policy
pub fn merge_decisions(policy: MergePolicy, decisions: impl IntoIterator<Item = Decision>) -> Decision {
    let decisions: Vec<Decision> = decisions.into_iter().collect();
    match policy {
        MergePolicy::MostStrict => merge_most_strict(&decisions),
        MergePolicy::Majority => merge_majority(&decisions),
        MergePolicy::Any => merge_any(&decisions),
        MergePolicy::All => merge_all(&decisions),
    }
}

fn merge_most_strict(decisions: &[Decision]) -> Decision {
    decisions
        .iter()
        .fold(Decision::Pass, |acc, d| acc.stricter(*d))
}

fn merge_majority(decisions: &[Decision]) -> Decision {
    let mut counts: Vec<(Decision, usize)> = Vec::new();
    for d in decisions {
        match counts.iter_mut().find(|(seen, _)| seen == d) {
            Some((_, n)) => *n += 1,
            None => counts.push((*d, 1)),
        }
    }

    counts
        .into_iter()
        .fold((Decision::Pass, 0), |(best, best_n), (d, n)| {
            if n > best_n || (n == best_n && d.severity() > best.severity()) {
                (d, n)
            } else {
                (best, best_n)
            }
        })
        .0
}

fn merge_any(decisions: &[Decision]) -> Decision {
    decisions
        .iter()
        .copied()
        .find(|d| *d != Decision::Pass)
        .unwrap_or(Decision::Pass)
}

fn merge_all(decisions: &[Decision]) -> Decision {
    if decisions.is_empty() {
        return Decision::Pass;
    }
    if decisions.iter().all(|d| *d == Decision::Block) {
        Decision::Block
    } else if decisions
        .iter()
        .all(|d| matches!(d, Decision::Block | Decision::Review))
    {
        Decision::Review
    } else {
        Decision::Pass
    }
}

/// Reason codes plus hit tags
pub fn extract_labels(reasons: &[Reason]) -> Vec<String> {
    let mut labels = Vec::new();
    for reason in reasons {
        if !reason.code.is_empty() {
            labels.push(reason.code.clone());
        }
        labels.extend(reason.hit_tags.iter().cloned());
    }
    labels
}

/// `raw.score` per reason code
pub fn extract_scores(reasons: &[Reason]) -> HashMap<String, f64> {
    reasons
        .iter()
        .filter_map(|r| {
            r.raw
                .get("score")
                .and_then(Value::as_f64)
                .map(|score| (r.code.clone(), score))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_strict() {
        use Decision::*;
        assert_eq!(merge_decisions(MergePolicy::MostStrict, [Pass, Review, Block]), Block);
        assert_eq!(merge_decisions(MergePolicy::MostStrict, [Pass, Error]), Error);
        assert_eq!(merge_decisions(MergePolicy::MostStrict, []), Pass);
    }

    #[test]
    fn test_majority_breaks_ties_toward_stricter() {
        use Decision::*;
        assert_eq!(merge_decisions(MergePolicy::Majority, [Pass, Pass, Block]), Pass);
        assert_eq!(merge_decisions(MergePolicy::Majority, [Pass, Block]), Block);
        assert_eq!(merge_decisions(MergePolicy::Majority, [Review, Pass, Review, Pass]), Review);
    }

    #[test]
    fn test_any_takes_first_flag() {
        use Decision::*;
        assert_eq!(merge_decisions(MergePolicy::Any, [Pass, Review, Block]), Review);
        assert_eq!(merge_decisions(MergePolicy::Any, [Pass, Pass]), Pass);
    }

    #[test]
    fn test_all_requires_agreement() {
        use Decision::*;
        assert_eq!(merge_decisions(MergePolicy::All, [Block, Block]), Block);
        assert_eq!(merge_decisions(MergePolicy::All, [Block, Review]), Review);
        assert_eq!(merge_decisions(MergePolicy::All, [Block, Pass]), Pass);
        assert_eq!(merge_decisions(MergePolicy::All, []), Pass);
    }

    #[test]
    fn test_label_and_score_extraction() {
        let reasons = vec![
            Reason::new("porn", "x")
                .with_hit_tags(["nsfw"])
                .with_raw("score", json!(0.97)),
            Reason::new("", "untagged").with_hit_tags(["ads"]),
        ];
        assert_eq!(extract_labels(&reasons), vec!["porn", "nsfw", "ads"]);
        let scores = extract_scores(&reasons);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores["porn"], 0.97);
    }
}
