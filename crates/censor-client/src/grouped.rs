//! Grouped review
//!
//! Reviews several short texts with as few provider calls as possible:
//! 1. Merge the texts and submit them once
//! 2. A pass clears every text; an async answer leaves every text pending
//! 3. A block or review is located back to the offending texts
//! 4. When locating is not confident enough, either every text inherits
//!    the merged decision (conservative) or each text is reviewed alone
//!
//! Texts that do not fit the merge budget form further groups; a group of
//! one is reviewed on its own.

use crate::client::{Client, SubmitInput};
use crate::locator::{locate, LocatedBy};
use censor_core::textmerge::merge_texts;
use censor_core::{BizContext, Decision, FinalOutcome, MergedText, Reason, Resource, Result};
use censor_policy::UnifiedScene;
use tracing::{debug, warn};

/// Texts taking part in a grouped review
pub(crate) trait GroupSource: Sync {
    fn len(&self) -> usize;

    fn text(&self, item: usize) -> &str;

    /// Context and resource for reviewing one item alone.
    ///
    /// The resource ID keys the item's immediate result.
    fn single(&self, item: usize) -> (BizContext, Resource);

    /// Context and resource for a merged review starting at `first`
    fn merged(&self, first: usize, text: String) -> (BizContext, Resource);
}

/// Knobs for one grouped review
#[derive(Debug, Clone)]
pub(crate) struct GroupOptions {
    pub scenes: Vec<UnifiedScene>,
    pub fallback_threshold: f64,
    pub disable_fallback: bool,
}

/// Decision for one item
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ItemVerdict {
    pub decision: Decision,
    pub reasons: Vec<Reason>,
    pub located_by: Option<LocatedBy>,
    pub confidence: f64,
}

impl ItemVerdict {
    fn pass(located_by: Option<LocatedBy>) -> Self {
        Self {
            decision: Decision::Pass,
            reasons: Vec::new(),
            located_by,
            confidence: 1.0,
        }
    }

    fn pending() -> Self {
        Self {
            decision: Decision::Pending,
            reasons: Vec::new(),
            located_by: None,
            confidence: 0.0,
        }
    }

    fn inherit(outcome: &FinalOutcome, located_by: LocatedBy, confidence: f64) -> Self {
        Self {
            decision: outcome.decision,
            reasons: outcome.reasons.clone(),
            located_by: Some(located_by),
            confidence,
        }
    }

    fn from_outcome(outcome: &FinalOutcome) -> Self {
        Self {
            decision: outcome.decision,
            reasons: outcome.reasons.clone(),
            located_by: None,
            confidence: 1.0,
        }
    }
}

/// Verdicts for every item of a source, in item order
#[derive(Debug, Clone, Default)]
pub(crate) struct GroupReview {
    pub verdicts: Vec<ItemVerdict>,

    /// Business reviews created, in submission order
    pub biz_review_ids: Vec<String>,

    pub used_fallback: bool,
    pub pending_async: bool,
}

impl GroupReview {
    /// Strictest item decision
    pub fn overall_decision(&self) -> Decision {
        self.verdicts
            .iter()
            .fold(Decision::Pass, |acc, v| acc.stricter(v.decision))
    }
}

impl Client {
    pub(crate) async fn review_group<S: GroupSource>(
        &self,
        source: &S,
        opts: &GroupOptions,
    ) -> Result<GroupReview> {
        let total = source.len();
        let mut review = GroupReview {
            verdicts: Vec::with_capacity(total),
            ..Default::default()
        };

        let mut next = 0;
        while next < total {
            let texts: Vec<&str> = (next..total).map(|i| source.text(i)).collect();
            let merged = if texts.len() > 1 {
                merge_texts(&texts, &self.config().text_merge).filter(|m| m.parts.len() >= 2)
            } else {
                None
            };

            match merged {
                Some(merged) => {
                    let count = merged.parts.len();
                    self.review_merged(source, next, merged, opts, &mut review)
                        .await?;
                    next += count;
                }
                None => {
                    let verdict = self.review_single(source, next, opts, &mut review).await?;
                    review.verdicts.push(verdict);
                    next += 1;
                }
            }
        }

        Ok(review)
    }

    async fn review_single<S: GroupSource>(
        &self,
        source: &S,
        item: usize,
        opts: &GroupOptions,
        review: &mut GroupReview,
    ) -> Result<ItemVerdict> {
        let (biz, resource) = source.single(item);
        let key = resource.resource_id.clone();
        let result = self
            .submit(SubmitInput::new(biz, vec![resource]).with_scenes(opts.scenes.iter().copied()))
            .await?;

        review.biz_review_ids.push(result.biz_review_id.clone());
        review.pending_async |= result.pending_async;

        Ok(match result.immediate_results.get(&key) {
            Some(outcome) => ItemVerdict::from_outcome(outcome),
            None => ItemVerdict::pending(),
        })
    }

    async fn review_merged<S: GroupSource>(
        &self,
        source: &S,
        first: usize,
        merged: MergedText,
        opts: &GroupOptions,
        review: &mut GroupReview,
    ) -> Result<()> {
        let count = merged.parts.len();
        let (biz, resource) = source.merged(first, merged.merged.clone());
        let key = resource.resource_id.clone();

        let result = self
            .submit(SubmitInput::new(biz, vec![resource]).with_scenes(opts.scenes.iter().copied()))
            .await?;
        review.biz_review_ids.push(result.biz_review_id.clone());

        let outcome = match result.immediate_results.get(&key) {
            None => {
                review.pending_async = true;
                review
                    .verdicts
                    .extend((0..count).map(|_| ItemVerdict::pending()));
                return Ok(());
            }
            Some(outcome) if outcome.decision == Decision::Pass => {
                review
                    .verdicts
                    .extend((0..count).map(|_| ItemVerdict::pass(None)));
                return Ok(());
            }
            Some(outcome) => outcome.clone(),
        };
        review.pending_async |= result.pending_async;

        let location = locate(&merged.parts, &merged.index, &outcome.reasons);
        if location.is_found() && location.confidence >= opts.fallback_threshold {
            debug!(
                first,
                count,
                located = ?location.items,
                confidence = location.confidence,
                method = ?location.method,
                "Violation located in merged review"
            );
            let method = location.method;
            review.verdicts.extend((0..count).map(|k| {
                if location.contains(k) {
                    ItemVerdict {
                        decision: outcome.decision,
                        reasons: outcome.reasons.clone(),
                        located_by: method,
                        confidence: location.confidence,
                    }
                } else {
                    ItemVerdict::pass(method)
                }
            }));
            return Ok(());
        }

        if opts.disable_fallback {
            review.verdicts.extend(
                (0..count).map(|_| ItemVerdict::inherit(&outcome, LocatedBy::Conservative, 1.0)),
            );
            return Ok(());
        }

        debug!(
            first,
            count,
            confidence = location.confidence,
            "Could not locate violation, reviewing items one by one"
        );
        review.used_fallback = true;
        for item in first..first + count {
            let verdict = match self.review_single(source, item, opts, review).await {
                Ok(mut verdict) => {
                    verdict.located_by = Some(LocatedBy::Fallback);
                    verdict
                }
                Err(e) => {
                    warn!(item, error = %e, "Individual review failed, keeping merged decision");
                    ItemVerdict::inherit(&outcome, LocatedBy::FallbackError, 1.0)
                }
            };
            review.verdicts.push(verdict);
        }
        Ok(())
    }
}
