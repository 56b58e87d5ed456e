//! Batch submission
//!
//! Reviews many independent short texts (chat messages, danmaku) with
//! merged submissions. Large batches run as sequential chunks.

use crate::client::Client;
use crate::grouped::{GroupOptions, GroupReview, GroupSource, ItemVerdict};
use crate::locator::LocatedBy;
use censor_core::{BizContext, BizType, Decision, Error, Reason, Resource, Result};
use censor_policy::UnifiedScene;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Business ID and resource ID of a merged batch review
pub const BATCH_ID: &str = "_batch_";

/// Reason code for items lost to a failed chunk
pub const BATCH_ERROR_CODE: &str = "batch_error";

/// One independent item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Item ID, for example a message ID
    pub biz_id: String,

    #[serde(default)]
    pub submitter_id: String,

    pub text: String,

    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl BatchItem {
    pub fn new(biz_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            biz_id: biz_id.into(),
            submitter_id: String::new(),
            text: text.into(),
            extra: HashMap::new(),
        }
    }

    pub fn with_submitter(mut self, submitter_id: impl Into<String>) -> Self {
        self.submitter_id = submitter_id.into();
        self
    }
}

/// A batch of items sharing a business type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitBatchInput {
    pub biz_type: BizType,
    pub items: Vec<BatchItem>,

    #[serde(default)]
    pub scenes: Vec<UnifiedScene>,

    #[serde(default)]
    pub trace_id: String,

    /// Locator confidence needed to trust a location; zero means the default
    #[serde(default)]
    pub fallback_threshold: Option<f64>,

    #[serde(default)]
    pub disable_fallback: Option<bool>,

    /// Items per merged request; zero uses the configured default
    #[serde(default)]
    pub max_merge_count: Option<usize>,
}

impl SubmitBatchInput {
    pub fn new(biz_type: BizType, items: Vec<BatchItem>) -> Self {
        Self {
            biz_type,
            items,
            scenes: Vec::new(),
            trace_id: String::new(),
            fallback_threshold: None,
            disable_fallback: None,
            max_merge_count: None,
        }
    }

    pub fn with_fallback_threshold(mut self, threshold: f64) -> Self {
        self.fallback_threshold = Some(threshold);
        self
    }

    pub fn with_disable_fallback(mut self, disable: bool) -> Self {
        self.disable_fallback = Some(disable);
        self
    }

    pub fn with_max_merge_count(mut self, count: usize) -> Self {
        self.max_merge_count = Some(count);
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }
}

/// Review result of one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    pub biz_id: String,
    pub decision: Decision,

    #[serde(default)]
    pub reasons: Vec<Reason>,

    /// Block or review
    pub blocked: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub located_by: Option<LocatedBy>,

    pub confidence: f64,
}

impl BatchItemResult {
    fn new(item: &BatchItem, verdict: ItemVerdict) -> Self {
        Self {
            biz_id: item.biz_id.clone(),
            blocked: verdict.decision.is_violation(),
            decision: verdict.decision,
            reasons: verdict.reasons,
            located_by: verdict.located_by,
            confidence: verdict.confidence,
        }
    }

    fn chunk_error(item: &BatchItem, err: &Error) -> Self {
        Self {
            biz_id: item.biz_id.clone(),
            decision: Decision::Error,
            reasons: vec![Reason::new(BATCH_ERROR_CODE, err.to_string())],
            blocked: false,
            located_by: None,
            confidence: 0.0,
        }
    }
}

/// Result of [`Client::submit_batch`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitBatchResult {
    /// One entry per input item, in input order
    pub results: Vec<BatchItemResult>,

    /// Strictest item decision
    pub overall_decision: Decision,

    pub blocked_count: usize,
    pub passed_count: usize,
    pub used_fallback: bool,
    pub pending_async: bool,
}

impl SubmitBatchResult {
    pub fn get(&self, biz_id: &str) -> Option<&BatchItemResult> {
        self.results.iter().find(|r| r.biz_id == biz_id)
    }

    fn push(&mut self, result: BatchItemResult) {
        if result.blocked {
            self.blocked_count += 1;
        } else if result.decision == Decision::Pass {
            self.passed_count += 1;
        }
        self.overall_decision = self.overall_decision.stricter(result.decision);
        self.results.push(result);
    }

    fn absorb(&mut self, items: &[BatchItem], review: GroupReview) {
        self.used_fallback |= review.used_fallback;
        self.pending_async |= review.pending_async;
        for (item, verdict) in items.iter().zip(review.verdicts) {
            self.push(BatchItemResult::new(item, verdict));
        }
    }
}

struct BatchSource<'a> {
    input: &'a SubmitBatchInput,
    items: &'a [BatchItem],
}

impl BatchSource<'_> {
    fn biz(&self, biz_id: &str, submitter_id: &str) -> BizContext {
        BizContext::new(self.input.biz_type.clone(), biz_id)
            .with_submitter(submitter_id)
            .with_trace_id(self.input.trace_id.clone())
    }
}

impl GroupSource for BatchSource<'_> {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn text(&self, item: usize) -> &str {
        &self.items[item].text
    }

    fn single(&self, item: usize) -> (BizContext, Resource) {
        let item = &self.items[item];
        let mut resource = Resource::text(item.biz_id.clone(), item.text.clone());
        resource.extra = item.extra.clone();
        (self.biz(&item.biz_id, &item.submitter_id), resource)
    }

    fn merged(&self, first: usize, text: String) -> (BizContext, Resource) {
        (
            self.biz(BATCH_ID, &self.items[first].submitter_id),
            Resource::text(BATCH_ID, text),
        )
    }
}

impl Client {
    /// Review independent items with merged submissions.
    ///
    /// A failing chunk marks its items and every later item as `error` and
    /// stops; results of earlier chunks are kept.
    pub async fn submit_batch(&self, input: SubmitBatchInput) -> Result<SubmitBatchResult> {
        if input.items.is_empty() {
            return Err(Error::NoResources);
        }

        let defaults = &self.config().batch;
        let opts = GroupOptions {
            scenes: input.scenes.clone(),
            fallback_threshold: input
                .fallback_threshold
                .filter(|t| *t > 0.0)
                .unwrap_or(defaults.fallback_threshold),
            disable_fallback: input.disable_fallback.unwrap_or(defaults.disable_fallback),
        };
        let chunk_size = input
            .max_merge_count
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_merge_count)
            .max(1);

        let mut result = SubmitBatchResult {
            overall_decision: Decision::Pass,
            ..Default::default()
        };

        if input.items.len() <= chunk_size {
            let source = BatchSource {
                input: &input,
                items: &input.items,
            };
            let review = self.review_group(&source, &opts).await?;
            result.absorb(&input.items, review);
            return Ok(result);
        }

        for (chunk_index, chunk) in input.items.chunks(chunk_size).enumerate() {
            let source = BatchSource {
                input: &input,
                items: chunk,
            };
            match self.review_group(&source, &opts).await {
                Ok(review) => result.absorb(chunk, review),
                Err(e) => {
                    let start = chunk_index * chunk_size;
                    warn!(
                        chunk = chunk_index,
                        failed_items = input.items.len() - start,
                        error = %e,
                        "Batch chunk failed, marking remaining items as error"
                    );
                    for item in &input.items[start..] {
                        result.push(BatchItemResult::chunk_error(item, &e));
                    }
                    break;
                }
            }
        }

        Ok(result)
    }
}
