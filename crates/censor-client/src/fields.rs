//! Field submission
//!
//! Reviews several fields of one business object together, then renders
//! each field's final value according to its block action.

use crate::client::{Client, MERGED_FIELD};
use crate::grouped::{GroupOptions, GroupSource, ItemVerdict};
use crate::locator::LocatedBy;
use censor_core::{BizContext, BizType, Decision, Error, Reason, Resource, Result};
use censor_policy::UnifiedScene;
use serde::{Deserialize, Serialize};

/// Replacement used when a replace action has no value
pub const DEFAULT_REPLACEMENT: &str = "***";

/// What happens to a field's value when it is blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockAction {
    /// Keep the value
    #[default]
    PassThrough,
    /// Substitute the replacement value
    Replace,
    /// Blank the value
    Hide,
    /// Keep the value; the caller rejects the whole submission
    Reject,
}

/// One field to review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInput {
    pub field: String,
    pub text: String,

    #[serde(default)]
    pub on_block: BlockAction,

    /// For [`BlockAction::Replace`]
    #[serde(default)]
    pub replace_with: String,
}

impl FieldInput {
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            text: text.into(),
            on_block: BlockAction::default(),
            replace_with: String::new(),
        }
    }

    pub fn on_block(mut self, action: BlockAction) -> Self {
        self.on_block = action;
        self
    }

    pub fn replace_with(mut self, value: impl Into<String>) -> Self {
        self.on_block = BlockAction::Replace;
        self.replace_with = value.into();
        self
    }

    /// Rendered value and whether it differs from the input
    pub fn apply_block_action(&self) -> (String, bool) {
        match self.on_block {
            BlockAction::Replace if self.replace_with.is_empty() => {
                (DEFAULT_REPLACEMENT.to_string(), true)
            }
            BlockAction::Replace => (self.replace_with.clone(), true),
            BlockAction::Hide => (String::new(), true),
            BlockAction::PassThrough | BlockAction::Reject => (self.text.clone(), false),
        }
    }
}

/// Fields of one business object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitFieldsInput {
    pub biz_type: BizType,
    pub biz_id: String,

    #[serde(default)]
    pub submitter_id: String,

    #[serde(default)]
    pub trace_id: String,

    pub fields: Vec<FieldInput>,

    /// Empty uses the business type's requirements
    #[serde(default)]
    pub scenes: Vec<UnifiedScene>,

    /// Locator confidence needed to trust a location; zero means the default
    #[serde(default)]
    pub fallback_threshold: Option<f64>,

    /// Mark every field instead of reviewing fields one by one
    #[serde(default)]
    pub disable_fallback: Option<bool>,
}

impl SubmitFieldsInput {
    pub fn new(biz_type: BizType, biz_id: impl Into<String>, fields: Vec<FieldInput>) -> Self {
        Self {
            biz_type,
            biz_id: biz_id.into(),
            submitter_id: String::new(),
            trace_id: String::new(),
            fields,
            scenes: Vec::new(),
            fallback_threshold: None,
            disable_fallback: None,
        }
    }

    pub fn with_submitter(mut self, submitter_id: impl Into<String>) -> Self {
        self.submitter_id = submitter_id.into();
        self
    }

    pub fn with_scenes(mut self, scenes: impl IntoIterator<Item = UnifiedScene>) -> Self {
        self.scenes = scenes.into_iter().collect();
        self
    }

    pub fn with_fallback_threshold(mut self, threshold: f64) -> Self {
        self.fallback_threshold = Some(threshold);
        self
    }

    pub fn with_disable_fallback(mut self, disable: bool) -> Self {
        self.disable_fallback = Some(disable);
        self
    }

    fn biz(&self, field: &str) -> BizContext {
        BizContext::new(self.biz_type.clone(), self.biz_id.clone())
            .with_field(field)
            .with_submitter(self.submitter_id.clone())
            .with_trace_id(self.trace_id.clone())
    }
}

/// Review result of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResult {
    pub field: String,
    pub decision: Decision,

    #[serde(default)]
    pub reasons: Vec<Reason>,

    /// Block or review
    pub blocked: bool,

    /// Value to store or display
    pub final_value: String,

    pub was_replaced: bool,

    pub confidence: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub located_by: Option<LocatedBy>,
}

impl FieldResult {
    fn new(input: &FieldInput, verdict: ItemVerdict) -> Self {
        let blocked = verdict.decision.is_violation();
        let (final_value, was_replaced) = if blocked {
            input.apply_block_action()
        } else {
            (input.text.clone(), false)
        };

        Self {
            field: input.field.clone(),
            decision: verdict.decision,
            reasons: verdict.reasons,
            blocked,
            final_value,
            was_replaced,
            confidence: verdict.confidence,
            located_by: verdict.located_by,
        }
    }
}

/// Result of [`Client::submit_fields`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitFieldsResult {
    /// First business review created for the submission
    pub biz_review_id: String,

    /// One entry per input field, in input order
    pub field_results: Vec<FieldResult>,

    /// Strictest field decision
    pub overall_decision: Decision,

    pub used_fallback: bool,
    pub pending_async: bool,
}

impl SubmitFieldsResult {
    pub fn get(&self, field: &str) -> Option<&FieldResult> {
        self.field_results.iter().find(|r| r.field == field)
    }
}

struct FieldSource<'a> {
    input: &'a SubmitFieldsInput,
}

impl GroupSource for FieldSource<'_> {
    fn len(&self) -> usize {
        self.input.fields.len()
    }

    fn text(&self, item: usize) -> &str {
        &self.input.fields[item].text
    }

    fn single(&self, item: usize) -> (BizContext, Resource) {
        let field = &self.input.fields[item];
        (
            self.input.biz(&field.field),
            Resource::text(field.field.clone(), field.text.clone()),
        )
    }

    fn merged(&self, _first: usize, text: String) -> (BizContext, Resource) {
        (self.input.biz(MERGED_FIELD), Resource::text(MERGED_FIELD, text))
    }
}

impl Client {
    /// Review the fields of one business object with as few provider
    /// calls as possible.
    pub async fn submit_fields(&self, input: SubmitFieldsInput) -> Result<SubmitFieldsResult> {
        if input.fields.is_empty() {
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

        let review = self
            .review_group(&FieldSource { input: &input }, &opts)
            .await?;
        let overall_decision = review.overall_decision();

        let field_results = input
            .fields
            .iter()
            .zip(review.verdicts)
            .map(|(field, verdict)| FieldResult::new(field, verdict))
            .collect();

        Ok(SubmitFieldsResult {
            biz_review_id: review.biz_review_ids.first().cloned().unwrap_or_default(),
            field_results,
            overall_decision,
            used_fallback: review.used_fallback,
            pending_async: review.pending_async,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_actions() {
        let field = FieldInput::new("bio", "original");
        assert_eq!(field.apply_block_action(), ("original".to_string(), false));

        let hide = field.clone().on_block(BlockAction::Hide);
        assert_eq!(hide.apply_block_action(), (String::new(), true));

        let reject = field.clone().on_block(BlockAction::Reject);
        assert_eq!(reject.apply_block_action(), ("original".to_string(), false));

        let replace = field.clone().on_block(BlockAction::Replace);
        assert_eq!(replace.apply_block_action(), ("***".to_string(), true));

        let custom = field.replace_with("[removed]");
        assert_eq!(custom.apply_block_action(), ("[removed]".to_string(), true));
    }

    #[test]
    fn test_block_action_serde() {
        let action: BlockAction = serde_json::from_str("\"pass_through\"").unwrap();
        assert_eq!(action, BlockAction::PassThrough);
        let field: FieldInput = serde_json::from_str(r#"{"field":"a","text":"b"}"#).unwrap();
        assert_eq!(field.on_block, BlockAction::PassThrough);
    }

    #[test]
    fn test_clean_field_keeps_value() {
        let field = FieldInput::new("name", "ok").on_block(BlockAction::Hide);
        let result = FieldResult::new(
            &field,
            ItemVerdict {
                decision: Decision::Pass,
                reasons: Vec::new(),
                located_by: None,
                confidence: 1.0,
            },
        );
        assert!(!result.blocked);
        assert_eq!(result.final_value, "ok");
        assert!(!result.was_replaced);
    }
}
