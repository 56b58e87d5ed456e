//! Core types for the censor engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

/// Kind of content under review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Text,
    Image,
    Video,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business scenario the content belongs to.
///
/// Well-known scenarios are provided as associated constants; any other
/// string is accepted so integrators can add their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BizType(Cow<'static, str>);

impl BizType {
    pub const USER_AVATAR: BizType = BizType(Cow::Borrowed("user_avatar"));
    pub const USER_NICKNAME: BizType = BizType(Cow::Borrowed("user_nickname"));
    pub const USER_BIO: BizType = BizType(Cow::Borrowed("user_bio"));

    pub const NOTE_TITLE: BizType = BizType(Cow::Borrowed("note_title"));
    pub const NOTE_BODY: BizType = BizType(Cow::Borrowed("note_body"));
    pub const NOTE_IMAGES: BizType = BizType(Cow::Borrowed("note_images"));
    pub const NOTE_VIDEOS: BizType = BizType(Cow::Borrowed("note_videos"));

    pub const TEAM_NAME: BizType = BizType(Cow::Borrowed("team_name"));
    pub const TEAM_INTRO: BizType = BizType(Cow::Borrowed("team_intro"));
    pub const TEAM_BG_IMAGE: BizType = BizType(Cow::Borrowed("team_bg_image"));

    pub const CHAT_MESSAGE: BizType = BizType(Cow::Borrowed("chat_message"));
    pub const DANMAKU: BizType = BizType(Cow::Borrowed("danmaku"));
    pub const COMMENT: BizType = BizType(Cow::Borrowed("comment"));

    /// Create a custom business type
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// All built-in business types
    pub fn builtin() -> [BizType; 13] {
        [
            Self::USER_AVATAR,
            Self::USER_NICKNAME,
            Self::USER_BIO,
            Self::NOTE_TITLE,
            Self::NOTE_BODY,
            Self::NOTE_IMAGES,
            Self::NOTE_VIDEOS,
            Self::TEAM_NAME,
            Self::TEAM_INTRO,
            Self::TEAM_BG_IMAGE,
            Self::CHAT_MESSAGE,
            Self::DANMAKU,
            Self::COMMENT,
        ]
    }
}

impl fmt::Display for BizType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BizType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BizType {
    fn from(s: String) -> Self {
        Self(Cow::Owned(s))
    }
}

/// Review decision for a resource or a business object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Awaiting review
    #[default]
    Pending,
    /// Content approved
    Pass,
    /// Needs manual review
    Review,
    /// Content blocked
    Block,
    /// Review failed with an error
    Error,
}

impl Decision {
    /// Severity rank: pass < pending < review < block < error
    pub fn severity(&self) -> u8 {
        match self {
            Self::Pass => 0,
            Self::Pending => 1,
            Self::Review => 2,
            Self::Block => 3,
            Self::Error => 4,
        }
    }

    /// The stricter of two decisions
    pub fn stricter(self, other: Decision) -> Decision {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Block or review
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::Block | Self::Review)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Pass => "pass",
            Self::Review => "review",
            Self::Block => "block",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How blocked content is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacePolicy {
    /// No replacement, hide content
    #[default]
    None,
    /// Replace with a default value
    #[serde(rename = "default_value")]
    Default,
    /// Mask sensitive parts
    Mask,
}

impl ReplacePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Default => "default_value",
            Self::Mask => "mask",
        }
    }
}

/// Lifecycle status of a business review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
    Canceled,
}

/// Severity of a violation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low = 1,
    Medium = 2,
    High = 3,
    Severe = 4,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Severe => "severe",
        }
    }

    /// Map a numeric level (1..=4) to a risk level; out-of-range values clamp
    pub fn from_level(level: i64) -> Self {
        match level {
            i64::MIN..=1 => Self::Low,
            2 => Self::Medium,
            3 => Self::High,
            _ => Self::Severe,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of a binding change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    /// Automatic review
    #[default]
    Auto,
    /// Human reviewer
    Manual,
    /// Re-review
    Recheck,
    /// Triggered by a policy change
    PolicyUpgrade,
    /// User appeal
    Appeal,
}

/// Whether a provider call completed inline or will complete later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Sync,
    Async,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes what is being reviewed: the business object and field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BizContext {
    /// Business scenario
    pub biz_type: BizType,

    /// Business object ID (user ID, note ID, ...)
    pub biz_id: String,

    /// Field of the object (title, body, avatar, ...)
    #[serde(default)]
    pub field: String,

    /// Who submitted the content
    #[serde(default)]
    pub submitter_id: String,

    /// Request trace ID
    #[serde(default)]
    pub trace_id: String,

    /// When the content was created
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl BizContext {
    pub fn new(biz_type: BizType, biz_id: impl Into<String>) -> Self {
        Self {
            biz_type,
            biz_id: biz_id.into(),
            field: String::new(),
            submitter_id: String::new(),
            trace_id: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn with_submitter(mut self, submitter_id: impl Into<String>) -> Self {
        self.submitter_id = submitter_id.into();
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }
}

/// One reviewable unit of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique within one request
    pub resource_id: String,

    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    /// Text content, for text resources
    #[serde(default)]
    pub content_text: String,

    /// URL, for image and video resources
    #[serde(default)]
    pub content_url: String,

    /// SHA-256 hex digest, computed on submit when empty
    #[serde(default)]
    pub content_hash: String,

    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl Resource {
    fn new(resource_id: impl Into<String>, resource_type: ResourceType) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_type,
            content_text: String::new(),
            content_url: String::new(),
            content_hash: String::new(),
            extra: HashMap::new(),
        }
    }

    /// Create a text resource
    pub fn text(resource_id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut r = Self::new(resource_id, ResourceType::Text);
        r.content_text = text.into();
        r
    }

    /// Create an image resource
    pub fn image(resource_id: impl Into<String>, url: impl Into<String>) -> Self {
        let mut r = Self::new(resource_id, ResourceType::Image);
        r.content_url = url.into();
        r
    }

    /// Create a video resource
    pub fn video(resource_id: impl Into<String>, url: impl Into<String>) -> Self {
        let mut r = Self::new(resource_id, ResourceType::Video);
        r.content_url = url.into();
        r
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = hash.into();
        self
    }

    /// Fill `content_hash` if empty and return it
    pub fn ensure_hash(&mut self) -> &str {
        if self.content_hash.is_empty() {
            self.content_hash = crate::hash::resource_hash(self);
        }
        &self.content_hash
    }

    pub fn is_text(&self) -> bool {
        self.resource_type == ResourceType::Text
    }
}

/// Why a decision was made
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    /// Reason code (usually a provider label or a violation domain)
    pub code: String,

    #[serde(default)]
    pub message: String,

    /// Provider that detected this
    #[serde(default)]
    pub provider: String,

    #[serde(default)]
    pub hit_tags: Vec<String>,

    /// Trimmed provider payload
    #[serde(default)]
    pub raw: HashMap<String, serde_json::Value>,
}

impl Reason {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_hit_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hit_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_raw(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.raw.insert(key.into(), value);
        self
    }
}

/// Result reported by a single provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub decision: Decision,

    /// Confidence in [0, 1]
    pub confidence: f64,

    #[serde(default)]
    pub reasons: Vec<Reason>,

    pub provider: String,

    pub reviewed_at: DateTime<Utc>,
}

impl ReviewResult {
    pub fn new(provider: impl Into<String>, decision: Decision, confidence: f64) -> Self {
        Self {
            decision,
            confidence,
            reasons: Vec::new(),
            provider: provider.into(),
            reviewed_at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: Reason) -> Self {
        self.reasons.push(reason);
        self
    }

    pub fn with_reasons(mut self, reasons: Vec<Reason>) -> Self {
        self.reasons = reasons;
        self
    }
}

/// Decision after all provider reviews for one resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalOutcome {
    pub decision: Decision,

    #[serde(default)]
    pub replace_policy: ReplacePolicy,

    #[serde(default)]
    pub replace_value: String,

    /// Reasons from every contributing provider
    #[serde(default)]
    pub reasons: Vec<Reason>,

    #[serde(default)]
    pub risk_level: RiskLevel,
}

impl FinalOutcome {
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            ..Default::default()
        }
    }

    /// Clean outcome
    pub fn pass() -> Self {
        Self::new(Decision::Pass)
    }

    /// Outcome recorded when a resource could not be reviewed
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            decision: Decision::Error,
            reasons: vec![Reason::new("error", message)],
            ..Default::default()
        }
    }

    pub fn with_reasons(mut self, reasons: Vec<Reason>) -> Self {
        self.reasons = reasons;
        self
    }
}

/// Business-level review record, one per submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BizReview {
    pub id: String,
    pub biz_type: BizType,
    pub biz_id: String,
    pub field: String,
    pub submitter_id: String,
    pub trace_id: String,
    pub decision: Decision,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Resource-level review record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceReview {
    pub id: String,
    pub biz_review_id: String,
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub content_hash: String,
    pub content_text: String,
    pub content_url: String,
    pub decision: Decision,

    /// Serialized `FinalOutcome`, empty until the resource completes
    pub outcome_json: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceReview {
    /// Decode the stored outcome, if any
    pub fn outcome(&self) -> crate::Result<Option<FinalOutcome>> {
        if self.outcome_json.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&self.outcome_json)?))
    }

    /// Rebuild the resource descriptor this review was created from
    pub fn to_resource(&self) -> Resource {
        Resource {
            resource_id: self.resource_id.clone(),
            resource_type: self.resource_type,
            content_text: self.content_text.clone(),
            content_url: self.content_url.clone(),
            content_hash: self.content_hash.clone(),
            extra: HashMap::new(),
        }
    }
}

/// One provider API call issued for a resource review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderTask {
    pub id: String,
    pub resource_review_id: String,
    pub provider: String,
    pub mode: Mode,
    pub remote_task_id: String,
    pub done: bool,

    /// Serialized `ReviewResult`, empty until done
    pub result_json: String,

    pub raw_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProviderTask {
    pub fn result(&self) -> crate::Result<Option<ReviewResult>> {
        if self.result_json.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&self.result_json)?))
    }
}

/// Immutable evidence for blocked or flagged content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationSnapshot {
    pub id: String,
    pub biz_type: BizType,
    pub biz_id: String,
    pub field: String,
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub content_hash: String,
    pub content_text: String,
    pub content_url: String,
    pub outcome_json: String,
    pub created_at: DateTime<Utc>,
}

/// Current moderation state of one business field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CensorBinding {
    pub id: String,
    pub biz_type: BizType,
    pub biz_id: String,
    pub field: String,
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub content_hash: String,

    /// Review that produced the current state
    pub review_id: String,

    pub decision: Decision,
    pub replace_policy: ReplacePolicy,
    pub replace_value: String,

    /// Snapshot backing the decision, if any
    pub violation_ref_id: Option<String>,

    /// Starts at 1, incremented on every change
    pub review_revision: u32,

    pub updated_at: DateTime<Utc>,
}

impl CensorBinding {
    /// Build the history row recording this binding state
    pub fn to_history(
        &self,
        reason_json: impl Into<String>,
        source: HistorySource,
        reviewer_id: impl Into<String>,
        comment: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> CensorBindingHistory {
        CensorBindingHistory {
            id: String::new(),
            biz_type: self.biz_type.clone(),
            biz_id: self.biz_id.clone(),
            field: self.field.clone(),
            resource_id: self.resource_id.clone(),
            resource_type: self.resource_type,
            content_hash: self.content_hash.clone(),
            decision: self.decision,
            replace_policy: self.replace_policy,
            replace_value: self.replace_value.clone(),
            violation_ref_id: self.violation_ref_id.clone(),
            review_revision: self.review_revision,
            reason_json: reason_json.into(),
            source,
            reviewer_id: reviewer_id.into(),
            comment: comment.into(),
            created_at,
        }
    }
}

/// Append-only audit row for a binding transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CensorBindingHistory {
    pub id: String,
    pub biz_type: BizType,
    pub biz_id: String,
    pub field: String,
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub content_hash: String,
    pub decision: Decision,
    pub replace_policy: ReplacePolicy,
    pub replace_value: String,
    pub violation_ref_id: Option<String>,

    /// Revision the binding moved to
    pub review_revision: u32,

    pub reason_json: String,
    pub source: HistorySource,
    pub reviewer_id: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Async task awaiting its result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTask {
    pub provider_task_id: String,
    pub provider: String,
    pub remote_task_id: String,
}

/// A proposed binding transition
#[derive(Debug, Clone)]
pub struct BindingChange<'a> {
    pub old: Option<&'a CensorBinding>,
    pub new: &'a CensorBinding,
}

impl<'a> BindingChange<'a> {
    pub fn new(old: Option<&'a CensorBinding>, new: &'a CensorBinding) -> Self {
        Self { old, new }
    }

    /// True when no binding existed or any rendered field differs
    pub fn has_changed(&self) -> bool {
        match self.old {
            None => true,
            Some(old) => {
                old.decision != self.new.decision
                    || old.replace_policy != self.new.replace_policy
                    || old.replace_value != self.new.replace_value
                    || old.violation_ref_id != self.new.violation_ref_id
            }
        }
    }
}
