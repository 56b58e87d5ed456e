//! Human review provider
//!
//! Tasks are queued for reviewers and complete asynchronously, either when a
//! reviewer result is submitted and the task is polled, or when the review
//! system posts a callback.

use crate::provider::{
    header, CallbackData, Capability, Provider, QueryResponse, RawMap, SubmitRequest,
    SubmitResponse,
};
use async_trait::async_trait;
use censor_core::{
    BizContext, BizType, Decision, Error, Mode, Reason, Resource, ResourceType, Result,
    ReviewResult, RiskLevel,
};
use censor_policy::{
    BaseTranslator, Domain, LabelMapping, SceneCapability, TranslationContext, Translator,
    UnifiedList, UnifiedScene,
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{debug, info};

/// Registered name of the manual provider
pub const PROVIDER_NAME: &str = "manual";

/// Header carrying the hex HMAC-SHA256 of a callback body
pub const SIGNATURE_HEADER: &str = "x-censor-signature";

/// Manual review configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualConfig {
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// How long a task waits for a reviewer before timing out
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Callback signing secret; callbacks are unchecked when unset
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

fn default_queue_name() -> String {
    "default".to_string()
}

fn default_timeout_secs() -> u64 {
    24 * 60 * 60
}

impl Default for ManualConfig {
    fn default() -> Self {
        Self {
            queue_name: default_queue_name(),
            timeout_secs: default_timeout_secs(),
            webhook_secret: None,
        }
    }
}

impl ManualConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A task waiting for a reviewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualTask {
    pub task_id: String,
    pub queue_name: String,
    pub resource: Resource,
    pub biz: BizContext,

    /// Higher is more urgent
    pub priority: i32,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub result: Option<ManualResult>,
    pub done: bool,
}

/// A reviewer's verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualResult {
    #[serde(default)]
    pub task_id: String,

    pub decision: Decision,

    #[serde(default)]
    pub reasons: Vec<Reason>,

    #[serde(default)]
    pub reviewer_id: String,

    #[serde(default)]
    pub comment: String,

    #[serde(default = "Utc::now")]
    pub reviewed_at: DateTime<Utc>,
}

impl ManualResult {
    pub fn new(decision: Decision, reviewer_id: impl Into<String>) -> Self {
        Self {
            task_id: String::new(),
            decision,
            reasons: Vec::new(),
            reviewer_id: reviewer_id.into(),
            comment: String::new(),
            reviewed_at: Utc::now(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_reason(mut self, reason: Reason) -> Self {
        self.reasons.push(reason);
        self
    }
}

/// Storage for manual review tasks
#[async_trait]
pub trait ManualTaskStore: Send + Sync {
    async fn save_task(&self, task: ManualTask) -> Result<()>;

    async fn get_task(&self, task_id: &str) -> Result<Option<ManualTask>>;

    /// Record a verdict; fails with `TaskNotFound` for unknown tasks
    async fn update_task(&self, task_id: &str, result: ManualResult) -> Result<()>;

    /// Unfinished tasks of a queue, most urgent first
    async fn list_pending(&self, queue_name: &str, limit: usize) -> Result<Vec<ManualTask>>;
}

/// In-process task table
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<String, ManualTask>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ManualTaskStore for MemoryTaskStore {
    async fn save_task(&self, task: ManualTask) -> Result<()> {
        self.tasks.write().insert(task.task_id.clone(), task);
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<ManualTask>> {
        Ok(self.tasks.read().get(task_id).cloned())
    }

    async fn update_task(&self, task_id: &str, result: ManualResult) -> Result<()> {
        let mut tasks = self.tasks.write();
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| Error::task_not_found(task_id))?;
        task.result = Some(result);
        task.done = true;
        Ok(())
    }

    async fn list_pending(&self, queue_name: &str, limit: usize) -> Result<Vec<ManualTask>> {
        let mut pending: Vec<ManualTask> = self
            .tasks
            .read()
            .values()
            .filter(|t| !t.done && t.queue_name == queue_name)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        pending.truncate(limit);
        Ok(pending)
    }
}

/// Notified when a task is queued (push to a review tool, page someone, ...)
pub type TaskHandler = Arc<dyn Fn(&ManualTask) -> Result<()> + Send + Sync>;

/// Queue priority for a business type: profile fields first, then notes, then chat
pub fn priority_for(biz: &BizContext) -> i32 {
    let biz_type = &biz.biz_type;
    if *biz_type == BizType::USER_NICKNAME || *biz_type == BizType::USER_AVATAR {
        10
    } else if *biz_type == BizType::NOTE_TITLE || *biz_type == BizType::NOTE_BODY {
        8
    } else if *biz_type == BizType::CHAT_MESSAGE || *biz_type == BizType::DANMAKU {
        6
    } else {
        5
    }
}

/// Hex HMAC-SHA256 of a callback body
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::config(format!("Invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(format!("{:x}", mac.finalize().into_bytes()))
}

/// Callback body posted by the review system
#[derive(Debug, Deserialize)]
struct ManualCallback {
    task_id: String,
    decision: Decision,
    #[serde(default)]
    reviewer_id: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    reasons: Vec<Reason>,
}

/// Reviewer labels are authoritative: confidence 1.0
fn reviewer_translator() -> BaseTranslator {
    let table = [
        (Domain::Pornography, RiskLevel::Severe),
        (Domain::Terrorism, RiskLevel::Severe),
        (Domain::Illegal, RiskLevel::Severe),
        (Domain::MinorSafety, RiskLevel::Severe),
        (Domain::Politics, RiskLevel::High),
        (Domain::Violence, RiskLevel::High),
        (Domain::Fraud, RiskLevel::High),
        (Domain::Abuse, RiskLevel::Medium),
        (Domain::Other, RiskLevel::Medium),
        (Domain::Ads, RiskLevel::Low),
        (Domain::Spam, RiskLevel::Low),
    ];
    let label_map = table
        .into_iter()
        .map(|(domain, severity)| {
            (
                domain.as_str().to_string(),
                LabelMapping::new(domain, severity).with_confidence(1.0),
            )
        })
        .collect();
    BaseTranslator::new(PROVIDER_NAME, label_map)
}

/// Drops the "normal"/"pass" labels reviewers use for clean content
struct ManualTranslator {
    base: BaseTranslator,
}

impl Translator for ManualTranslator {
    fn provider(&self) -> &str {
        self.base.provider()
    }

    fn translate(
        &self,
        ctx: &TranslationContext,
        labels: &[String],
        scores: &HashMap<String, f64>,
    ) -> UnifiedList {
        let labels: Vec<String> = labels
            .iter()
            .filter(|l| l.as_str() != "normal" && l.as_str() != "pass")
            .cloned()
            .collect();
        self.base.translate(ctx, &labels, scores)
    }
}

/// Manual review provider
pub struct ManualProvider {
    config: ManualConfig,
    store: Arc<dyn ManualTaskStore>,
    handler: Option<TaskHandler>,
    translator: Arc<dyn Translator>,
}

impl ManualProvider {
    /// Provider backed by an in-memory task table
    pub fn new(config: ManualConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryTaskStore::new()))
    }

    pub fn with_store(config: ManualConfig, store: Arc<dyn ManualTaskStore>) -> Self {
        Self {
            config,
            store,
            handler: None,
            translator: Arc::new(ManualTranslator {
                base: reviewer_translator(),
            }),
        }
    }

    pub fn with_handler(mut self, handler: impl Fn(&ManualTask) -> Result<()> + Send + Sync + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn config(&self) -> &ManualConfig {
        &self.config
    }

    /// Record a reviewer's verdict
    pub async fn submit_result(&self, task_id: &str, mut result: ManualResult) -> Result<()> {
        result.task_id = task_id.to_string();
        result.reviewed_at = Utc::now();
        info!(task_id = %task_id, decision = %result.decision, reviewer = %result.reviewer_id, "Manual review completed");
        self.store.update_task(task_id, result).await
    }

    /// Unfinished tasks of this provider's queue
    pub async fn pending_tasks(&self, limit: usize) -> Result<Vec<ManualTask>> {
        self.store.list_pending(&self.config.queue_name, limit).await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<ManualTask>> {
        self.store.get_task(task_id).await
    }

    fn all_scenes() -> SceneCapability {
        let mut cap = SceneCapability::new(PROVIDER_NAME)
            .with_sync(false)
            .with_async(true);
        for rt in [ResourceType::Text, ResourceType::Image, ResourceType::Video] {
            cap = cap.with_scenes(rt, UnifiedScene::ALL);
        }
        cap
    }
}

#[async_trait]
impl Provider for ManualProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn capabilities(&self) -> Vec<Capability> {
        [ResourceType::Text, ResourceType::Image, ResourceType::Video]
            .into_iter()
            .map(|rt| Capability::new(rt, [Mode::Async]))
            .collect()
    }

    fn scene_capability(&self) -> SceneCapability {
        Self::all_scenes()
    }

    /// Reviewers work from unified scenes directly
    fn translate_scenes(&self, _scenes: &[UnifiedScene], _resource_type: ResourceType) -> Vec<String> {
        Vec::new()
    }

    async fn submit(&self, req: SubmitRequest) -> Result<SubmitResponse> {
        let now = Utc::now();
        let task_id = format!(
            "manual_{}_{}",
            req.resource.resource_id,
            now.timestamp_nanos_opt().unwrap_or_default()
        );
        let timeout = chrono::Duration::from_std(self.config.timeout())
            .map_err(|e| Error::config(format!("Invalid manual review timeout: {}", e)))?;

        let task = ManualTask {
            task_id: task_id.clone(),
            queue_name: self.config.queue_name.clone(),
            priority: priority_for(&req.biz),
            resource: req.resource,
            biz: req.biz,
            created_at: now,
            expires_at: now + timeout,
            result: None,
            done: false,
        };
        let expires_at = task.expires_at;

        self.store.save_task(task.clone()).await?;
        if let Some(handler) = &self.handler {
            handler(&task)?;
        }
        debug!(task_id = %task_id, queue = %self.config.queue_name, priority = task.priority, "Queued manual review");

        Ok(SubmitResponse::pending(task_id.clone())
            .with_raw("task_id", json!(task_id))
            .with_raw("queue", json!(self.config.queue_name))
            .with_raw("status", json!("pending"))
            .with_raw("expires_at", json!(expires_at.timestamp())))
    }

    async fn query(&self, task_id: &str) -> Result<QueryResponse> {
        let Some(task) = self.store.get_task(task_id).await? else {
            return Ok(QueryResponse::pending()
                .with_raw("task_id", json!(task_id))
                .with_raw("status", json!("not_found")));
        };

        match (&task.result, task.done) {
            (Some(result), true) => {
                let review = ReviewResult {
                    decision: result.decision,
                    confidence: 1.0,
                    reasons: result.reasons.clone(),
                    provider: PROVIDER_NAME.to_string(),
                    reviewed_at: result.reviewed_at,
                };
                Ok(QueryResponse::done(review)
                    .with_raw("task_id", json!(task_id))
                    .with_raw("status", json!("completed"))
                    .with_raw("reviewer_id", json!(result.reviewer_id))
                    .with_raw("comment", json!(result.comment)))
            }
            _ if Utc::now() > task.expires_at => {
                // Nobody looked at it in time; keep it flagged for review
                let review = ReviewResult::new(PROVIDER_NAME, Decision::Review, 0.0)
                    .with_reason(Reason::new("timeout", "Manual review timed out"));
                Ok(QueryResponse::done(review)
                    .with_raw("task_id", json!(task_id))
                    .with_raw("status", json!("timeout")))
            }
            _ => Ok(QueryResponse::pending()
                .with_raw("task_id", json!(task_id))
                .with_raw("status", json!("pending"))),
        }
    }

    async fn verify_callback(&self, headers: &HashMap<String, String>, body: &[u8]) -> Result<()> {
        let Some(secret) = &self.config.webhook_secret else {
            return Ok(());
        };
        let provided = header(headers, SIGNATURE_HEADER)
            .ok_or_else(|| Error::callback_invalid(format!("missing {} header", SIGNATURE_HEADER)))?;
        let expected = sign(secret, body)?;

        if bool::from(expected.as_bytes().ct_eq(provided.trim().to_ascii_lowercase().as_bytes())) {
            Ok(())
        } else {
            Err(Error::callback_invalid("signature mismatch"))
        }
    }

    async fn parse_callback(&self, body: &[u8]) -> Result<CallbackData> {
        let callback: ManualCallback = serde_json::from_slice(body)
            .map_err(|e| Error::validation("body", format!("malformed manual callback: {}", e)))?;

        let result = ReviewResult {
            decision: callback.decision,
            confidence: 1.0,
            reasons: callback.reasons.clone(),
            provider: PROVIDER_NAME.to_string(),
            reviewed_at: Utc::now(),
        };

        // Keep the queue in step so the task leaves pending_tasks
        let verdict = ManualResult {
            task_id: callback.task_id.clone(),
            decision: callback.decision,
            reasons: callback.reasons,
            reviewer_id: callback.reviewer_id.clone(),
            comment: callback.comment.clone(),
            reviewed_at: result.reviewed_at,
        };
        if self.store.get_task(&callback.task_id).await?.is_some() {
            self.store.update_task(&callback.task_id, verdict).await?;
        }

        let mut raw = RawMap::new();
        raw.insert("reviewer_id".to_string(), json!(callback.reviewer_id));
        raw.insert("comment".to_string(), json!(callback.comment));

        Ok(CallbackData {
            task_id: callback.task_id,
            done: true,
            result: Some(result),
            raw,
        })
    }

    fn translator(&self) -> Option<Arc<dyn Translator>> {
        Some(self.translator.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(biz_type: BizType) -> SubmitRequest {
        SubmitRequest::new(Resource::text("r1", "some text"), BizContext::new(biz_type, "b1"))
    }

    #[test]
    fn test_priority_by_biz_type() {
        assert_eq!(priority_for(&BizContext::new(BizType::USER_AVATAR, "u")), 10);
        assert_eq!(priority_for(&BizContext::new(BizType::NOTE_BODY, "n")), 8);
        assert_eq!(priority_for(&BizContext::new(BizType::DANMAKU, "d")), 6);
        assert_eq!(priority_for(&BizContext::new(BizType::COMMENT, "c")), 5);
    }

    #[tokio::test]
    async fn test_submit_then_complete() {
        let provider = ManualProvider::new(ManualConfig::default());
        let resp = provider.submit(request(BizType::USER_NICKNAME)).await.unwrap();

        assert_eq!(resp.mode, Mode::Async);
        assert!(resp.task_id.starts_with("manual_r1_"));
        assert_eq!(resp.raw["status"], json!("pending"));
        assert_eq!(resp.raw["queue"], json!("default"));

        let pending = provider.pending_tasks(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].priority, 10);

        let before = provider.query(&resp.task_id).await.unwrap();
        assert!(!before.done);
        assert_eq!(before.raw["status"], json!("pending"));

        provider
            .submit_result(&resp.task_id, ManualResult::new(Decision::Block, "alice").with_comment("spam"))
            .await
            .unwrap();

        let after = provider.query(&resp.task_id).await.unwrap();
        assert!(after.done);
        let result = after.result.unwrap();
        assert_eq!(result.decision, Decision::Block);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(after.raw["reviewer_id"], json!("alice"));
        assert!(provider.pending_tasks(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let provider = ManualProvider::new(ManualConfig::default());
        let resp = provider.query("manual_nope").await.unwrap();
        assert!(!resp.done);
        assert_eq!(resp.raw["status"], json!("not_found"));
        assert!(provider
            .submit_result("manual_nope", ManualResult::new(Decision::Pass, "bob"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_expired_task_escalates_to_review() {
        let provider = ManualProvider::new(ManualConfig {
            timeout_secs: 0,
            ..ManualConfig::default()
        });
        let resp = provider.submit(request(BizType::COMMENT)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let status = provider.query(&resp.task_id).await.unwrap();
        assert!(status.done);
        let result = status.result.unwrap();
        assert_eq!(result.decision, Decision::Review);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.reasons[0].code, "timeout");
    }

    #[tokio::test]
    async fn test_callback_signature() {
        let provider = ManualProvider::new(ManualConfig {
            webhook_secret: Some("s3cret".to_string()),
            ..ManualConfig::default()
        });
        let body = br#"{"task_id":"t1","decision":"block","reviewer_id":"carol"}"#;
        let good = HashMap::from([(
            "X-Censor-Signature".to_string(),
            sign("s3cret", body).unwrap(),
        )]);
        assert!(provider.verify_callback(&good, body).await.is_ok());

        let bad = HashMap::from([(SIGNATURE_HEADER.to_string(), "00".repeat(32))]);
        assert!(matches!(
            provider.verify_callback(&bad, body).await,
            Err(Error::CallbackInvalid(_))
        ));
        assert!(provider.verify_callback(&HashMap::new(), body).await.is_err());
    }

    #[tokio::test]
    async fn test_parse_callback() {
        let provider = ManualProvider::new(ManualConfig::default());
        let body = br#"{"task_id":"t1","decision":"review","reviewer_id":"dan","comment":"borderline","reasons":[{"code":"ads"}]}"#;
        let data = provider.parse_callback(body).await.unwrap();
        assert_eq!(data.task_id, "t1");
        assert!(data.done);
        let result = data.result.unwrap();
        assert_eq!(result.decision, Decision::Review);
        assert_eq!(result.reasons[0].code, "ads");
        assert_eq!(data.raw["comment"], json!("borderline"));

        assert!(provider.parse_callback(b"not json").await.is_err());
    }

    #[test]
    fn test_translator_labels() {
        let provider = ManualProvider::new(ManualConfig::default());
        let translator = provider.translator().unwrap();
        let labels = vec!["terrorism".to_string(), "pass".to_string(), "ads".to_string()];
        let out = translator.translate(&TranslationContext::default(), &labels, &HashMap::new());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].severity, RiskLevel::Severe);
        assert_eq!(out[0].confidence, 1.0);
        assert_eq!(out[1].domain, Domain::Ads);
    }
}
