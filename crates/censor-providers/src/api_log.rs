//! Provider API call logging
//!
//! Every provider call is timed and recorded as an [`ApiLogEntry`]. Entries
//! carry sanitized request/response summaries only, never raw content.

use crate::provider::{SubmitRequest, SubmitResponse};
use censor_core::{Error, Resource, ResourceType};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One provider API call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub provider: String,

    /// submit, query, verify_callback, callback
    pub operation: String,

    pub resource_type: Option<ResourceType>,
    pub resource_id: String,
    pub task_id: String,
    pub duration_ms: u64,
    pub success: bool,
    pub status_code: Option<u16>,
    pub error_code: String,
    pub error_message: String,
    pub retry_count: u32,
    pub request: Option<Value>,
    pub response: Option<Value>,
    pub extra: HashMap<String, Value>,
}

/// Sink for API log entries
pub trait ApiLogger: Send + Sync {
    fn log(&self, entry: ApiLogEntry);
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NopApiLogger;

impl ApiLogger for NopApiLogger {
    fn log(&self, _entry: ApiLogEntry) {}
}

/// Writes entries as structured tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingApiLogger;

impl TracingApiLogger {
    pub fn new() -> Self {
        Self
    }
}

impl ApiLogger for TracingApiLogger {
    fn log(&self, entry: ApiLogEntry) {
        if entry.success {
            info!(
                provider = %entry.provider,
                operation = %entry.operation,
                resource_id = %entry.resource_id,
                task_id = %entry.task_id,
                duration_ms = entry.duration_ms,
                retry_count = entry.retry_count,
                "Provider call succeeded"
            );
        } else {
            warn!(
                provider = %entry.provider,
                operation = %entry.operation,
                resource_id = %entry.resource_id,
                task_id = %entry.task_id,
                duration_ms = entry.duration_ms,
                retry_count = entry.retry_count,
                status_code = ?entry.status_code,
                error_code = %entry.error_code,
                error = %entry.error_message,
                "Provider call failed"
            );
        }
    }
}

/// Keeps entries in memory
#[derive(Debug, Default)]
pub struct MemoryApiLogger {
    entries: Mutex<Vec<ApiLogEntry>>,
}

impl MemoryApiLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ApiLogEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl ApiLogger for MemoryApiLogger {
    fn log(&self, entry: ApiLogEntry) {
        self.entries.lock().push(entry);
    }
}

/// Commands sent to the background writer
enum LogCommand {
    Record(Box<ApiLogEntry>),
    Shutdown,
}

/// Hands entries to a background task so the caller never waits on the sink.
///
/// Must be created inside a tokio runtime.
pub struct ChannelApiLogger {
    sender: mpsc::UnboundedSender<LogCommand>,
}

impl ChannelApiLogger {
    pub fn new(inner: Arc<dyn ApiLogger>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(cmd) = receiver.recv().await {
                match cmd {
                    LogCommand::Record(entry) => inner.log(*entry),
                    LogCommand::Shutdown => {
                        debug!("API log writer shutting down");
                        break;
                    }
                }
            }
        });

        Self { sender }
    }

    /// Stop the background writer after queued entries are written
    pub fn shutdown(&self) {
        if let Err(e) = self.sender.send(LogCommand::Shutdown) {
            warn!("Failed to send API log shutdown: {}", e);
        }
    }
}

impl ApiLogger for ChannelApiLogger {
    fn log(&self, entry: ApiLogEntry) {
        if let Err(e) = self.sender.send(LogCommand::Record(Box::new(entry))) {
            warn!("Failed to queue API log entry: {}", e);
        }
    }
}

/// Times one call and emits its entry on completion
pub struct LogTimer {
    logger: Arc<dyn ApiLogger>,
    start: Instant,
    entry: ApiLogEntry,
}

impl LogTimer {
    pub fn start(
        logger: Arc<dyn ApiLogger>,
        provider: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            logger,
            start: Instant::now(),
            entry: ApiLogEntry {
                id: censor_core::id::generate("log"),
                timestamp: Utc::now(),
                provider: provider.into(),
                operation: operation.into(),
                resource_type: None,
                resource_id: String::new(),
                task_id: String::new(),
                duration_ms: 0,
                success: false,
                status_code: None,
                error_code: String::new(),
                error_message: String::new(),
                retry_count: 0,
                request: None,
                response: None,
                extra: HashMap::new(),
            },
        }
    }

    pub fn with_resource(mut self, resource: &Resource) -> Self {
        self.entry.resource_type = Some(resource.resource_type);
        self.entry.resource_id = resource.resource_id.clone();
        self
    }

    pub fn with_request(mut self, request: Value) -> Self {
        self.entry.request = Some(request);
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.entry.task_id = task_id.into();
        self
    }

    pub fn set_task_id(&mut self, task_id: impl Into<String>) {
        self.entry.task_id = task_id.into();
    }

    pub fn set_retry_count(&mut self, retry_count: u32) {
        self.entry.retry_count = retry_count;
    }

    pub fn set_extra(&mut self, key: impl Into<String>, value: Value) {
        self.entry.extra.insert(key.into(), value);
    }

    fn finish(mut self) {
        self.entry.duration_ms = self.start.elapsed().as_millis() as u64;
        self.logger.log(self.entry);
    }

    pub fn success(mut self, response: Option<Value>) {
        self.entry.success = true;
        self.entry.response = response;
        self.finish();
    }

    /// Provider errors keep their vendor code and status; others log their category
    pub fn failure(mut self, err: &Error) {
        self.entry.success = false;
        match err {
            Error::Provider(pe) => {
                self.entry.error_code = pe.code.clone();
                self.entry.error_message = pe.message.clone();
                self.entry.status_code = pe.status_code;
            }
            other => {
                self.entry.error_code = other.category().as_str().to_string();
                self.entry.error_message = other.to_string();
            }
        }
        self.finish();
    }
}

/// Request summary without content
pub fn sanitize_request(req: &SubmitRequest) -> Value {
    json!({
        "resource_id": req.resource.resource_id,
        "resource_type": req.resource.resource_type,
        "biz_type": req.biz.biz_type,
        "biz_id": req.biz.biz_id,
        "has_text": !req.resource.content_text.is_empty(),
        "has_url": !req.resource.content_url.is_empty(),
    })
}

/// Response summary without reasons or raw payload
pub fn sanitize_response(resp: &SubmitResponse) -> Value {
    let mut summary = json!({
        "mode": resp.mode,
        "task_id": resp.task_id,
    });
    if let Some(result) = &resp.immediate {
        summary["decision"] = json!(result.decision);
        summary["confidence"] = json!(result.confidence);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use censor_core::{BizContext, BizType, Decision, ProviderError, ReviewResult};

    #[test]
    fn test_timer_success_entry() {
        let logger = Arc::new(MemoryApiLogger::new());
        let resource = Resource::text("r1", "hello");
        let mut timer = LogTimer::start(logger.clone(), "local", "submit").with_resource(&resource);
        timer.set_task_id("t1");
        timer.set_retry_count(2);
        timer.success(Some(json!({"decision": "pass"})));

        let entries = logger.entries();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert!(e.success);
        assert_eq!(e.provider, "local");
        assert_eq!(e.resource_type, Some(ResourceType::Text));
        assert_eq!(e.resource_id, "r1");
        assert_eq!(e.task_id, "t1");
        assert_eq!(e.retry_count, 2);
        assert!(e.id.starts_with("log_"));
    }

    #[test]
    fn test_timer_failure_uses_provider_details() {
        let logger = Arc::new(MemoryApiLogger::new());
        let err: Error = ProviderError::new("aliyun", "Throttled", "slow down")
            .with_status_code(429)
            .into();
        LogTimer::start(logger.clone(), "aliyun", "query").failure(&err);

        LogTimer::start(logger.clone(), "aliyun", "query").failure(&Error::Timeout);

        let entries = logger.entries();
        assert_eq!(entries[0].error_code, "Throttled");
        assert_eq!(entries[0].error_message, "slow down");
        assert_eq!(entries[0].status_code, Some(429));
        assert_eq!(entries[1].error_code, "timeout");
        assert!(!entries[1].success);
    }

    #[test]
    fn test_sanitizers_drop_content() {
        let req = SubmitRequest::new(
            Resource::text("r1", "secret words"),
            BizContext::new(BizType::COMMENT, "c1"),
        );
        let summary = sanitize_request(&req);
        assert_eq!(summary["has_text"], json!(true));
        assert_eq!(summary["has_url"], json!(false));
        assert_eq!(summary["biz_type"], json!("comment"));
        assert!(!summary.to_string().contains("secret"));

        let resp = SubmitResponse::sync("t1", ReviewResult::new("local", Decision::Block, 0.9));
        let summary = sanitize_response(&resp);
        assert_eq!(summary["mode"], json!("sync"));
        assert_eq!(summary["decision"], json!("block"));
    }

    #[tokio::test]
    async fn test_channel_logger_forwards() {
        let sink = Arc::new(MemoryApiLogger::new());
        let logger = ChannelApiLogger::new(sink.clone());
        LogTimer::start(Arc::new(logger), "local", "submit").success(None);

        for _ in 0..50 {
            if !sink.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(sink.len(), 1);
    }
}
