//! Retry and call logging around any provider

use crate::api_log::{
    sanitize_request, sanitize_response, ApiLogger, LogTimer, NopApiLogger, TracingApiLogger,
};
use crate::provider::{
    CallbackData, Capability, Provider, QueryResponse, SubmitRequest, SubmitResponse,
};
use crate::retry::{RetryConfig, Retried, Retryer};
use async_trait::async_trait;
use censor_core::{ResourceType, Result};
use censor_policy::{SceneCapability, Translator, UnifiedScene};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Resilience wrapper configuration
#[derive(Clone)]
pub struct ResilientConfig {
    pub retry: RetryConfig,
    pub enable_retry: bool,
    pub enable_logging: bool,

    /// Defaults to [`TracingApiLogger`] when logging is enabled
    pub logger: Option<Arc<dyn ApiLogger>>,
}

impl Default for ResilientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            enable_retry: true,
            enable_logging: true,
            logger: None,
        }
    }
}

impl ResilientConfig {
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self.enable_retry = true;
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.enable_retry = false;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn ApiLogger>) -> Self {
        self.logger = Some(logger);
        self.enable_logging = true;
        self
    }

    pub fn without_logging(mut self) -> Self {
        self.enable_logging = false;
        self
    }
}

/// Retries submit and query, logs every call.
///
/// Callbacks are one-shot deliveries: they are logged but never retried.
pub struct ResilientProvider {
    inner: Arc<dyn Provider>,
    retryer: Option<Retryer>,
    logger: Arc<dyn ApiLogger>,
}

impl ResilientProvider {
    pub fn new(inner: Arc<dyn Provider>, config: ResilientConfig) -> Self {
        let retryer = config.enable_retry.then(|| Retryer::new(config.retry));
        let logger: Arc<dyn ApiLogger> = match (config.enable_logging, config.logger) {
            (false, _) => Arc::new(NopApiLogger),
            (true, Some(logger)) => logger,
            (true, None) => Arc::new(TracingApiLogger),
        };
        Self {
            inner,
            retryer,
            logger,
        }
    }

    /// The wrapped provider
    pub fn inner(&self) -> &Arc<dyn Provider> {
        &self.inner
    }

    async fn retried<T, F, Fut>(&self, op: F) -> Retried<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match &self.retryer {
            Some(retryer) => retryer.run(op).await,
            None => {
                let mut op = op;
                Retried {
                    result: op().await,
                    attempts: 1,
                }
            }
        }
    }
}

/// Wrap with default retry and logging
pub fn wrap_with_resilience(provider: Arc<dyn Provider>) -> ResilientProvider {
    ResilientProvider::new(provider, ResilientConfig::default())
}

/// Wrap with retry only
pub fn wrap_with_retry(provider: Arc<dyn Provider>, max_retries: u32) -> ResilientProvider {
    ResilientProvider::new(
        provider,
        ResilientConfig::default()
            .with_retry(RetryConfig::default().with_max_retries(max_retries))
            .without_logging(),
    )
}

/// Wrap with logging only
pub fn wrap_with_logging(provider: Arc<dyn Provider>, logger: Arc<dyn ApiLogger>) -> ResilientProvider {
    ResilientProvider::new(
        provider,
        ResilientConfig::default().without_retry().with_logger(logger),
    )
}

#[async_trait]
impl Provider for ResilientProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> Vec<Capability> {
        self.inner.capabilities()
    }

    fn scene_capability(&self) -> SceneCapability {
        self.inner.scene_capability()
    }

    fn translate_scenes(&self, scenes: &[UnifiedScene], resource_type: ResourceType) -> Vec<String> {
        self.inner.translate_scenes(scenes, resource_type)
    }

    async fn submit(&self, req: SubmitRequest) -> Result<SubmitResponse> {
        let mut timer = LogTimer::start(self.logger.clone(), self.inner.name(), "submit")
            .with_resource(&req.resource)
            .with_request(sanitize_request(&req));

        let outcome = self.retried(|| self.inner.submit(req.clone())).await;
        timer.set_retry_count(outcome.attempts.saturating_sub(1));

        match outcome.result {
            Ok(resp) => {
                timer.set_task_id(resp.task_id.clone());
                timer.success(Some(sanitize_response(&resp)));
                Ok(resp)
            }
            Err(e) => {
                timer.failure(&e);
                Err(e)
            }
        }
    }

    async fn query(&self, task_id: &str) -> Result<QueryResponse> {
        let mut timer =
            LogTimer::start(self.logger.clone(), self.inner.name(), "query").with_task_id(task_id);

        let outcome = self.retried(|| self.inner.query(task_id)).await;
        timer.set_retry_count(outcome.attempts.saturating_sub(1));

        match outcome.result {
            Ok(resp) => {
                timer.set_extra("done", json!(resp.done));
                let decision = resp.result.as_ref().map(|r| r.decision);
                timer.success(Some(json!({ "done": resp.done, "decision": decision })));
                Ok(resp)
            }
            Err(e) => {
                timer.failure(&e);
                Err(e)
            }
        }
    }

    async fn verify_callback(&self, headers: &HashMap<String, String>, body: &[u8]) -> Result<()> {
        let mut timer = LogTimer::start(self.logger.clone(), self.inner.name(), "verify_callback");
        timer.set_extra("body_bytes", json!(body.len()));

        match self.inner.verify_callback(headers, body).await {
            Ok(()) => {
                timer.success(None);
                Ok(())
            }
            Err(e) => {
                timer.failure(&e);
                Err(e)
            }
        }
    }

    async fn parse_callback(&self, body: &[u8]) -> Result<CallbackData> {
        let mut timer = LogTimer::start(self.logger.clone(), self.inner.name(), "callback");

        match self.inner.parse_callback(body).await {
            Ok(data) => {
                timer.set_task_id(data.task_id.clone());
                timer.set_extra("done", json!(data.done));
                timer.success(None);
                Ok(data)
            }
            Err(e) => {
                timer.failure(&e);
                Err(e)
            }
        }
    }

    fn translator(&self) -> Option<Arc<dyn Translator>> {
        self.inner.translator()
    }
}
