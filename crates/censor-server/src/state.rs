//! Shared application state

use anyhow::{Context, Result};
use censor_client::{Client, Poller, TracingHooks};
use censor_policy::ReviewRequirements;
use censor_providers::{
    ApiLogger, ChannelApiLogger, KeywordProvider, ManualProvider, Provider, ProviderRegistry,
    ResilientConfig, ResilientProvider, TracingApiLogger,
};
use censor_store::MemoryStore;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::info;

use crate::config::{CensorConfig, ResilienceConfig};

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub client: Client,

    /// Reviewer-facing side of the manual queue, when configured
    pub manual: Option<Arc<ManualProvider>>,

    pub poller: Arc<Poller>,

    pub metrics_handle: PrometheusHandle,

    /// Largest accepted request body
    pub body_limit_bytes: usize,

    api_logger: Option<Arc<ChannelApiLogger>>,
}

impl AppState {
    pub fn new(config: CensorConfig, metrics_handle: PrometheusHandle) -> Result<Self> {
        let api_logger = config
            .resilience
            .enabled
            .then(|| Arc::new(ChannelApiLogger::new(Arc::new(TracingApiLogger::new()))));

        let mut registry = ProviderRegistry::new();

        if let Some(keyword) = config.keyword.clone() {
            let provider = KeywordProvider::new(keyword).context("Failed to build keyword provider")?;
            info!(
                provider = %provider.name(),
                rules = provider.rule_count(),
                "Registered keyword provider"
            );
            registry.register(wrap(Arc::new(provider), &config.resilience, &api_logger));
        }

        let manual = config.manual.clone().map(|m| Arc::new(ManualProvider::new(m)));
        if let Some(provider) = &manual {
            info!(
                provider = %provider.name(),
                queue = %provider.config().queue_name,
                "Registered manual review provider"
            );
            registry.register(wrap(provider.clone(), &config.resilience, &api_logger));
        }

        let requirements = match &config.requirements_path {
            Some(path) => ReviewRequirements::from_file(path)
                .with_context(|| format!("Failed to load review requirements from {}", path))?,
            None => ReviewRequirements::new(),
        };

        let client = Client::builder()
            .with_store(Arc::new(MemoryStore::new()))
            .with_registry(registry)
            .with_requirements(requirements)
            .with_hooks(Arc::new(TracingHooks))
            .with_config(config.client.clone())
            .build()
            .context("Failed to build censor client")?;

        let poller = Arc::new(Poller::new(client.clone()));

        Ok(Self {
            client,
            manual,
            poller,
            metrics_handle,
            body_limit_bytes: config.server.body_limit_bytes,
            api_logger,
        })
    }

    /// Flush and stop background work
    pub async fn shutdown(&self) {
        self.poller.stop().await;
        if let Some(logger) = &self.api_logger {
            logger.shutdown();
        }
    }
}

fn wrap(
    provider: Arc<dyn Provider>,
    resilience: &ResilienceConfig,
    api_logger: &Option<Arc<ChannelApiLogger>>,
) -> Arc<dyn Provider> {
    let Some(logger) = api_logger else {
        return provider;
    };
    let logger: Arc<dyn ApiLogger> = logger.clone();
    let config = ResilientConfig::default()
        .with_retry(resilience.retry_config())
        .with_logger(logger);
    Arc::new(ResilientProvider::new(provider, config))
}
