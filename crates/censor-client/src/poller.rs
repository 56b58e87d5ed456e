//! Async task poller
//!
//! Periodically queries providers for unfinished async tasks and feeds
//! finished results through the same completion path as callbacks.

use crate::client::{Client, CompletionSource};
use crate::config::PollerConfig;
use censor_core::{PendingTask, Result};
use censor_providers::Provider;
use censor_store::Store;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counters for one polling pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Tasks queried
    pub checked: usize,
    /// Tasks this pass completed
    pub completed: usize,
    /// Still running at the provider
    pub pending: usize,
    /// Already completed by a callback
    pub duplicate: usize,
    pub failed: usize,
}

impl PollStats {
    fn merge(&mut self, other: PollStats) {
        self.checked += other.checked;
        self.completed += other.completed;
        self.pending += other.pending;
        self.duplicate += other.duplicate;
        self.failed += other.failed;
    }
}

enum TaskOutcome {
    Completed,
    Pending,
    Duplicate,
    Failed,
}

impl TaskOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Pending => "pending",
            Self::Duplicate => "duplicate",
            Self::Failed => "failed",
        }
    }
}

/// Background poller for async provider tasks
pub struct Poller {
    client: Client,
    config: PollerConfig,
    token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Poller {
    /// Poller using the client's poller configuration
    pub fn new(client: Client) -> Self {
        let config = client.config().poller.clone();
        Self::with_config(client, config)
    }

    pub fn with_config(client: Client, config: PollerConfig) -> Self {
        Self {
            client,
            config,
            token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Providers polled on each tick
    pub fn providers(&self) -> Vec<Arc<dyn Provider>> {
        let registry = self.client.registry();
        if self.config.providers.is_empty() {
            return registry.async_capable();
        }

        self.config
            .providers
            .iter()
            .filter_map(|name| {
                let provider = registry.get(name);
                if provider.is_none() {
                    warn!(provider = %name, "Configured poll provider is not registered");
                }
                provider
            })
            .collect()
    }

    pub fn is_running(&self) -> bool {
        !self.handles.lock().is_empty()
    }

    /// Spawn one polling loop per provider.
    ///
    /// Calling `start` on a running poller does nothing.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            return;
        }

        let providers = self.providers();
        info!(
            providers = providers.len(),
            interval_secs = self.config.interval_secs,
            workers = self.config.workers,
            "Starting async task poller"
        );

        for provider in providers {
            let client = self.client.clone();
            let config = self.config.clone();
            let token = self.token.child_token();
            handles.push(tokio::spawn(poll_loop(client, provider, config, token)));
        }
    }

    /// Cancel every loop and wait for in-flight passes to finish.
    ///
    /// A stopped poller cannot be started again.
    pub async fn stop(&self) {
        self.token.cancel();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Poll loop ended abnormally");
            }
        }
        info!("Async task poller stopped");
    }

    /// Run one pass over every provider and wait for it
    pub async fn poll_now(&self) -> Result<PollStats> {
        let mut stats = PollStats::default();
        for provider in self.providers() {
            stats.merge(poll_once(&self.client, provider.as_ref(), &self.config).await?);
        }
        Ok(stats)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn poll_loop(
    client: Client,
    provider: Arc<dyn Provider>,
    config: PollerConfig,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                match poll_once(&client, provider.as_ref(), &config).await {
                    Ok(stats) if stats.checked > 0 => {
                        debug!(provider = %provider.name(), ?stats, "Poll pass finished");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(provider = %provider.name(), error = %e, "Poll pass failed");
                    }
                }
            }
        }
    }
}

/// Query every pending task of one provider, `workers` at a time
pub async fn poll_once(
    client: &Client,
    provider: &dyn Provider,
    config: &PollerConfig,
) -> Result<PollStats> {
    let pending = client
        .store()
        .list_pending_async_tasks(provider.name(), config.batch_size)
        .await?;
    if pending.is_empty() {
        return Ok(PollStats::default());
    }

    let outcomes: Vec<TaskOutcome> = stream::iter(pending)
        .map(|task| poll_task(client, provider, task))
        .buffer_unordered(config.workers.max(1))
        .collect()
        .await;

    let mut stats = PollStats::default();
    for outcome in outcomes {
        stats.checked += 1;
        metrics::counter!(
            "censor_poller_tasks_total",
            "provider" => provider.name().to_string(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        match outcome {
            TaskOutcome::Completed => stats.completed += 1,
            TaskOutcome::Pending => stats.pending += 1,
            TaskOutcome::Duplicate => stats.duplicate += 1,
            TaskOutcome::Failed => stats.failed += 1,
        }
    }
    Ok(stats)
}

async fn poll_task(client: &Client, provider: &dyn Provider, pending: PendingTask) -> TaskOutcome {
    let response = match provider.query(&pending.remote_task_id).await {
        Ok(response) => response,
        Err(e) => {
            warn!(
                provider = %pending.provider,
                remote_task_id = %pending.remote_task_id,
                error = %e,
                "Failed to query provider task"
            );
            return TaskOutcome::Failed;
        }
    };
    if !response.done {
        return TaskOutcome::Pending;
    }

    let task = match client.store().get_provider_task(&pending.provider_task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            warn!(task_id = %pending.provider_task_id, "Provider task disappeared");
            return TaskOutcome::Failed;
        }
        Err(e) => {
            warn!(task_id = %pending.provider_task_id, error = %e, "Failed to load provider task");
            return TaskOutcome::Failed;
        }
    };

    match client
        .complete_provider_task(
            &task,
            true,
            response.result,
            &response.raw,
            CompletionSource::Poller,
        )
        .await
    {
        Ok(true) => TaskOutcome::Completed,
        Ok(false) => TaskOutcome::Duplicate,
        Err(e) => {
            warn!(task_id = %task.id, error = %e, "Failed to complete provider task");
            TaskOutcome::Failed
        }
    }
}
