//! Cache-aside weather subscription.
//!
//! A [`WeatherFeed`] is one live subscription to a forecast subject. On
//! start it serves whatever the cache holds immediately, then revalidates
//! against the upstream in the background; a cache miss is the only path
//! that shows a visible loading state. While subscribed it keeps the data
//! fresh on a fixed interval, and tearing it down cancels every pending
//! timer and in-flight publication.
//!
//! All state transitions for one subscription flow through a single task,
//! which is what makes publication order deterministic: the cached value
//! always lands before any revalidation result, and a manual refresh is
//! always the last word against an in-flight background pass.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use stratus_api::ApiError;
use stratus_core::Config;
use stratus_store::{CacheStore, Collection};

use crate::forecast::ForecastClient;
use crate::normalize::normalize;
use crate::types::{ForecastSubject, NormalizedWeather};

/// Subscription-facing error. `Clone` so it can travel the state channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    /// Credential rejected upstream; the stored token is already cleared.
    #[error("Unauthorized - sign in required")]
    Unauthorized,

    #[error("Weather service unavailable: {0}")]
    Upstream(String),

    /// The feed was torn down before the request completed.
    #[error("Subscription closed")]
    Closed,
}

impl From<ApiError> for FeedError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::Unauthorized => FeedError::Unauthorized,
            ApiError::Validation(msg) => FeedError::InvalidCoordinates(msg),
            other => FeedError::Upstream(other.to_string()),
        }
    }
}

impl FeedError {
    /// User-friendly message for UI display.
    pub fn user_message(&self) -> &'static str {
        match self {
            FeedError::InvalidCoordinates(_) => "That location looks invalid. Check and try again.",
            FeedError::Unauthorized => "Your session has expired. Please sign in again.",
            FeedError::Upstream(_) => "Weather service unavailable. Showing what we have.",
            FeedError::Closed => "This view is no longer active.",
        }
    }
}

/// Externally visible state of one subscription.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FetchState {
    #[default]
    Idle,
    Loading,
    Ready(NormalizedWeather),
    Failed(FeedError),
}

impl FetchState {
    pub fn is_ready(&self) -> bool {
        matches!(self, FetchState::Ready(_))
    }
}

/// Tunables for one subscription.
#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// Background revalidation interval.
    pub refresh_interval: Duration,
    /// Entries older than this are purged by the on-subscribe sweep.
    pub sweep_max_age: Duration,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30 * 60),
            sweep_max_age: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

impl FeedOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            refresh_interval: Duration::from_secs(u64::from(config.feed.refresh_minutes) * 60),
            sweep_max_age: Duration::from_secs(
                u64::from(config.cache.sweep_max_age_days) * 24 * 60 * 60,
            ),
        }
    }
}

enum Command {
    Refresh(oneshot::Sender<Result<NormalizedWeather, FeedError>>),
}

/// Handle to a live subscription. Dropping it (or calling
/// [`unsubscribe`](Self::unsubscribe)) cancels the worker: pending timers
/// stop and no further state is published.
pub struct WeatherFeed {
    state: watch::Receiver<FetchState>,
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
}

impl WeatherFeed {
    /// Start a subscription for a subject.
    pub fn subscribe(
        store: CacheStore,
        client: ForecastClient,
        subject: ForecastSubject,
        options: FeedOptions,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(FetchState::Idle);
        let (command_tx, command_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let worker = FeedWorker {
            store,
            client,
            subject,
            options,
            state: state_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(worker.run(command_rx));

        Self {
            state: state_rx,
            commands: command_tx,
            cancel,
        }
    }

    /// Watch the subscription state. The receiver always holds the most
    /// recent publication.
    pub fn state(&self) -> watch::Receiver<FetchState> {
        self.state.clone()
    }

    /// Snapshot of the current state.
    pub fn current(&self) -> FetchState {
        self.state.borrow().clone()
    }

    /// Force an immediate revalidation.
    ///
    /// Invalidates the cache entry first so nothing can serve the
    /// known-stale value meanwhile, then fetches and publishes the
    /// outcome regardless of prior state.
    pub async fn refresh(&self) -> Result<NormalizedWeather, FeedError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Refresh(reply_tx))
            .await
            .map_err(|_| FeedError::Closed)?;
        reply_rx.await.map_err(|_| FeedError::Closed)?
    }

    /// Tear the subscription down. Idempotent; also runs on drop.
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WeatherFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct FeedWorker {
    store: CacheStore,
    client: ForecastClient,
    subject: ForecastSubject,
    options: FeedOptions,
    state: watch::Sender<FetchState>,
    cancel: CancellationToken,
}

impl FeedWorker {
    async fn run(self, mut commands: mpsc::Receiver<Command>) {
        // Bound store growth on every subscription start; failures are
        // absorbed by the store.
        self.store.sweep(self.options.sweep_max_age);

        let key = self.subject.cache_key();
        match self.store.get(Collection::Forecast, &key) {
            Some(cached) => {
                // Serve the cached value as-is, then revalidate without
                // touching the visible loading state.
                self.publish(FetchState::Ready(normalize(&cached)));
                if self.cancel.is_cancelled() {
                    return;
                }
                let _ = self.revalidate(false).await;
            }
            None => {
                self.publish(FetchState::Loading);
                if self.cancel.is_cancelled() {
                    return;
                }
                let _ = self.revalidate(true).await;
            }
        }

        let mut interval = tokio::time::interval(self.options.refresh_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial fetch above
        // already covered it.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Subscription for {} torn down", key);
                    return;
                }
                _ = interval.tick() => {
                    tracing::debug!("Auto-refresh for {}", key);
                    let _ = self.revalidate(false).await;
                }
                command = commands.recv() => match command {
                    Some(Command::Refresh(reply)) => {
                        let result = self.manual_refresh().await;
                        let _ = reply.send(result);
                    }
                    // All feed handles are gone; drop also cancels, so
                    // just stop.
                    None => return,
                }
            }
        }
    }

    /// Fetch, publish, persist.
    ///
    /// On the visible path an exhausted failure publishes `Failed`; on
    /// the silent path it is logged and swallowed so already-displayed
    /// data survives.
    async fn revalidate(&self, visible: bool) -> Result<NormalizedWeather, FeedError> {
        let key = self.subject.cache_key();

        match self.client.fetch(&self.subject).await {
            Ok(weather) => {
                self.publish(FetchState::Ready(weather.clone()));
                match serde_json::to_value(&weather) {
                    Ok(value) => {
                        if !self.store.put(Collection::Forecast, &key, &value) {
                            tracing::warn!("Failed to cache forecast for {}", key);
                        }
                    }
                    Err(e) => tracing::warn!("Failed to serialize forecast for {}: {}", key, e),
                }
                Ok(weather)
            }
            Err(e) => {
                let error = FeedError::from(e);
                if visible {
                    self.publish(FetchState::Failed(error.clone()));
                } else {
                    tracing::warn!(
                        "Background revalidation for {} failed, keeping cached data: {}",
                        key,
                        error
                    );
                }
                Err(error)
            }
        }
    }

    async fn manual_refresh(&self) -> Result<NormalizedWeather, FeedError> {
        let key = self.subject.cache_key();
        // Invalidate first so a read racing the refresh can't pick up the
        // known-stale entry.
        self.store.delete(Collection::Forecast, &key);
        self.revalidate(true).await
    }

    /// Publish a state transition unless the subscription was cancelled.
    fn publish(&self, state: FetchState) {
        if self.cancel.is_cancelled() {
            return;
        }
        let _ = self.state.send(state);
    }
}
