use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::StreamConfig;
use crate::stream::loader::{LoadError, StreamLoader};
use crate::stream::state::{CameraStreamState, StreamPhase, StreamStateStore};
use crate::types::CameraId;

pub const MAX_STREAM_RETRIES: u32 = 3;
pub const STREAM_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const STREAM_LOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Produces a fresh, cache-busting stream URL for a camera
pub type UrlFactory = Arc<dyn Fn(CameraId) -> String + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub load_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_STREAM_RETRIES,
            retry_delay: STREAM_RETRY_DELAY,
            load_timeout: STREAM_LOAD_TIMEOUT,
        }
    }
}

impl From<&StreamConfig> for RetryPolicy {
    fn from(config: &StreamConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            load_timeout: Duration::from_millis(config.load_timeout_ms),
        }
    }
}

/// What the dashboard should show for a camera tile
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    Display { camera_id: CameraId, url: String },
    Reconnecting { camera_id: CameraId, attempt: u32, max_retries: u32 },
    Offline { camera_id: CameraId },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Another attempt owns this camera, or it is offline.
    Skipped,
    Displayed { url: String },
    RetryScheduled { attempt: u32, delay: Duration },
    Offline,
    /// Superseded by a reconnect while in flight.
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Poll,
    Retry { generation: u64 },
    Manual,
}

/// Bounded-retry state machine for camera streams.
///
/// Per camera: Idle → Loading → (Idle | Backoff | Offline). Backoff re-enters
/// Loading after a fixed delay; Offline is left only through [`reconnect`].
///
/// [`reconnect`]: StreamRetryController::reconnect
pub struct StreamRetryController<L: StreamLoader> {
    loader: Arc<L>,
    policy: RetryPolicy,
    store: Mutex<StreamStateStore>,
    signals: mpsc::UnboundedSender<StreamSignal>,
}

impl<L: StreamLoader> StreamRetryController<L> {
    pub fn new(
        loader: Arc<L>,
        policy: RetryPolicy,
        store: StreamStateStore,
        signals: mpsc::UnboundedSender<StreamSignal>,
    ) -> Arc<Self> {
        Arc::new(Self {
            loader,
            policy,
            store: Mutex::new(store),
            signals,
        })
    }

    #[allow(dead_code)]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Snapshot of a camera's stream state
    pub fn state(&self, camera_id: CameraId) -> Option<CameraStreamState> {
        self.lock_store().get(&camera_id).cloned()
    }

    pub fn tracked_cameras(&self) -> Vec<CameraId> {
        self.lock_store().camera_ids()
    }

    /// Poll-driven load attempt. Dropped while the camera is loading, backing
    /// off, or offline.
    pub async fn attempt_load(self: &Arc<Self>, camera_id: CameraId, urls: UrlFactory) -> AttemptOutcome {
        Arc::clone(self).run_attempt(camera_id, urls, Trigger::Poll).await
    }

    /// Manual reconnect: cancels anything pending for the camera, clears the
    /// retry count and starts a fresh attempt.
    pub async fn reconnect(self: &Arc<Self>, camera_id: CameraId, urls: UrlFactory) -> AttemptOutcome {
        {
            let mut store = self.lock_store();
            let state = store.entry(camera_id);
            info!("🔄 Manual reconnect for camera {} (was {})", camera_id, state);
            state.reset();
        }
        Arc::clone(self).run_attempt(camera_id, urls, Trigger::Manual).await
    }

    fn lock_store(&self) -> MutexGuard<'_, StreamStateStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, signal: StreamSignal) {
        if self.signals.send(signal).is_err() {
            debug!("Stream signal receiver dropped");
        }
    }

    fn run_attempt(
        self: Arc<Self>,
        camera_id: CameraId,
        urls: UrlFactory,
        trigger: Trigger,
    ) -> BoxFuture<'static, AttemptOutcome> {
        async move {
            let Some((generation, token)) = self.begin_attempt(camera_id, trigger) else {
                debug!("⏭️ Skipping stream attempt for camera {} ({:?})", camera_id, trigger);
                return AttemptOutcome::Skipped;
            };
            let mut guard = LoadingGuard {
                controller: Arc::clone(&self),
                camera_id,
                generation,
                armed: true,
            };

            let url = urls(camera_id);
            debug!("📷 Loading stream for camera {}: {}", camera_id, url);

            let timeout = self.policy.load_timeout;
            let result = tokio::select! {
                _ = token.cancelled() => {
                    debug!("Stream attempt for camera {} cancelled", camera_id);
                    return AttemptOutcome::Cancelled;
                }
                loaded = tokio::time::timeout(timeout, self.loader.load(&url)) => match loaded {
                    Ok(result) => result,
                    Err(_) => Err(LoadError::TimedOut(timeout)),
                },
            };

            guard.armed = false;
            self.finish_attempt(camera_id, generation, url, result, urls)
        }
        .boxed()
    }

    fn begin_attempt(&self, camera_id: CameraId, trigger: Trigger) -> Option<(u64, CancellationToken)> {
        let mut store = self.lock_store();
        let state = store.entry(camera_id);

        let allowed = match state.phase {
            StreamPhase::Loading | StreamPhase::Offline => false,
            StreamPhase::Idle => !matches!(trigger, Trigger::Retry { .. }),
            StreamPhase::Backoff => {
                matches!(trigger, Trigger::Retry { generation } if generation == state.generation)
            }
        };
        if !allowed {
            return None;
        }

        let token = CancellationToken::new();
        state.generation += 1;
        state.phase = StreamPhase::Loading;
        state.cancel = Some(token.clone());
        Some((state.generation, token))
    }

    fn finish_attempt(
        self: &Arc<Self>,
        camera_id: CameraId,
        generation: u64,
        url: String,
        result: Result<(), LoadError>,
        urls: UrlFactory,
    ) -> AttemptOutcome {
        let mut store = self.lock_store();
        let state = store.entry(camera_id);
        if state.generation != generation {
            return AttemptOutcome::Cancelled;
        }
        state.cancel = None;

        match result {
            Ok(()) => {
                state.last_success = Some(Utc::now());
                state.retry_count = 0;
                state.phase = StreamPhase::Idle;
                info!("✅ Camera {} stream loaded", camera_id);
                self.emit(StreamSignal::Display { camera_id, url: url.clone() });
                AttemptOutcome::Displayed { url }
            }
            Err(e) => {
                state.retry_count += 1;
                let attempt = state.retry_count;
                warn!("❌ Camera {} stream error (failure {}): {}", camera_id, attempt, e);

                if attempt <= self.policy.max_retries {
                    let token = CancellationToken::new();
                    state.phase = StreamPhase::Backoff;
                    state.cancel = Some(token.clone());
                    drop(store);

                    self.emit(StreamSignal::Reconnecting {
                        camera_id,
                        attempt,
                        max_retries: self.policy.max_retries,
                    });
                    self.schedule_retry(camera_id, generation, token, urls);
                    AttemptOutcome::RetryScheduled {
                        attempt,
                        delay: self.policy.retry_delay,
                    }
                } else {
                    state.phase = StreamPhase::Offline;
                    error!("📴 Camera {} is offline after {} failures", camera_id, attempt);
                    self.emit(StreamSignal::Offline { camera_id });
                    AttemptOutcome::Offline
                }
            }
        }
    }

    fn schedule_retry(
        self: &Arc<Self>,
        camera_id: CameraId,
        generation: u64,
        token: CancellationToken,
        urls: UrlFactory,
    ) {
        let controller = Arc::clone(self);
        let delay = self.policy.retry_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Retry for camera {} cancelled", camera_id);
                }
                _ = tokio::time::sleep(delay) => {
                    controller
                        .run_attempt(camera_id, urls, Trigger::Retry { generation })
                        .await;
                }
            }
        });
    }
}

/// Returns a camera to Idle if its attempt future is dropped mid-flight.
struct LoadingGuard<L: StreamLoader> {
    controller: Arc<StreamRetryController<L>>,
    camera_id: CameraId,
    generation: u64,
    armed: bool,
}

impl<L: StreamLoader> Drop for LoadingGuard<L> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut store = self.controller.lock_store();
        let state = store.entry(self.camera_id);
        if state.generation == self.generation && state.is_loading() {
            state.phase = StreamPhase::Idle;
            state.cancel = None;
        }
    }
}
