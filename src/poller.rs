use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::DashboardApi;
use crate::error::ApiError;
use crate::notifications::{NotificationCenter, NotificationLevel};
use crate::stream::controller::{StreamRetryController, UrlFactory};
use crate::stream::loader::StreamLoader;
use crate::types::CameraSelection;

/// User-facing text for a failed camera refresh
pub fn describe_refresh_error(error: &ApiError) -> String {
    match error {
        ApiError::Malformed(_) => {
            "Camera data has an unexpected format. Please contact the administrator.".to_string()
        }
        ApiError::Unauthorized => "Your session has expired. Please log in again.".to_string(),
        ApiError::Status(404) => {
            "Camera information not found. Check that the cameras are registered.".to_string()
        }
        ApiError::Status(code) if *code >= 500 => {
            "A server error occurred. Please try again shortly.".to_string()
        }
        _ => "An error occurred while loading camera data.".to_string(),
    }
}

/// Fixed-interval refresh driving the stream controller for selected cameras.
///
/// Offline cameras are not polled; every `offline_recheck_ticks` refreshes
/// they get a [`StreamRetryController::reconnect`] instead.
pub struct CameraPoller<L: StreamLoader> {
    api: DashboardApi,
    controller: Arc<StreamRetryController<L>>,
    urls: UrlFactory,
    selection: watch::Receiver<CameraSelection>,
    notifications: Arc<NotificationCenter>,
    interval: Duration,
    offline_recheck_ticks: u64,
    ticks: AtomicU64,
}

impl<L: StreamLoader> CameraPoller<L> {
    pub fn new(
        api: DashboardApi,
        controller: Arc<StreamRetryController<L>>,
        urls: UrlFactory,
        selection: watch::Receiver<CameraSelection>,
        notifications: Arc<NotificationCenter>,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            controller,
            urls,
            selection,
            notifications,
            interval,
            offline_recheck_ticks: 1,
            ticks: AtomicU64::new(0),
        }
    }

    pub fn with_offline_recheck(mut self, ticks: u32) -> Self {
        self.offline_recheck_ticks = u64::from(ticks.max(1));
        self
    }

    /// Refreshes once immediately, then every interval until shutdown
    pub async fn run(self, shutdown: CancellationToken) {
        info!("🎥 Camera poller started (every {:?})", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.refresh_once().await;
                }
            }
        }
        info!("🛑 Camera poller stopped");
    }

    /// Lists cameras and spawns one stream attempt per selected camera,
    /// a reconnect for offline ones on recheck ticks. Returns how many
    /// attempts were started.
    pub async fn refresh_once(&self) -> usize {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let recheck_offline = tick % self.offline_recheck_ticks == 0;

        let cameras = match self.api.list_cameras().await {
            Ok(cameras) => cameras,
            Err(e) => {
                warn!("Camera refresh failed: {}", e);
                self.notifications.notify(
                    "Camera error",
                    &describe_refresh_error(&e),
                    NotificationLevel::Error,
                );
                return 0;
            }
        };

        if cameras.is_empty() {
            warn!("No cameras registered");
            return 0;
        }

        let selection = *self.selection.borrow();
        let mut started = 0;
        for camera in cameras.into_iter().filter(|c| selection.includes(c.id)) {
            let offline = self
                .controller
                .state(camera.id)
                .is_some_and(|state| state.is_offline());
            if offline && !recheck_offline {
                continue;
            }

            let controller = Arc::clone(&self.controller);
            let urls = Arc::clone(&self.urls);
            tokio::spawn(async move {
                let outcome = if offline {
                    info!("🔄 Rechecking offline camera {}", camera.id);
                    controller.reconnect(camera.id, urls).await
                } else {
                    controller.attempt_load(camera.id, urls).await
                };
                debug!("Camera {} refresh: {:?}", camera.id, outcome);
            });
            started += 1;
        }
        started
    }
}
