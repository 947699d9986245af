use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{ApiClient, DashboardApi, RequestPolicy};
use crate::config::AppConfig;
use crate::notifications::socket::{ws_url, NotificationSocket, ReconnectPolicy, ServerEvent};
use crate::notifications::{NotificationCenter, NotificationLevel};
use crate::poller::CameraPoller;
use crate::settings::SettingsManager;
use crate::stream::controller::{RetryPolicy, StreamRetryController, StreamSignal};
use crate::stream::loader::HttpStreamLoader;
use crate::stream::state::StreamStateStore;
use crate::token_store::LocalStore;
use crate::types::{format_memory, CameraSelection};

mod api;
mod config;
mod error;
mod notifications;
mod poller;
mod settings;
mod stream;
mod telemetry;
mod token_store;
mod types;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_telemetry()?;

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config = AppConfig::load(&config_path)?;
    info!("⚙️ Configuration loaded: backend {}", config.origin());

    let store = Arc::new(
        LocalStore::open(&config.state_file)
            .with_context(|| format!("opening state file {}", config.state_file))?,
    );
    info!("🧑 Avatar {}", store.avatar_or_random());

    let http = reqwest::Client::builder()
        .build()
        .context("building HTTP client")?;
    let client = ApiClient::new(
        http.clone(),
        config.origin(),
        RequestPolicy::from(&config.api),
        store.clone(),
    );
    let api = DashboardApi::new(client);
    let notifications = Arc::new(NotificationCenter::new(config.notification_history));

    login_from_env(&api, &store).await;

    let settings = SettingsManager::new(api.clone());
    match settings.load().await {
        Ok(s) => info!("⚙️ Violation threshold {}", s.violation_threshold),
        Err(e) => warn!("Settings unavailable: {}", e),
    }

    match api.system_info().await {
        Ok(system) => info!(
            "🖥️ Memory {} / {} ({:.0}%)",
            format_memory(system.memory.used),
            format_memory(system.memory.total),
            system.memory.usage_percent()
        ),
        Err(e) => warn!("System info unavailable: {}", e),
    }

    let shutdown = CancellationToken::new();

    // Push notifications
    let (event_tx, event_rx) = mpsc::channel::<ServerEvent>(64);
    let (socket, _socket_status) = NotificationSocket::new(
        ws_url(config.origin(), &config.websocket.path),
        ReconnectPolicy::from(&config.websocket),
        event_tx,
    );
    let socket_handle = tokio::spawn(socket.run(shutdown.clone()));
    tokio::spawn(forward_push_events(event_rx, notifications.clone()));

    // Camera streams
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let loader = Arc::new(HttpStreamLoader::new(http, store.clone()));
    let controller = StreamRetryController::new(
        loader,
        RetryPolicy::from(&config.stream),
        StreamStateStore::new(),
        signal_tx,
    );
    tokio::spawn(forward_stream_signals(signal_rx, notifications.clone()));

    let selection: CameraSelection = config.selected_camera.parse().unwrap_or_else(|_| {
        warn!("Unknown camera selection {:?}, showing all", config.selected_camera);
        CameraSelection::All
    });
    let (_selection_tx, selection_rx) = watch::channel(selection);

    let poller = CameraPoller::new(
        api.clone(),
        controller.clone(),
        stream::url_factory(config.origin()),
        selection_rx,
        notifications.clone(),
        config.poll_interval(),
    )
    .with_offline_recheck(config.offline_recheck_ticks);
    let poller_handle = tokio::spawn(poller.run(shutdown.clone()));

    info!("🚀 Dashboard monitor running; press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    shutdown.cancel();

    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = poller_handle.await;
        let _ = socket_handle.await;
    })
    .await;

    let mut offline = 0;
    for camera_id in controller.tracked_cameras() {
        if let Some(state) = controller.state(camera_id) {
            info!("📷 Camera {}: {}", camera_id, state);
            if state.is_offline() {
                offline += 1;
            }
        }
    }
    if offline > 0 {
        warn!("📴 {} camera(s) offline at shutdown", offline);
    }
    info!(
        "🛑 Shutdown complete ({} notifications, unread: {})",
        notifications.list().len(),
        notifications.has_unread()
    );
    Ok(())
}

/// Logs in with `WATHEYE_USERNAME` / `WATHEYE_PASSWORD` when no token is stored
async fn login_from_env(api: &DashboardApi, store: &LocalStore) {
    if store.auth_token().is_some() {
        return;
    }
    let (Ok(username), Ok(password)) = (
        std::env::var("WATHEYE_USERNAME"),
        std::env::var("WATHEYE_PASSWORD"),
    ) else {
        warn!("🔑 No auth token stored and no credentials in the environment");
        return;
    };
    let remember = std::env::var("WATHEYE_REMEMBER").map(|v| v == "1").unwrap_or(false);
    if let Err(e) = api.login(&username, &password, remember).await {
        error!("🔑 Login failed: {}", e);
    }
}

async fn forward_stream_signals(
    mut signals: mpsc::UnboundedReceiver<StreamSignal>,
    notifications: Arc<NotificationCenter>,
) {
    while let Some(signal) = signals.recv().await {
        match signal {
            StreamSignal::Display { camera_id, url } => {
                tracing::debug!("🖼️ Camera {} showing {}", camera_id, url);
            }
            StreamSignal::Reconnecting { camera_id, attempt, max_retries } => notifications.notify(
                "Camera reconnect",
                &format!("Camera {} reconnecting... ({}/{})", camera_id, attempt, max_retries),
                NotificationLevel::Warning,
            ),
            StreamSignal::Offline { camera_id } => notifications.notify(
                "Camera offline",
                &format!("Camera {} is offline", camera_id),
                NotificationLevel::Error,
            ),
        }
    }
}

async fn forward_push_events(mut events: mpsc::Receiver<ServerEvent>, notifications: Arc<NotificationCenter>) {
    while let Some(event) = events.recv().await {
        let title = event.kind().unwrap_or("Notification").to_string();
        let message = event
            .payload
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| event.payload.to_string());
        notifications.notify(&title, &message, NotificationLevel::Info);
    }
}
