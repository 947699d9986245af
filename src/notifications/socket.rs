use std::time::Duration;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WebSocketConfig;

/// Capped linear reconnect: the n-th retry waits `n * base_delay`
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Delay before the next reconnect, or `None` once attempts are used up
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.base_delay * self.attempts)
    }
}

impl From<&WebSocketConfig> for ReconnectPolicy {
    fn from(config: &WebSocketConfig) -> Self {
        Self::new(
            config.max_reconnect_attempts,
            Duration::from_millis(config.reconnect_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// JSON message pushed by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEvent {
    pub payload: Value,
}

impl ServerEvent {
    pub fn kind(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }
}

/// WebSocket URL for an HTTP origin
pub fn ws_url(origin: &str, path: &str) -> String {
    let origin = origin.trim_end_matches('/');
    let origin = if let Some(rest) = origin.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = origin.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        origin.to_string()
    };
    format!("{}{}", origin, path)
}

/// Push-notification connection with capped reconnect
pub struct NotificationSocket {
    url: String,
    policy: ReconnectPolicy,
    events: mpsc::Sender<ServerEvent>,
    status: watch::Sender<ConnectionStatus>,
}

impl NotificationSocket {
    pub fn new(
        url: String,
        policy: ReconnectPolicy,
        events: mpsc::Sender<ServerEvent>,
    ) -> (Self, watch::Receiver<ConnectionStatus>) {
        let (status, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        (
            Self {
                url,
                policy,
                events,
                status,
            },
            status_rx,
        )
    }

    /// Runs until shutdown or until reconnect attempts are exhausted
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            self.status.send_replace(ConnectionStatus::Connecting);
            let connected = tokio::select! {
                _ = shutdown.cancelled() => return,
                result = connect_async(self.url.as_str()) => result,
            };

            match connected {
                Ok((mut ws, _)) => {
                    info!("🔌 WebSocket connected to {}", self.url);
                    self.status.send_replace(ConnectionStatus::Connected);
                    self.policy.reset();

                    loop {
                        let next = tokio::select! {
                            _ = shutdown.cancelled() => {
                                let _ = ws.close(None).await;
                                self.status.send_replace(ConnectionStatus::Disconnected);
                                return;
                            }
                            next = ws.next() => next,
                        };
                        match next {
                            Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()).await,
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!("WebSocket error: {}", e);
                                self.status.send_replace(ConnectionStatus::Error);
                                break;
                            }
                        }
                    }
                    info!("🔌 WebSocket disconnected");
                }
                Err(e) => {
                    error!("WebSocket connect to {} failed: {}", self.url, e);
                    self.status.send_replace(ConnectionStatus::Error);
                }
            }

            self.status.send_replace(ConnectionStatus::Disconnected);
            let Some(delay) = self.policy.next_delay() else {
                warn!(
                    "🛑 Giving up on WebSocket after {} reconnect attempts",
                    self.policy.attempts()
                );
                return;
            };
            debug!("Reconnecting WebSocket in {:?} (attempt {})", delay, self.policy.attempts());
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(payload) => {
                debug!("📨 Push message: {}", payload);
                if self.events.send(ServerEvent { payload }).await.is_err() {
                    debug!("Push event receiver dropped");
                }
            }
            Err(e) => warn!("Ignoring non-JSON push message ({}): {}", e, text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::ws::{Message as AxumMessage, WebSocketUpgrade},
        routing::get,
        Router,
    };
    use serde_json::json;

    #[test]
    fn test_linear_backoff_is_capped() {
        let mut policy = ReconnectPolicy::new(5, Duration::from_secs(1));
        let delays: Vec<_> = std::iter::from_fn(|| policy.next_delay()).collect();
        assert_eq!(
            delays,
            (1..=5).map(Duration::from_secs).collect::<Vec<_>>()
        );
        assert_eq!(policy.next_delay(), None);

        policy.reset();
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_ws_url_scheme() {
        assert_eq!(ws_url("http://10.0.0.1:8000/", "/api/v1/ws"), "ws://10.0.0.1:8000/api/v1/ws");
        assert_eq!(ws_url("https://cams.example", "/api/v1/ws"), "wss://cams.example/api/v1/ws");
    }

    #[test]
    fn test_event_kind() {
        let event = ServerEvent { payload: json!({"type": "violation"}) };
        assert_eq!(event.kind(), Some("violation"));
        assert_eq!(ServerEvent { payload: json!([1]) }.kind(), None);
    }

    #[tokio::test]
    async fn test_forwards_json_messages() {
        let app = Router::new().route(
            "/api/v1/ws",
            get(|ws: WebSocketUpgrade| async move {
                ws.on_upgrade(|mut socket| async move {
                    let _ = socket.send(AxumMessage::Text(r#"{"type":"alert","camera":1}"#.into())).await;
                    let _ = socket.send(AxumMessage::Text("not json".into())).await;
                    let _ = socket.send(AxumMessage::Text(r#"{"n":2}"#.into())).await;
                    let _ = socket.send(AxumMessage::Close(None)).await;
                })
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let (tx, mut rx) = mpsc::channel(8);
        let url = ws_url(&format!("http://{}", addr), "/api/v1/ws");
        let (socket, status) = NotificationSocket::new(url, ReconnectPolicy::new(0, Duration::from_millis(10)), tx);

        tokio::time::timeout(Duration::from_secs(5), socket.run(CancellationToken::new()))
            .await
            .expect("socket should give up after the server closes");

        assert_eq!(rx.recv().await.unwrap().kind(), Some("alert"));
        assert_eq!(rx.recv().await.unwrap().payload, json!({"n": 2}));
        assert!(rx.recv().await.is_none());
        assert_eq!(*status.borrow(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_capped_attempts() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, _rx) = mpsc::channel(1);
        let url = format!("ws://{}/api/v1/ws", addr);
        let (socket, status) = NotificationSocket::new(url, ReconnectPolicy::new(2, Duration::from_secs(1)), tx);

        let started = tokio::time::Instant::now();
        socket.run(CancellationToken::new()).await;

        // 1s + 2s of linear backoff between the three connects.
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(*status.borrow(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_shutdown_stops_reconnecting() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, _rx) = mpsc::channel(1);
        let url = format!("ws://{}/api/v1/ws", addr);
        let (socket, _status) = NotificationSocket::new(url, ReconnectPolicy::new(5, Duration::from_secs(60)), tx);

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(socket.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("run should return promptly on shutdown")
            .unwrap();
    }
}
