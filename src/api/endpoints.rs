use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::client::ApiClient;
use crate::error::ApiError;
use crate::types::{Camera, CameraId, SystemInfo};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PositionResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Typed wrappers for the monitoring backend endpoints
#[derive(Clone)]
pub struct DashboardApi {
    client: ApiClient,
}

impl DashboardApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    #[allow(dead_code)]
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub async fn list_cameras(&self) -> Result<Vec<Camera>, ApiError> {
        let value = self.client.get("/cameras").await?;
        if !value.is_array() {
            return Err(ApiError::Malformed(
                "camera listing is not an array".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    #[allow(dead_code)]
    pub async fn connect_camera(&self, camera_id: CameraId) -> Result<(), ApiError> {
        let endpoint = format!("/api/v1/cameras/{}/connect", camera_id);
        self.client.post(&endpoint, json!({})).await?;
        info!("🔌 Camera {} connect requested", camera_id);
        Ok(())
    }

    /// Logs in and stores the returned token for the session, or persistently
    /// when `remember` is set.
    pub async fn login(&self, username: &str, password: &str, remember: bool) -> Result<(), ApiError> {
        let value = self
            .client
            .post(
                "/api/auth/login",
                json!({ "username": username, "password": password }),
            )
            .await?;
        let response: LoginResponse = serde_json::from_value(value)?;
        let Some(token) = response.token else {
            return Err(ApiError::Malformed(
                response.message.unwrap_or_else(|| "login response has no token".to_string()),
            ));
        };

        self.client
            .store()
            .set_auth_token(&token, remember)
            .map_err(|e| ApiError::Storage(e.to_string()))?;
        info!("🔑 Logged in as {}", username);
        Ok(())
    }

    /// Token is dropped locally even when the backend call fails.
    #[allow(dead_code)]
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = self.client.post("/api/auth/logout", json!({})).await;
        if let Err(e) = self.client.store().clear_auth_token() {
            warn!("Failed to clear auth token: {}", e);
        }
        result.map(|_| ())
    }

    pub async fn get_settings(&self) -> Result<Value, ApiError> {
        self.client.get("/api/v1/settings").await
    }

    pub async fn save_settings(&self, settings: Value) -> Result<Value, ApiError> {
        self.client.post("/api/v1/settings", settings).await
    }

    pub async fn reset_settings(&self) -> Result<(), ApiError> {
        self.client.post("/settings/reset", json!({})).await.map(|_| ())
    }

    #[allow(dead_code)]
    pub async fn update_position(&self, position: &str) -> Result<(), ApiError> {
        let value = self
            .client
            .put("/api/v1/users/position", json!({ "position": position }))
            .await?;
        let response: PositionResponse = serde_json::from_value(value)?;
        if response.success {
            Ok(())
        } else {
            Err(ApiError::Rejected(
                response.message.unwrap_or_else(|| "position update failed".to_string()),
            ))
        }
    }

    pub async fn system_info(&self) -> Result<SystemInfo, ApiError> {
        let value = self.client.get("/system/info").await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use axum::{
        routing::{get, post, put},
        Json, Router,
    };
    use crate::api::client::RequestPolicy;
    use crate::token_store::LocalStore;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn api(origin: &str) -> (DashboardApi, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::open(dir.path().join("state.json")).unwrap());
        let policy = RequestPolicy {
            max_retries: 0,
            retry_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(2),
        };
        let client = ApiClient::new(reqwest::Client::new(), origin, policy, store);
        (DashboardApi::new(client), dir)
    }

    #[tokio::test]
    async fn test_list_cameras() {
        let app = Router::new().route(
            "/cameras",
            get(|| async { Json(json!([{"id": 1, "name": "Gate"}, {"id": 2}])) }),
        );
        let (api, _dir) = api(&serve(app).await);

        let cameras = api.list_cameras().await.unwrap();
        assert_eq!(cameras.iter().map(|c| c.id).collect::<Vec<_>>(), vec![CameraId(1), CameraId(2)]);
    }

    #[tokio::test]
    async fn test_list_cameras_rejects_non_array() {
        let app = Router::new().route(
            "/cameras",
            get(|| async { Json(json!({"cameras": [1, 2]})) }),
        );
        let (api, _dir) = api(&serve(app).await);

        assert!(matches!(api.list_cameras().await, Err(ApiError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_login_stores_token() {
        let app = Router::new().route(
            "/api/auth/login",
            post(|Json(body): Json<Value>| async move {
                if body["username"] == "admin" && body["password"] == "secret" {
                    Json(json!({"token": "abc"}))
                } else {
                    Json(json!({"message": "invalid credentials"}))
                }
            }),
        );
        let (api, _dir) = api(&serve(app).await);

        assert_eq!(
            api.login("admin", "wrong", false).await,
            Err(ApiError::Malformed("invalid credentials".to_string()))
        );
        assert_eq!(api.client().store().auth_token(), None);

        tokio_test::assert_ok!(api.login("admin", "secret", false).await);
        assert_eq!(api.client().store().auth_token().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_logout_clears_token_even_on_failure() {
        let app = Router::new().route(
            "/api/auth/logout",
            post(|| async { axum::http::StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let (api, _dir) = api(&serve(app).await);
        api.client().store().set_auth_token("abc", true).unwrap();

        assert_eq!(api.logout().await, Err(ApiError::Status(500)));
        assert_eq!(api.client().store().auth_token(), None);
    }

    #[tokio::test]
    async fn test_update_position() {
        let app = Router::new().route(
            "/api/v1/users/position",
            put(|Json(body): Json<Value>| async move {
                if body["position"].as_str().unwrap_or("").is_empty() {
                    Json(json!({"success": false, "message": "position required"}))
                } else {
                    Json(json!({"success": true}))
                }
            }),
        );
        let (api, _dir) = api(&serve(app).await);

        tokio_test::assert_ok!(api.update_position("Site manager").await);
        assert_eq!(
            api.update_position("").await,
            Err(ApiError::Rejected("position required".to_string()))
        );
    }

    #[tokio::test]
    async fn test_system_info_and_connect() {
        let app = Router::new()
            .route(
                "/system/info",
                get(|| async { Json(json!({"memory": {"used": 4294967296u64, "total": 17179869184u64}})) }),
            )
            .route(
                "/api/v1/cameras/:id/connect",
                post(|| async { Json(json!({"message": "connected"})) }),
            );
        let (api, _dir) = api(&serve(app).await);

        let info = api.system_info().await.unwrap();
        assert_eq!(crate::types::format_memory(info.memory.used), "4.0 GB");
        assert!((info.memory.usage_percent() - 25.0).abs() < 1e-9);
        tokio_test::assert_ok!(api.connect_camera(CameraId(3)).await);
    }

    #[tokio::test]
    async fn test_login_reports_unwritable_state_file() {
        let app = Router::new().route(
            "/api/auth/login",
            post(|| async { Json(json!({"token": "abc"})) }),
        );
        let origin = serve(app).await;
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LocalStore::open(dir.path().join("missing").join("state.json")).unwrap());
        let policy = RequestPolicy {
            max_retries: 0,
            retry_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(2),
        };
        let api = DashboardApi::new(ApiClient::new(reqwest::Client::new(), &origin, policy, store));

        assert!(matches!(api.login("admin", "secret", true).await, Err(ApiError::Storage(_))));
        assert_eq!(api.client().store().auth_token(), None);
    }

    #[tokio::test]
    async fn test_empty_ok_bodies_succeed() {
        let app = Router::new()
            .route("/settings/reset", post(|| async { axum::http::StatusCode::OK }))
            .route(
                "/api/v1/cameras/:id/connect",
                post(|| async { axum::http::StatusCode::NO_CONTENT }),
            );
        let (api, _dir) = api(&serve(app).await);

        tokio_test::assert_ok!(api.reset_settings().await);
        tokio_test::assert_ok!(api.connect_camera(CameraId(2)).await);
    }
}
