//! Camera stream health: per-camera state, the load primitive and the
//! bounded-retry controller that drives both.

pub mod controller;
pub mod loader;
pub mod state;

use std::sync::Arc;
use chrono::Utc;

use crate::types::CameraId;
use controller::UrlFactory;

/// Stream URL for a camera with a millisecond timestamp to defeat caching
pub fn stream_url(origin: &str, camera_id: CameraId) -> String {
    format!(
        "{}/api/v1/cameras/{}/stream?t={}",
        origin.trim_end_matches('/'),
        camera_id,
        Utc::now().timestamp_millis()
    )
}

pub fn url_factory(origin: &str) -> UrlFactory {
    let origin = origin.trim_end_matches('/').to_string();
    Arc::new(move |camera_id| stream_url(&origin, camera_id))
}
