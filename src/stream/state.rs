use std::collections::HashMap;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::types::CameraId;

/// Stream health of a single camera tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    #[default]
    Idle,
    Loading,
    Backoff,
    Offline,
}

#[derive(Debug, Clone, Default)]
pub struct CameraStreamState {
    pub retry_count: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub phase: StreamPhase,
    /// Bumped on every attempt and on reconnect; results carrying an older
    /// generation are discarded.
    pub(crate) generation: u64,
    /// Token of the in-flight attempt or the pending backoff timer.
    pub(crate) cancel: Option<CancellationToken>,
}

impl CameraStreamState {
    pub fn is_loading(&self) -> bool {
        self.phase == StreamPhase::Loading
    }

    pub fn is_offline(&self) -> bool {
        self.phase == StreamPhase::Offline
    }

    /// Cancels whatever this camera is waiting on and returns it to Idle.
    pub(crate) fn reset(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.generation += 1;
        self.retry_count = 0;
        self.phase = StreamPhase::Idle;
    }

    pub(crate) fn get_state_string(&self) -> &'static str {
        match self.phase {
            StreamPhase::Idle => "Idle",
            StreamPhase::Loading => "Loading",
            StreamPhase::Backoff => "Backoff",
            StreamPhase::Offline => "Offline",
        }
    }
}

impl std::fmt::Display for CameraStreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CameraStreamState {{ state: {}, retries: {}, last_success: {} }}",
            self.get_state_string(),
            self.retry_count,
            self.last_success
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string()),
        )
    }
}

/// Per-camera stream states, owned by the retry controller
#[derive(Debug, Default)]
pub struct StreamStateStore {
    states: HashMap<CameraId, CameraStreamState>,
}

impl StreamStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &CameraId) -> Option<&CameraStreamState> {
        self.states.get(id)
    }

    /// State is created lazily on first touch.
    pub fn entry(&mut self, id: CameraId) -> &mut CameraStreamState {
        self.states.entry(id).or_default()
    }

    pub fn camera_ids(&self) -> Vec<CameraId> {
        let mut ids: Vec<CameraId> = self.states.keys().copied().collect();
        ids.sort();
        ids
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_is_lazy_and_idle() {
        let mut store = StreamStateStore::new();
        assert!(store.get(&CameraId(1)).is_none());

        let state = store.entry(CameraId(1));
        assert_eq!(state.phase, StreamPhase::Idle);
        assert_eq!(state.retry_count, 0);
        assert!(state.last_success.is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reset_cancels_pending_token() {
        let mut store = StreamStateStore::new();
        let token = CancellationToken::new();
        {
            let state = store.entry(CameraId(4));
            state.phase = StreamPhase::Offline;
            state.retry_count = 4;
            state.cancel = Some(token.clone());
            state.reset();
        }

        let state = store.get(&CameraId(4)).unwrap();
        assert!(token.is_cancelled());
        assert_eq!(state.phase, StreamPhase::Idle);
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.generation, 1);
        assert!(state.cancel.is_none());
    }

    #[test]
    fn test_camera_ids_sorted() {
        let mut store = StreamStateStore::new();
        store.entry(CameraId(3));
        store.entry(CameraId(1));
        assert_eq!(store.camera_ids(), vec![CameraId(1), CameraId(3)]);
    }

    #[test]
    fn test_display() {
        let state = CameraStreamState::default();
        assert_eq!(
            state.to_string(),
            "CameraStreamState { state: Idle, retries: 0, last_success: never }"
        );
    }
}
