use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Camera identifier as issued by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub u32);

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CameraId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(CameraId)
    }
}

/// Camera entry from the listing endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub id: CameraId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Which camera tiles are being refreshed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraSelection {
    #[default]
    All,
    Only(CameraId),
}

impl CameraSelection {
    pub fn includes(&self, id: CameraId) -> bool {
        match self {
            CameraSelection::All => true,
            CameraSelection::Only(selected) => *selected == id,
        }
    }
}

impl FromStr for CameraSelection {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            Ok(CameraSelection::All)
        } else {
            s.parse().map(CameraSelection::Only)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub used: u64,
    pub total: u64,
}

/// Response of `GET /system/info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub memory: MemoryInfo,
}

impl MemoryInfo {
    pub fn usage_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.used as f64 / self.total as f64 * 100.0
    }
}

/// Format a byte count as gigabytes with one decimal
pub fn format_memory(bytes: u64) -> String {
    let gb = bytes as f64 / (1024.0 * 1024.0 * 1024.0);
    format!("{:.1} GB", gb)
}
