use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Timestamp layout used in every persisted record
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn local_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// PPE detection: helmets and safety vests against persons
    Detect,
    /// Person counting with persons blurred in the output
    Blur,
    Fall,
    Trespass,
    /// Frames pass through untouched
    Raw,
    Stop,
}

impl OperatingMode {
    pub const ALL: [OperatingMode; 6] = [
        OperatingMode::Detect,
        OperatingMode::Blur,
        OperatingMode::Fall,
        OperatingMode::Trespass,
        OperatingMode::Raw,
        OperatingMode::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::Detect => "detect",
            OperatingMode::Blur => "blur",
            OperatingMode::Fall => "fall",
            OperatingMode::Trespass => "trespass",
            OperatingMode::Raw => "raw",
            OperatingMode::Stop => "stop",
        }
    }

    /// Raw and Stop run without an inference backend
    pub fn requires_backend(&self) -> bool {
        !matches!(self, OperatingMode::Raw | OperatingMode::Stop)
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown operating mode: {0}")]
pub struct UnknownModeError(pub String);

impl FromStr for OperatingMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        OperatingMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == lowered)
            .ok_or_else(|| UnknownModeError(s.to_string()))
    }
}

/// Axis-aligned bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub region: Region,
    pub confidence: f32,
    pub class_id: usize,
}

/// One captured image; `data` is row-major, interleaved channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    pub fn byte_len(width: u32, height: u32, channels: u8) -> usize {
        width as usize * height as usize * channels as usize
    }

    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(width, height, 3, vec![0; Self::byte_len(width, height, 3)])
    }
}

/// Per-frame class counts extracted from a PPE detection pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub detection_count: usize,
    /// Distinct class names seen, sorted, joined with ", "
    pub all_objects: String,
    pub person_count: usize,
    pub helmet_count: usize,
    pub safety_vest_count: usize,
    pub avg_confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub camera_id: u32,
    pub timestamp: String,
    pub all_objects: String,
    pub person_count: usize,
    pub helmet_count: usize,
    pub safety_vest_count: usize,
    pub avg_confidence: f32,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlurRecord {
    pub camera_id: u32,
    pub timestamp: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallRecord {
    pub camera_id: u32,
    pub timestamp: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrespassRecord {
    pub camera_id: u32,
    pub timestamp: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("detect".parse::<OperatingMode>().unwrap(), OperatingMode::Detect);
        assert_eq!(" Trespass ".parse::<OperatingMode>().unwrap(), OperatingMode::Trespass);
        assert!("sleep".parse::<OperatingMode>().is_err());
    }

    #[test]
    fn test_mode_round_trips_through_display() {
        for mode in OperatingMode::ALL {
            assert_eq!(mode.to_string().parse::<OperatingMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_mode_serde_is_lowercase() {
        let json = serde_json::to_string(&OperatingMode::Fall).unwrap();
        assert_eq!(json, "\"fall\"");
    }

    #[test]
    fn test_backend_requirement() {
        assert!(OperatingMode::Detect.requires_backend());
        assert!(OperatingMode::Blur.requires_backend());
        assert!(!OperatingMode::Raw.requires_backend());
        assert!(!OperatingMode::Stop.requires_backend());
    }

    #[test]
    fn test_timestamp_layout() {
        let ts = local_timestamp();
        assert_eq!(ts.len(), 19);
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).is_ok());
    }
}
