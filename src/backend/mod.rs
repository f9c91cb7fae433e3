// Inference backend collaborators
//
// A backend is bound to one operating mode and owned exclusively by the
// orchestrator while that mode is active.

mod process;

pub use process::{ProcessBackend, ProcessBackendFactory};

use crate::types::{Detection, Frame, OperatingMode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    /// Construction failure; fatal for the mode that needed the backend
    #[error("Backend for {mode} mode unavailable: {reason}")]
    Unavailable { mode: OperatingMode, reason: String },

    /// Per-frame failure; the frame is treated as having no detections
    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Backend protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

pub trait DetectionBackend: Send {
    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        nms_threshold: f32,
    ) -> BackendResult<Vec<Detection>>;

    /// Ordered so that `class_names()[class_id]` names a detection
    fn class_names(&self) -> &[String];

    fn class_name(&self, class_id: usize) -> Option<&str> {
        self.class_names().get(class_id).map(String::as_str)
    }
}

/// Builds the backend a mode needs on mode entry
pub trait BackendFactory: Send {
    fn create(&mut self, mode: OperatingMode) -> BackendResult<Box<dyn DetectionBackend>>;
}

/// Factory used when no inference program is configured; every
/// backend-bound mode fails to start.
#[derive(Debug, Default)]
pub struct DisabledBackendFactory;

impl BackendFactory for DisabledBackendFactory {
    fn create(&mut self, mode: OperatingMode) -> BackendResult<Box<dyn DetectionBackend>> {
        Err(BackendError::Unavailable {
            mode,
            reason: "no inference backend configured".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_factory_refuses_every_mode() {
        let mut factory = DisabledBackendFactory;
        for mode in [OperatingMode::Detect, OperatingMode::Blur, OperatingMode::Fall] {
            let err = factory.create(mode).err().unwrap();
            assert!(matches!(err, BackendError::Unavailable { mode: m, .. } if m == mode));
        }
    }
}
