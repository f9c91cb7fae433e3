// Process-wide state shared between the orchestrator and the command surface

use crate::types::OperatingMode;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Handed out as `Arc<SharedState>`; there is no global instance.
#[derive(Debug)]
pub struct SharedState {
    mode: Mutex<OperatingMode>,
    running: AtomicBool,
    anomaly_active: AtomicBool,
}

impl SharedState {
    pub fn new(initial_mode: OperatingMode) -> Self {
        Self {
            mode: Mutex::new(initial_mode),
            running: AtomicBool::new(true),
            anomaly_active: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> OperatingMode {
        *self.mode.lock()
    }

    /// Returns the previous mode
    pub fn set_mode(&self, mode: OperatingMode) -> OperatingMode {
        let mut guard = self.mode.lock();
        let previous = *guard;
        *guard = mode;
        if previous != mode {
            log::info!("Operating mode set: {} -> {}", previous, mode);
        }
        previous
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Safe to call from a signal handler task
    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn anomaly_active(&self) -> bool {
        self.anomaly_active.load(Ordering::Acquire)
    }

    pub fn set_anomaly_active(&self, active: bool) {
        self.anomaly_active.store(active, Ordering::Release);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(OperatingMode::Blur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_mode_returns_previous() {
        let state = SharedState::new(OperatingMode::Detect);
        assert_eq!(state.set_mode(OperatingMode::Fall), OperatingMode::Detect);
        assert_eq!(state.mode(), OperatingMode::Fall);
    }

    #[test]
    fn test_shutdown_flag() {
        let state = Arc::new(SharedState::default());
        assert!(state.is_running());

        let handle = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || state.request_shutdown())
        };
        handle.join().unwrap();
        assert!(!state.is_running());
    }

    #[test]
    fn test_anomaly_mirror() {
        let state = SharedState::default();
        assert!(!state.anomaly_active());
        state.set_anomaly_active(true);
        assert!(state.anomaly_active());
    }
}
