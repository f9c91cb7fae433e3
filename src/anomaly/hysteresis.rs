// Consecutive-window confirmation for the anomaly flag

/// Sets after `required` consecutive candidate windows, clears on the first
/// non-candidate window.
#[derive(Debug, Clone)]
pub struct AnomalyRunState {
    required: u32,
    consecutive: u32,
    detected: bool,
}

impl AnomalyRunState {
    pub const DEFAULT_REQUIRED: u32 = 3;

    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            consecutive: 0,
            detected: false,
        }
    }

    /// Feed one window's verdict; returns the flag after the update
    pub fn update(&mut self, candidate: bool) -> bool {
        if candidate {
            self.consecutive = self.consecutive.saturating_add(1);
            if self.consecutive >= self.required {
                self.detected = true;
            }
        } else {
            self.consecutive = 0;
            self.detected = false;
        }
        self.detected
    }

    pub fn detected(&self) -> bool {
        self.detected
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
        self.detected = false;
    }
}

impl Default for AnomalyRunState {
    fn default() -> Self {
        Self::new(Self::DEFAULT_REQUIRED)
    }
}
