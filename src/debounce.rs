// Rate-limited trigger for the LED fade actuator
//
// Calls inside the cooldown window are dropped, not queued.

use parking_lot::Mutex;
use std::io;
use std::time::{Duration, Instant};

/// Fade request handed to the actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeParams {
    pub period_ns: u64,
    pub duration_ms: u64,
    pub steps: u8,
    pub polarity: u8,
}

impl Default for FadeParams {
    fn default() -> Self {
        Self {
            period_ns: 500_000,
            duration_ms: 300,
            steps: 30,
            polarity: 0,
        }
    }
}

/// Physical actuation primitive (PWM LED fade)
pub trait Actuator: Send {
    fn fade(
        &mut self,
        period_ns: u64,
        duration_ms: u64,
        steps: u8,
        polarity: u8,
    ) -> io::Result<()>;
}

struct DebounceState {
    actuator: Box<dyn Actuator>,
    last_trigger: Option<Instant>,
}

pub struct DebounceController {
    state: Mutex<DebounceState>,
    cooldown: Duration,
    fade: FadeParams,
}

impl DebounceController {
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(300);

    pub fn new(actuator: Box<dyn Actuator>, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(DebounceState {
                actuator,
                last_trigger: None,
            }),
            cooldown,
            fade: FadeParams::default(),
        }
    }

    pub fn with_fade(mut self, fade: FadeParams) -> Self {
        self.fade = fade;
        self
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Fire the fade unless the previous one is still inside the cooldown.
    /// Returns whether the actuator was invoked.
    pub fn trigger(&self) -> bool {
        self.trigger_at(Instant::now())
    }

    pub fn trigger_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();

        if let Some(last) = state.last_trigger {
            if now.saturating_duration_since(last) < self.cooldown {
                return false;
            }
        }

        let FadeParams {
            period_ns,
            duration_ms,
            steps,
            polarity,
        } = self.fade;

        log::debug!("LED fade triggered");
        if let Err(e) = state.actuator.fade(period_ns, duration_ms, steps, polarity) {
            log::warn!("LED fade failed: {}", e);
        }
        state.last_trigger = Some(now);
        true
    }
}
