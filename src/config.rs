use crate::anomaly::sensor::AdcDevice;
use crate::anomaly::AnomalyConfig;
use crate::debounce::DebounceController;
use crate::led::LedPwmDevice;
use crate::orchestrator::{AnomalySignal, OrchestratorConfig};
use crate::transport::SerialConfig;
use crate::types::OperatingMode;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const PREFIX: &str = "SITEWATCH_";

/// Node configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Alarm microcontroller link
    pub serial: SerialConfig,
    /// ADC character device feeding the anomaly detector
    pub adc_device: PathBuf,
    /// LED PWM fade device
    pub led_device: PathBuf,
    pub debounce_cooldown: Duration,
    pub anomaly: AnomalyConfig,
    pub orchestrator: OrchestratorConfig,
    pub initial_mode: OperatingMode,
    /// Directory for the JSON-lines logs
    pub data_dir: PathBuf,
    /// WAV clip played on unsafe frames
    pub alert_clip: Option<PathBuf>,
    /// ALSA device passed to the player
    pub audio_device: String,
    /// Inference bridge program; without it no backend-bound mode can start
    pub backend_command: Option<String>,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Bind address of the command surface
    pub control_addr: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            adc_device: PathBuf::from(AdcDevice::DEFAULT_PATH),
            led_device: PathBuf::from(LedPwmDevice::DEFAULT_PATH),
            debounce_cooldown: DebounceController::DEFAULT_COOLDOWN,
            anomaly: AnomalyConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            initial_mode: OperatingMode::Blur,
            data_dir: PathBuf::from("./data"),
            alert_clip: None,
            audio_device: "default".to_string(),
            backend_command: None,
            frame_width: 320,
            frame_height: 240,
            control_addr: "127.0.0.1:9000".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load `.env` if present, then read `SITEWATCH_*` variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Absent keys take defaults, present
    /// but malformed values are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };
        let defaults = Self::default();

        let serial = SerialConfig {
            port: vars.string("SERIAL_PORT").unwrap_or(defaults.serial.port),
            baud_rate: vars.parse_or("BAUD_RATE", defaults.serial.baud_rate)?,
            poll_quantum: vars.millis_or("SERIAL_POLL_MS", defaults.serial.poll_quantum)?,
            response_timeout: vars
                .millis_or("SERIAL_TIMEOUT_MS", defaults.serial.response_timeout)?,
        };

        let anomaly = AnomalyConfig {
            window_size: vars.parse_or("WINDOW_SIZE", defaults.anomaly.window_size)?,
            sample_rate_hz: vars.parse_or("SAMPLE_RATE", defaults.anomaly.sample_rate_hz)?,
            cutoff_hz: vars.parse_or("CUTOFF_HZ", defaults.anomaly.cutoff_hz)?,
            calibration_windows: vars
                .parse_or("CALIBRATION_WINDOWS", defaults.anomaly.calibration_windows)?,
            threshold: vars.parse_or("ANOMALY_THRESHOLD", defaults.anomaly.threshold)?,
            confirm_windows: vars.parse_or("CONFIRM_WINDOWS", defaults.anomaly.confirm_windows)?,
            max_read_failures: defaults.anomaly.max_read_failures,
        };

        let orchestrator = OrchestratorConfig {
            camera_id: vars.parse_or("CAMERA_ID", defaults.orchestrator.camera_id)?,
            save_interval: vars
                .secs_or("SAVE_INTERVAL_SECS", defaults.orchestrator.save_interval)?,
            anomaly_check_interval: vars
                .secs_or("ANOMALY_CHECK_SECS", defaults.orchestrator.anomaly_check_interval)?,
            system_info_interval: vars
                .secs_or("SYSTEM_INFO_SECS", defaults.orchestrator.system_info_interval)?,
            confidence_threshold: vars
                .parse_or("CONFIDENCE", defaults.orchestrator.confidence_threshold)?,
            nms_threshold: vars.parse_or("NMS", defaults.orchestrator.nms_threshold)?,
            anomaly_signal: vars
                .parse_or::<AnomalySignal>("ANOMALY_SIGNAL", defaults.orchestrator.anomaly_signal)?,
        };

        let config = Self {
            serial,
            adc_device: vars.path("ADC_DEVICE").unwrap_or(defaults.adc_device),
            led_device: vars.path("LED_DEVICE").unwrap_or(defaults.led_device),
            debounce_cooldown: vars.millis_or("DEBOUNCE_MS", defaults.debounce_cooldown)?,
            anomaly,
            orchestrator,
            initial_mode: vars.parse_or("INITIAL_MODE", defaults.initial_mode)?,
            data_dir: vars.path("DATA_DIR").unwrap_or(defaults.data_dir),
            alert_clip: vars.path("ALERT_CLIP"),
            audio_device: vars.string("AUDIO_DEVICE").unwrap_or(defaults.audio_device),
            backend_command: vars.string("BACKEND_COMMAND"),
            frame_width: vars.parse_or("FRAME_WIDTH", defaults.frame_width)?,
            frame_height: vars.parse_or("FRAME_HEIGHT", defaults.frame_height)?,
            control_addr: vars.string("CONTROL_ADDR").unwrap_or(defaults.control_addr),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.anomaly.window_size < 2 {
            return Err(ConfigError::InvalidValue(format!(
                "{}WINDOW_SIZE must be at least 2",
                PREFIX
            )));
        }
        if self.anomaly.sample_rate_hz <= 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "{}SAMPLE_RATE must be positive",
                PREFIX
            )));
        }
        if self.anomaly.calibration_windows == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "{}CALIBRATION_WINDOWS must be at least 1",
                PREFIX
            )));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::InvalidValue(
                "frame dimensions must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{}{}", PREFIX, key))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn path(&self, key: &str) -> Option<PathBuf> {
        self.string(key).map(PathBuf::from)
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.string(key) {
            Some(raw) => raw.parse().map_err(|_| {
                ConfigError::InvalidValue(format!("{}{}={}", PREFIX, key, raw))
            }),
            None => Ok(default),
        }
    }

    fn millis_or(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let ms = self.parse_or(key, default.as_millis() as u64)?;
        Ok(Duration::from_millis(ms))
    }

    fn secs_or(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let secs = self.parse_or(key, default.as_secs_f64())?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "{}{} must be a non-negative number of seconds",
                PREFIX, key
            )));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
