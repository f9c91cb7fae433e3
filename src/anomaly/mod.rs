// Acoustic anomaly detector
//
// Calibrates a baseline on the caller's thread, then samples on a dedicated
// thread and publishes a single boolean flag readable from anywhere.

pub mod calibration;
pub mod hysteresis;
pub mod sensor;
pub mod spectral;

pub use calibration::{CalibrationProfile, FeatureStats};
pub use hysteresis::AnomalyRunState;
pub use sensor::{AdcDevice, SampleSource};
pub use spectral::{Features, SpectralAnalyzer};

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnomalyError {
    #[error("Sample source unavailable")]
    SourceUnavailable,

    #[error("Sensor read failed {attempts} times in a row: {source}")]
    SensorRead {
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("Calibration interrupted")]
    CalibrationInterrupted,

    #[error("Failed to spawn sampling thread: {0}")]
    Spawn(io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    pub window_size: usize,
    pub sample_rate_hz: f64,
    pub cutoff_hz: f64,
    pub calibration_windows: usize,
    pub threshold: f64,
    pub confirm_windows: u32,
    /// Consecutive read failures tolerated before a window is abandoned
    pub max_read_failures: u32,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            window_size: 256,
            sample_rate_hz: 860.0,
            cutoff_hz: 200.0,
            calibration_windows: 20,
            threshold: 3.0,
            confirm_windows: AnomalyRunState::DEFAULT_REQUIRED,
            max_read_failures: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorState {
    Idle,
    Calibrating,
    Armed,
    Stopped,
}

/// Owns the source, the analyzer and the pacing clock. Moves into the
/// sampling thread and is handed back when it exits.
struct Sampler {
    source: Box<dyn SampleSource>,
    analyzer: SpectralAnalyzer,
    period: Duration,
    next_due: Instant,
    max_read_failures: u32,
}

impl Sampler {
    fn new(source: Box<dyn SampleSource>, config: &AnomalyConfig) -> Self {
        let rate = if config.sample_rate_hz > 0.0 {
            config.sample_rate_hz
        } else {
            AnomalyConfig::default().sample_rate_hz
        };

        Self {
            source,
            analyzer: SpectralAnalyzer::new(config.window_size.max(2), rate, config.cutoff_hz),
            period: Duration::from_secs_f64(1.0 / rate),
            next_due: Instant::now(),
            max_read_failures: config.max_read_failures.max(1),
        }
    }

    fn into_source(self) -> Box<dyn SampleSource> {
        self.source
    }

    fn pace(&mut self) {
        let now = Instant::now();
        if now < self.next_due {
            thread::sleep(self.next_due - now);
            self.next_due += self.period;
        } else {
            // Behind schedule: resynchronise instead of bursting to catch up
            self.next_due = now + self.period;
        }
    }

    fn read_sample(&mut self, stop: &AtomicBool) -> Result<Option<f64>, AnomalyError> {
        let mut failures = 0u32;
        loop {
            if stop.load(Ordering::Acquire) {
                return Ok(None);
            }
            self.pace();
            match self.source.read_raw() {
                Ok(raw) => return Ok(Some(self.source.to_voltage(raw))),
                Err(e) => {
                    failures += 1;
                    if failures >= self.max_read_failures {
                        return Err(AnomalyError::SensorRead {
                            attempts: failures,
                            source: e,
                        });
                    }
                }
            }
        }
    }

    /// One full window of voltages, or `None` if stop was requested midway
    fn acquire_window(&mut self, stop: &AtomicBool) -> Result<Option<Vec<f64>>, AnomalyError> {
        let n = self.analyzer.window_size();
        let mut samples = Vec::with_capacity(n);
        while samples.len() < n {
            match self.read_sample(stop)? {
                Some(v) => samples.push(v),
                None => return Ok(None),
            }
        }
        Ok(Some(samples))
    }

    fn next_features(&mut self, stop: &AtomicBool) -> Result<Option<Features>, AnomalyError> {
        Ok(self
            .acquire_window(stop)?
            .map(|samples| self.analyzer.analyze(&samples)))
    }

    fn calibrate(
        &mut self,
        windows: usize,
        stop: &AtomicBool,
    ) -> Result<CalibrationProfile, AnomalyError> {
        self.analyzer.reset();
        self.next_due = Instant::now();

        // Primes the previous spectrum so the first counted flux is meaningful
        if self.next_features(stop)?.is_none() {
            return Err(AnomalyError::CalibrationInterrupted);
        }

        let mut collected = Vec::with_capacity(windows);
        while collected.len() < windows {
            match self.next_features(stop)? {
                Some(features) => collected.push(features),
                None => return Err(AnomalyError::CalibrationInterrupted),
            }
        }

        Ok(CalibrationProfile::from_features(&collected))
    }
}

struct WorkerShared {
    stop: Arc<AtomicBool>,
    detected: Arc<AtomicBool>,
    threshold_bits: Arc<AtomicU64>,
}

fn run_detection(
    mut sampler: Sampler,
    profile: CalibrationProfile,
    confirm_windows: u32,
    shared: WorkerShared,
) -> Box<dyn SampleSource> {
    let mut run = AnomalyRunState::new(confirm_windows);
    let mut read_errors = 0u64;

    while !shared.stop.load(Ordering::Acquire) {
        let features = match sampler.next_features(&shared.stop) {
            Ok(Some(features)) => features,
            Ok(None) => break,
            Err(e) => {
                read_errors += 1;
                if read_errors == 1 || read_errors % 100 == 0 {
                    log::warn!("Anomaly sampling error ({} so far): {}", read_errors, e);
                }
                thread::sleep(Duration::from_millis(100));
                continue;
            }
        };

        let threshold = f64::from_bits(shared.threshold_bits.load(Ordering::Relaxed));
        let candidate = profile.is_candidate(&features, threshold);
        let was_detected = run.detected();
        let now_detected = run.update(candidate);

        if now_detected != was_detected {
            shared.detected.store(now_detected, Ordering::Release);
            let (hf_z, flux_z) = profile.z_scores(&features);
            if now_detected {
                log::warn!(
                    "Acoustic anomaly detected (hf_z={:.2}, flux_z={:.2})",
                    hf_z,
                    flux_z
                );
            } else {
                log::info!("Acoustic anomaly cleared");
            }
        }
    }

    shared.detected.store(false, Ordering::Release);
    sampler.into_source()
}

pub struct AnomalyDetector {
    config: AnomalyConfig,
    source: Option<Box<dyn SampleSource>>,
    state: DetectorState,
    profile: Option<CalibrationProfile>,
    stop: Arc<AtomicBool>,
    detected: Arc<AtomicBool>,
    threshold_bits: Arc<AtomicU64>,
    worker: Option<JoinHandle<Box<dyn SampleSource>>>,
}

impl AnomalyDetector {
    pub fn new(source: Box<dyn SampleSource>, config: AnomalyConfig) -> Self {
        let threshold_bits = Arc::new(AtomicU64::new(config.threshold.to_bits()));
        Self {
            config,
            source: Some(source),
            state: DetectorState::Idle,
            profile: None,
            stop: Arc::new(AtomicBool::new(false)),
            detected: Arc::new(AtomicBool::new(false)),
            threshold_bits,
            worker: None,
        }
    }

    /// Detector over the ADC character device
    pub fn open_adc<P: AsRef<Path>>(path: P, config: AnomalyConfig) -> io::Result<Self> {
        let device = AdcDevice::open(path)?;
        Ok(Self::new(Box::new(device), config))
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Baseline from the most recent successful calibration
    pub fn calibration(&self) -> Option<CalibrationProfile> {
        self.profile
    }

    /// Calibrate synchronously, then spawn the sampling thread. A no-op if
    /// already running.
    pub fn start(&mut self) -> Result<(), AnomalyError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let source = self.source.take().ok_or(AnomalyError::SourceUnavailable)?;
        let mut sampler = Sampler::new(source, &self.config);

        self.stop.store(false, Ordering::Release);
        self.detected.store(false, Ordering::Release);
        self.state = DetectorState::Calibrating;
        log::info!(
            "Calibrating anomaly detector over {} windows of {} samples",
            self.config.calibration_windows,
            self.config.window_size
        );

        let profile = match sampler.calibrate(self.config.calibration_windows, &self.stop) {
            Ok(profile) => profile,
            Err(e) => {
                log::error!("Anomaly calibration failed: {}", e);
                self.source = Some(sampler.into_source());
                self.state = DetectorState::Idle;
                return Err(e);
            }
        };

        log::info!(
            "Calibration complete: hf_ratio mean={:.4} std={:.4}, flux mean={:.4e} std={:.4e}",
            profile.hf_ratio.mean,
            profile.hf_ratio.std,
            profile.flux.mean,
            profile.flux.std
        );
        self.profile = Some(profile);

        let shared = WorkerShared {
            stop: Arc::clone(&self.stop),
            detected: Arc::clone(&self.detected),
            threshold_bits: Arc::clone(&self.threshold_bits),
        };
        let confirm = self.config.confirm_windows;

        let handle = thread::Builder::new()
            .name("anomaly-sampler".to_string())
            .spawn(move || run_detection(sampler, profile, confirm, shared))
            .map_err(|e| {
                self.state = DetectorState::Idle;
                AnomalyError::Spawn(e)
            })?;

        self.worker = Some(handle);
        self.state = DetectorState::Armed;
        Ok(())
    }

    /// Signal the sampling thread and wait for it to exit. The flag reads
    /// false afterwards.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };

        self.stop.store(true, Ordering::Release);
        match handle.join() {
            Ok(source) => self.source = Some(source),
            Err(_) => log::error!("Anomaly sampling thread panicked"),
        }
        self.detected.store(false, Ordering::Release);
        self.state = DetectorState::Stopped;
        log::info!("Anomaly detector stopped");
    }

    pub fn is_anomaly_detected(&self) -> bool {
        self.detected.load(Ordering::Acquire)
    }

    /// Takes effect on the next analysed window
    pub fn set_threshold(&self, threshold: f64) {
        self.threshold_bits
            .store(threshold.to_bits(), Ordering::Relaxed);
    }

    pub fn threshold(&self) -> f64 {
        f64::from_bits(self.threshold_bits.load(Ordering::Relaxed))
    }

    /// Takes effect on the next `start`
    pub fn set_calibration_window_count(&mut self, windows: usize) {
        self.config.calibration_windows = windows;
    }
}

/// What the orchestrator needs from an anomaly detector
pub trait AnomalyMonitor: Send {
    fn start(&mut self) -> Result<(), AnomalyError>;
    fn stop(&mut self);
    fn is_anomaly_detected(&self) -> bool;
}

impl AnomalyMonitor for AnomalyDetector {
    fn start(&mut self) -> Result<(), AnomalyError> {
        AnomalyDetector::start(self)
    }

    fn stop(&mut self) {
        AnomalyDetector::stop(self)
    }

    fn is_anomaly_detected(&self) -> bool {
        AnomalyDetector::is_anomaly_detected(self)
    }
}

impl Drop for AnomalyDetector {
    fn drop(&mut self) {
        self.stop();
    }
}
