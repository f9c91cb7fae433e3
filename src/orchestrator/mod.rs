// Orchestrator - per-frame control loop of the safety node
//
// One iteration per captured frame:
// - apply a pending mode change (backend swap, save cadence reset)
// - run the mode's backend and classify the frame
// - fan out alerts on an unsafe frame (LED, audio, serial)
// - persist a summary on the save cadence
// - sample the anomaly flag and system load on their own cadences
//
// Hardware failures are logged and absorbed. Only a backend that cannot be
// built for the requested mode stops the loop.

pub mod observers;
pub mod rules;

pub use observers::Observers;
pub use rules::Assessment;

use crate::anomaly::{AnomalyError, AnomalyMonitor};
use crate::audio::AudioNotifier;
use crate::backend::{BackendError, BackendFactory, DetectionBackend};
use crate::capture::FrameSource;
use crate::debounce::DebounceController;
use crate::monitor::SystemMonitor;
use crate::state::SharedState;
use crate::store::LogStore;
use crate::transport::SerialTransport;
use crate::types::{Frame, OperatingMode};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The requested mode cannot run; global shutdown has been requested
    #[error("Failed to construct backend for {mode} mode: {source}")]
    BackendConstruction {
        mode: OperatingMode,
        #[source]
        source: BackendError,
    },
}

/// How anomaly transitions are signalled to the microcontroller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySignal {
    /// Toggle the alarm once on the rising edge
    #[default]
    Toggle,
    /// Send the anomaly-notify command with the new state on both edges
    Notify,
}

impl FromStr for AnomalySignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "toggle" => Ok(AnomalySignal::Toggle),
            "notify" => Ok(AnomalySignal::Notify),
            other => Err(format!("unknown anomaly signal: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub camera_id: u32,
    pub save_interval: Duration,
    pub anomaly_check_interval: Duration,
    pub system_info_interval: Duration,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub anomaly_signal: AnomalySignal,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            camera_id: 1,
            save_interval: Duration::from_secs(3),
            anomaly_check_interval: Duration::from_secs(1),
            system_info_interval: Duration::from_secs(5),
            confidence_threshold: 0.4,
            nms_threshold: 0.45,
            anomaly_signal: AnomalySignal::Toggle,
        }
    }
}

/// What one loop iteration decided
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub mode: OperatingMode,
    pub detections: usize,
    pub assessment: Assessment,
    /// A summary record was persisted this iteration
    pub saved: bool,
}

fn due(last: Option<Instant>, interval: Duration, now: Instant) -> bool {
    match last {
        Some(last) => now.saturating_duration_since(last) >= interval,
        None => true,
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    state: Arc<SharedState>,
    transport: SerialTransport,
    backends: Box<dyn BackendFactory>,
    store: Box<dyn LogStore>,
    debounce: Option<DebounceController>,
    audio: Option<AudioNotifier>,
    anomaly: Option<Box<dyn AnomalyMonitor>>,
    monitor: Option<SystemMonitor>,
    observers: Observers,

    active_mode: Option<OperatingMode>,
    backend: Option<Box<dyn DetectionBackend>>,
    last_save: Instant,
    last_anomaly_check: Option<Instant>,
    last_system_info: Option<Instant>,
    anomaly_latched: bool,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        state: Arc<SharedState>,
        transport: SerialTransport,
        backends: Box<dyn BackendFactory>,
        store: Box<dyn LogStore>,
    ) -> Self {
        Self {
            config,
            state,
            transport,
            backends,
            store,
            debounce: None,
            audio: None,
            anomaly: None,
            monitor: None,
            observers: Observers::new(),
            active_mode: None,
            backend: None,
            last_save: Instant::now(),
            last_anomaly_check: None,
            last_system_info: None,
            anomaly_latched: false,
        }
    }

    pub fn with_debounce(mut self, debounce: DebounceController) -> Self {
        self.debounce = Some(debounce);
        self
    }

    pub fn with_audio(mut self, audio: AudioNotifier) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_anomaly_monitor(mut self, anomaly: Box<dyn AnomalyMonitor>) -> Self {
        self.anomaly = Some(anomaly);
        self
    }

    pub fn with_system_monitor(mut self, monitor: SystemMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn observers_mut(&mut self) -> &mut Observers {
        &mut self.observers
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn transport_mut(&mut self) -> &mut SerialTransport {
        &mut self.transport
    }

    /// Mode whose backend is currently loaded, if any mode has been applied
    pub fn active_mode(&self) -> Option<OperatingMode> {
        self.active_mode
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Calibrate and arm the anomaly detector. Failure only disables anomaly
    /// awareness.
    pub fn start_anomaly_monitor(&mut self) -> Result<(), AnomalyError> {
        let Some(anomaly) = self.anomaly.as_mut() else {
            return Ok(());
        };
        match anomaly.start() {
            Ok(()) => {
                log::info!("Anomaly detection armed");
                Ok(())
            }
            Err(e) => {
                log::error!("Anomaly detection disabled: {}", e);
                self.anomaly = None;
                Err(e)
            }
        }
    }

    /// Run until the shared running flag clears, the frame source ends, or a
    /// mode cannot be entered. The anomaly detector is stopped on every exit.
    pub fn run(&mut self, source: &mut dyn FrameSource) -> Result<(), OrchestratorError> {
        log::info!(
            "Orchestrator loop starting (camera {}, mode {})",
            self.config.camera_id,
            self.state.mode()
        );

        let result = loop {
            if !self.state.is_running() {
                break Ok(());
            }

            match source.next_frame() {
                Ok(Some(frame)) => {
                    if let Err(e) = self.process_frame(&frame) {
                        break Err(e);
                    }
                }
                Ok(None) => {
                    log::info!("Frame source ended");
                    break Ok(());
                }
                Err(e) => {
                    log::warn!("Frame capture failed: {}", e);
                    thread::sleep(Duration::from_millis(10));
                }
            }
        };

        self.shutdown();
        result
    }

    /// Stop the anomaly detector and release the active backend
    pub fn shutdown(&mut self) {
        if let Some(anomaly) = self.anomaly.as_mut() {
            anomaly.stop();
        }
        self.backend = None;
        self.active_mode = None;
        log::info!("Orchestrator stopped");
    }

    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameOutcome, OrchestratorError> {
        self.process_frame_at(frame, Instant::now())
    }

    /// One loop iteration against an explicit clock
    pub fn process_frame_at(
        &mut self,
        frame: &Frame,
        now: Instant,
    ) -> Result<FrameOutcome, OrchestratorError> {
        let mode = self.apply_mode(now)?;

        let (detections, assessment) = match self.backend.as_mut() {
            Some(backend) => {
                let detections = match backend.detect(
                    frame,
                    self.config.confidence_threshold,
                    self.config.nms_threshold,
                ) {
                    Ok(detections) => detections,
                    Err(e) => {
                        log::warn!("Inference failed in {} mode: {}", mode, e);
                        Vec::new()
                    }
                };
                let assessment = rules::assess(mode, &detections, backend.class_names());
                (detections.len(), assessment)
            }
            None => (0, Assessment::safe()),
        };

        if assessment.unsafe_condition {
            self.raise_alarm(mode, now);
        }

        let save_due = due(Some(self.last_save), self.config.save_interval, now);
        let saved = if self.backend.is_some() && save_due {
            self.last_save = now;
            self.persist(mode, &assessment)
        } else {
            false
        };

        if due(self.last_anomaly_check, self.config.anomaly_check_interval, now) {
            self.last_anomaly_check = Some(now);
            self.check_anomaly();
        }

        if self.monitor.is_some()
            && due(self.last_system_info, self.config.system_info_interval, now)
        {
            self.last_system_info = Some(now);
            self.report_system_info();
        }

        Ok(FrameOutcome {
            mode,
            detections,
            assessment,
            saved,
        })
    }

    fn apply_mode(&mut self, now: Instant) -> Result<OperatingMode, OrchestratorError> {
        let mode = self.state.mode();
        if self.active_mode == Some(mode) {
            return Ok(mode);
        }

        // Release the old backend before building the new one
        if self.backend.take().is_some() {
            log::debug!("Released backend for {:?} mode", self.active_mode);
        }

        if mode.requires_backend() {
            match self.backends.create(mode) {
                Ok(backend) => self.backend = Some(backend),
                Err(source) => {
                    log::error!("Cannot enter {} mode: {}", mode, source);
                    self.active_mode = None;
                    self.state.request_shutdown();
                    return Err(OrchestratorError::BackendConstruction { mode, source });
                }
            }
        }

        log::info!("Mode applied: {}", mode);
        self.active_mode = Some(mode);
        self.last_save = now;
        Ok(mode)
    }

    fn raise_alarm(&mut self, mode: OperatingMode, now: Instant) {
        log::debug!("Unsafe frame in {} mode", mode);

        if let Some(debounce) = self.debounce.as_ref() {
            debounce.trigger_at(now);
        }

        if let Some(audio) = self.audio.as_mut() {
            audio.play();
        }

        if self.transport.is_open() {
            // Failures are logged by the transport; the next unsafe frame retries
            let _ = self.transport.toggle_alarm();
        }
    }

    fn persist(&mut self, mode: OperatingMode, assessment: &Assessment) -> bool {
        let camera_id = self.config.camera_id;
        match mode {
            OperatingMode::Detect => {
                let summary = assessment.summary.clone().unwrap_or_default();
                self.store
                    .save_detection_log(camera_id, &summary)
                    .map(|record| self.observers.detection_record(&record))
                    .is_some()
            }
            OperatingMode::Blur => self
                .store
                .save_blur_log(camera_id, assessment.count)
                .map(|record| self.observers.blur_record(&record))
                .is_some(),
            OperatingMode::Fall => self
                .store
                .save_fall_log(camera_id, assessment.count)
                .map(|record| self.observers.fall_record(&record))
                .is_some(),
            OperatingMode::Trespass => self
                .store
                .save_trespass_log(camera_id, assessment.count)
                .map(|record| self.observers.trespass_record(&record))
                .is_some(),
            OperatingMode::Raw | OperatingMode::Stop => false,
        }
    }

    fn check_anomaly(&mut self) {
        let detected = self
            .anomaly
            .as_ref()
            .map(|a| a.is_anomaly_detected())
            .unwrap_or(false);
        self.state.set_anomaly_active(detected);

        if detected == self.anomaly_latched {
            return;
        }
        self.anomaly_latched = detected;

        if detected {
            log::warn!("Anomaly detected, alarm raised");
        } else {
            log::info!("Anomaly cleared");
        }

        if self.transport.is_open() {
            match self.config.anomaly_signal {
                AnomalySignal::Toggle if detected => {
                    let _ = self.transport.toggle_alarm();
                }
                AnomalySignal::Toggle => {}
                AnomalySignal::Notify => {
                    let _ = self.transport.notify_anomaly(detected);
                }
            }
        }

        self.observers.anomaly_status_changed(detected);
    }

    fn report_system_info(&mut self) {
        let Some(monitor) = self.monitor.as_mut() else {
            return;
        };
        match monitor.sample() {
            Ok(info) => self.observers.system_info(&info),
            Err(e) => log::debug!("System info unavailable: {}", e),
        }
    }
}
