use crate::cli::RunArgs;
use crate::exit_codes;
use anyhow::{Context, Result};
use sitewatch::audio::{AplayPlayer, AudioNotifier};
use sitewatch::backend::{BackendFactory, DisabledBackendFactory, ProcessBackendFactory};
use sitewatch::capture::{FrameSource, RawVideoSource};
use sitewatch::led::LedPwmDevice;
use sitewatch::monitor::SystemMonitor;
use sitewatch::store::JsonlLogStore;
use sitewatch::{
    control, AnomalyDetector, DebounceController, NodeConfig, NodeError, Orchestrator,
    SerialTransport, SharedState,
};
use std::fs::File;
use std::io::{self, BufReader};
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn execute(args: RunArgs) -> i32 {
    let mut config = match super::load_config() {
        Ok(config) => config,
        Err(code) => return code,
    };
    if let Some(port) = args.port.clone() {
        config.serial.port = port;
    }
    if let Some(addr) = args.control_addr.clone() {
        config.control_addr = addr;
    }
    if let Some(mode) = args.mode {
        config.initial_mode = mode;
    }

    match run(config, args).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            match e.downcast_ref::<NodeError>() {
                Some(err) if err.is_device_failure() => exit_codes::DEVICE_ERROR,
                _ => exit_codes::EXECUTION_ERROR,
            }
        }
    }
}

async fn run(config: NodeConfig, args: RunArgs) -> Result<()> {
    let state = Arc::new(SharedState::new(config.initial_mode));
    log::info!("Starting sitewatch in {} mode", config.initial_mode);

    tokio::spawn(shutdown_on_signal(Arc::clone(&state)));

    let listener = TcpListener::bind(&config.control_addr)
        .await
        .with_context(|| format!("Failed to bind control surface on {}", config.control_addr))?;
    let control_task = tokio::spawn(control::serve(listener, Arc::clone(&state)));

    let loop_state = Arc::clone(&state);
    let result = tokio::task::spawn_blocking(move || run_node(&config, &args, loop_state))
        .await
        .context("Orchestrator thread panicked")?;

    state.request_shutdown();
    control_task.abort();
    Ok(result?)
}

async fn shutdown_on_signal(state: Arc<SharedState>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                log::warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                state.request_shutdown();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    log::info!("Shutdown requested");
    state.request_shutdown();
}

fn run_node(
    config: &NodeConfig,
    args: &RunArgs,
    state: Arc<SharedState>,
) -> sitewatch::Result<()> {
    let transport = SerialTransport::open(&config.serial);

    let backends: Box<dyn BackendFactory> = match config.backend_command.as_deref() {
        Some(command) => Box::new(ProcessBackendFactory::new(command)),
        None => {
            log::warn!("No inference backend configured, only raw and stop modes can run");
            Box::new(DisabledBackendFactory)
        }
    };

    let store = JsonlLogStore::open(&config.data_dir)
        .map_err(|e| NodeError::open(&config.data_dir, e))?;

    let mut orchestrator = Orchestrator::new(
        config.orchestrator.clone(),
        state,
        transport,
        backends,
        Box::new(store),
    )
    .with_system_monitor(SystemMonitor::new());

    match LedPwmDevice::open(&config.led_device) {
        Ok(led) => {
            orchestrator = orchestrator
                .with_debounce(DebounceController::new(Box::new(led), config.debounce_cooldown));
        }
        Err(e) => log::warn!(
            "LED device {} unavailable: {}",
            config.led_device.display(),
            e
        ),
    }

    if let Some(clip) = config.alert_clip.as_ref() {
        let player = Arc::new(AplayPlayer::new(config.audio_device.clone()));
        orchestrator = orchestrator.with_audio(AudioNotifier::new(player, clip.clone()));
    }

    if !args.no_anomaly {
        match AnomalyDetector::open_adc(&config.adc_device, config.anomaly.clone()) {
            Ok(detector) => orchestrator = orchestrator.with_anomaly_monitor(Box::new(detector)),
            Err(e) => log::warn!(
                "ADC device {} unavailable, anomaly detection disabled: {}",
                config.adc_device.display(),
                e
            ),
        }
    }

    register_observers(&mut orchestrator);

    // Detector failure leaves the vision loop running
    let _ = orchestrator.start_anomaly_monitor();

    let mut source = open_video(config, args)?;
    orchestrator.run(source.as_mut())?;
    Ok(())
}

fn register_observers(orchestrator: &mut Orchestrator) {
    let observers = orchestrator.observers_mut();
    observers.on_anomaly_status_changed(|active| {
        log::info!("Anomaly status changed: {}", active);
    });
    observers.on_detection_record(|record| {
        log::info!(
            "Saved detection log: {} persons, {} helmets, {} vests",
            record.person_count,
            record.helmet_count,
            record.safety_vest_count
        );
    });
    observers.on_blur_record(|record| log::debug!("Saved blur log: {} persons", record.count));
    observers.on_fall_record(|record| log::debug!("Saved fall log: {} falls", record.count));
    observers.on_trespass_record(|record| {
        log::debug!("Saved trespass log: {} persons", record.count)
    });
    observers.on_system_info(|info| {
        log::debug!(
            "CPU {:.1}%, memory {:.1}%",
            info.cpu_percent,
            info.memory_percent
        )
    });
}

fn open_video(config: &NodeConfig, args: &RunArgs) -> sitewatch::Result<Box<dyn FrameSource>> {
    let (width, height) = (config.frame_width, config.frame_height);
    match args.video.as_ref() {
        Some(path) => {
            let file = File::open(path).map_err(|e| NodeError::open(path, e))?;
            log::info!("Reading {}x{} frames from {}", width, height, path.display());
            Ok(Box::new(RawVideoSource::new(BufReader::new(file), width, height)))
        }
        None => {
            log::info!("Reading {}x{} frames from stdin", width, height);
            Ok(Box::new(RawVideoSource::new(io::stdin(), width, height)))
        }
    }
}
