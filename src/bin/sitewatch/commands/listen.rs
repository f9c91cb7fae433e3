use crate::cli::ListenArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use sitewatch::types::local_timestamp;
use sitewatch::AnomalyDetector;
use std::time::{Duration, Instant};

#[derive(Serialize)]
struct Transition {
    timestamp: String,
    anomaly: bool,
}

pub async fn execute(args: ListenArgs) -> i32 {
    let config = match super::load_config() {
        Ok(config) => config,
        Err(code) => return code,
    };

    let device = args.device.unwrap_or(config.adc_device);
    let mut anomaly = config.anomaly;
    if let Some(threshold) = args.threshold {
        anomaly.threshold = threshold;
    }
    let listen_for = Duration::from_secs(args.seconds);

    let task = tokio::task::spawn_blocking(move || {
        let mut detector = match AnomalyDetector::open_adc(&device, anomaly) {
            Ok(detector) => detector,
            Err(e) => {
                eprintln!("Error: ADC device {} unavailable: {}", device.display(), e);
                return exit_codes::DEVICE_ERROR;
            }
        };

        if let Err(e) = detector.start() {
            eprintln!("Error: {}", e);
            return exit_codes::DEVICE_ERROR;
        }
        log::info!("Listening for {:?}", listen_for);

        let deadline = Instant::now() + listen_for;
        let mut last = false;
        while Instant::now() < deadline {
            let current = detector.is_anomaly_detected();
            if current != last {
                last = current;
                let transition = Transition {
                    timestamp: local_timestamp(),
                    anomaly: current,
                };
                if !output::emit(&transition, true) {
                    break;
                }
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        detector.stop();
        exit_codes::SUCCESS
    });

    match task.await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: listener task failed: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}
