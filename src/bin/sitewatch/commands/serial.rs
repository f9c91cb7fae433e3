use crate::cli::{SerialAction, SerialArgs};
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use sitewatch::transport::{Exchange, SerialConfig, TransportError};
use sitewatch::{DeviceStatus, SerialTransport};
use std::time::Duration;

#[derive(Serialize)]
struct ExchangeOutput {
    command: &'static str,
    sequence: u8,
    acknowledged: bool,
    reply_command: u8,
    reply_sequence: u8,
}

impl From<&Exchange> for ExchangeOutput {
    fn from(exchange: &Exchange) -> Self {
        Self {
            command: exchange.command.name(),
            sequence: exchange.sequence,
            acknowledged: exchange.is_ack(),
            reply_command: exchange.reply.command,
            reply_sequence: exchange.reply.sequence,
        }
    }
}

#[derive(Serialize)]
struct StatusOutput {
    port: String,
    #[serde(flatten)]
    status: DeviceStatus,
}

pub async fn execute(args: SerialArgs) -> i32 {
    let mut serial = match super::load_config() {
        Ok(config) => config.serial,
        Err(code) => return code,
    };
    if let Some(port) = args.port {
        serial.port = port;
    }
    if let Some(ms) = args.timeout_ms {
        serial.response_timeout = Duration::from_millis(ms);
    }

    let action = args.action;
    match tokio::task::spawn_blocking(move || exchange(&serial, action)).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: serial task failed: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}

fn exchange(serial: &SerialConfig, action: SerialAction) -> i32 {
    let mut transport = SerialTransport::open(serial);
    if !transport.is_open() {
        eprintln!("Error: serial port {} could not be opened", serial.port);
        return exit_codes::DEVICE_ERROR;
    }

    let result = match action {
        SerialAction::Status => match transport.check_status() {
            Ok(Some(status)) => {
                let out = StatusOutput {
                    port: serial.port.clone(),
                    status,
                };
                return finish(output::emit(&out, false));
            }
            Ok(None) => {
                eprintln!("Error: reply was not a status response");
                return exit_codes::EXECUTION_ERROR;
            }
            Err(e) => Err(e),
        },
        SerialAction::Toggle => transport.toggle_alarm(),
        SerialAction::Reset => transport.reset(),
        SerialAction::Anomaly(flags) => transport.notify_anomaly(flags.on && !flags.off),
    };

    match result {
        Ok(exchange) => finish(output::emit(&ExchangeOutput::from(&exchange), false)),
        Err(e) => report(&e),
    }
}

fn finish(printed: bool) -> i32 {
    if printed {
        exit_codes::SUCCESS
    } else {
        exit_codes::EXECUTION_ERROR
    }
}

fn report(error: &TransportError) -> i32 {
    eprintln!("Error: {}", error);
    if error.is_timeout() {
        exit_codes::TIMEOUT
    } else {
        exit_codes::EXECUTION_ERROR
    }
}
