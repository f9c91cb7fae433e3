use clap::{Args, Parser, Subcommand};
use sitewatch::OperatingMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sitewatch",
    version,
    about = "On-device safety monitoring node",
    long_about = "Runs vision safety rules and acoustic anomaly detection on an edge device\n\
                  and signals the alarm microcontroller over a framed serial link.\n\
                  Settings come from SITEWATCH_* environment variables (or a .env file)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the full monitoring node
    Run(RunArgs),
    /// Send a single command to the alarm microcontroller
    Serial(SerialArgs),
    /// Run only the acoustic anomaly detector and print transitions
    Listen(ListenArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Serial device of the alarm microcontroller
    #[arg(long, env = "SITEWATCH_SERIAL_PORT")]
    pub port: Option<String>,

    /// Bind address of the JSON command surface
    #[arg(long, env = "SITEWATCH_CONTROL_ADDR")]
    pub control_addr: Option<String>,

    /// Operating mode at startup (detect, blur, fall, trespass, raw, stop)
    #[arg(long, env = "SITEWATCH_INITIAL_MODE")]
    pub mode: Option<OperatingMode>,

    /// Raw BGR24 video file or FIFO; stdin when omitted
    #[arg(long)]
    pub video: Option<PathBuf>,

    /// Do not start the acoustic anomaly detector
    #[arg(long)]
    pub no_anomaly: bool,
}

#[derive(Args)]
pub struct SerialArgs {
    /// Serial device of the alarm microcontroller
    #[arg(long, env = "SITEWATCH_SERIAL_PORT")]
    pub port: Option<String>,

    /// Reply timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    #[command(subcommand)]
    pub action: SerialAction,
}

#[derive(Subcommand, Clone, Copy)]
pub enum SerialAction {
    /// Query LED, buzzer, light level and temperature
    Status,
    /// Toggle the alarm
    Toggle,
    /// Reset the alarm state
    Reset,
    /// Send the anomaly-notify command
    Anomaly(AnomalyArgs),
}

#[derive(Args, Clone, Copy)]
pub struct AnomalyArgs {
    /// Report an active anomaly
    #[arg(long, conflicts_with = "off", required_unless_present = "off")]
    pub on: bool,

    /// Report that the anomaly cleared
    #[arg(long)]
    pub off: bool,
}

#[derive(Args)]
pub struct ListenArgs {
    /// How long to listen after calibration
    #[arg(long, default_value_t = 30)]
    pub seconds: u64,

    /// ADC character device
    #[arg(long, env = "SITEWATCH_ADC_DEVICE")]
    pub device: Option<PathBuf>,

    /// z-score threshold for both features
    #[arg(long)]
    pub threshold: Option<f64>,
}
