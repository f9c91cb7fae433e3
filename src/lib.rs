pub mod anomaly;
pub mod audio;
pub mod backend;
pub mod capture;
pub mod config;
pub mod control;
pub mod debounce;
pub mod error;
pub mod led;
pub mod monitor;
pub mod orchestrator;
pub mod protocol;
pub mod state;
pub mod store;
pub mod transport;
pub mod types;

pub use anomaly::{AnomalyConfig, AnomalyDetector, DetectorState};
pub use config::NodeConfig;
pub use debounce::{Actuator, DebounceController, FadeParams};
pub use error::{NodeError, Result};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use protocol::{Command, DeviceStatus, FrameError, FrameType, ParsedFrame};
pub use state::SharedState;
pub use transport::{SerialTransport, TransportError};
pub use types::*;
