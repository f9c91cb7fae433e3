use crate::anomaly::AnomalyError;
use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::orchestrator::OrchestratorError;
use crate::transport::TransportError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serial transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Anomaly detector error: {0}")]
    Anomaly(#[from] AnomalyError),

    #[error("Inference backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    /// Failures caused by hardware or the inference backend rather than the
    /// host environment
    pub fn is_device_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Anomaly(_) | Self::Backend(_) | Self::Orchestrator(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;
