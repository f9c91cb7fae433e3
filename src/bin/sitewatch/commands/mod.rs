pub mod listen;
pub mod run;
pub mod serial;

use crate::exit_codes;
use sitewatch::NodeConfig;

/// Load configuration or print the error and return the exit code
pub(crate) fn load_config() -> Result<NodeConfig, i32> {
    NodeConfig::from_env().map_err(|e| {
        eprintln!("Error: {}", e);
        exit_codes::CONFIG_ERROR
    })
}
