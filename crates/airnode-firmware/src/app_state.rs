//! Firmware-wide error type and shared state

use core::fmt::{Debug, Write};

use airnode_core::app_state::{SharedStatus, StatusSnapshot};
use airnode_core::config::ConfigError;
use static_cell::StaticCell;
use thiserror_no_std::Error;

static STATUS: StaticCell<SharedStatus> = StaticCell::new();

/// Create the status shared between the node and the web handlers.
///
/// Must be called exactly once.
pub fn init_status(initial: StatusSnapshot) -> &'static SharedStatus {
    STATUS.init(SharedStatus::new(initial))
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("SD card error: {0}")]
    Storage(heapless::String<64>),
    #[error("Sensor error: {0}")]
    Sensor(heapless::String<64>),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AppError {
    pub fn storage(e: impl Debug) -> Self {
        Self::Storage(describe(e))
    }

    pub fn sensor(e: impl Debug) -> Self {
        Self::Sensor(describe(e))
    }
}

/// Debug text of `e`, truncated to fit.
fn describe(e: impl Debug) -> heapless::String<64> {
    let mut text = heapless::String::new();
    let _ = write!(text, "{:?}", e);
    text
}
