//! # Serial Communication Module
//!
//! Opens the two UART links the node talks over.
//!
//! This module handles:
//! - Opening the sensor bus link (chunk ingestion)
//! - Opening the modem link (AT command transport)
//! - The [`SerialPortIO`] seam that lets tests replace real ports

pub mod port_trait;

pub use port_trait::{SerialPortIO, TokioSerialPort};

use crate::error::{Result, TelemetryError};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Open a serial port with 8N1 settings and no flow control
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyUSB2")
/// * `baud_rate` - Line speed
///
/// # Errors
///
/// Returns `TelemetryError::Serial` if the device cannot be opened
pub fn open_port(path: &str, baud_rate: u32) -> Result<TokioSerialPort> {
    debug!("Opening serial port {} at {} baud", path, baud_rate);

    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| TelemetryError::Serial(format!("Failed to open {}: {}", path, e)))?;

    info!("Opened serial port {}", path);
    Ok(TokioSerialPort::new(port))
}

/// Open the first device in `paths` that succeeds
///
/// USB modems re-enumerate across boots, so the modem path may be given as
/// a list of candidates.
///
/// # Errors
///
/// Returns `TelemetryError::SerialPortNotFound` listing every path tried
pub fn open_first(paths: &[&str], baud_rate: u32) -> Result<(TokioSerialPort, String)> {
    for path in paths {
        match open_port(path, baud_rate) {
            Ok(port) => return Ok((port, path.to_string())),
            Err(e) => {
                warn!("Failed to open {}: {}", path, e);
                continue;
            }
        }
    }

    Err(TelemetryError::SerialPortNotFound(paths.join(", ")))
}
