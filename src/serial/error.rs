use std::io;

use thiserror::Error;

/// Ways talking to the pad can fail.
/// All of them end the current connection.
#[derive(Debug, Error)]
pub enum SerialPortError {
    /// Reading or writing failed.
    #[error("Device I/O failed: {0}")]
    IO(#[from] io::Error),

    /// Opening or configuring the port failed.
    #[error("Could not set up the port: {0}")]
    Serial(#[from] serialport::Error),

    /// End of stream, the cable was pulled or the port closed.
    #[error("Device disconnected")]
    Disconnected,
}
