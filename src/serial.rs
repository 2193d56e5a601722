/// Serial port related errors.
pub(crate) mod error;

/// Opening the device and framing what goes over it.
pub(crate) mod serial_port;

/// Codecs for encoding/decoding messages to/from wire.
pub(crate) mod codecs;

/// What the device says.
pub(crate) mod protocol;

/// The device's read and write threads.
pub(crate) mod link;
