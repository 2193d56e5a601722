/// Splitting a byte stream into lines.
pub(crate) mod lines;

/// The pad firmware's framing, on top of [`lines`].
pub(crate) mod device;
