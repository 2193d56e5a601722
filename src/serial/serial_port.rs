use std::{
    io::{self, Read, Write},
    time::Duration,
};

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{info, trace};

use crate::{
    commands::Command,
    serial::{codecs::device::DeviceCodec, error::SerialPortError, protocol::DeviceLine},
};

/// An open device, split in a reading and a writing half.
pub(crate) struct DeviceConnection {
    pub(crate) reader: Box<dyn Read + Send>,
    pub(crate) writer: Box<dyn Write + Send>,
}

/// Something which can open a connection to the device.
pub(crate) trait Connector: Send + Sync {
    /// Open the device.
    /// Reads on the returned connection must time out rather than block forever.
    fn open(&self) -> Result<DeviceConnection, SerialPortError>;

    /// What is being connected to, for logs.
    fn describe(&self) -> String;
}

/// Opens a tty/COM port.
#[derive(Debug, Clone)]
pub(crate) struct SerialConnector {
    path: String,
    baud: u32,
    timeout: Duration,
}

impl SerialConnector {
    pub(crate) fn new(path: &str, baud: u32, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            baud,
            timeout,
        }
    }
}

impl Connector for SerialConnector {
    fn open(&self) -> Result<DeviceConnection, SerialPortError> {
        let port = serialport::new(&self.path, self.baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.timeout)
            .open()?;

        let writer = port.try_clone()?;

        info!(path = %self.path, baud = %self.baud, "Opened serial port");

        Ok(DeviceConnection {
            reader: Box::new(port),
            writer: Box::new(writer),
        })
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}

/// Reads whole lines off the device.
pub(crate) struct FramedReader {
    reader: Box<dyn Read + Send>,
    buffer: BytesMut,
    codec: DeviceCodec,
}

impl FramedReader {
    pub(crate) fn new(reader: Box<dyn Read + Send>, sensor_count: usize) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(256),
            codec: DeviceCodec::new(sensor_count),
        }
    }

    /// The next line from the device.
    ///
    /// `Ok(None)` if the read timed out before a full line arrived.
    /// End of stream means the device is gone.
    pub(crate) fn next_line(&mut self) -> Result<Option<DeviceLine>, SerialPortError> {
        let mut chunk = [0; 256];

        loop {
            if let Some(line) = self.codec.decode(&mut self.buffer)? {
                trace!(%line, "From device");
                return Ok(Some(line));
            }

            match self.reader.read(&mut chunk) {
                Ok(0) => return Err(SerialPortError::Disconnected),
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                    return Ok(None)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Put a command on the wire, flushing it.
pub(crate) fn write_command(
    writer: &mut (dyn Write + Send),
    command: Command,
) -> Result<(), SerialPortError> {
    let mut buffer = BytesMut::new();
    DeviceCodec::new(0).encode(command, &mut buffer)?;

    writer.write_all(&buffer)?;
    writer.flush()?;

    Ok(())
}
