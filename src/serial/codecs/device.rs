use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    commands::Command,
    serial::{codecs::lines::LinesCodec, error::SerialPortError, protocol::DeviceLine},
};

/// Reads [`DeviceLine`]s and writes [`Command`]s.
#[derive(Debug, Clone)]
pub(crate) struct DeviceCodec {
    lines: LinesCodec,
    sensor_count: usize,
}

impl DeviceCodec {
    pub(crate) fn new(sensor_count: usize) -> Self {
        Self {
            lines: LinesCodec::new(b'\n', Some(b'\n')),
            sensor_count,
        }
    }
}

impl Decoder for DeviceCodec {
    type Item = DeviceLine;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(bytes) = self.lines.decode(src)? else {
            return Ok(None);
        };

        let line = String::from_utf8_lossy(&bytes);
        let line = line.trim_end_matches('\r');

        Ok(Some(DeviceLine::parse(line, self.sensor_count)))
    }
}

impl Encoder<Command> for DeviceCodec {
    type Error = SerialPortError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Command::QueryValues => self.lines.encode(b"v".to_vec(), dst),
            Command::QueryThresholds => self.lines.encode(b"t".to_vec(), dst),
            Command::SetThreshold { index, value } => {
                self.lines.encode(format!("{index} {value}").into_bytes(), dst)
            }
            Command::SendImage(bytes) => {
                self.lines.encode(format!("g {}", bytes.len()).into_bytes(), dst)?;
                dst.extend_from_slice(&bytes);
                Ok(())
            }
        }
    }
}
