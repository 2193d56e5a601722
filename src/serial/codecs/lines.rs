use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::serial::error::SerialPortError;

/// Longest line kept. The pad never sends anything close to this,
/// so longer runs are noise from a port that was opened mid-transfer.
const MAX_LINE: usize = 4096;

/// Splits a byte stream on a terminator byte.
/// Optionally terminates what it writes.
#[derive(Debug, Clone)]
pub struct LinesCodec {
    // Bytes before this offset have no terminator in them.
    scanned: usize,

    // Skipping an overlong line until the next terminator.
    discarding: bool,

    terminator: u8,
    write_terminator: Option<u8>,
}

impl LinesCodec {
    /// A codec splitting on `terminator`, and appending `write_terminator`
    /// (if any) to each encoded frame.
    pub fn new(terminator: u8, write_terminator: Option<u8>) -> Self {
        Self {
            scanned: 0,
            discarding: false,
            terminator,
            write_terminator,
        }
    }
}

impl Default for LinesCodec {
    fn default() -> Self {
        Self::new(b'\n', None)
    }
}

impl Decoder for LinesCodec {
    type Item = Vec<u8>;
    type Error = SerialPortError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let found = src[self.scanned..]
                .iter()
                .position(|&byte| byte == self.terminator)
                .map(|offset| self.scanned + offset);

            match (found, self.discarding) {
                (Some(end), true) => {
                    src.advance(end + 1);
                    self.scanned = 0;
                    self.discarding = false;
                }
                (Some(end), false) => {
                    let line = src.split_to(end).to_vec();
                    src.advance(1);
                    self.scanned = 0;

                    return Ok(Some(line));
                }
                (None, true) => {
                    src.clear();
                    self.scanned = 0;

                    return Ok(None);
                }
                (None, false) if src.len() > MAX_LINE => {
                    warn!(bytes = src.len(), "No line terminator in sight, discarding");
                    self.discarding = true;
                }
                (None, false) => {
                    self.scanned = src.len();

                    return Ok(None);
                }
            }
        }
    }
}

impl Encoder<Vec<u8>> for LinesCodec {
    type Error = SerialPortError;

    fn encode(&mut self, item: Vec<u8>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + 1);
        dst.extend_from_slice(&item);
        dst.extend(self.write_terminator);

        Ok(())
    }
}
