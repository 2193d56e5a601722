//! A mock, useful to run and test the server without an actual pad attached.
//!
//! Emulates the pad firmware: answers queries, applies thresholds and swallows images.

use std::{
    io::{self, Read, Write},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use itertools::Itertools;
use tracing::{debug, trace};

use crate::{
    config::MAX_THRESHOLD,
    serial::{
        error::SerialPortError,
        serial_port::{Connector, DeviceConnection},
    },
};

#[derive(Debug)]
struct Firmware {
    values: Vec<u16>,
    thresholds: Vec<u16>,
    image: Option<Vec<u8>>,

    // Bytes of the line being received.
    line: Vec<u8>,

    // Image bytes still expected after a `g` command.
    image_remaining: usize,
    image_buffer: Vec<u8>,

    plugged: bool,
    fail_writes: bool,

    // Where output towards the current connection goes.
    output: Option<Sender<Vec<u8>>>,
    // Bumped on every open, so stale connections can tell.
    generation: u64,
}

impl Firmware {
    fn print(&self, line: String) {
        trace!(%line, "Mock device prints");

        if let Some(output) = &self.output {
            let _ = output.send(format!("{line}\n").into_bytes());
        }
    }

    fn print_values(&self) {
        self.print(format!("v {}", self.values.iter().join(" ")));
    }

    fn print_thresholds(&self) {
        self.print(format!("t {}", self.thresholds.iter().join(" ")));
    }

    fn set_threshold(&mut self, line: &str) {
        let mut parts = line.split_whitespace();

        let (Some(index), Some(value)) = (parts.next(), parts.next()) else {
            return;
        };
        let (Ok(index), Ok(value)) = (index.parse::<usize>(), value.parse::<i64>()) else {
            return;
        };

        if index >= self.thresholds.len() || !(0..=i64::from(MAX_THRESHOLD)).contains(&value) {
            debug!(%index, %value, "Mock device ignores threshold");
            return;
        }

        self.thresholds[index] = value as u16;
        self.print_thresholds();
    }

    fn start_image(&mut self, line: &str) {
        let size = line
            .get(2..)
            .and_then(|size| size.trim().parse::<usize>().ok())
            .unwrap_or(0);

        self.image_buffer.clear();
        self.image_remaining = size;
    }

    fn handle_line(&mut self, line: &str) {
        let line = line.trim_end_matches('\r');

        match line.chars().next() {
            Some('v' | 'V') => self.print_values(),
            Some('t' | 'T') => self.print_thresholds(),
            Some('g' | 'G') => self.start_image(line),
            Some('0'..='9') => self.set_threshold(line),
            // Offsets are recalibrated on the device, nothing to answer.
            Some('o' | 'O') => {}
            _ => {}
        }
    }

    fn receive(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if self.image_remaining > 0 {
                self.image_buffer.push(byte);
                self.image_remaining -= 1;

                if self.image_remaining == 0 {
                    debug!(bytes = self.image_buffer.len(), "Mock device got an image");
                    self.image = Some(std::mem::take(&mut self.image_buffer));
                }
            } else if byte == b'\n' {
                let line = std::mem::take(&mut self.line);
                self.handle_line(&String::from_utf8_lossy(&line));
            } else {
                self.line.push(byte);
            }
        }
    }
}

/// An emulated pad.
///
/// Cloning gives another handle to the same device.
#[derive(Debug, Clone)]
pub struct MockDevice {
    firmware: Arc<Mutex<Firmware>>,
}

impl MockDevice {
    /// A plugged in device with the given amount of sensors,
    /// all thresholds at the maximum and no pressure on any sensor.
    pub fn new(sensor_count: usize) -> Self {
        Self {
            firmware: Arc::new(Mutex::new(Firmware {
                values: vec![0; sensor_count],
                thresholds: vec![MAX_THRESHOLD; sensor_count],
                image: None,
                line: vec![],
                image_remaining: 0,
                image_buffer: vec![],
                plugged: true,
                fail_writes: false,
                output: None,
                generation: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Firmware> {
        self.firmware.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connects to this device.
    pub(crate) fn connector(&self, read_timeout: Duration) -> MockConnector {
        MockConnector {
            device: self.clone(),
            read_timeout,
        }
    }

    /// Pull the cable. Open connections see end of stream, new ones fail.
    pub fn unplug(&self) {
        let mut firmware = self.lock();
        firmware.plugged = false;
        firmware.output = None;
    }

    /// Put the cable back.
    pub fn plug(&self) {
        self.lock().plugged = true;
    }

    /// Make every write fail (or stop doing so).
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Set what the sensors currently read, in device order.
    pub fn set_values(&self, values: Vec<u16>) {
        self.lock().values = values;
    }

    /// Change thresholds as if done on the device itself, in device order.
    pub fn set_thresholds(&self, thresholds: Vec<u16>) {
        self.lock().thresholds = thresholds;
    }

    /// The thresholds in use, in device order.
    pub fn thresholds(&self) -> Vec<u16> {
        self.lock().thresholds.clone()
    }

    /// The last image pushed to the device.
    pub fn image(&self) -> Option<Vec<u8>> {
        self.lock().image.clone()
    }

    /// Make the device print a line on its own.
    pub fn print(&self, line: &str) {
        self.lock().print(line.into());
    }
}

/// Opens connections to a [`MockDevice`].
#[derive(Debug, Clone)]
pub(crate) struct MockConnector {
    device: MockDevice,
    read_timeout: Duration,
}

impl Connector for MockConnector {
    fn open(&self) -> Result<DeviceConnection, SerialPortError> {
        let mut firmware = self.device.lock();

        if !firmware.plugged {
            return Err(io::Error::new(io::ErrorKind::NotFound, "Mock device is unplugged").into());
        }

        let (sender, receiver) = crossbeam_channel::unbounded();
        firmware.output = Some(sender);
        firmware.generation += 1;
        firmware.line.clear();
        firmware.image_remaining = 0;

        Ok(DeviceConnection {
            reader: Box::new(MockReader {
                receiver,
                timeout: self.read_timeout,
                leftover: vec![],
            }),
            writer: Box::new(MockWriter {
                device: self.device.clone(),
                generation: firmware.generation,
            }),
        })
    }

    fn describe(&self) -> String {
        "mock".into()
    }
}

struct MockReader {
    receiver: Receiver<Vec<u8>>,
    timeout: Duration,
    leftover: Vec<u8>,
}

impl Read for MockReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.leftover.is_empty() {
            match self.receiver.recv_timeout(self.timeout) {
                Ok(bytes) => self.leftover = bytes,
                Err(RecvTimeoutError::Timeout) => return Err(io::ErrorKind::TimedOut.into()),
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }

        let n = buf.len().min(self.leftover.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);

        Ok(n)
    }
}

struct MockWriter {
    device: MockDevice,
    generation: u64,
}

impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut firmware = self.device.lock();

        if !firmware.plugged || firmware.generation != self.generation {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        if firmware.fail_writes {
            return Err(io::Error::new(io::ErrorKind::Other, "Mock write failure"));
        }

        firmware.receive(buf);

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
