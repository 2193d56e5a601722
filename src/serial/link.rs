use std::{
    io::Write,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn};

use crate::{
    actions::Update,
    commands::DeviceCommands,
    config::DeviceConfig,
    error::Error,
    hub::Hub,
    profile::{ProfileKey, ProfileStore},
    serial::{
        protocol::DeviceLine,
        serial_port::{write_command, Connector, FramedReader},
    },
};

type WriterSlot = Arc<Mutex<Option<Box<dyn Write + Send>>>>;

/// Owns the connection to the device.
///
/// Reading happens on one thread, which also (re)connects.
/// Writing happens on another, draining the command queue.
pub(crate) struct SerialLink {
    connector: Arc<dyn Connector>,
    store: Arc<ProfileStore>,
    commands: DeviceCommands,
    hub: Hub,

    // The writing half of the current connection, if any.
    writer: WriterSlot,

    sensor_count: usize,
    read_timeout: Duration,
    backoff: Duration,
    queue_poll: Duration,
    values_interval: Duration,

    shutdown: CancellationToken,
}

/// The running link threads.
pub(crate) struct LinkHandle {
    read: JoinHandle<()>,
    write: JoinHandle<()>,
}

impl LinkHandle {
    /// Wait for both threads to stop.
    /// They stop once the shutdown token is cancelled.
    pub(crate) fn join(self) {
        if self.read.join().is_err() {
            error!("Device read thread panicked");
        }
        if self.write.join().is_err() {
            error!("Device write thread panicked");
        }
    }
}

impl SerialLink {
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        store: Arc<ProfileStore>,
        commands: DeviceCommands,
        hub: Hub,
        config: &DeviceConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let sensor_count = commands.order().len();

        Self {
            connector,
            store,
            commands,
            hub,
            writer: Arc::new(Mutex::new(None)),
            sensor_count,
            read_timeout: config.read_timeout(),
            backoff: config.reconnect_backoff(),
            queue_poll: config.queue_poll(),
            values_interval: config.values_interval(),
            shutdown,
        }
    }

    /// Start the read and write threads.
    pub(crate) fn spawn(self) -> Result<LinkHandle, Error> {
        let link = Arc::new(self);
        let device = link.connector.describe();

        let spawn = |name: &str, work: fn(&SerialLink)| {
            let link = Arc::clone(&link);
            let span = info_span!("link", %device, thread = name);

            thread::Builder::new()
                .name(name.into())
                .spawn(move || {
                    let _entered = span.entered();
                    work(&link)
                })
                .map_err(|e| Error::InternalIssue(format!("Could not spawn {name}: {e}")))
        };

        let read = spawn("device-read", SerialLink::read_loop)?;
        let write = spawn("device-write", SerialLink::write_loop)?;

        Ok(LinkHandle { read, write })
    }

    fn writer(&self) -> MutexGuard<'_, Option<Box<dyn Write + Send>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_writer(&self, writer: Option<Box<dyn Write + Send>>) {
        *self.writer() = writer;
    }

    fn connect(&self) -> Option<FramedReader> {
        match self.connector.open() {
            Ok(connection) => {
                info!("Device connected");
                self.set_writer(Some(connection.writer));

                // The device may have been reset, or be another device altogether.
                self.commands.update_values(&self.store);

                Some(FramedReader::new(connection.reader, self.sensor_count))
            }
            Err(e) => {
                error!(?e, backoff = ?self.backoff, "Could not open the device, will retry");
                thread::sleep(self.backoff);
                None
            }
        }
    }

    fn read_loop(&self) {
        info!(read_timeout = ?self.read_timeout, "Starting");

        let mut reader = None;

        while !self.shutdown.is_cancelled() {
            let framed = match &mut reader {
                Some(framed) => framed,
                None => {
                    reader = self.connect();
                    continue;
                }
            };

            if let Err(e) = self.commands.query_values() {
                warn!(?e, "Could not ask for values");
            }

            match framed.next_line() {
                Ok(Some(line)) => {
                    if self.handle_line(line) {
                        thread::sleep(self.values_interval);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!(?e, "Lost the device");
                    reader = None;
                    self.set_writer(None);
                }
            }
        }

        self.set_writer(None);
        info!("Stopped");
    }

    /// Act on a line from the device.
    /// Returns whether it was a sensor frame.
    fn handle_line(&self, line: DeviceLine) -> bool {
        match line {
            DeviceLine::Values(values) => {
                let Some(values) = self.commands.order().reorder(&values) else {
                    warn!(?values, "Sensor frame does not fit the sensor order");
                    return false;
                };

                self.hub.publish(Update::Values(values));
                true
            }
            DeviceLine::Thresholds(thresholds) => {
                let Some(thresholds) = self.commands.order().reorder(&thresholds) else {
                    warn!(?thresholds, "Thresholds do not fit the sensor order");
                    return false;
                };

                match self.store.reconcile_thresholds(&thresholds) {
                    Ok(true) => info!(?thresholds, "Took thresholds from the device"),
                    Ok(false) => {}
                    Err(e) => warn!(?e, ?thresholds, "Could not reconcile thresholds"),
                }
                false
            }
            DeviceLine::Unrecognized(text) => {
                debug!(%text, "Device said something unrecognized");
                false
            }
        }
    }

    fn write_loop(&self) {
        info!(queue_poll = ?self.queue_poll, "Starting");

        while !self.shutdown.is_cancelled() {
            let Some(command) = self.commands.queue().dequeue_timeout(self.queue_poll) else {
                continue;
            };

            let mut slot = self.writer();

            let Some(device) = slot.as_mut() else {
                drop(slot);
                // TODO: Hold on to the command until the device is back instead of dropping it.
                debug!(%command, "No device, dropping command");
                thread::sleep(self.backoff);
                continue;
            };

            let written = write_command(device.as_mut(), command);
            drop(slot);

            if let Err(e) = written {
                error!(?e, "Could not write to the device");

                // The device may not have taken a threshold change,
                // so tell everyone what we believe it has.
                self.store.broadcast_field(ProfileKey::Thresholds);
            }
        }

        info!("Stopped");
    }
}
