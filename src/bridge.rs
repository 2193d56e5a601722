use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    commands::DeviceCommands,
    config::{Config, DevicePort},
    error::Error,
    hub::Hub,
    images::Images,
    mock::MockDevice,
    profile::{Profile, ProfileStore},
    queue::CommandQueue,
    serial::{
        link::{LinkHandle, SerialLink},
        protocol::SensorOrder,
        serial_port::{Connector, SerialConnector},
    },
};

/// The shared state every session and the device link get a handle to.
#[derive(Debug, Clone)]
pub(crate) struct Bridge {
    pub(crate) store: Arc<ProfileStore>,
    pub(crate) hub: Hub,
    pub(crate) commands: DeviceCommands,
    shutdown: CancellationToken,
}

impl Bridge {
    /// Load profiles and set up the command queue.
    ///
    /// Everything started from here stops when `shutdown` is cancelled.
    pub(crate) fn new(config: &Config, shutdown: CancellationToken) -> Result<Self, Error> {
        let sensors = &config.sensors;
        let hub = Hub::new();

        let default = Profile::new(
            sensors.default_image.clone(),
            vec![sensors.default_threshold; sensors.count],
        );
        let store = ProfileStore::load(&config.profiles_path, sensors.count, default, hub.clone())?;

        let commands = DeviceCommands::new(
            CommandQueue::new(sensors.queue_capacity()),
            SensorOrder::new(sensors.resolved_order())?,
            Images::new(&config.images_dir),
            shutdown.clone(),
        );

        info!(
            profiles = ?store.profile_names(),
            current = %store.current_name(),
            queue_capacity = %commands.queue().capacity(),
            "Bridge ready"
        );

        Ok(Self {
            store: Arc::new(store),
            hub,
            commands,
            shutdown,
        })
    }

    /// Run `work` against the profile store on the blocking pool.
    ///
    /// Store operations may wait for the lock while another one writes the log.
    pub(crate) async fn with_store<T, F>(&self, work: F) -> Result<T, Error>
    where
        F: FnOnce(&ProfileStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);

        tokio::task::spawn_blocking(move || work(&store))
            .await
            .map_err(|e| Error::InternalIssue(format!("Profile task failed: {e}")))
    }

    /// Start talking to the device.
    pub(crate) fn start_link(
        &self,
        connector: Arc<dyn Connector>,
        config: &Config,
    ) -> Result<LinkHandle, Error> {
        SerialLink::new(
            connector,
            Arc::clone(&self.store),
            self.commands.clone(),
            self.hub.clone(),
            &config.device,
            self.shutdown.clone(),
        )
        .spawn()
    }
}

/// How to reach the configured device.
///
/// A given mock device is used regardless of configuration.
pub(crate) fn connector(config: &Config, mock: Option<MockDevice>) -> Arc<dyn Connector> {
    let device = &config.device;

    match (mock, &device.port) {
        (Some(mock), _) => Arc::new(mock.connector(device.read_timeout())),
        (None, DevicePort::Mock) => {
            let mock = MockDevice::new(config.sensors.count);
            mock.set_thresholds(vec![config.sensors.default_threshold; config.sensors.count]);
            Arc::new(mock.connector(device.read_timeout()))
        }
        (None, DevicePort::Tty(path)) => Arc::new(SerialConnector::new(
            path,
            device.baud,
            device.read_timeout(),
        )),
    }
}
