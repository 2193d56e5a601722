//! Commands for the device, and turning profile state into them.

use std::fmt::Display;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    config::MAX_THRESHOLD,
    error::Error,
    images::Images,
    profile::{ProfileField, ProfileKey, ProfileStore},
    queue::CommandQueue,
    serial::protocol::SensorOrder,
};

/// Something the device should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask for a sensor frame.
    QueryValues,

    /// Ask for the thresholds in use.
    QueryThresholds,

    /// Set the threshold of a sensor.
    SetThreshold {
        /// The device's index of the sensor.
        index: usize,

        /// The new threshold.
        value: u16,
    },

    /// Push an image.
    SendImage(Vec<u8>),
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::QueryValues => write!(f, "query values"),
            Command::QueryThresholds => write!(f, "query thresholds"),
            Command::SetThreshold { index, value } => write!(f, "set threshold {index} to {value}"),
            Command::SendImage(bytes) => write!(f, "send image ({} bytes)", bytes.len()),
        }
    }
}

/// Enqueues commands for the device.
///
/// Translates from the logical sensor order users see into the device's order.
#[derive(Debug, Clone)]
pub(crate) struct DeviceCommands {
    queue: CommandQueue,
    order: SensorOrder,
    images: Images,

    // Ends waits for queue space.
    shutdown: CancellationToken,
}

impl DeviceCommands {
    pub(crate) fn new(
        queue: CommandQueue,
        order: SensorOrder,
        images: Images,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            order,
            images,
            shutdown,
        }
    }

    pub(crate) fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub(crate) fn order(&self) -> &SensorOrder {
        &self.order
    }

    pub(crate) fn images(&self) -> &Images {
        &self.images
    }

    pub(crate) fn query_values(&self) -> Result<(), Error> {
        self.queue.try_enqueue(Command::QueryValues)
    }

    pub(crate) fn query_thresholds(&self) -> Result<(), Error> {
        self.queue.try_enqueue(Command::QueryThresholds)
    }

    /// Ask the device to use `values[index]` for the logical sensor `index`.
    pub(crate) fn update_threshold(&self, values: &[u16], index: usize) -> Result<(), Error> {
        let value = *values.get(index).ok_or_else(|| {
            Error::BadRequest(format!(
                "Index {index} is out of range for {} values",
                values.len()
            ))
        })?;

        if value > MAX_THRESHOLD {
            return Err(Error::BadRequest(format!(
                "Threshold {value} is above the maximum of {MAX_THRESHOLD}"
            )));
        }

        let device_index = self.order.device_index(index).ok_or_else(|| {
            Error::BadRequest(format!(
                "Index {index} is out of range for {} sensors",
                self.order.len()
            ))
        })?;

        self.queue.try_enqueue(Command::SetThreshold {
            index: device_index,
            value,
        })
    }

    /// Push an image to the device.
    ///
    /// A missing image is not an error, there is just nothing to push.
    /// Blocks until the queue has room, or shutdown.
    pub(crate) fn update_image(&self, name: &str) -> Result<(), Error> {
        let Some(bytes) = self.images.load(name) else {
            debug!(%name, "No image to send");
            return Ok(());
        };

        self.queue
            .enqueue_blocking(Command::SendImage(bytes), &self.shutdown)
    }

    /// Make the device match the current profile: its image, then every threshold.
    ///
    /// Problems are logged, and do not stop the remaining commands.
    /// May block on a full queue.
    pub(crate) fn update_values(&self, store: &ProfileStore) {
        if let ProfileField::Image(Some(image)) = store.get_current_field(ProfileKey::Image) {
            if let Err(e) = self.update_image(&image) {
                warn!(%image, ?e, "Could not send image");
            }
        }

        if let ProfileField::Thresholds(thresholds) = store.get_current_field(ProfileKey::Thresholds) {
            for index in 0..thresholds.len() {
                if let Err(e) = self.update_threshold(&thresholds, index) {
                    warn!(%index, ?e, "Could not send threshold");
                }
            }
        }
    }

    /// As [`DeviceCommands::update_values`], from async code.
    pub(crate) async fn update_values_async(&self, store: std::sync::Arc<ProfileStore>) {
        let commands = self.clone();

        if let Err(e) = tokio::task::spawn_blocking(move || commands.update_values(&store)).await {
            warn!(?e, "Could not re-apply the profile");
        }
    }

    /// As [`DeviceCommands::update_image`], from async code.
    pub(crate) async fn update_image_async(&self, name: String) -> Result<(), Error> {
        let commands = self.clone();

        tokio::task::spawn_blocking(move || commands.update_image(&name))
            .await
            .map_err(|e| Error::InternalIssue(format!("Image task failed: {e}")))?
    }
}
