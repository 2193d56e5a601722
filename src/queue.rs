//! The bounded FIFO of commands waiting to be written to the device.
//!
//! Any thread or task may enqueue. Only the device writer dequeues.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{commands::Command, error::Error};

// How often a blocked enqueue looks for shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// A cloneable handle to the queue.
///
/// Both ends are kept in every handle, so the channel never disconnects
/// while a handle is alive.
#[derive(Debug, Clone)]
pub(crate) struct CommandQueue {
    tx: Sender<Command>,
    rx: Receiver<Command>,
}

impl CommandQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);

        Self { tx, rx }
    }

    /// Enqueue without waiting.
    /// Fails with [`Error::QueueFull`] if there is no room.
    pub(crate) fn try_enqueue(&self, command: Command) -> Result<(), Error> {
        trace!(%command, "Enqueue");

        match self.tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::QueueFull),
            Err(TrySendError::Disconnected(_)) => {
                Err(Error::InternalIssue("Command queue disconnected".into()))
            }
        }
    }

    /// Enqueue, waiting for room if needed.
    /// Gives up once `shutdown` is cancelled, since nobody drains the queue after that.
    ///
    /// Blocks the calling thread, so async callers should go through
    /// [`tokio::task::spawn_blocking`].
    pub(crate) fn enqueue_blocking(
        &self,
        mut command: Command,
        shutdown: &CancellationToken,
    ) -> Result<(), Error> {
        trace!(%command, "Enqueue (blocking)");

        loop {
            match self.tx.send_timeout(command, SHUTDOWN_POLL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(unsent)) if !shutdown.is_cancelled() => {
                    command = unsent;
                }
                Err(SendTimeoutError::Timeout(unsent)) => {
                    debug!(command = %unsent, "Shutting down, not queued");
                    return Err(Error::InternalIssue("Shutting down".into()));
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(Error::InternalIssue("Command queue disconnected".into()))
                }
            }
        }
    }

    /// Wait at most `timeout` for the next command.
    pub(crate) fn dequeue_timeout(&self, timeout: Duration) -> Option<Command> {
        match self.rx.recv_timeout(timeout) {
            Ok(command) => Some(command),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(usize::MAX)
    }
}
