//! Fans updates out to every live session.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::actions::Update;

/// How many updates a session may lag behind before it starts missing some.
pub(crate) const MAILBOX_CAPACITY: usize = 100;

type Mailboxes = HashMap<Uuid, mpsc::Sender<Update>>;

/// The set of subscriber mailboxes.
///
/// Publishing never blocks, so it may be done from any thread while holding other locks.
#[derive(Debug, Clone, Default)]
pub(crate) struct Hub {
    mailboxes: Arc<Mutex<Mailboxes>>,
}

impl Hub {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Mailboxes> {
        self.mailboxes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a mailbox. Updates published from now on reach it.
    pub(crate) fn register(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(MAILBOX_CAPACITY);
        let id = Uuid::new_v4();

        self.lock().insert(id, sender);
        debug!(%id, "Subscriber registered");

        Subscription {
            id,
            receiver,
            hub: self.clone(),
        }
    }

    pub(crate) fn unregister(&self, id: Uuid) {
        if self.lock().remove(&id).is_some() {
            debug!(%id, "Subscriber unregistered");
        }
    }

    /// Offer the update to every mailbox.
    /// Returns how many accepted it.
    pub(crate) fn publish(&self, update: Update) -> usize {
        let mut mailboxes = self.lock();
        let mut accepted = 0;

        mailboxes.retain(|id, mailbox| match mailbox.try_send(update.clone()) {
            Ok(()) => {
                accepted += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                trace!(%id, key = update.key(), "Mailbox full, dropping update");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%id, "Mailbox closed, pruning");
                false
            }
        });

        trace!(key = update.key(), %accepted, "Published");

        accepted
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.lock().len()
    }
}

/// A registered mailbox.
/// Unregisters itself when dropped.
#[derive(Debug)]
pub(crate) struct Subscription {
    id: Uuid,
    receiver: mpsc::Receiver<Update>,
    hub: Hub,
}

impl Subscription {
    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    /// The next update.
    pub(crate) async fn recv(&mut self) -> Option<Update> {
        self.receiver.recv().await
    }

    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<Update> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}
