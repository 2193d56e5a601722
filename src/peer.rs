use tracing::{info, warn};

use crate::{
    actions::Action,
    bridge::Bridge,
    error::Error,
    profile::ProfileField,
    user::User,
};

/// Acts on behalf of a connected user.
pub(crate) struct Peer {
    // Which user does this peer represent
    user: User,

    // Holds the profiles and reaches the device.
    bridge: Bridge,
}

impl Peer {
    pub(crate) fn new(user: User, bridge: Bridge) -> Self {
        Self { user, bridge }
    }

    /// Perform the action, logging rather than returning any problem.
    /// The user sees the effects through broadcasts.
    pub(crate) async fn do_user_action(&self, action: Action) {
        info!(user = %self.user, %action, "Action");

        if let Err(e) = self.perform(action).await {
            warn!(user = %self.user, %e, "Action failed");
        }
    }

    async fn perform(&self, action: Action) -> Result<(), Error> {
        let Bridge {
            store, commands, ..
        } = &self.bridge;

        // Store operations write the profile log, so they run on the blocking pool.
        match action {
            Action::UpdateThreshold { values, index } => {
                // The profile follows once the device echoes its thresholds.
                commands.update_threshold(&values, index)
            }
            Action::UpdateImage(image) => {
                let field = ProfileField::Image(Some(image.clone()));
                self.bridge
                    .with_store(move |store| store.set_current_field(field))
                    .await??;

                commands.update_image_async(image).await
            }
            Action::AddProfile { name, data } => {
                // The device already has these thresholds, as they were taken from it.
                self.bridge
                    .with_store(move |store| store.add_profile(&name, data))
                    .await?
            }
            Action::RemoveProfile(name) => {
                self.bridge
                    .with_store(move |store| store.remove_profile(&name))
                    .await??;

                commands.update_values_async(store.clone()).await;
                Ok(())
            }
            Action::ChangeProfile(name) => {
                let changed = self
                    .bridge
                    .with_store(move |store| {
                        store
                            .change_profile(&name)
                            .then(|| store.current_name())
                    })
                    .await?;

                if let Some(current) = changed {
                    info!(%current, "Profile changed");
                }
                commands.update_values_async(store.clone()).await;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        commands::Command,
        config::{Config, SensorConfig},
        profile::{Profile, ProfileKey},
    };

    fn peer(dir: &tempfile::TempDir) -> Peer {
        let config = Config {
            sensors: SensorConfig {
                count: 2,
                order: vec![1, 0],
                ..Default::default()
            },
            profiles_path: dir.path().join("profiles.txt"),
            images_dir: dir.path().into(),
            ..Default::default()
        };

        Peer::new(User::new("tester"), Bridge::new(&config, CancellationToken::new()).unwrap())
    }

    fn drain(peer: &Peer) -> Vec<Command> {
        let queue = peer.bridge.commands.queue();
        std::iter::from_fn(|| queue.dequeue_timeout(Duration::from_millis(10))).collect()
    }

    #[tokio::test]
    async fn update_threshold_is_queued_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let peer = peer(&dir);

        peer.do_user_action(Action::UpdateThreshold {
            values: vec![1000, 5],
            index: 1,
        })
        .await;

        assert_eq!(
            drain(&peer),
            vec![Command::SetThreshold { index: 0, value: 5 }]
        );
        assert_eq!(peer.bridge.store.snapshot().data.thresholds, vec![1000, 1000]);
    }

    #[tokio::test]
    async fn update_image() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cat.gif"), b"meow").unwrap();
        let peer = peer(&dir);

        peer.do_user_action(Action::UpdateImage("cat.gif".into())).await;

        assert_eq!(drain(&peer), vec![Command::SendImage(b"meow".to_vec())]);
        assert_eq!(
            peer.bridge.store.get_current_field(ProfileKey::Image),
            ProfileField::Image(Some("cat.gif".into()))
        );
    }

    #[tokio::test]
    async fn change_profile_reapplies() {
        let dir = tempfile::tempdir().unwrap();
        let peer = peer(&dir);

        peer.do_user_action(Action::AddProfile {
            name: "alice".into(),
            data: Profile::new(None, vec![1, 2]),
        })
        .await;
        assert!(drain(&peer).is_empty());

        peer.do_user_action(Action::ChangeProfile("".into())).await;
        peer.do_user_action(Action::ChangeProfile("alice".into())).await;

        assert_eq!(
            drain(&peer),
            vec![
                Command::SetThreshold {
                    index: 1,
                    value: 1000
                },
                Command::SetThreshold {
                    index: 0,
                    value: 1000
                },
                Command::SetThreshold { index: 1, value: 1 },
                Command::SetThreshold { index: 0, value: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn remove_profile_reapplies_default() {
        let dir = tempfile::tempdir().unwrap();
        let peer = peer(&dir);

        peer.do_user_action(Action::AddProfile {
            name: "alice".into(),
            data: Profile::new(None, vec![1, 2]),
        })
        .await;
        peer.do_user_action(Action::RemoveProfile("alice".into())).await;

        assert_eq!(peer.bridge.store.current_name(), "");
        assert_eq!(drain(&peer).len(), 2);
    }

    #[tokio::test]
    async fn bad_threshold_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let peer = peer(&dir);

        peer.do_user_action(Action::UpdateThreshold {
            values: vec![1000],
            index: 3,
        })
        .await;

        assert!(drain(&peer).is_empty());
    }
}
