//! Named calibration profiles, the current one, and their log on disk.

use std::{
    fs::{self, File},
    io::Write,
    path::PathBuf,
    sync::{Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{actions::Update, config::MAX_THRESHOLD, error::Error, hub::Hub};

/// The name of the built-in default profile.
pub const DEFAULT_PROFILE: &str = "";

/// A calibration: which image to show, and the threshold of every sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// An image file name, if any.
    pub image: Option<String>,

    /// One threshold per sensor, in logical sensor order.
    pub thresholds: Vec<u16>,
}

impl Profile {
    /// Create a profile.
    pub fn new(image: Option<String>, thresholds: Vec<u16>) -> Self {
        Self { image, thresholds }
    }
}

/// One line of the profile log.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileRecord {
    name: String,
    data: Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProfileKey {
    Image,
    Thresholds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProfileField {
    Image(Option<String>),
    Thresholds(Vec<u16>),
}

impl ProfileField {
    fn of(profile: &Profile, key: ProfileKey) -> Self {
        match key {
            ProfileKey::Image => Self::Image(profile.image.clone()),
            ProfileKey::Thresholds => Self::Thresholds(profile.thresholds.clone()),
        }
    }
}

impl From<ProfileField> for Update {
    fn from(field: ProfileField) -> Self {
        match field {
            ProfileField::Image(image) => Update::Image(image),
            ProfileField::Thresholds(thresholds) => Update::Thresholds(thresholds),
        }
    }
}

const KEYS: [ProfileKey; 2] = [ProfileKey::Image, ProfileKey::Thresholds];

/// What `/defaults` shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    pub(crate) profiles: Vec<String>,
    pub(crate) cur_profile: String,
    pub(crate) data: Profile,
}

#[derive(Debug, Clone)]
struct Profiles {
    // Insertion ordered. Always contains the default.
    profiles: Vec<(String, Profile)>,
    current: String,
}

impl Profiles {
    fn position(&self, name: &str) -> Option<usize> {
        self.profiles.iter().position(|(n, _)| n == name)
    }

    /// Put `current` back on a profile that exists.
    fn heal(&mut self) -> usize {
        match self.position(&self.current) {
            Some(position) => position,
            None => {
                warn!(current = %self.current, "Current profile is gone, using the default");
                self.current = DEFAULT_PROFILE.into();
                self.position(DEFAULT_PROFILE).unwrap_or(0)
            }
        }
    }

    fn current(&mut self) -> &mut Profile {
        let position = self.heal();
        &mut self.profiles[position].1
    }

    fn upsert(&mut self, name: &str, profile: Profile) {
        match self.position(name) {
            Some(position) => self.profiles[position].1 = profile,
            None => self.profiles.push((name.into(), profile)),
        }
    }

    fn names(&self) -> Vec<String> {
        self.profiles
            .iter()
            .map(|(name, _)| name)
            .filter(|name| name.as_str() != DEFAULT_PROFILE)
            .cloned()
            .collect()
    }
}

/// All profiles, and which one is in use.
///
/// Every operation holds the lock while mutating, persisting and broadcasting.
/// Changes become visible only once they are on disk.
/// The hub is only ever locked after the store.
#[derive(Debug)]
pub(crate) struct ProfileStore {
    inner: Mutex<Profiles>,
    hub: Hub,
    path: PathBuf,
    sensor_count: usize,
    default: Profile,
}

impl ProfileStore {
    /// Replay the profile log at `path`, creating it if missing.
    ///
    /// The first profile in the log becomes the current one.
    pub(crate) fn load<P: Into<PathBuf>>(
        path: P,
        sensor_count: usize,
        default: Profile,
        hub: Hub,
    ) -> Result<Self, Error> {
        let path = path.into();

        let store = Self {
            inner: Mutex::new(Profiles {
                profiles: vec![(DEFAULT_PROFILE.into(), default.clone())],
                current: DEFAULT_PROFILE.into(),
            }),
            hub,
            path,
            sensor_count,
            default,
        };
        store.validate(&store.default)?;

        if !store.path.exists() {
            info!(path = ?store.path, "No profile log, creating an empty one");
            File::create(&store.path).map_err(|e| {
                Error::Persistence(format!("Could not create {:?}: {e}", store.path))
            })?;

            return Ok(store);
        }

        let log = fs::read_to_string(&store.path)
            .map_err(|e| Error::Persistence(format!("Could not read {:?}: {e}", store.path)))?;

        {
            let mut profiles = store.lock();
            let mut first = None;

            for (number, line) in log.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }

                let record = match serde_json::from_str::<ProfileRecord>(line) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(line = number + 1, %e, "Skipping malformed profile record");
                        continue;
                    }
                };

                if record.name == DEFAULT_PROFILE {
                    warn!(line = number + 1, "Skipping record for the default profile");
                    continue;
                }

                if let Err(e) = store.validate(&record.data) {
                    warn!(line = number + 1, name = %record.name, %e, "Skipping invalid profile");
                    continue;
                }

                first.get_or_insert_with(|| record.name.clone());
                profiles.upsert(&record.name, record.data);
            }

            if let Some(first) = first {
                profiles.current = first;
            }

            info!(profiles = ?profiles.names(), current = %profiles.current, "Profiles loaded");
        }

        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Profiles> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn validate_thresholds(&self, thresholds: &[u16]) -> Result<(), Error> {
        if thresholds.len() != self.sensor_count {
            return Err(Error::BadRequest(format!(
                "Expected {} thresholds, got {}",
                self.sensor_count,
                thresholds.len()
            )));
        }

        if let Some(bad) = thresholds.iter().find(|&&t| t > MAX_THRESHOLD) {
            return Err(Error::BadRequest(format!(
                "Threshold {bad} is above the maximum of {MAX_THRESHOLD}"
            )));
        }

        Ok(())
    }

    fn validate(&self, profile: &Profile) -> Result<(), Error> {
        self.validate_thresholds(&profile.thresholds)
    }

    /// Rewrite the log, leaving out the default.
    fn persist(&self, profiles: &Profiles) -> Result<(), Error> {
        let persistence = |e: std::io::Error| {
            Error::Persistence(format!("Could not write {:?}: {e}", self.path))
        };

        let mut contents = String::new();
        for (name, data) in &profiles.profiles {
            if name == DEFAULT_PROFILE {
                continue;
            }

            let record = ProfileRecord {
                name: name.clone(),
                data: data.clone(),
            };
            let line = serde_json::to_string(&record)
                .map_err(|e| Error::Persistence(format!("Could not serialize {name:?}: {e}")))?;

            contents += &line;
            contents.push('\n');
        }

        let mut temporary = self.path.clone().into_os_string();
        temporary.push(".tmp");
        let temporary = PathBuf::from(temporary);

        let mut file = File::create(&temporary).map_err(persistence)?;
        file.write_all(contents.as_bytes()).map_err(persistence)?;
        file.sync_all().map_err(persistence)?;
        drop(file);

        fs::rename(&temporary, &self.path).map_err(persistence)?;

        debug!(path = ?self.path, "Profiles persisted");

        Ok(())
    }

    /// Apply `change` to a copy of the profiles and persist the copy.
    /// Only then does the copy replace `profiles`.
    fn commit<T>(
        &self,
        profiles: &mut Profiles,
        change: impl FnOnce(&mut Profiles) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut staged = profiles.clone();
        let out = change(&mut staged)?;

        self.persist(&staged)?;
        *profiles = staged;

        Ok(out)
    }

    fn broadcast_locked(&self, profiles: &mut Profiles, key: ProfileKey) {
        let field = ProfileField::of(profiles.current(), key);
        self.hub.publish(field.into());
    }

    /// Tell everyone about every field of the current profile, then its name.
    fn announce_current(&self, profiles: &mut Profiles) {
        for key in KEYS {
            self.broadcast_locked(profiles, key);
        }
        self.hub.publish(Update::CurProfile(profiles.current.clone()));

        let thresholds = profiles.current().thresholds.clone();
        info!(name = %profiles.current, ?thresholds, "Changed profile");
    }

    fn set_current_field_locked(
        &self,
        profiles: &mut Profiles,
        field: ProfileField,
    ) -> Result<(), Error> {
        let key = self.commit(profiles, |staged| {
            let current = staged.current();

            Ok(match field {
                ProfileField::Image(image) => {
                    current.image = image;
                    ProfileKey::Image
                }
                ProfileField::Thresholds(thresholds) => {
                    self.validate_thresholds(&thresholds)?;
                    current.thresholds = thresholds;
                    ProfileKey::Thresholds
                }
            })
        })?;

        self.broadcast_locked(profiles, key);

        Ok(())
    }

    /// A field of the current profile.
    pub(crate) fn get_current_field(&self, key: ProfileKey) -> ProfileField {
        ProfileField::of(self.lock().current(), key)
    }

    /// Change a field of the current profile, tell everyone, and persist.
    pub(crate) fn set_current_field(&self, field: ProfileField) -> Result<(), Error> {
        let mut profiles = self.lock();
        self.set_current_field_locked(&mut profiles, field)
    }

    /// Set one threshold of the current profile.
    pub(crate) fn update_threshold(&self, index: usize, value: u16) -> Result<(), Error> {
        let mut profiles = self.lock();

        let mut thresholds = profiles.current().thresholds.clone();
        let threshold = thresholds.get_mut(index).ok_or_else(|| {
            Error::BadRequest(format!("Index {index} is out of range for {} sensors", self.sensor_count))
        })?;
        *threshold = value;

        self.set_current_field_locked(&mut profiles, ProfileField::Thresholds(thresholds))
    }

    /// Let the device's thresholds win wherever they differ from the current profile's.
    ///
    /// Returns whether anything changed.
    /// Nothing is broadcast or persisted if they already agree.
    pub(crate) fn reconcile_thresholds(&self, device: &[u16]) -> Result<bool, Error> {
        self.validate_thresholds(device)?;

        let mut profiles = self.lock();
        let stored = &profiles.current().thresholds;

        let differing = stored
            .iter()
            .zip(device)
            .enumerate()
            .filter(|(_, (stored, device))| stored != device)
            .map(|(index, (stored, device))| (index, *stored, *device))
            .collect::<Vec<_>>();

        if differing.is_empty() {
            return Ok(false);
        }

        for (index, stored, device) in &differing {
            debug!(%index, %stored, %device, "Device threshold differs");
        }

        self.set_current_field_locked(&mut profiles, ProfileField::Thresholds(device.to_vec()))?;

        Ok(true)
    }

    /// Switch to the named profile.
    ///
    /// Does nothing if there is no such profile.
    /// Returns whether it switched.
    pub(crate) fn change_profile(&self, name: &str) -> bool {
        let mut profiles = self.lock();

        if profiles.position(name).is_none() {
            debug!(%name, "No such profile");
            return false;
        }

        profiles.current = name.into();
        self.announce_current(&mut profiles);

        true
    }

    /// Create or overwrite a profile, and switch to it.
    pub(crate) fn add_profile(&self, name: &str, data: Profile) -> Result<(), Error> {
        if name == DEFAULT_PROFILE {
            return Err(Error::BadRequest("The default profile cannot be replaced".into()));
        }
        self.validate(&data)?;

        let mut profiles = self.lock();

        self.commit(&mut profiles, |staged| {
            staged.upsert(name, data);

            if staged.current == DEFAULT_PROFILE {
                let default = Profile::new(None, self.default.thresholds.clone());
                staged.upsert(DEFAULT_PROFILE, default);
            }

            staged.current = name.into();
            Ok(())
        })?;

        self.announce_current(&mut profiles);
        self.hub.publish(Update::Profiles(profiles.names()));

        info!(%name, "Added profile");

        Ok(())
    }

    /// Remove a profile.
    ///
    /// Unknown profiles and the default are left alone.
    /// Removing the current profile switches to the default.
    pub(crate) fn remove_profile(&self, name: &str) -> Result<(), Error> {
        if name == DEFAULT_PROFILE {
            warn!("The default profile cannot be removed");
            return Ok(());
        }

        let mut profiles = self.lock();

        let Some(position) = profiles.position(name) else {
            debug!(%name, "No such profile to remove");
            return Ok(());
        };
        let was_current = profiles.current == name;

        self.commit(&mut profiles, |staged| {
            staged.profiles.remove(position);

            if was_current {
                staged.current = DEFAULT_PROFILE.into();
            }
            Ok(())
        })?;

        if was_current {
            self.announce_current(&mut profiles);
        }
        self.hub.publish(Update::Profiles(profiles.names()));
        self.hub.publish(Update::CurProfile(profiles.current.clone()));

        info!(%name, "Removed profile");

        Ok(())
    }

    /// Tell everyone the current value of a field.
    pub(crate) fn broadcast_field(&self, key: ProfileKey) {
        let mut profiles = self.lock();
        self.broadcast_locked(&mut profiles, key);
    }

    pub(crate) fn current_name(&self) -> String {
        let mut profiles = self.lock();
        profiles.heal();
        profiles.current.clone()
    }

    /// Names of all profiles except the default.
    pub(crate) fn profile_names(&self) -> Vec<String> {
        self.lock().names()
    }

    /// Every field of the current profile, as updates.
    pub(crate) fn current_fields(&self) -> Vec<Update> {
        let current = self.lock().current().clone();

        KEYS.into_iter()
            .map(|key| ProfileField::of(&current, key).into())
            .collect()
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let mut profiles = self.lock();
        let data = profiles.current().clone();

        Snapshot {
            profiles: profiles.names(),
            cur_profile: profiles.current.clone(),
            data,
        }
    }

    #[cfg(test)]
    pub(crate) fn path(&self) -> &std::path::Path {
        &self.path
    }

    #[cfg(test)]
    fn force_current(&self, name: &str) {
        self.lock().current = name.into();
    }
}
