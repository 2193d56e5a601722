use std::fmt::Display;

use serde::{
    de::{self, DeserializeOwned},
    ser::{SerializeMap, SerializeTuple},
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::{json, Value};

use crate::{error::Error, profile::Profile};

/// Actions a connected user can ask of the server.
///
/// On the wire, an action is a JSON array: the action name followed by its arguments.
/// For example `["change_profile", "alice"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Ask the device to use `values[index]` as the threshold for sensor `index`.
    ///
    /// The profile is updated once the device reports back its thresholds.
    UpdateThreshold {
        /// The full set of thresholds as the user sees them.
        values: Vec<u16>,

        /// Which one of them changed.
        index: usize,
    },

    /// Use this image (a file name within the images directory) for the current profile,
    /// and push it to the device.
    UpdateImage(String),

    /// Create or overwrite a profile, then switch to it.
    AddProfile {
        /// The profile's name.
        name: String,

        /// The profile's contents.
        data: Profile,
    },

    /// Remove a profile.
    RemoveProfile(String),

    /// Switch to another profile.
    ChangeProfile(String),
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::UpdateThreshold { values, index } => {
                write!(f, "update threshold: {index} in {values:?}")
            }
            Action::UpdateImage(image) => write!(f, "update image: {image}"),
            Action::AddProfile { name, .. } => write!(f, "add profile: {name}"),
            Action::RemoveProfile(name) => write!(f, "remove profile: {name}"),
            Action::ChangeProfile(name) => write!(f, "change profile: {name}"),
        }
    }
}

fn next_arg<T: DeserializeOwned>(
    args: &mut impl Iterator<Item = Value>,
    action: &str,
    what: &str,
) -> Result<T, Error> {
    let arg = args
        .next()
        .ok_or_else(|| Error::BadRequest(format!("`{action}` is missing its {what}")))?;

    serde_json::from_value(arg)
        .map_err(|e| Error::BadRequest(format!("`{action}` has a bad {what}: {e}")))
}

impl Action {
    /// Parse a request as sent by a user.
    pub fn parse(request: &str) -> Result<Self, Error> {
        let bad_json = |problem: String| Error::BadJson {
            request: request.to_owned(),
            problem,
        };

        let parts: Vec<Value> = serde_json::from_str(request).map_err(|e| bad_json(e.to_string()))?;
        let mut args = parts.into_iter();

        let name = match args.next() {
            Some(Value::String(name)) => name,
            _ => return Err(bad_json("expected an action name first".into())),
        };

        let action = match name.as_str() {
            "update_threshold" => Self::UpdateThreshold {
                values: next_arg(&mut args, &name, "values")?,
                index: next_arg(&mut args, &name, "index")?,
            },
            "update_image" => Self::UpdateImage(next_arg(&mut args, &name, "file name")?),
            "add_profile" => Self::AddProfile {
                name: next_arg(&mut args, &name, "profile name")?,
                data: next_arg(&mut args, &name, "profile data")?,
            },
            "remove_profile" => Self::RemoveProfile(next_arg(&mut args, &name, "profile name")?),
            "change_profile" => Self::ChangeProfile(next_arg(&mut args, &name, "profile name")?),
            _ => return Err(Error::UnknownAction(name)),
        };

        Ok(action)
    }

    /// Turn an action into serialized json.
    pub fn serialize(&self) -> String {
        let value = match self {
            Action::UpdateThreshold { values, index } => json!(["update_threshold", values, index]),
            Action::UpdateImage(image) => json!(["update_image", image]),
            Action::AddProfile { name, data } => json!(["add_profile", name, data]),
            Action::RemoveProfile(name) => json!(["remove_profile", name]),
            Action::ChangeProfile(name) => json!(["change_profile", name]),
        };

        value.to_string()
    }

    /// An example of adding a profile.
    pub fn example_add_profile() -> Self {
        Self::AddProfile {
            name: "alice".into(),
            data: Profile::new(Some("alice.gif".into()), vec![500; 8]),
        }
    }

    /// An example of changing a threshold.
    pub fn example_update_threshold() -> Self {
        Self::UpdateThreshold {
            values: vec![1000, 900, 1000, 1000, 1000, 1000, 1000, 1000],
            index: 1,
        }
    }
}

/// A state change the server pushes to every connected user.
///
/// On the wire an update is `[key, {key: value}]`,
/// e.g. `["cur_profile", {"cur_profile": "alice"}]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// A fresh sensor frame.
    Values(Vec<u16>),

    /// The current profile's thresholds.
    Thresholds(Vec<u16>),

    /// The current profile's image.
    Image(Option<String>),

    /// The name of the current profile. Empty for the default profile.
    CurProfile(String),

    /// The names of all user profiles.
    Profiles(Vec<String>),
}

impl Update {
    /// The key this update is published under.
    pub fn key(&self) -> &'static str {
        match self {
            Update::Values(_) => "values",
            Update::Thresholds(_) => "thresholds",
            Update::Image(_) => "image",
            Update::CurProfile(_) => "cur_profile",
            Update::Profiles(_) => "profiles",
        }
    }

    /// An example of a thresholds update.
    pub fn example_thresholds() -> Self {
        Self::Thresholds(vec![1000, 900, 1000, 1000, 1000, 1000, 1000, 1000])
    }

    /// Turn an update into serialized json.
    pub fn serialize(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Display for Update {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Update::Values(values) => write!(f, "values: {values:?}"),
            Update::Thresholds(thresholds) => write!(f, "thresholds: {thresholds:?}"),
            Update::Image(image) => write!(f, "image: {image:?}"),
            Update::CurProfile(name) => write!(f, "cur_profile: {name:?}"),
            Update::Profiles(names) => write!(f, "profiles: {names:?}"),
        }
    }
}

/// The `{key: value}` half of an update.
struct Keyed<'a>(&'a Update);

impl Serialize for Keyed<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        let key = self.0.key();

        match self.0 {
            Update::Values(values) => map.serialize_entry(key, values)?,
            Update::Thresholds(thresholds) => map.serialize_entry(key, thresholds)?,
            Update::Image(image) => map.serialize_entry(key, image)?,
            Update::CurProfile(name) => map.serialize_entry(key, name)?,
            Update::Profiles(names) => map.serialize_entry(key, names)?,
        }

        map.end()
    }
}

impl Serialize for Update {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(self.key())?;
        tuple.serialize_element(&Keyed(self))?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Update {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (key, mut body): (String, serde_json::Map<String, Value>) =
            Deserialize::deserialize(deserializer)?;

        let value = body
            .remove(&key)
            .ok_or_else(|| de::Error::custom(format!("update body lacks the key `{key}`")))?;

        fn inner<T: DeserializeOwned, E: de::Error>(value: Value) -> Result<T, E> {
            serde_json::from_value(value).map_err(E::custom)
        }

        match key.as_str() {
            "values" => Ok(Update::Values(inner(value)?)),
            "thresholds" => Ok(Update::Thresholds(inner(value)?)),
            "image" => Ok(Update::Image(inner(value)?)),
            "cur_profile" => Ok(Update::CurProfile(inner(value)?)),
            "profiles" => Ok(Update::Profiles(inner(value)?)),
            other => Err(de::Error::custom(format!("unknown update key `{other}`"))),
        }
    }
}
