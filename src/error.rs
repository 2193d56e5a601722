use thiserror::Error;

/// Errors that may occur in this library.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    /// Bad json.
    #[error("The request `{request}` could not be deserialized. Problem: {problem}")]
    BadJson {
        /// The problematic request.
        request: String,

        /// The deserialization issue.
        problem: String,
    },

    /// The request named an action we don't know about.
    #[error("Unknown action: `{0}`")]
    UnknownAction(String),

    /// The user did something which is not valid.
    /// For example, a threshold index beyond the sensor count.
    #[error("The request did not conform to valid usage. Problem: `{0}`")]
    BadRequest(String),

    /// The command queue towards the device had no room.
    #[error("The device command queue is full")]
    QueueFull,

    /// The configuration is not valid.
    #[error("Bad configuration: {0}")]
    BadConfig(String),

    /// Reading or writing the profile log failed.
    #[error("Profile persistence problem: {0}")]
    Persistence(String),

    /// Something within the server went wrong.
    #[error("Internal issue: {0}")]
    InternalIssue(String),
}

impl Error {
    /// Returns the inner string if this is a [`Error::BadConfig`].
    pub fn try_into_bad_config(self) -> Result<String, Self> {
        if let Self::BadConfig(v) = self {
            Ok(v)
        } else {
            Err(self)
        }
    }

    /// Returns the inner string if this is a [`Error::BadRequest`].
    pub fn try_into_bad_request(self) -> Result<String, Self> {
        if let Self::BadRequest(v) = self {
            Ok(v)
        } else {
            Err(self)
        }
    }
}
