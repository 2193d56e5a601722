#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

/// The actions that can be sent from a connecting user,
/// as well as the updates sent back.
pub mod actions;

/// Code relating to setting up the server which sets up connections and spawns handlers for clients.
pub mod server;

/// The command line interface.
pub mod cli;

/// Relates to config files.
pub mod config;

/// Possible errors in this library.
pub mod error;

/// Logging/tracing setup.
pub mod logging;

/// Profiles and where they are kept.
pub mod profile;

/// Emulated pad firmware.
pub mod mock;

/// Commands for the device.
pub mod commands;

/// Serial port driver.
pub(crate) mod serial;

/// Owns the shared state.
/// Hands out handles to the device link and to each connection.
pub(crate) mod bridge;

/// Handles incoming websockets.
pub(crate) mod websocket;

/// The actor spawned from a connected user.
pub(crate) mod peer;

/// Fan-out of updates to connected users.
pub(crate) mod hub;

/// The queue of commands waiting for the device.
pub(crate) mod queue;

/// Where profile images are found.
pub(crate) mod images;

/// A connected user.
pub(crate) mod user;
