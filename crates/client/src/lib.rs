//! Client side of driftsync: a connection to one server as one user, with
//! a single reader task routing responses by sequence number, a
//! notification handler applying server-initiated changes, and a polling
//! watcher uploading and deleting on local changes.

mod client;
mod config;
mod error;
mod fs_ops;
mod initial_sync;
mod notify;
mod reader;
mod router;
mod watcher;

pub use client::{Client, RemoteFile};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
