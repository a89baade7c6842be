//! Per-user flat file storage, rooted under one directory per account.

mod error;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::Store;
