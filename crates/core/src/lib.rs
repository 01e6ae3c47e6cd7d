pub mod album;
pub mod crop;
pub mod db;
pub mod error;
pub mod gallery;
pub mod ingest;
pub mod media_store;
pub mod metadata;
pub mod models;
pub mod reconcile;
pub mod resolver;
pub mod settings;
pub mod store;
pub mod thumbnail;
pub mod video;
pub mod watch;

#[cfg(test)]
mod testing;

pub use crate::error::{Error, Result};
pub use crate::models::*;
