use thiserror::Error;

use crate::models::MediaUri;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid value for setting `{key}`: {value}")]
    InvalidSetting { key: &'static str, value: String },

    #[error("not found: {0}")]
    NotFound(MediaUri),

    /// Writing to a URI the app does not own needs the user's consent first.
    #[error("write access to {0} requires user consent")]
    PermissionRequired(MediaUri),

    #[error("change watcher error: {0}")]
    Watch(String),

    #[error("worker task failed: {0}")]
    Join(String),
}
