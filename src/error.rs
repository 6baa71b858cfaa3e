//! Error types for the paths that are allowed to fail deliberately (§7).
//!
//! Once the event loop is running, handlers never return errors — an
//! unexpected X error goes through the installed error handler's allow-list
//! (see `xconn::on_x_error`), and everything else is handled locally. Only
//! the startup path in `main.rs` surfaces a `Result`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WmError {
    #[error("cannot open connection to the X display")]
    DisplayConnect,

    #[error("no screen associated with the display")]
    NoScreen,

    #[error("another window manager is already running")]
    CompetingWindowManager,

    #[error("no fonts could be loaded: {0}")]
    FontLoad(String),

    #[error("failed to parse configuration file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, WmError>;
