use std::time::Duration;

use thiserror::Error;

mod config;
mod document;
mod election;
mod settings;
mod store;
mod txn;
mod utils;
mod wait;

pub use config::*;
pub use document::*;
pub use election::*;
pub use settings::*;
pub use store::*;
pub use txn::*;
pub use utils::*;
pub use wait::*;

#[derive(Error, Debug)]
pub enum GwConfError {
    #[error("object '{0}' does not exist")]
    ObjectNotFound(String),
    #[error("object '{0}' is locked by another session")]
    ObjectBusy(String),
    #[error("unable to reach the backing store - {0}")]
    BackendUnavailable(String),
    #[error("A fatal error occurred accessing the backing store.")]
    Io(#[from] std::io::Error),

    #[error("configuration object is corrupt - {0}")]
    CorruptConfig(String),
    #[error("Timed out ({limit:?}) waiting for excl lock on '{object}' object")]
    LockTimeout { object: String, limit: Duration },
    #[error("waited too long for '{0}' to appear in the configuration")]
    WaitTimeout(String),
    #[error("no gateways are defined, unable to elect an owner")]
    ElectionEmpty,

    #[error("'{0}' is not a valid size, use <int><M|G|T>")]
    InvalidSize(String),
}
