pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod log_sanitize;
pub mod plainid;
pub mod restore;
pub mod scope;
pub mod snapshot;
pub mod sync;
pub mod util;
pub mod vcs;

pub use error::{Error, ErrorKind, Result};
