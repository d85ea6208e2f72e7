pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod ports;

pub use domain::message::{Message, Role};
pub use errors::{SqlError, TrackerError};
pub use ports::{IssueTracker, SqlExecutor, SqlRow};
