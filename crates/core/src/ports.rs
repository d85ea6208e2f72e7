//! Capabilities the agent loop is handed at construction time.
//!
//! Implementations live in `ema-db` (SQL) and `ema-linear` (GraphQL issue
//! tracker); tests plug in fakes.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::errors::{SqlError, TrackerError};

pub type SqlRow = Map<String, Value>;

#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn execute(&self, query: &str) -> Result<Value, TrackerError>;
}

/// Runs one statement inside its own scoped session.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, query: &str) -> Result<Vec<SqlRow>, SqlError>;
}
