//! GraphQL client for the Linear issue tracker.
//!
//! [`LinearClient`] is the issue-tracker collaborator the agent loop sends
//! model-written GraphQL to; it also offers the few typed lookups
//! (teams, single issue) callers need around the loop.

pub mod client;
pub mod types;

pub use client::LinearClient;
pub use types::{PageInfo, Team};
