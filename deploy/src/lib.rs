//! Deployment Store: turns a workspace directory into a numbered, served static site.

mod error;
mod record;
mod server;
mod store;

pub use error::DeployError;
pub use record::{slugify, DeploymentRecord, DeploymentSummary, ServerInfo};
pub use store::{CleanupOutcome, DeployRequest, Store};
