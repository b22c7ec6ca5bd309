pub mod api;
pub mod client;
pub mod error;
pub mod profiles;
pub mod query;

pub use api::{HttpApi, ServerApi};
pub use client::SyncClient;
pub use error::SyncError;
pub use query::{MutationTicket, QueryState, TrackedQuery};

use std::time::Duration;

/// Explicit client configuration. The polling cadence is passed in here
/// rather than living in ambient global state.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Cadence for background re-fetch of notifications and unread counts.
    pub poll_interval: Duration,
    /// Capacity of the read-through profile cache shared across views.
    pub profile_cache_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            profile_cache_capacity: 256,
        }
    }
}
