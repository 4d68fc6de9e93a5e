//! Port Lease — (port, owner, acquired_at) (spec.md §3.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLease {
    pub port: u16,
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
}

impl PortLease {
    #[must_use]
    pub fn new(port: u16, owner: impl Into<String>) -> Self {
        Self {
            port,
            owner: owner.into(),
            acquired_at: Utc::now(),
        }
    }
}
