//! `SubscriberChannel` identity shared between the bus, the
//! gRPC streaming storage engine, and the read API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque handle identifying one streaming subscriber, returned at
/// registration and used on deregistration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
