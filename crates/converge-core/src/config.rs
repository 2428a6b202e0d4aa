// ── Engine configuration ──
//
// Per-operation-class timeouts and polling cadence. Built by the host
// (or by `converge-config` from a profile) and handed to the orchestrator.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::Display;

/// Which kind of remote operation a wait episode follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationClass {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationTimeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl OperationTimeouts {
    pub fn for_class(&self, class: OperationClass) -> Duration {
        match class {
            OperationClass::Create => self.create,
            OperationClass::Update => self.update,
            OperationClass::Delete => self.delete,
        }
    }
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30 * 60),
            update: Duration::from_secs(30 * 60),
            delete: Duration::from_secs(15 * 60),
        }
    }
}

/// Settings every wait episode draws from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub timeouts: OperationTimeouts,
    /// Pause before the first status refresh after a mutation.
    pub initial_delay: Duration,
    /// Pause between refreshes while the status is still pending.
    pub min_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeouts: OperationTimeouts::default(),
            initial_delay: Duration::from_secs(10),
            min_poll_interval: Duration::from_secs(3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_per_class() {
        let t = OperationTimeouts {
            create: Duration::from_secs(1),
            update: Duration::from_secs(2),
            delete: Duration::from_secs(3),
        };
        assert_eq!(t.for_class(OperationClass::Create), Duration::from_secs(1));
        assert_eq!(t.for_class(OperationClass::Update), Duration::from_secs(2));
        assert_eq!(t.for_class(OperationClass::Delete), Duration::from_secs(3));
    }

    #[test]
    fn class_names() {
        assert_eq!(OperationClass::Delete.to_string(), "delete");
    }
}
