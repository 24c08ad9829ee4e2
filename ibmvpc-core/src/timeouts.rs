//! Per-operation timeouts

use std::time::Duration;

use crate::resource::{Resource, Value};
use crate::wait::DEFAULT_TIMEOUT;

/// Attribute holding per-resource timeout overrides
pub const TIMEOUTS_ATTRIBUTE: &str = "timeouts";

/// Lifecycle operation a timeout applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Timeouts for create, update and delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::uniform(DEFAULT_TIMEOUT)
    }
}

impl Timeouts {
    /// Same timeout for every operation
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            create: timeout,
            update: timeout,
            delete: timeout,
        }
    }

    pub fn get(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }

    /// Apply overrides from a resource's `timeouts` attribute (seconds)
    ///
    /// Entries that are missing or not positive integers keep the current value.
    pub fn with_overrides(mut self, resource: &Resource) -> Self {
        let Some(Value::Map(map)) = resource.attributes.get(TIMEOUTS_ATTRIBUTE) else {
            return self;
        };

        for operation in [Operation::Create, Operation::Update, Operation::Delete] {
            if let Some(secs) = map.get(operation.as_str()).and_then(Value::as_int)
                && secs > 0
            {
                let duration = Duration::from_secs(secs as u64);
                match operation {
                    Operation::Create => self.create = duration,
                    Operation::Update => self.update = duration,
                    Operation::Delete => self.delete = duration,
                }
            }
        }
        self
    }
}
