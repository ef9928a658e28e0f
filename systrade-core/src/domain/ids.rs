use serde::{Deserialize, Serialize};
use std::fmt;

/// Order ID, allocated by the registry's [`IdGen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for OrderId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Monotonic order ID sequence. The first ID handed out is 1.
#[derive(Debug, Clone, Default)]
pub struct IdGen {
    last_id: u64,
}

impl IdGen {
    pub fn next_order_id(&mut self) -> OrderId {
        self.last_id += 1;
        OrderId(self.last_id)
    }

    /// The most recently allocated ID, or 0 if none has been handed out.
    pub fn last_id(&self) -> u64 {
        self.last_id
    }
}
