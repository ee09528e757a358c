//! Typed ids for requests and tuple sources, plus metadata record uuids.
//!
//! Downstream crates (buffer, planner, exec) should *not* use raw integers for IDs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! new_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(v: u64) -> Self {
                Self(v)
            }
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

new_id!(TupleSourceId);
new_id!(RequestId);
new_id!(NodeId);

/// Monotonic id source. One per owner (buffer manager, planner run, ...).
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_raw(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_tuple_source(&self) -> TupleSourceId {
        TupleSourceId::new(self.next_raw())
    }

    pub fn next_request(&self) -> RequestId {
        RequestId::new(self.next_raw())
    }
}

/// Metadata record uuid in the `tid:` namespace used by DDL-created objects.
pub fn generate_record_uuid() -> String {
    format!("tid:{}", uuid::Uuid::new_v4().simple())
}
