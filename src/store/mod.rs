//! Coordination Store Adapters
//!
//! Provides implementations of [`CoordinationStore`](crate::domain::CoordinationStore):
//! - Memory: in-process store for standalone mode and tests
//! - Etcd: HTTP client for an etcd v2 keys API
//!
//! The key layout shared by every component lives in [`keys`].

pub mod etcd;
pub mod keys;
pub mod memory;

pub use etcd::*;
pub use memory::*;
