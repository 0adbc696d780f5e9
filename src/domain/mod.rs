//! Domain layer - capability traits and the shared cluster context
//!
//! Components depend on these ports rather than on concrete store or
//! cluster clients, so fakes can be swapped in per call.

pub mod ports;

pub use ports::*;
