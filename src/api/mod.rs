//! API Module
//!
//! REST façade over the inventory and cluster modules.

pub mod handlers;
pub mod server;

pub use handlers::{router, AppState};
pub use server::{ApiServer, ApiServerConfig};
