//! Bridge CNI plugin
//!
//! This implementation provides a pure Rust bridge CNI plugin that:
//! - Creates a Linux bridge on the host on demand
//! - Creates a veth pair from inside the container namespace
//! - Configures the container-side IP address
//! - Removes the container link and the bridge on deletion

pub mod commands;
pub mod config;
pub mod error;
pub mod net;
pub mod plugin;
pub mod runtime;
pub mod types;

// Re-export commonly used items
pub use commands::{cmd_add, cmd_check, cmd_del, run_cni};
pub use config::NetConf;
pub use error::{Error, Result};
pub use plugin::BridgePlugin;
pub use runtime::PinnedRuntime;
