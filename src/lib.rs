//! OVN overlay CNI plugin for Kubernetes
//!
//! This implementation provides a pure Rust CNI plugin that:
//! - Waits for the pod's network annotation published by the control plane
//! - Creates a veth pair and moves one end into the container namespace
//! - Configures address, MAC, MTU and default route on the container side
//! - Registers the host-side end as a port on the OVS integration bridge
//! - Handles cleanup on container deletion and on partial failure

pub mod annotation;
pub mod commands;
pub mod config;
pub mod error;
pub mod net;
pub mod plugin;
pub mod switch;
pub mod types;

// Re-export commonly used items
pub use config::PluginConfig;
pub use error::CniError;
pub use plugin::OvnPlugin;
pub use commands::{run_cni, cmd_add, cmd_del};
