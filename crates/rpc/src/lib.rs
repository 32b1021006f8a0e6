//! Loopback RPC fabric: the HTTP surface, instance discovery, and adapter
//! registration.

pub mod adapter;
pub mod discover;
pub mod server;

pub use {
    adapter::{adapter_config_path, ensure_adapter_registered},
    discover::{DiscoveryClient, WORKSPACE_FOLDERS_ENV, expected_workspaces_from_env},
    server::{AppState, PORT_RANGE_LEN, PORT_RANGE_START, Reconnector, bind_loopback, router, serve},
};
