//! Persistent and transient workspace state for the bridge daemon.

pub mod cells;
pub mod paths;
pub mod registry;
pub mod store;

pub use {
    cells::{ActiveConversations, ActiveSpeaker},
    registry::{DEFAULT_FRESHNESS, Mapping, MappingRegistry},
    store::{StateStore, keys},
};
