//! Read-only adapter over the IDE's workspace-storage database.

pub mod locate;
pub mod store;

pub use {
    locate::{WorkspaceStorage, file_uri_to_path, locate_for_workspace, storage_base_dir},
    store::ComposerStore,
};
