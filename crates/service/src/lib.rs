//! Service layer for FileEngine.
//!
//! Wraps the engine from `common` into something a process can run:
//! - Config (TOML file plus defaults, tenant policies and quotas)
//! - Filesystem snapshot store the engine is persisted to
//! - State (engine + store + sync coordinator)
//! - Request surface ([`FileService`]) answering every call with a [`api::Response`]
//! - Process lifecycle (logging, sync worker, graceful shutdown)

pub mod api;
pub mod config;
pub mod fs_store;
pub mod process;
pub mod state;

pub use api::FileService;
pub use config::{Config, ConfigError};
pub use fs_store::{FsSnapshotStore, FsSnapshotStoreError};
pub use state::{State as ServiceState, StateSetupError};
