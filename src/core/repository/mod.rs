pub mod client;
pub mod manager;
pub mod model;

pub use client::RepositoryClient;
pub use manager::RepositoryManager;
pub use model::{CachedCatalog, Repository, SYNC_INTERVAL_SECS};
