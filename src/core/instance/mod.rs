pub mod manager;

pub use manager::{missing_dependencies, InstanceManager};
