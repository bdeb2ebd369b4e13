pub mod context;
pub mod fabric;
pub mod forge;
pub mod installer;
pub mod provisioner;
pub mod vanilla;

pub use context::{InstallContext, MetaEndpoints};
pub use installer::{Installer, LoaderInstallResult, LoaderInstaller};
pub use provisioner::{GameProvisioner, GameTarget, MojangProvisioner};
