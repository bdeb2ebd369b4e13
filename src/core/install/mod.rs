pub mod archive;
pub mod lock;
pub mod pipeline;
pub mod update;

pub use archive::{export_directory, extract_archive};
pub use lock::{InstallGuard, InstallLock};
pub use pipeline::{instance_dir_name, ArchiveSource, ModpackInstaller, BACKUP_PREFIX, STAGING_PREFIX};
pub use update::backup_path;
