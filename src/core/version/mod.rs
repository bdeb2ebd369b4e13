pub mod manifest;
pub mod version_file;

pub use manifest::{VersionEntry, VersionManifest, VERSION_MANIFEST_URL};
pub use version_file::{
    client_jar_path, current_os_name, version_json_path, LibraryEntry, VersionJson,
};
