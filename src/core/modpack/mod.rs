pub mod manifest;
pub mod model;

pub use manifest::{
    find_manifest, parse_catalog, parse_descriptor, read_manifest, write_manifest, MANIFEST_FILE,
};
pub use model::{LoaderType, ModEntry, ModpackDescriptor};
