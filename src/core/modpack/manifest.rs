// ─── Modpack Manifest ───
// Reading, writing and locating `manifest.json`, plus catalog parsing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::model::ModpackDescriptor;
use crate::core::error::{LauncherError, LauncherResult};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Parse a single descriptor, normalizing field names.
pub fn parse_descriptor(raw: &str) -> LauncherResult<ModpackDescriptor> {
    let value: serde_json::Value = serde_json::from_str(raw)?;

    // Some server exports wrap a single pack in a one-element list.
    let value = match value {
        serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        serde_json::Value::Array(_) => {
            return Err(LauncherError::InvalidManifest("empty manifest list".into()))
        }
        other => other,
    };

    let descriptor: ModpackDescriptor = serde_json::from_value(value)
        .map_err(|e| LauncherError::InvalidManifest(e.to_string()))?;

    if descriptor.id.trim().is_empty() {
        return Err(LauncherError::InvalidManifest("manifest has an empty id".into()));
    }

    Ok(descriptor)
}

/// Parse a catalog response (`GET /api/modpacks`). Entries that fail to
/// normalize are skipped with a warning instead of failing the whole list.
pub fn parse_catalog(raw: &str) -> LauncherResult<Vec<ModpackDescriptor>> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let serde_json::Value::Array(items) = value else {
        return Err(LauncherError::InvalidManifest(
            "catalog response is not a JSON array".into(),
        ));
    };

    let mut descriptors = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<ModpackDescriptor>(item) {
            Ok(d) if !d.id.trim().is_empty() => descriptors.push(d),
            Ok(_) => warn!("Skipping catalog entry with empty id"),
            Err(e) => warn!("Skipping malformed catalog entry: {}", e),
        }
    }

    Ok(descriptors)
}

pub async fn read_manifest(path: &Path) -> LauncherResult<ModpackDescriptor> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    parse_descriptor(&raw)
}

/// Write the manifest via a temporary sibling and rename, so a reader never
/// observes a half-written file.
pub async fn write_manifest(path: &Path, descriptor: &ModpackDescriptor) -> LauncherResult<()> {
    let json = serde_json::to_string_pretty(descriptor)?;
    write_atomic(path, json.as_bytes()).await
}

pub async fn write_atomic(path: &Path, bytes: &[u8]) -> LauncherResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LauncherError::io(parent, e))?;
    }

    let tmp = temp_sibling(path);
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| LauncherError::io(&tmp, e))?;

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(LauncherError::io(path, e));
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".into());
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

/// Locate `manifest.json` under an extracted archive: the root first, then
/// breadth-first through subdirectories (some packs wrap everything in a
/// top-level folder).
pub fn find_manifest(root: &Path) -> Option<PathBuf> {
    let mut queue = VecDeque::from([root.to_path_buf()]);

    while let Some(dir) = queue.pop_front() {
        let candidate = dir.join(MANIFEST_FILE);
        if candidate.is_file() {
            debug!("Found manifest at {:?}", candidate);
            return Some(candidate);
        }

        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut subdirs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        subdirs.sort();
        queue.extend(subdirs);
    }

    None
}
