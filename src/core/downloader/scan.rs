// ─── Archive Threat Scan ───
// Best-effort heuristic filter over modpack archives. It catches the obvious
// cases (stray executables, zip bombs, scripts hidden in configs) and is not
// an antivirus.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path};

use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};

/// Largest uncompressed size allowed for a single entry.
pub const MAX_ENTRY_BYTES: u64 = 100 * 1024 * 1024;
/// Largest allowed uncompressed/compressed ratio for a single entry.
pub const MAX_COMPRESSION_RATIO: f64 = 100.0;

const EXECUTABLE_EXTENSIONS: &[&str] = &["exe", "dll", "jar", "bat", "cmd", "sh", "js", "vbs", "ps1", "msi"];
const TEXT_EXTENSIONS: &[&str] = &["json", "txt", "cfg", "properties", "xml"];
const TEXT_SCAN_LIMIT: u64 = 1024 * 1024;

/// Matched case-insensitively against text entries.
const SUSPICIOUS_PATTERNS: &[&str] = &[
    "runtime.getruntime",
    "processbuilder",
    "cmd.exe",
    "powershell",
    "java.exe",
    "javaw.exe",
    "sh -c",
    "/bin/sh",
    "/bin/bash",
    "curl ",
    "wget ",
    "invoke-webrequest",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreatVerdict {
    Clean,
    Rejected(String),
}

impl ThreatVerdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, ThreatVerdict::Clean)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ThreatVerdict::Clean => None,
            ThreatVerdict::Rejected(reason) => Some(reason),
        }
    }

    /// `ArchiveThreatDetected` for a rejected verdict.
    pub fn into_result(self, archive: &Path) -> LauncherResult<()> {
        match self {
            ThreatVerdict::Clean => Ok(()),
            ThreatVerdict::Rejected(reason) => Err(LauncherError::ArchiveThreatDetected {
                archive: archive.to_path_buf(),
                reason,
            }),
        }
    }
}

/// Scan a zip archive. Unreadable archives are rejected, not reported as
/// errors: a file we cannot inspect is not a file we install.
///
/// Sizes are measured by decompressing each entry, not read from headers.
pub fn scan_archive_for_threats(archive: &Path) -> ThreatVerdict {
    scan_with_limit(archive, MAX_ENTRY_BYTES)
}

fn scan_with_limit(archive: &Path, max_entry_bytes: u64) -> ThreatVerdict {
    let file = match File::open(archive) {
        Ok(f) => f,
        Err(e) => return ThreatVerdict::Rejected(format!("cannot open archive: {}", e)),
    };
    let mut zip = match zip::ZipArchive::new(file) {
        Ok(z) => z,
        Err(e) => return ThreatVerdict::Rejected(format!("not a valid zip archive: {}", e)),
    };

    for i in 0..zip.len() {
        let mut entry = match zip.by_index(i) {
            Ok(e) => e,
            Err(e) => return ThreatVerdict::Rejected(format!("unreadable entry #{}: {}", i, e)),
        };
        let name = entry.name().to_string();
        if entry.is_dir() {
            continue;
        }

        let Some(path) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            return ThreatVerdict::Rejected(format!("unsafe path: {}", name));
        };

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if EXECUTABLE_EXTENSIONS.contains(&extension.as_str()) && !is_mod_jar(&path, &extension) {
            return ThreatVerdict::Rejected(format!("suspicious file: {}", name));
        }

        let declared = entry.size();
        let compressed = entry.compressed_size();
        let is_text = TEXT_EXTENSIONS.contains(&extension.as_str());
        let keep = if is_text { TEXT_SCAN_LIMIT } else { 0 };
        let (size, content) = if declared > max_entry_bytes {
            (declared, Vec::new())
        } else {
            match measure_entry(&mut entry, max_entry_bytes, keep) {
                Ok(measured) => measured,
                Err(e) => return ThreatVerdict::Rejected(format!("unreadable entry {}: {}", name, e)),
            }
        };

        if size > max_entry_bytes {
            return ThreatVerdict::Rejected(format!(
                "very large file: {} ({:.2} MB)",
                name,
                size as f64 / 1024.0 / 1024.0
            ));
        }
        if size != declared {
            return ThreatVerdict::Rejected(format!(
                "{} expands to {} bytes but declares {}",
                name, size, declared
            ));
        }

        if compressed > 0 {
            let ratio = size as f64 / compressed as f64;
            if ratio > MAX_COMPRESSION_RATIO {
                return ThreatVerdict::Rejected(format!(
                    "suspicious compression ratio for {}: {:.2}",
                    name, ratio
                ));
            }
        }

        if is_text {
            if let Some(reason) = inspect_text(&name, &content) {
                return ThreatVerdict::Rejected(reason);
            }
        }
    }

    debug!("Archive {:?} passed threat scan", archive);
    ThreatVerdict::Clean
}

/// Runs the scan on the blocking pool.
pub async fn scan_archive(archive: &Path) -> LauncherResult<ThreatVerdict> {
    let path = archive.to_path_buf();
    let verdict = tokio::task::spawn_blocking(move || scan_archive_for_threats(&path))
        .await
        .map_err(|e| LauncherError::Other(format!("archive scan task failed: {}", e)))?;

    if let ThreatVerdict::Rejected(reason) = &verdict {
        warn!("Archive {:?} rejected: {}", archive, reason);
    }
    Ok(verdict)
}

/// Decompress at most `limit + 1` bytes of `reader`, keeping the first
/// `keep`. Returns the byte count seen and the kept prefix.
fn measure_entry<R: Read>(reader: R, limit: u64, keep: u64) -> io::Result<(u64, Vec<u8>)> {
    let mut limited = reader.take(limit + 1);
    let mut kept = Vec::new();
    (&mut limited).take(keep).read_to_end(&mut kept)?;
    let rest = io::copy(&mut limited, &mut io::sink())?;
    Ok((kept.len() as u64 + rest, kept))
}

/// Write a one-entry stored zip whose headers claim `declared` bytes for
/// `data`.
#[cfg(test)]
pub(crate) fn write_understated_zip(path: &Path, name: &str, data: &[u8], declared: u32) {
    use std::io::Write;

    let mut zip = zip::ZipWriter::new(io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    zip.start_file(name, options).unwrap();
    zip.write_all(data).unwrap();
    let mut bytes = zip.finish().unwrap().into_inner();

    // Uncompressed size sits at +22 in the local header, +24 in the central one.
    for (signature, offset) in [(b"PK\x03\x04", 22), (b"PK\x01\x02", 24)] {
        let at = bytes
            .windows(4)
            .position(|w| w == signature)
            .unwrap();
        bytes[at + offset..at + offset + 4].copy_from_slice(&declared.to_le_bytes());
    }
    std::fs::write(path, bytes).unwrap();
}

/// Jars are expected only inside a `mods` directory.
fn is_mod_jar(path: &Path, extension: &str) -> bool {
    if extension != "jar" {
        return false;
    }
    path.parent()
        .and_then(|p| p.components().last())
        .map(|c| matches!(c, Component::Normal(n) if n.eq_ignore_ascii_case("mods")))
        .unwrap_or(false)
}

fn inspect_text(name: &str, content: &[u8]) -> Option<String> {
    let head = &content[..content.len().min(1024)];
    if head.contains(&0) {
        return Some(format!("binary data in text file: {}", name));
    }

    let text = String::from_utf8_lossy(content).to_ascii_lowercase();
    SUSPICIOUS_PATTERNS
        .iter()
        .find(|p| text.contains(**p))
        .map(|p| format!("suspicious pattern '{}' in {}", p.trim(), name))
}
