// ─── Archive I/O ───
// Extracting downloaded modpack archives and exporting instances as zips.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::core::downloader::scan::MAX_ENTRY_BYTES;
use crate::core::error::{LauncherError, LauncherResult};

/// Ceiling on the bytes one archive may write to disk.
pub const MAX_EXTRACTED_BYTES: u64 = 4 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
struct ExtractLimits {
    per_entry: u64,
    total: u64,
}

const DEFAULT_LIMITS: ExtractLimits = ExtractLimits {
    per_entry: MAX_ENTRY_BYTES,
    total: MAX_EXTRACTED_BYTES,
};

/// Extract `archive` into `dest`. An entry whose name would land outside
/// `dest`, or that inflates past its declared size or the size limits,
/// rejects the whole archive. Returns the number of files written.
pub async fn extract_archive(archive: &Path, dest: &Path) -> LauncherResult<usize> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&archive, &dest, DEFAULT_LIMITS))
        .await
        .map_err(|e| LauncherError::Other(format!("extract task failed: {}", e)))?
}

fn extract_blocking(archive_path: &Path, dest: &Path, limits: ExtractLimits) -> LauncherResult<usize> {
    let file = File::open(archive_path).map_err(|e| LauncherError::io(archive_path, e))?;
    let mut archive = ZipArchive::new(file)?;
    std::fs::create_dir_all(dest).map_err(|e| LauncherError::io(dest, e))?;

    let threat = |reason: String| LauncherError::ArchiveThreatDetected {
        archive: archive_path.to_path_buf(),
        reason,
    };

    let mut written = 0;
    let mut total_bytes = 0u64;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            return Err(threat(format!("entry {} escapes the archive root", entry.name())));
        };
        let out_path = dest.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        // The decompressor is only bounded by the compressed size, so cap
        // the output at what the header declares.
        let limit = entry
            .size()
            .min(limits.per_entry)
            .min(limits.total.saturating_sub(total_bytes));
        let mut out = File::create(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
        let copied = io::copy(&mut (&mut entry).take(limit + 1), &mut out)
            .map_err(|e| LauncherError::io(&out_path, e))?;
        if copied > limit {
            drop(out);
            let _ = std::fs::remove_file(&out_path);
            return Err(threat(format!(
                "entry {} expands past {} bytes (declared {})",
                entry.name(),
                limit,
                entry.size()
            )));
        }
        total_bytes += copied;
        written += 1;
    }

    debug!("Extracted {} files from {:?}", written, archive_path);
    Ok(written)
}

/// Zip the contents of `source_dir` into `zip_path` (deflated, `/`
/// separators). Returns the number of files added.
pub async fn export_directory(source_dir: &Path, zip_path: &Path) -> LauncherResult<usize> {
    let source_dir = source_dir.to_path_buf();
    let zip_path = zip_path.to_path_buf();
    tokio::task::spawn_blocking(move || export_blocking(&source_dir, &zip_path))
        .await
        .map_err(|e| LauncherError::Other(format!("export task failed: {}", e)))?
}

fn export_blocking(source_dir: &Path, zip_path: &Path) -> LauncherResult<usize> {
    if let Some(parent) = zip_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
    }
    let out = File::create(zip_path).map_err(|e| LauncherError::io(zip_path, e))?;
    let mut writer = ZipWriter::new(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut files = Vec::new();
    collect_files(source_dir, &mut files).map_err(|e| LauncherError::io(source_dir, e))?;
    files.sort();

    for path in &files {
        let Ok(relative) = path.strip_prefix(source_dir) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        writer.start_file(name, options)?;
        let mut input = File::open(path).map_err(|e| LauncherError::io(path, e))?;
        io::copy(&mut input, &mut writer).map_err(|e| LauncherError::io(zip_path, e))?;
    }

    writer.finish()?;
    Ok(files.len())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(&entry.path(), out)?;
        } else if file_type.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::scan::write_understated_zip;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, bytes) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn extracts_nested_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("pack.zip");
        write_zip(
            &zip_path,
            &[
                ("manifest.json", b"{}"),
                ("config/sub/a.cfg", b"a=1"),
                ("mods/x.jar", b"jar"),
            ],
        );

        let out = tmp.path().join("out");
        let count = extract_archive(&zip_path, &out).await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(std::fs::read(out.join("config/sub/a.cfg")).unwrap(), b"a=1");
    }

    #[tokio::test]
    async fn traversal_entry_rejects_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("evil.zip");
        write_zip(&zip_path, &[("../escape.txt", b"x")]);

        let err = extract_archive(&zip_path, &tmp.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::ArchiveThreatDetected { .. }));
        assert!(!tmp.path().join("escape.txt").exists());
    }

    #[test]
    fn entry_inflating_past_its_header_is_cut_off() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("forged.zip");
        write_understated_zip(&zip_path, "config/blob.bin", &[1u8; 8192], 32);

        let out = tmp.path().join("out");
        let err = extract_blocking(&zip_path, &out, DEFAULT_LIMITS).unwrap_err();
        assert!(matches!(err, LauncherError::ArchiveThreatDetected { .. }));
        assert!(!out.join("config/blob.bin").exists());
    }

    #[test]
    fn total_extracted_bytes_are_capped() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("pack.zip");
        write_zip(&zip_path, &[("a.bin", &[0u8; 600]), ("b.bin", &[0u8; 600])]);

        let limits = ExtractLimits {
            per_entry: 1000,
            total: 1000,
        };
        let err = extract_blocking(&zip_path, &tmp.path().join("out"), limits).unwrap_err();
        match err {
            LauncherError::ArchiveThreatDetected { reason, .. } => assert!(reason.contains("b.bin")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn export_then_extract_keeps_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("instance");
        std::fs::create_dir_all(src.join("mods")).unwrap();
        std::fs::write(src.join("manifest.json"), b"{\"id\":\"p\"}").unwrap();
        std::fs::write(src.join("mods").join("a.jar"), b"a").unwrap();

        let zip_path = tmp.path().join("export").join("p.zip");
        assert_eq!(export_directory(&src, &zip_path).await.unwrap(), 2);

        let back = tmp.path().join("back");
        extract_archive(&zip_path, &back).await.unwrap();
        assert_eq!(std::fs::read(back.join("mods/a.jar")).unwrap(), b"a");
        assert!(back.join("manifest.json").is_file());
    }
}
