pub mod client;
pub mod hash;
pub mod scan;

pub use client::{DownloadEntry, DownloadOutcome, Downloader, DEFAULT_CONCURRENCY};
pub use hash::{file_matches, hash_file, ExpectedHash, HashAlgorithm};
pub use scan::{scan_archive, scan_archive_for_threats, ThreatVerdict};
