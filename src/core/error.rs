use std::path::PathBuf;
use thiserror::Error;

use crate::core::modpack::ModpackDescriptor;

/// Central error type for the launcher backend.
/// Storage, network and packaging modules return `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── Integrity ───────────────────────────────────────
    #[error("Hash mismatch for {path:?}: expected {expected}, got {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Unsupported hash algorithm: {0}")]
    UnsupportedHash(String),

    #[error("Archive {archive:?} rejected: {reason}")]
    ArchiveThreatDetected { archive: PathBuf, reason: String },

    // ── Repository ──────────────────────────────────────
    #[error("Repository {repository} unreachable: {reason}")]
    RepositoryUnreachable { repository: String, reason: String },

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Repository already exists: {0}")]
    RepositoryAlreadyExists(String),

    // ── Modpack / instance ──────────────────────────────
    #[error("Modpack not found: {0}")]
    ModpackNotFound(String),

    #[error("Invalid modpack manifest: {0}")]
    InvalidManifest(String),

    #[error("Instance already exists: {0}")]
    InstanceAlreadyExists(String),

    // ── Maven ───────────────────────────────────────────
    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Loader ──────────────────────────────────────────
    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Loader API unreachable: {0}")]
    LoaderApi(String),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Operation cancelled")]
    Cancelled,

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl LauncherError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }
}

// ── Authentication ──────────────────────────────────────

/// Every variant names the step of the sign-in chain that failed, since
/// each one has a different remedy for the user.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Microsoft identity provider error: {0}")]
    AuthProviderError(String),

    #[error("Sign-in was declined: {0}")]
    AuthorizationDeclined(String),

    #[error("Device code expired before sign-in was completed")]
    DeviceCodeExpired,

    #[error("Timed out waiting for the device code sign-in")]
    Timeout,

    #[error("Sign-in cancelled")]
    Cancelled,

    #[error("Redirect state does not match this sign-in attempt")]
    StateMismatch,

    #[error("Xbox Live authentication failed (HTTP {status}): {message}")]
    XboxAuthError { status: u16, message: String },

    #[error("XSTS authorization failed (HTTP {status}, XErr {xerr:?})")]
    XstsAuthError { status: u16, xerr: Option<u64> },

    #[error("Minecraft authentication failed (HTTP {status}): {message}")]
    MinecraftAuthError { status: u16, message: String },

    #[error("Minecraft profile unavailable (HTTP {status})")]
    ProfileUnavailable { status: u16 },

    #[error("This account does not own Minecraft")]
    EntitlementCheckFailed,

    #[error("Refresh token rejected; interactive sign-in required")]
    RefreshRejected,

    #[error("No stored credentials")]
    NotLoggedIn,

    #[error("Credential storage error: {0}")]
    Storage(#[from] LauncherError),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// User-facing remediation text for the well-known XSTS error codes.
    pub fn remedy(&self) -> Option<&'static str> {
        match self {
            AuthError::XstsAuthError { xerr: Some(code), .. } => explain_xerr(*code),
            AuthError::EntitlementCheckFailed => {
                Some("Buy Minecraft: Java Edition with this Microsoft account, or sign in with the account that owns it.")
            }
            AuthError::RefreshRejected => Some("Your session expired. Please sign in again."),
            _ => None,
        }
    }
}

pub fn explain_xerr(code: u64) -> Option<&'static str> {
    match code {
        2148916233 => Some("This Microsoft account has no Xbox account. Create one at xbox.com and try again."),
        2148916235 => Some("Xbox Live is not available in your country or region."),
        2148916236 | 2148916237 => {
            Some("This account needs adult verification on xbox.com before it can sign in.")
        }
        2148916238 => Some("This is a child account. An adult must add it to a Microsoft family first."),
        2148916227 => Some("This account is banned from Xbox services."),
        2148916229 => Some("Parental controls currently block online play for this account."),
        2148916234 => Some("This account must accept the Xbox terms of service first."),
        _ => None,
    }
}

// ── Install / update ────────────────────────────────────

/// Named stages of the install pipeline; carried by failures so the caller
/// knows where an install stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStep {
    DownloadArchive,
    ScanArchive,
    ExtractArchive,
    ReadManifest,
    InstallBaseGameVersion,
    InstallModLoader,
    MaterializeFiles,
    WriteManifest,
    Commit,
    Backup,
}

impl std::fmt::Display for InstallStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InstallStep::DownloadArchive => "download archive",
            InstallStep::ScanArchive => "scan archive",
            InstallStep::ExtractArchive => "extract archive",
            InstallStep::ReadManifest => "read manifest",
            InstallStep::InstallBaseGameVersion => "install base game version",
            InstallStep::InstallModLoader => "install mod loader",
            InstallStep::MaterializeFiles => "materialize files",
            InstallStep::WriteManifest => "write manifest",
            InstallStep::Commit => "commit instance",
            InstallStep::Backup => "back up instance",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Install step '{step}' failed: {source}")]
    StepFailed {
        step: InstallStep,
        #[source]
        source: LauncherError,
    },

    #[error("Update of '{}' failed and was rolled back: {cause}", original.name)]
    UpdateRolledBack {
        original: Box<ModpackDescriptor>,
        cause: Box<InstallError>,
    },

    #[error("Rollback failed, backup kept at {backup:?}: {source}")]
    RollbackFailed {
        backup: PathBuf,
        #[source]
        source: LauncherError,
    },

    #[error("Another operation is already running for modpack {0}")]
    Busy(String),

    #[error("Modpack {0} is not installed")]
    NotInstalled(String),

    #[error("Install cancelled")]
    Cancelled,
}

impl InstallError {
    pub fn at(step: InstallStep) -> impl FnOnce(LauncherError) -> InstallError {
        move |source| match source {
            LauncherError::Cancelled => InstallError::Cancelled,
            source => InstallError::StepFailed { step, source },
        }
    }

    /// The step that failed, if the failure happened inside the pipeline.
    pub fn failed_step(&self) -> Option<InstallStep> {
        match self {
            InstallError::StepFailed { step, .. } => Some(*step),
            InstallError::UpdateRolledBack { cause, .. } => cause.failed_step(),
            _ => None,
        }
    }
}

pub type InstallResult<T> = Result<T, InstallError>;
