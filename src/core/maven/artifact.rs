use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::downloader::{DownloadEntry, ExpectedHash};
use crate::core::error::{LauncherError, LauncherResult};

/// A parsed Maven coordinate, used for loader libraries that are named by
/// coordinate instead of by download url.
///
/// Accepted forms:
///   `group:artifact:version`
///   `group:artifact:version:classifier`
/// each optionally followed by `@extension`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MavenArtifact {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub classifier: Option<String>,
    /// File extension. Defaults to `"jar"`.
    pub extension: String,
}

impl MavenArtifact {
    pub fn parse(coord: &str) -> LauncherResult<Self> {
        let invalid = || LauncherError::InvalidMavenCoordinate(coord.to_string());

        let (coord_part, extension) = match coord.trim().rsplit_once('@') {
            Some((c, ext)) if !ext.is_empty() => (c, ext),
            Some(_) => return Err(invalid()),
            None => (coord.trim(), "jar"),
        };

        let parts: Vec<&str> = coord_part.split(':').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid());
        }

        let classifier = match parts.len() {
            3 => None,
            4 => Some(parts[3].to_string()),
            _ => return Err(invalid()),
        };

        Ok(Self {
            group_id: parts[0].to_string(),
            artifact_id: parts[1].to_string(),
            version: parts[2].to_string(),
            classifier,
            extension: extension.to_string(),
        })
    }

    /// `artifactId-version[-classifier].extension`
    pub fn filename(&self) -> String {
        match &self.classifier {
            Some(c) => format!("{}-{}-{}.{}", self.artifact_id, self.version, c, self.extension),
            None => format!("{}-{}.{}", self.artifact_id, self.version, self.extension),
        }
    }

    /// `<repo>/<group path>/<artifact>/<version>/<filename>`
    pub fn url(&self, repo_base: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            repo_base.trim_end_matches('/'),
            self.group_id.replace('.', "/"),
            self.artifact_id,
            self.version,
            self.filename()
        )
    }

    /// Path relative to the shared libraries directory, in Maven layout.
    pub fn local_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for segment in self.group_id.split('.') {
            path.push(segment);
        }
        path.join(&self.artifact_id)
            .join(&self.version)
            .join(self.filename())
    }

    /// Download entry for this artifact from `repo_base` into `libs_dir`.
    pub fn download_entry(
        &self,
        repo_base: &str,
        libs_dir: &Path,
        sha1: Option<&str>,
    ) -> DownloadEntry {
        DownloadEntry::new(
            self.to_string(),
            self.url(repo_base),
            libs_dir.join(self.local_path()),
        )
        .with_hash(sha1.map(ExpectedHash::sha1))
    }
}

impl FromStr for MavenArtifact {
    type Err = LauncherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MavenArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)?;
        if let Some(c) = &self.classifier {
            write!(f, ":{}", c)?;
        }
        if self.extension != "jar" {
            write!(f, "@{}", self.extension)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_coordinate() {
        let a: MavenArtifact = "net.fabricmc:fabric-loader:0.15.11".parse().unwrap();
        assert_eq!(a.group_id, "net.fabricmc");
        assert_eq!(a.artifact_id, "fabric-loader");
        assert_eq!(a.version, "0.15.11");
        assert_eq!(a.classifier, None);
        assert_eq!(a.extension, "jar");
        assert_eq!(a.to_string(), "net.fabricmc:fabric-loader:0.15.11");
    }

    #[test]
    fn forge_installer_coordinate() {
        let a = MavenArtifact::parse("net.minecraftforge:forge:1.20.1-47.2.0:installer").unwrap();
        assert_eq!(
            a.url("https://maven.minecraftforge.net/"),
            "https://maven.minecraftforge.net/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar"
        );
        assert_eq!(
            a.local_path(),
            PathBuf::from("net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar")
        );
    }

    #[test]
    fn extension_override_round_trips_through_display() {
        let a = MavenArtifact::parse("de.oceanlabs.mcp:mcp_config:1.20.1@zip").unwrap();
        assert_eq!(a.filename(), "mcp_config-1.20.1.zip");
        assert_eq!(a.to_string(), "de.oceanlabs.mcp:mcp_config:1.20.1@zip");
    }

    #[test]
    fn malformed_coordinates_are_rejected() {
        for bad in ["just-a-name", "a:b", "a::1.0", "a:b:c:d:e", "a:b:1.0@"] {
            assert!(
                matches!(
                    MavenArtifact::parse(bad),
                    Err(LauncherError::InvalidMavenCoordinate(_))
                ),
                "{bad} should be rejected"
            );
        }
    }
}
