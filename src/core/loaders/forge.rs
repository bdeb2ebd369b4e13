use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::Read;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::info;

use super::context::InstallContext;
use super::installer::{LoaderInstallResult, LoaderInstaller};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::maven::MavenArtifact;
use crate::core::progress::ProgressReporter;
use crate::core::version::VersionJson;

/// Installs Forge from its installer jar: the embedded `version.json` is
/// saved under `versions/` and every library it and `install_profile.json`
/// name is downloaded. The installer's processors are not run.
pub struct ForgeInstaller;

#[derive(Debug, Deserialize)]
struct Promotions {
    #[serde(default)]
    promos: HashMap<String, String>,
}

/// Raw JSON documents read out of the installer jar.
#[derive(Debug)]
struct InstallerContents {
    version_json: String,
    install_profile: Option<String>,
}

impl ForgeInstaller {
    /// Accepts `47.2.0` as well as the full `1.20.1-47.2.0`.
    fn normalize_version(minecraft_version: &str, loader_version: &str) -> String {
        let v = loader_version.trim();
        v.strip_prefix(&format!("{}-", minecraft_version))
            .unwrap_or(v)
            .to_string()
    }

    /// The requested version, else the promoted recommended build, else the
    /// promoted latest one.
    async fn resolve_loader_version(ctx: &InstallContext<'_>) -> LauncherResult<String> {
        if let Some(v) = ctx.loader_version.filter(|v| !v.trim().is_empty()) {
            return Ok(Self::normalize_version(ctx.minecraft_version, v));
        }

        let url = &ctx.endpoints.forge_promotions;
        let resp = ctx.http_client.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(LauncherError::LoaderApi(format!(
                "Forge promotions returned {} for {}",
                resp.status(),
                url
            )));
        }
        let promotions: Promotions = resp.json().await?;

        let mc = ctx.minecraft_version;
        let chosen = promotions
            .promos
            .get(&format!("{}-recommended", mc))
            .or_else(|| promotions.promos.get(&format!("{}-latest", mc)))
            .cloned()
            .ok_or_else(|| {
                LauncherError::Loader(format!("No Forge build promoted for Minecraft {}", mc))
            })?;

        info!("Using promoted Forge {} for Minecraft {}", chosen, mc);
        Ok(chosen)
    }
}

#[async_trait::async_trait]
impl LoaderInstaller for ForgeInstaller {
    async fn install(&self, ctx: &InstallContext<'_>) -> LauncherResult<LoaderInstallResult> {
        let loader_version = Self::resolve_loader_version(ctx).await?;
        let forge_id = format!("{}-{}", ctx.minecraft_version, loader_version);
        info!("Installing Forge {}", forge_id);
        ctx.progress
            .report(0.0, &format!("Downloading Forge {} installer", forge_id));

        let installer =
            MavenArtifact::parse(&format!("net.minecraftforge:forge:{}:installer", forge_id))?;
        let installer_path = ctx.libs_dir.join(installer.local_path());
        ctx.downloader
            .download_file(
                &installer.url(&ctx.endpoints.forge_maven),
                &installer_path,
                None,
                &ProgressReporter::silent(),
            )
            .await?;

        let contents = read_installer(installer_path).await?;
        let version_json: VersionJson = serde_json::from_str(&contents.version_json)?;
        // The profile lists the processor tool chain with the same library shape.
        let install_profile: Option<VersionJson> = contents
            .install_profile
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        let version_id = version_json
            .id
            .clone()
            .unwrap_or_else(|| format!("{}-forge-{}", ctx.minecraft_version, loader_version));
        VersionJson::save_to(&contents.version_json, ctx.versions_dir, &version_id).await?;

        let mut libraries: BTreeSet<String> = version_json.library_names().into_iter().collect();
        let mut downloads = version_json.library_downloads(ctx.libs_dir);
        if let Some(profile) = &install_profile {
            let mut seen: HashSet<PathBuf> = downloads.iter().map(|d| d.dest.clone()).collect();
            for entry in profile.library_downloads(ctx.libs_dir) {
                if seen.insert(entry.dest.clone()) {
                    downloads.push(entry);
                }
            }
            libraries.extend(profile.library_names());
        }

        ctx.downloader
            .download_all(downloads, ctx.progress, ctx.cancel)
            .await?;

        info!(
            "Forge {} installed as {} (installer processors not run)",
            forge_id, version_id
        );
        Ok(LoaderInstallResult {
            version_id,
            main_class: version_json.main_class,
            loader_version: Some(loader_version),
            libraries: libraries.into_iter().collect(),
        })
    }
}

async fn read_installer(path: PathBuf) -> LauncherResult<InstallerContents> {
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path).map_err(|e| LauncherError::io(&path, e))?;
        let mut archive = zip::ZipArchive::new(file)?;

        let version_json = read_entry(&mut archive, "version.json")?.ok_or_else(|| {
            LauncherError::Loader(format!("Missing version.json in {}", path.display()))
        })?;
        let install_profile = read_entry(&mut archive, "install_profile.json")?;

        Ok(InstallerContents {
            version_json,
            install_profile,
        })
    })
    .await
    .map_err(|e| LauncherError::Other(format!("Forge installer task failed: {}", e)))?
}

fn read_entry(
    archive: &mut zip::ZipArchive<std::fs::File>,
    name: &str,
) -> LauncherResult<Option<String>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(Some(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::Downloader;
    use crate::core::loaders::MetaEndpoints;
    use std::io::Write;
    use tokio_util::sync::CancellationToken;
    use zip::write::SimpleFileOptions;

    fn installer_jar(version_json: &serde_json::Value, profile: &serde_json::Value) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer.start_file("version.json", options).unwrap();
        writer
            .write_all(version_json.to_string().as_bytes())
            .unwrap();
        writer.start_file("install_profile.json", options).unwrap();
        writer.write_all(profile.to_string().as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn loader_version_accepts_full_forge_id() {
        assert_eq!(ForgeInstaller::normalize_version("1.20.1", "1.20.1-47.2.0"), "47.2.0");
        assert_eq!(ForgeInstaller::normalize_version("1.20.1", " 47.2.0 "), "47.2.0");
    }

    #[tokio::test]
    async fn installs_from_promoted_installer() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();

        let version_json = serde_json::json!({
            "id": "1.20.1-forge-47.2.0",
            "inheritsFrom": "1.20.1",
            "mainClass": "cpw.mods.bootstraplauncher.BootstrapLauncher",
            "libraries": [
                {
                    "name": "cpw.mods:securejarhandler:2.1.10",
                    "downloads": { "artifact": {
                        "path": "cpw/mods/securejarhandler/2.1.10/securejarhandler-2.1.10.jar",
                        "url": format!("{}/maven/forge/cpw/mods/securejarhandler/2.1.10/securejarhandler-2.1.10.jar", base)
                    }}
                },
                {
                    "name": "net.minecraftforge:forge:1.20.1-47.2.0:client",
                    "downloads": { "artifact": {
                        "path": "net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-client.jar",
                        "url": ""
                    }}
                }
            ]
        });
        let profile = serde_json::json!({
            "version": "1.20.1-forge-47.2.0",
            "libraries": [{
                "name": "cpw.mods:securejarhandler:2.1.10",
                "downloads": { "artifact": {
                    "path": "cpw/mods/securejarhandler/2.1.10/securejarhandler-2.1.10.jar",
                    "url": format!("{}/maven/forge/cpw/mods/securejarhandler/2.1.10/securejarhandler-2.1.10.jar", base)
                }}
            }]
        });

        let _promos = server
            .mock("GET", "/forge/promotions_slim.json")
            .with_body(r#"{"promos": {"1.20.1-latest": "47.2.20", "1.20.1-recommended": "47.2.0"}}"#)
            .create_async()
            .await;
        let _installer = server
            .mock(
                "GET",
                "/maven/forge/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar",
            )
            .with_body(installer_jar(&version_json, &profile))
            .create_async()
            .await;
        let lib = server
            .mock(
                "GET",
                "/maven/forge/cpw/mods/securejarhandler/2.1.10/securejarhandler-2.1.10.jar",
            )
            .with_body("sjh")
            .expect(1)
            .create_async()
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let versions = tmp.path().join("versions");
        let libs = tmp.path().join("libraries");
        let http = reqwest::Client::new();
        let downloader = Downloader::new(http.clone());
        let endpoints = MetaEndpoints::with_base(&base);
        let progress = ProgressReporter::silent();
        let cancel = CancellationToken::new();
        let ctx = InstallContext {
            minecraft_version: "1.20.1",
            loader_version: None,
            versions_dir: &versions,
            libs_dir: &libs,
            downloader: &downloader,
            http_client: &http,
            endpoints: &endpoints,
            progress: &progress,
            cancel: &cancel,
        };

        let result = ForgeInstaller.install(&ctx).await.unwrap();
        assert_eq!(result.loader_version.as_deref(), Some("47.2.0"));
        assert_eq!(result.version_id, "1.20.1-forge-47.2.0");
        assert_eq!(result.main_class, "cpw.mods.bootstraplauncher.BootstrapLauncher");
        assert!(versions
            .join("1.20.1-forge-47.2.0/1.20.1-forge-47.2.0.json")
            .is_file());
        assert!(libs
            .join("cpw/mods/securejarhandler/2.1.10/securejarhandler-2.1.10.jar")
            .is_file());
        lib.assert_async().await;
    }
}
