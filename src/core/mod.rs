// ─── PackLauncher Core ───
// Backend for a Minecraft modpack launcher.
//
// Architecture:
//   core/
//     auth/       — Microsoft → Xbox Live → XSTS → Minecraft sign-in
//     repository/ — Modpack catalogs with disk cache fallback
//     modpack/    — Descriptor model + manifest.json I/O
//     downloader/ — Concurrent verified downloads + archive threat scan
//     install/    — Staged install, update with rollback, per-pack lock
//     instance/   — Installed instances on disk
//     loaders/    — Vanilla, Fabric and Forge provisioning
//     version/    — Mojang manifest + version JSON + OS rules
//     maven/      — Artifact coordinates
//     state/      — Data directory layout + shared clients

pub mod auth;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod install;
pub mod instance;
pub mod loaders;
pub mod maven;
pub mod modpack;
pub mod progress;
pub mod repository;
pub mod state;
pub mod task;
pub mod version;
