mod artifact;

pub use artifact::MavenArtifact;

/// Maven repositories the loaders pull from.
pub const FORGE_MAVEN: &str = "https://maven.minecraftforge.net";
pub const FABRIC_MAVEN: &str = "https://maven.fabricmc.net";
