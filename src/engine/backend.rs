use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::command::{CommandBuilder, LaunchOptions};
use crate::engine::{LaunchBackend, ProgressSink, TargetEntry, VersionCatalog};
use crate::install::MinecraftInstaller;
use crate::networking::NetworkClient;
use crate::process::ProcessLauncher;

/// Talks to Mojang's servers and runs the game with either the given java or
/// the runtime Mojang publishes for the version.
#[derive(Clone)]
pub struct MinecraftBackend {
    network: NetworkClient,
    launcher: ProcessLauncher,
    java: Option<PathBuf>,
}

impl MinecraftBackend {
    pub fn new(network: NetworkClient, java: Option<PathBuf>) -> Self {
        Self {
            network,
            launcher: ProcessLauncher::new(),
            java,
        }
    }
}

impl VersionCatalog for MinecraftBackend {
    async fn list_available_targets(&self) -> Result<Vec<TargetEntry>, String> {
        let manifest = self.network.fetch_manifest().await?;
        Ok(catalog_entries(manifest.versions.into_iter().map(|v| (v.id, v.kind))))
    }
}

impl LaunchBackend for MinecraftBackend {
    async fn install(
        &self,
        target_id: &str,
        install_dir: &Path,
        progress: ProgressSink<'_>,
        cancel: &Option<Arc<AtomicBool>>,
    ) -> Result<(), String> {
        MinecraftInstaller::new(self.network.clone(), install_dir)
            .with_java_runtime(self.java.is_none())
            .install(target_id, progress, cancel)
            .await
    }

    fn build_launch_command(
        &self,
        target_id: &str,
        install_dir: &Path,
        options: &LaunchOptions,
    ) -> Result<Vec<String>, String> {
        CommandBuilder::new(install_dir, self.java.clone()).build(target_id, options)
    }

    fn run(&self, argv: &[String], install_dir: &Path) -> Result<Option<i32>, String> {
        self.launcher.run(argv, install_dir)
    }
}

/// Releases first, each group keeping the manifest's newest-first order.
fn catalog_entries(versions: impl Iterator<Item = (String, String)>) -> Vec<TargetEntry> {
    let (mut releases, others): (Vec<_>, Vec<_>) = versions
        .map(|(id, kind)| TargetEntry { id, kind })
        .partition(|entry| entry.kind == "release");
    releases.extend(others);
    releases
}
