use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use futures_util::StreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::fs;

use crate::engine::ProgressSink;
use crate::engine::models::{DownloadInfo, VersionInfo};
use crate::engine::state::InstallProgress;
use crate::env;
use crate::networking::{NetworkClient, is_complete};
use crate::util::{CANCELLED, cancel_requested};

const RUNTIME_INDEX_URL: &str = "https://launchermeta.mojang.com/v1/products/java-runtime/2ec0cc96c44e5a76b9c8b7c39df7210883d12871/all.json";
const RUNTIME_CONCURRENCY: usize = 8;
/// Written once every file of a component is in place.
const COMPLETE_MARKER: &str = ".installed";

/// platform -> component -> releases, newest first.
type RuntimeIndex = HashMap<String, HashMap<String, Vec<RuntimeRelease>>>;

#[derive(Debug, Deserialize)]
struct RuntimeRelease {
    manifest: DownloadInfo,
    #[serde(default)]
    version: Option<RuntimeVersion>,
}

#[derive(Debug, Deserialize)]
struct RuntimeVersion {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RuntimeManifest {
    /// Sorted so directories come before their contents.
    files: BTreeMap<String, RuntimeFile>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RuntimeFile {
    Directory,
    File {
        #[serde(default)]
        executable: bool,
        downloads: RuntimeDownloads,
    },
    Link {
        target: String,
    },
}

#[derive(Debug, Deserialize)]
struct RuntimeDownloads {
    raw: DownloadInfo,
}

/// Installs the Java runtime a Minecraft version asks for under `<root>/runtime`.
pub struct JavaRuntimeInstaller {
    network: NetworkClient,
    root: PathBuf,
    index_url: String,
    platform: Option<&'static str>,
}

impl JavaRuntimeInstaller {
    pub fn new(network: NetworkClient, root: impl Into<PathBuf>) -> Self {
        Self {
            network,
            root: root.into(),
            index_url: RUNTIME_INDEX_URL.into(),
            platform: runtime_platform(),
        }
    }

    #[cfg(test)]
    fn with_source(mut self, index_url: String, platform: Option<&'static str>) -> Self {
        self.index_url = index_url;
        self.platform = platform;
        self
    }

    /// Returns the runtime's java executable, or `None` when Mojang publishes
    /// no runtime for this platform.
    pub async fn ensure(
        &self,
        component: &str,
        progress: ProgressSink<'_>,
        cancel: &Option<Arc<AtomicBool>>,
    ) -> Result<Option<PathBuf>, String> {
        let dir = env::runtime_dir(&self.root, component);
        let java = java_executable(&self.root, component);
        if exists(&dir.join(COMPLETE_MARKER)).await && exists(&java).await {
            debug!("runtime: {component} already installed");
            return Ok(Some(java));
        }
        let Some(platform) = self.platform else {
            warn!("runtime: no Java runtime is published for this platform; using the system java");
            return Ok(None);
        };

        check_cancel(cancel)?;
        progress(InstallProgress::Status("Download Java Runtime".into()));
        progress(InstallProgress::Max(0));

        let index: RuntimeIndex = self.network.fetch_json(&self.index_url).await?;
        let release = index
            .get(platform)
            .and_then(|components| components.get(component))
            .and_then(|releases| releases.first())
            .ok_or_else(|| format!("Java runtime {component} is not available for {platform}"))?;
        info!(
            "runtime: installing {component} {} for {platform}",
            release
                .version
                .as_ref()
                .map(|v| v.name.as_str())
                .unwrap_or("(unknown version)")
        );

        check_cancel(cancel)?;
        let manifest: RuntimeManifest = self.network.fetch_json(&release.manifest.url).await?;
        self.install_files(&dir, manifest, progress, cancel).await?;

        if !exists(&java).await {
            return Err(format!(
                "Java runtime {component} has no executable at {}",
                java.display()
            ));
        }
        fs::write(dir.join(COMPLETE_MARKER), component)
            .await
            .map_err(|e| format!("unable to mark runtime as installed: {e}"))?;
        info!("runtime: {component} ready at {}", java.display());
        Ok(Some(java))
    }

    async fn install_files(
        &self,
        dir: &Path,
        manifest: RuntimeManifest,
        progress: ProgressSink<'_>,
        cancel: &Option<Arc<AtomicBool>>,
    ) -> Result<(), String> {
        let mut files = Vec::new();
        let mut links = Vec::new();
        for (name, entry) in manifest.files {
            let path = safe_join(dir, &name)
                .ok_or_else(|| format!("runtime manifest has an unsafe path: {name}"))?;
            match entry {
                RuntimeFile::Directory => fs::create_dir_all(&path)
                    .await
                    .map_err(|e| format!("unable to create {}: {e}", path.display()))?,
                RuntimeFile::File {
                    executable,
                    downloads,
                } => files.push((path, executable, downloads.raw)),
                RuntimeFile::Link { target } => links.push((path, target)),
            }
        }

        progress(InstallProgress::Max(files.len() as u64));
        progress(InstallProgress::Progress(0));
        let network = &self.network;
        let mut downloads = futures_util::stream::iter(files.into_iter().map(
            |(path, executable, raw)| async move {
                let check = raw.check();
                if !is_complete(&path, &check).await {
                    network.download_to_path(&raw.url, &path, &check, cancel).await?;
                }
                if executable {
                    set_executable(&path).await?;
                }
                Ok::<(), String>(())
            },
        ))
        .buffer_unordered(RUNTIME_CONCURRENCY);

        let mut done = 0u64;
        while let Some(result) = downloads.next().await {
            result?;
            check_cancel(cancel)?;
            done += 1;
            progress(InstallProgress::Progress(done));
        }

        for (path, target) in links {
            create_link(&path, &target).await?;
        }
        Ok(())
    }
}

/// The java executable inside an installed runtime component.
pub fn java_executable(root: &Path, component: &str) -> PathBuf {
    let dir = env::runtime_dir(root, component);
    if cfg!(target_os = "windows") {
        dir.join("bin").join("java.exe")
    } else if cfg!(target_os = "macos") {
        dir.join("jre.bundle")
            .join("Contents")
            .join("Home")
            .join("bin")
            .join("java")
    } else {
        dir.join("bin").join("java")
    }
}

/// The provisioned runtime for `info`, or `java` from `PATH` when there is none.
pub fn java_for(root: &Path, info: &VersionInfo) -> PathBuf {
    info.java_version
        .as_ref()
        .map(|java| java_executable(root, &java.component))
        .filter(|path| path.is_file())
        .unwrap_or_else(|| PathBuf::from("java"))
}

/// Mojang's name for the host in the runtime index.
fn runtime_platform() -> Option<&'static str> {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("linux", "x86_64") => Some("linux"),
        ("linux", "x86") => Some("linux-i386"),
        ("macos", "x86_64") => Some("mac-os"),
        ("macos", "aarch64") => Some("mac-os-arm64"),
        ("windows", "x86_64") => Some("windows-x64"),
        ("windows", "x86") => Some("windows-x86"),
        ("windows", "aarch64") => Some("windows-arm64"),
        _ => None,
    }
}

fn safe_join(dir: &Path, name: &str) -> Option<PathBuf> {
    let relative = Path::new(name);
    let normal = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    (normal && !name.is_empty()).then(|| dir.join(relative))
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

fn check_cancel(cancel: &Option<Arc<AtomicBool>>) -> Result<(), String> {
    if cancel_requested(cancel) {
        warn!("runtime: cancellation requested");
        return Err(CANCELLED.into());
    }
    Ok(())
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> Result<(), String> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| format!("unable to mark {} executable: {e}", path.display()))
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> Result<(), String> {
    Ok(())
}

#[cfg(unix)]
async fn create_link(path: &Path, target: &str) -> Result<(), String> {
    if fs::symlink_metadata(path).await.is_ok() {
        fs::remove_file(path)
            .await
            .map_err(|e| format!("unable to replace {}: {e}", path.display()))?;
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("unable to create {}: {e}", parent.display()))?;
    }
    fs::symlink(target, path)
        .await
        .map_err(|e| format!("unable to link {}: {e}", path.display()))
}

#[cfg(not(unix))]
async fn create_link(path: &Path, _target: &str) -> Result<(), String> {
    debug!("runtime: skipping link {}", path.display());
    Ok(())
}
