use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::fs;
use zip::read::ZipArchive;

use crate::engine::ProgressSink;
use crate::engine::models::{AssetIndex, Platform, VersionInfo, VersionManifest};
use crate::engine::state::InstallProgress;
use crate::env;
use crate::networking::{FileCheck, NetworkClient, is_complete};
use crate::runtime::JavaRuntimeInstaller;
use crate::util::{CANCELLED, cancel_requested};

const RESOURCES_URL: &str = "https://resources.download.minecraft.net";
const ASSET_CONCURRENCY: usize = 16;
/// Guards against cyclic `inheritsFrom` chains.
const MAX_INHERITANCE_DEPTH: usize = 8;

pub struct MinecraftInstaller {
    network: NetworkClient,
    root: PathBuf,
    platform: Platform,
    resources_url: String,
    java_runtime: bool,
}

impl MinecraftInstaller {
    pub fn new(network: NetworkClient, root: impl Into<PathBuf>) -> Self {
        Self {
            network,
            root: root.into(),
            platform: Platform::current(),
            resources_url: RESOURCES_URL.into(),
            java_runtime: false,
        }
    }

    /// Also provision the Java runtime named by the version's `javaVersion`.
    pub fn with_java_runtime(mut self, enabled: bool) -> Self {
        self.java_runtime = enabled;
        self
    }

    #[cfg(test)]
    fn with_resources_url(mut self, url: String) -> Self {
        self.resources_url = url;
        self
    }

    /// Make sure every file needed to run `version_id` is present under the root.
    pub async fn install(
        &self,
        version_id: &str,
        progress: ProgressSink<'_>,
        cancel: &Option<Arc<AtomicBool>>,
    ) -> Result<(), String> {
        info!("install: preparing {} in {}", version_id, self.root.display());
        env::ensure_base_dirs(&self.root)
            .map_err(|e| format!("unable to create launcher directories: {e}"))?;

        progress(InstallProgress::Max(0));
        progress(InstallProgress::Status("Resolving version".into()));

        let mut manifest = None;
        let mut chain = Vec::new();
        let mut pending = Some(version_id.to_owned());
        while let Some(id) = pending.take() {
            if chain.len() >= MAX_INHERITANCE_DEPTH {
                return Err(format!("version {version_id} has too many parent versions"));
            }
            check_cancel(cancel)?;
            let info = self.ensure_version_json(&id, &mut manifest).await?;
            pending = info.inherits_from.clone();
            chain.push(info);
        }

        let natives_dir = env::natives_dir(&self.root, version_id);
        for info in chain.iter().rev() {
            self.install_libraries(info, &natives_dir, progress, cancel)
                .await?;
            self.install_client(info, progress, cancel).await?;
            self.install_assets(info, progress, cancel).await?;
        }

        let component = chain
            .iter()
            .find_map(|info| info.java_version.as_ref())
            .map(|java| java.component.as_str());
        if self.java_runtime
            && let Some(component) = component
        {
            JavaRuntimeInstaller::new(self.network.clone(), &self.root)
                .ensure(component, progress, cancel)
                .await?;
        }

        progress(InstallProgress::Status("Installation complete".into()));
        info!("install: {} ready", version_id);
        Ok(())
    }

    async fn ensure_version_json(
        &self,
        id: &str,
        manifest: &mut Option<VersionManifest>,
    ) -> Result<VersionInfo, String> {
        let path = env::version_json_path(&self.root, id);
        if let Ok(text) = fs::read_to_string(&path).await {
            match serde_json::from_str::<VersionInfo>(&text) {
                Ok(info) => {
                    debug!("install: using local version JSON {}", path.display());
                    return Ok(info);
                }
                Err(err) => warn!(
                    "install: ignoring unreadable version JSON {}: {err}",
                    path.display()
                ),
            }
        }

        if manifest.is_none() {
            *manifest = Some(self.network.fetch_manifest().await?);
        }
        let entry = manifest
            .as_ref()
            .and_then(|m| m.find(id))
            .ok_or_else(|| format!("version {id} not found"))?;

        let text = self.network.fetch_text(&entry.url).await?;
        let info: VersionInfo = serde_json::from_str(&text)
            .map_err(|e| format!("invalid version JSON for {id}: {e}"))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("unable to create {id} dir: {e}"))?;
        }
        fs::write(&path, text)
            .await
            .map_err(|e| format!("unable to save version JSON: {e}"))?;
        Ok(info)
    }

    async fn install_libraries(
        &self,
        info: &VersionInfo,
        natives_dir: &Path,
        progress: ProgressSink<'_>,
        cancel: &Option<Arc<AtomicBool>>,
    ) -> Result<(), String> {
        let libraries_dir = env::libraries_dir(&self.root);
        progress(InstallProgress::Status("Download Libraries".into()));
        progress(InstallProgress::Max(info.libraries.len() as u64));
        progress(InstallProgress::Progress(0));

        for (index, library) in info.libraries.iter().enumerate() {
            check_cancel(cancel)?;
            if library.allowed_on(&self.platform) {
                if let (Some(path), Some((url, check))) =
                    (library.artifact_path(), library.artifact_source())
                {
                    let dest = libraries_dir.join(path);
                    if !is_complete(&dest, &check).await {
                        debug!("install: library {}", library.name);
                        self.network
                            .download_to_path(&url, &dest, &check, cancel)
                            .await?;
                    }
                }

                if let Some(native) = library.native_artifact(&self.platform) {
                    let file_name = format!("{}.jar", library.name.replace(':', "_"));
                    let dest = match &native.path {
                        Some(path) => libraries_dir.join(path),
                        None => libraries_dir.join("natives").join(file_name),
                    };
                    let check = native.check();
                    if !is_complete(&dest, &check).await {
                        self.network
                            .download_to_path(&native.url, &dest, &check, cancel)
                            .await?;
                    }
                    let exclude = library
                        .extract
                        .as_ref()
                        .map(|rules| rules.exclude.clone())
                        .unwrap_or_default();
                    let target = natives_dir.to_path_buf();
                    tokio::task::spawn_blocking(move || extract_natives(&dest, &target, &exclude))
                        .await
                        .map_err(|e| format!("natives extraction aborted: {e}"))??;
                }
            }
            progress(InstallProgress::Progress(index as u64 + 1));
        }
        Ok(())
    }

    async fn install_client(
        &self,
        info: &VersionInfo,
        progress: ProgressSink<'_>,
        cancel: &Option<Arc<AtomicBool>>,
    ) -> Result<(), String> {
        let Some(client) = info.downloads.as_ref().and_then(|d| d.client.as_ref()) else {
            return Ok(());
        };
        check_cancel(cancel)?;
        progress(InstallProgress::Status("Download Client".into()));
        progress(InstallProgress::Max(1));
        progress(InstallProgress::Progress(0));

        let dest = env::client_jar_path(&self.root, &info.id);
        let check = client.check();
        if !is_complete(&dest, &check).await {
            info!("install: downloading client jar for {}", info.id);
            self.network
                .download_to_path(&client.url, &dest, &check, cancel)
                .await?;
        }
        progress(InstallProgress::Progress(1));
        Ok(())
    }

    async fn install_assets(
        &self,
        info: &VersionInfo,
        progress: ProgressSink<'_>,
        cancel: &Option<Arc<AtomicBool>>,
    ) -> Result<(), String> {
        let Some(index_info) = info.asset_index.as_ref() else {
            return Ok(());
        };
        check_cancel(cancel)?;
        progress(InstallProgress::Status("Download Assets".into()));
        progress(InstallProgress::Max(0));

        let index_path = env::asset_indexes_dir(&self.root).join(format!("{}.json", index_info.id));
        let check = index_info.check();
        if !is_complete(&index_path, &check).await {
            self.network
                .download_to_path(&index_info.url, &index_path, &check, cancel)
                .await?;
        }
        let text = fs::read_to_string(&index_path)
            .await
            .map_err(|e| format!("unable to read asset index: {e}"))?;
        let index: AssetIndex =
            serde_json::from_str(&text).map_err(|e| format!("invalid asset index: {e}"))?;

        let mut seen = HashSet::new();
        let objects: Vec<_> = index
            .objects
            .into_values()
            .filter(|object| seen.insert(object.hash.clone()))
            .collect();
        let total = objects.len() as u64;
        progress(InstallProgress::Max(total));
        progress(InstallProgress::Progress(0));

        let objects_dir = env::asset_objects_dir(&self.root);
        let mut downloads = futures_util::stream::iter(objects.into_iter().map(|object| {
            let network = &self.network;
            let objects_dir = &objects_dir;
            let resources_url = &self.resources_url;
            async move {
                let prefix = object.hash.get(..2).unwrap_or("00");
                let dest = objects_dir.join(prefix).join(&object.hash);
                // Object names are their SHA-1.
                let check = FileCheck::new(Some(object.size), Some(&object.hash));
                if is_complete(&dest, &check).await {
                    return Ok(());
                }
                let url = format!("{resources_url}/{prefix}/{}", object.hash);
                network
                    .download_to_path(&url, &dest, &check, cancel)
                    .await
            }
        }))
        .buffer_unordered(ASSET_CONCURRENCY);

        let mut done = 0u64;
        while let Some(result) = downloads.next().await {
            result?;
            check_cancel(cancel)?;
            done += 1;
            progress(InstallProgress::Progress(done));
        }
        info!("install: {} asset objects verified", total);
        Ok(())
    }
}

fn check_cancel(cancel: &Option<Arc<AtomicBool>>) -> Result<(), String> {
    if cancel_requested(cancel) {
        warn!("install: cancellation requested");
        return Err(CANCELLED.into());
    }
    Ok(())
}

/// Unpack native libraries shipped as classifier jars, skipping excluded prefixes.
fn extract_natives(archive_path: &Path, dest: &Path, exclude: &[String]) -> Result<(), String> {
    use std::fs;

    let file = fs::File::open(archive_path)
        .map_err(|e| format!("failed to open natives archive: {e}"))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| format!("failed to read natives archive: {e}"))?;
    fs::create_dir_all(dest).map_err(|e| format!("failed to create natives dir: {e}"))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| format!("natives archive entry error: {e}"))?;
        let name = entry.name().to_owned();
        if name.ends_with('/') || exclude.iter().any(|prefix| name.starts_with(prefix.as_str())) {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let out_path = dest.join(relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create natives dir: {e}"))?;
        }
        let mut out = fs::File::create(&out_path)
            .map_err(|e| format!("failed to create native file: {e}"))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| format!("failed to extract native file: {e}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use crate::networking::test_server::{Reply, TestServer};

    // SHA-1 of "abc".
    const ABC_SHA1: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";

    fn write_version(root: &Path, id: &str, json: &str) {
        let path = env::version_json_path(root, id);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, json).unwrap();
    }

    /// A version whose library, client jar and single asset are all served by `server`.
    fn networked_version(server: &TestServer, client_size: u64) -> String {
        serde_json::json!({
            "id": "net",
            "libraries": [{"name": "org.test:lib:1", "downloads": {"artifact": {
                "path": "org/test/lib/1/lib-1.jar",
                "url": server.url("/lib.jar"),
                "size": 3}}}],
            "downloads": {"client": {
                "url": server.url("/client.jar"),
                "size": client_size,
                "sha1": ABC_SHA1}},
            "assetIndex": {"id": "test", "url": server.url("/index.json")}
        })
        .to_string()
    }

    async fn asset_server(client: Reply) -> TestServer {
        let object = format!("/objects/a9/{ABC_SHA1}");
        let index = serde_json::json!({"objects": {
            "icons/icon.png": {"hash": ABC_SHA1, "size": 3}}});
        TestServer::start(vec![
            ("/lib.jar", Reply::Body(b"lib".to_vec())),
            ("/client.jar", client),
            ("/index.json", Reply::Body(index.to_string().into_bytes())),
            (object.as_str(), Reply::Body(b"abc".to_vec())),
        ])
        .await
    }

    #[tokio::test]
    async fn installs_local_profile_chain_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_version(root, "base", r#"{"id":"base","libraries":[{"name":"a:b:1","downloads":{}}]}"#);
        write_version(
            root,
            "child",
            r#"{"id":"child","inheritsFrom":"base","libraries":[]}"#,
        );

        let installer = MinecraftInstaller::new(NetworkClient::new(), root);
        let mut updates = Vec::new();
        let mut sink = |update: InstallProgress| updates.push(update);
        installer.install("child", &mut sink, &None).await.unwrap();

        assert!(updates.contains(&InstallProgress::Status("Download Libraries".into())));
        assert!(updates.contains(&InstallProgress::Progress(1)));
        assert_eq!(
            updates.last(),
            Some(&InstallProgress::Status("Installation complete".into()))
        );
    }

    #[tokio::test]
    async fn stops_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        write_version(dir.path(), "custom", r#"{"id":"custom"}"#);
        let installer = MinecraftInstaller::new(NetworkClient::new(), dir.path());
        let flag = Arc::new(AtomicBool::new(false));
        flag.store(true, Ordering::SeqCst);

        let mut sink = |_: InstallProgress| {};
        let err = installer
            .install("custom", &mut sink, &Some(flag))
            .await
            .unwrap_err();
        assert_eq!(err, CANCELLED);
    }

    #[tokio::test]
    async fn rejects_cyclic_inheritance() {
        let dir = tempfile::tempdir().unwrap();
        write_version(dir.path(), "a", r#"{"id":"a","inheritsFrom":"b"}"#);
        write_version(dir.path(), "b", r#"{"id":"b","inheritsFrom":"a"}"#);
        let installer = MinecraftInstaller::new(NetworkClient::new(), dir.path());

        let mut sink = |_: InstallProgress| {};
        let err = installer.install("a", &mut sink, &None).await.unwrap_err();
        assert!(err.contains("too many parent versions"));
    }

    #[tokio::test]
    async fn downloads_libraries_client_and_assets() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let server = asset_server(Reply::Body(b"abc".to_vec())).await;
        write_version(root, "net", &networked_version(&server, 3));
        let installer = MinecraftInstaller::new(NetworkClient::new(), root)
            .with_resources_url(server.url("/objects"));

        let mut updates = Vec::new();
        let mut sink = |update: InstallProgress| updates.push(update);
        installer.install("net", &mut sink, &None).await.unwrap();

        let libraries = env::libraries_dir(root);
        assert_eq!(
            fs::read(libraries.join("org/test/lib/1/lib-1.jar")).unwrap(),
            b"lib"
        );
        assert_eq!(fs::read(env::client_jar_path(root, "net")).unwrap(), b"abc");
        let object = env::asset_objects_dir(root).join("a9").join(ABC_SHA1);
        assert_eq!(fs::read(object).unwrap(), b"abc");

        let phases: Vec<_> = updates
            .iter()
            .filter_map(|update| match update {
                InstallProgress::Status(status) => Some(status.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            [
                "Resolving version",
                "Download Libraries",
                "Download Client",
                "Download Assets",
                "Installation complete"
            ]
        );

        // Everything is in place, so a second install downloads nothing.
        let mut quiet = |_: InstallProgress| {};
        installer.install("net", &mut quiet, &None).await.unwrap();
        assert_eq!(server.hits("/client.jar"), 1);
        assert_eq!(server.hits(&format!("/objects/a9/{ABC_SHA1}")), 1);
    }

    #[tokio::test]
    async fn short_client_jar_fails_install() {
        let dir = tempfile::tempdir().unwrap();
        let server = asset_server(Reply::Body(b"abc".to_vec())).await;
        write_version(dir.path(), "net", &networked_version(&server, 4));
        let installer = MinecraftInstaller::new(NetworkClient::new(), dir.path())
            .with_resources_url(server.url("/objects"));

        let mut sink = |_: InstallProgress| {};
        let err = installer.install("net", &mut sink, &None).await.unwrap_err();
        assert!(err.contains("size mismatch"), "{err}");
        assert!(!env::client_jar_path(dir.path(), "net").exists());
    }

    #[tokio::test]
    async fn cancel_stops_stalled_client_download() {
        let dir = tempfile::tempdir().unwrap();
        let server = asset_server(Reply::Stall(3)).await;
        write_version(dir.path(), "net", &networked_version(&server, 3));
        let installer = MinecraftInstaller::new(NetworkClient::new(), dir.path())
            .with_resources_url(server.url("/objects"));
        let flag = Arc::new(AtomicBool::new(false));
        let raiser = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            raiser.store(true, Ordering::SeqCst);
        });

        let mut sink = |_: InstallProgress| {};
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            installer.install("net", &mut sink, &Some(flag)),
        )
        .await
        .expect("install ignored the cancel flag");
        assert_eq!(result, Err(CANCELLED.to_owned()));
        assert_eq!(server.hits("/index.json"), 0);
    }

    #[test]
    fn extracts_natives_honouring_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("natives.jar");
        {
            let file = fs::File::create(&archive_path).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            writer.start_file("liblwjgl.so", options).unwrap();
            writer.write_all(b"native").unwrap();
            writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
            writer.write_all(b"manifest").unwrap();
            writer.finish().unwrap();
        }

        let out = dir.path().join("natives");
        extract_natives(&archive_path, &out, &["META-INF/".to_owned()]).unwrap();
        assert_eq!(fs::read(out.join("liblwjgl.so")).unwrap(), b"native");
        assert!(!out.join("META-INF").exists());
    }
}
