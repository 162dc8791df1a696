use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Folder name used under the platform data directory. Kept apart from
/// `.minecraft` so an official launcher install is never touched.
const APP_DIR_NAME: &str = "catlauncher";

/// Overrides the launcher root directory when set.
pub const HOME_OVERRIDE_VAR: &str = "CAT_LAUNCHER_HOME";

pub const SETTINGS_FILE: &str = "launcher_settings.txt";

/// Returns the root directory used by the launcher.
pub fn default_app_dir() -> PathBuf {
    if let Some(custom) = env::var_os(HOME_OVERRIDE_VAR).filter(|value| !value.is_empty()) {
        return PathBuf::from(custom);
    }

    let base = match env::consts::OS {
        "windows" => env::var_os("LOCALAPPDATA")
            .or_else(|| env::var_os("APPDATA"))
            .map(PathBuf::from),
        "macos" => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join("Library").join("Application Support")),
        _ => env::var_os("XDG_DATA_HOME")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                env::var_os("HOME")
                    .map(PathBuf::from)
                    .map(|home| home.join(".local").join("share"))
            }),
    }
    .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR_NAME)
}

pub fn settings_path(root: &Path) -> PathBuf {
    root.join(SETTINGS_FILE)
}

pub fn versions_dir(root: &Path) -> PathBuf {
    root.join("versions")
}

pub fn version_dir(root: &Path, version: &str) -> PathBuf {
    versions_dir(root).join(version)
}

pub fn version_json_path(root: &Path, version: &str) -> PathBuf {
    version_dir(root, version).join(format!("{version}.json"))
}

pub fn client_jar_path(root: &Path, version: &str) -> PathBuf {
    version_dir(root, version).join(format!("{version}.jar"))
}

pub fn natives_dir(root: &Path, version: &str) -> PathBuf {
    version_dir(root, version).join("natives")
}

pub fn libraries_dir(root: &Path) -> PathBuf {
    root.join("libraries")
}

pub fn assets_dir(root: &Path) -> PathBuf {
    root.join("assets")
}

pub fn asset_indexes_dir(root: &Path) -> PathBuf {
    assets_dir(root).join("indexes")
}

pub fn asset_objects_dir(root: &Path) -> PathBuf {
    assets_dir(root).join("objects")
}

pub fn runtimes_dir(root: &Path) -> PathBuf {
    root.join("runtime")
}

/// Where a Mojang Java runtime component (e.g. `jre-legacy`) is unpacked.
pub fn runtime_dir(root: &Path, component: &str) -> PathBuf {
    runtimes_dir(root).join(component)
}

/// Create the on-disk folder layout expected by the launcher.
pub fn ensure_base_dirs(root: &Path) -> std::io::Result<()> {
    let folders = [
        root.to_path_buf(),
        versions_dir(root),
        libraries_dir(root),
        asset_indexes_dir(root),
        asset_objects_dir(root),
    ];

    for dir in folders {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}
