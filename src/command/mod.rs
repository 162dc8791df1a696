use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::engine::models::{Argument, Platform, VersionInfo, rules_allow};
use crate::env;
use crate::runtime;

const LAUNCHER_NAME: &str = "cat-launcher";
const MAX_INHERITANCE_DEPTH: usize = 8;
const LEGACY_JVM_ARGS: [&str; 5] = [
    "-Djava.library.path=${natives_directory}",
    "-Dminecraft.launcher.brand=${launcher_name}",
    "-Dminecraft.launcher.version=${launcher_version}",
    "-cp",
    "${classpath}",
];

/// Per-launch values substituted into the version's argument templates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub username: String,
    pub session_id: String,
    /// Empty in offline mode.
    pub token: String,
    pub extra_args: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct CommandBuilder {
    root: PathBuf,
    /// Explicit override; otherwise the provisioned runtime or `java` on `PATH`.
    java: Option<PathBuf>,
    platform: Platform,
}

impl CommandBuilder {
    pub fn new(root: impl Into<PathBuf>, java: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            java,
            platform: Platform::current(),
        }
    }

    /// Build the argv (executable first) for an installed version.
    pub fn build(&self, version_id: &str, options: &LaunchOptions) -> Result<Vec<String>, String> {
        let info = load_merged_version(&self.root, version_id)?;
        let java = self
            .java
            .clone()
            .unwrap_or_else(|| runtime::java_for(&self.root, &info));
        let argv = assemble(&info, &self.root, &java, &self.platform, options)?;
        debug!("command: {} arguments for {}", argv.len(), version_id);
        Ok(argv)
    }
}

/// Read a version JSON and fold in every `inheritsFrom` parent.
pub fn load_merged_version(root: &Path, version_id: &str) -> Result<VersionInfo, String> {
    let mut info = read_version(root, version_id)?;
    let mut depth = 0;
    while let Some(parent_id) = info.inherits_from.clone() {
        depth += 1;
        if depth > MAX_INHERITANCE_DEPTH {
            return Err(format!("version {version_id} has too many parent versions"));
        }
        let parent = read_version(root, &parent_id)?;
        let parent_inherits = parent.inherits_from.clone();
        info = info.inherit(parent);
        info.inherits_from = parent_inherits;
    }
    Ok(info)
}

fn read_version(root: &Path, id: &str) -> Result<VersionInfo, String> {
    let path = env::version_json_path(root, id);
    let text = fs::read_to_string(&path)
        .map_err(|e| format!("version {id} is not installed ({}): {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid version JSON for {id}: {e}"))
}

fn classpath(info: &VersionInfo, root: &Path, platform: &Platform) -> String {
    let libraries_dir = env::libraries_dir(root);
    let mut entries: Vec<String> = Vec::new();
    for library in &info.libraries {
        if !library.allowed_on(platform) {
            continue;
        }
        if let Some(path) = library.artifact_path() {
            let entry = libraries_dir.join(path).display().to_string();
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
    }
    entries.push(env::client_jar_path(root, info.jar_id()).display().to_string());
    entries.join(platform.classpath_separator())
}

fn expand_arguments(arguments: &[Argument], platform: &Platform) -> Vec<String> {
    let mut out = Vec::new();
    for argument in arguments {
        match argument {
            Argument::Plain(value) => out.push(value.clone()),
            Argument::Conditional { rules, value } => {
                if rules_allow(rules, platform) {
                    out.extend(value.values().into_iter().map(str::to_owned));
                }
            }
        }
    }
    out
}

fn substitute(template: &str, values: &[(&str, String)]) -> String {
    let mut result = template.to_owned();
    for (key, value) in values {
        let placeholder = format!("${{{key}}}");
        if result.contains(&placeholder) {
            result = result.replace(&placeholder, value);
        }
    }
    result
}

fn assemble(
    info: &VersionInfo,
    root: &Path,
    java: &Path,
    platform: &Platform,
    options: &LaunchOptions,
) -> Result<Vec<String>, String> {
    let main_class = info
        .main_class
        .clone()
        .ok_or_else(|| format!("version {} has no main class", info.id))?;

    let natives = env::natives_dir(root, &info.id);
    let assets = env::assets_dir(root);
    let values: Vec<(&str, String)> = vec![
        ("auth_player_name", options.username.clone()),
        ("version_name", info.id.clone()),
        ("game_directory", root.display().to_string()),
        ("assets_root", assets.display().to_string()),
        ("game_assets", assets.display().to_string()),
        ("assets_index_name", info.assets_id()),
        ("auth_uuid", options.session_id.clone()),
        ("auth_access_token", options.token.clone()),
        ("auth_session", options.token.clone()),
        ("auth_xuid", String::new()),
        ("clientid", String::new()),
        ("user_type", "legacy".into()),
        (
            "version_type",
            info.version_type.clone().unwrap_or_else(|| "release".into()),
        ),
        ("user_properties", "{}".into()),
        ("natives_directory", natives.display().to_string()),
        ("launcher_name", LAUNCHER_NAME.into()),
        ("launcher_version", env!("CARGO_PKG_VERSION").into()),
        ("classpath", classpath(info, root, platform)),
        ("classpath_separator", platform.classpath_separator().into()),
        (
            "library_directory",
            env::libraries_dir(root).display().to_string(),
        ),
    ];

    let (jvm_templates, game_templates) = match &info.arguments {
        Some(arguments) if !arguments.jvm.is_empty() => (
            expand_arguments(&arguments.jvm, platform),
            expand_arguments(&arguments.game, platform),
        ),
        modern => {
            let game = match (modern, &info.minecraft_arguments) {
                (Some(arguments), _) if !arguments.game.is_empty() => {
                    expand_arguments(&arguments.game, platform)
                }
                (_, Some(legacy)) => legacy.split_whitespace().map(str::to_owned).collect(),
                _ => Vec::new(),
            };
            (LEGACY_JVM_ARGS.iter().map(|s| (*s).to_owned()).collect(), game)
        }
    };

    let mut argv = Vec::with_capacity(jvm_templates.len() + game_templates.len() + 8);
    argv.push(java.display().to_string());
    argv.extend(options.extra_args.iter().cloned());
    argv.extend(jvm_templates.iter().map(|arg| substitute(arg, &values)));
    argv.push(main_class);
    argv.extend(game_templates.iter().map(|arg| substitute(arg, &values)));
    Ok(argv)
}
