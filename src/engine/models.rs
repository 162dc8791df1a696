use std::collections::HashMap;

use serde::Deserialize;

use crate::networking::FileCheck;

#[derive(Clone, Debug, Deserialize)]
pub struct VersionManifest {
    pub versions: Vec<ManifestEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

impl VersionManifest {
    pub fn find(&self, id: &str) -> Option<&ManifestEntry> {
        self.versions.iter().find(|entry| entry.id == id)
    }
}

/// Per-version JSON as published by Mojang or written by mod loader installers.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct VersionInfo {
    pub id: String,
    #[serde(default, rename = "inheritsFrom")]
    pub inherits_from: Option<String>,
    #[serde(default, rename = "type")]
    pub version_type: Option<String>,
    #[serde(default, rename = "mainClass")]
    pub main_class: Option<String>,
    #[serde(default, rename = "minecraftArguments")]
    pub minecraft_arguments: Option<String>,
    #[serde(default)]
    pub arguments: Option<Arguments>,
    #[serde(default, rename = "assetIndex")]
    pub asset_index: Option<AssetIndexInfo>,
    #[serde(default)]
    pub assets: Option<String>,
    #[serde(default)]
    pub downloads: Option<VersionDownloads>,
    #[serde(default)]
    pub libraries: Vec<Library>,
    #[serde(default, rename = "javaVersion")]
    pub java_version: Option<JavaVersion>,
    /// Filled in when merging a child onto its parent; the jar to put on the classpath.
    #[serde(skip)]
    pub jar: Option<String>,
}

impl VersionInfo {
    /// Overlay `self` (a child such as a Fabric profile) on top of `parent`.
    pub fn inherit(self, parent: VersionInfo) -> VersionInfo {
        let mut libraries = self.libraries;
        libraries.extend(parent.libraries);

        let arguments = match (self.arguments, parent.arguments) {
            (Some(child), Some(parent)) => Some(Arguments {
                game: parent.game.into_iter().chain(child.game).collect(),
                jvm: parent.jvm.into_iter().chain(child.jvm).collect(),
            }),
            (child, parent) => child.or(parent),
        };

        VersionInfo {
            jar: Some(parent.jar.unwrap_or_else(|| parent.id.clone())),
            id: self.id,
            inherits_from: None,
            version_type: self.version_type.or(parent.version_type),
            main_class: self.main_class.or(parent.main_class),
            minecraft_arguments: self.minecraft_arguments.or(parent.minecraft_arguments),
            arguments,
            asset_index: self.asset_index.or(parent.asset_index),
            assets: self.assets.or(parent.assets),
            downloads: self.downloads.or(parent.downloads),
            libraries,
            java_version: self.java_version.or(parent.java_version),
        }
    }

    /// Version id whose jar carries the game classes.
    pub fn jar_id(&self) -> &str {
        self.jar.as_deref().unwrap_or(&self.id)
    }

    pub fn assets_id(&self) -> String {
        self.asset_index
            .as_ref()
            .map(|index| index.id.clone())
            .or_else(|| self.assets.clone())
            .unwrap_or_else(|| "legacy".into())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Arguments {
    #[serde(default)]
    pub game: Vec<Argument>,
    #[serde(default)]
    pub jvm: Vec<Argument>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Argument {
    Plain(String),
    Conditional {
        #[serde(default)]
        rules: Vec<Rule>,
        value: ArgumentValue,
    },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    Single(String),
    Many(Vec<String>),
}

impl ArgumentValue {
    pub fn values(&self) -> Vec<&str> {
        match self {
            ArgumentValue::Single(value) => vec![value.as_str()],
            ArgumentValue::Many(values) => values.iter().map(String::as_str).collect(),
        }
    }
}

/// Java runtime the version was built for, as named in Mojang's runtime index.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct JavaVersion {
    pub component: String,
    #[serde(default, rename = "majorVersion")]
    pub major_version: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AssetIndexInfo {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl AssetIndexInfo {
    pub fn check(&self) -> FileCheck {
        FileCheck::new(self.size, self.sha1.as_deref())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct VersionDownloads {
    #[serde(default)]
    pub client: Option<DownloadInfo>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DownloadInfo {
    pub url: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl DownloadInfo {
    pub fn check(&self) -> FileCheck {
        FileCheck::new(self.size, self.sha1.as_deref())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Library {
    pub name: String,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    /// Maven repository base used by loader profiles that omit `downloads`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub natives: Option<HashMap<String, String>>,
    #[serde(default)]
    pub rules: Option<Vec<Rule>>,
    #[serde(default)]
    pub extract: Option<ExtractRules>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<Artifact>,
    #[serde(default)]
    pub classifiers: Option<HashMap<String, Artifact>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub path: Option<String>,
    pub url: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl Artifact {
    pub fn check(&self) -> FileCheck {
        FileCheck::new(self.size, self.sha1.as_deref())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExtractRules {
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsRule>,
    #[serde(default)]
    pub features: Option<HashMap<String, bool>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arch: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AssetIndex {
    pub objects: HashMap<String, AssetObject>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,
}

/// The host as seen by version rules.
#[derive(Clone, Copy, Debug)]
pub struct Platform {
    pub os: &'static str,
    pub arch: &'static str,
}

impl Platform {
    pub fn current() -> Self {
        let os = if cfg!(target_os = "windows") {
            "windows"
        } else if cfg!(target_os = "macos") {
            "osx"
        } else {
            "linux"
        };
        let arch = if cfg!(target_pointer_width = "32") {
            "x86"
        } else {
            std::env::consts::ARCH
        };
        Self { os, arch }
    }

    pub fn classpath_separator(&self) -> &'static str {
        if self.os == "windows" { ";" } else { ":" }
    }

    fn bitness(&self) -> &'static str {
        if self.arch == "x86" { "32" } else { "64" }
    }
}

impl Rule {
    /// Launcher features (demo user, custom resolution, ...) are all off.
    fn matches(&self, platform: &Platform) -> bool {
        if let Some(os) = &self.os {
            if os.name.as_deref().is_some_and(|name| name != platform.os) {
                return false;
            }
            if os.arch.as_deref().is_some_and(|arch| arch != platform.arch) {
                return false;
            }
        }
        if let Some(features) = &self.features {
            if features.values().any(|wanted| *wanted) {
                return false;
            }
        }
        true
    }
}

/// An empty rule list allows; otherwise the last matching rule decides.
pub fn rules_allow(rules: &[Rule], platform: &Platform) -> bool {
    if rules.is_empty() {
        return true;
    }
    let mut allowed = false;
    for rule in rules {
        if rule.matches(platform) {
            allowed = rule.action == RuleAction::Allow;
        }
    }
    allowed
}

impl Library {
    pub fn allowed_on(&self, platform: &Platform) -> bool {
        self.rules
            .as_deref()
            .map(|rules| rules_allow(rules, platform))
            .unwrap_or(true)
    }

    /// Relative path of the main artifact inside the libraries directory.
    pub fn artifact_path(&self) -> Option<String> {
        match self.downloads.as_ref() {
            Some(downloads) => downloads
                .artifact
                .as_ref()
                .and_then(|artifact| artifact.path.clone().or_else(|| maven_path(&self.name))),
            None => maven_path(&self.name),
        }
    }

    /// Download location and integrity data of the main artifact.
    pub fn artifact_source(&self) -> Option<(String, FileCheck)> {
        if let Some(artifact) = self.downloads.as_ref().and_then(|d| d.artifact.as_ref()) {
            if artifact.url.is_empty() {
                return None;
            }
            return Some((artifact.url.clone(), artifact.check()));
        }
        if self.downloads.is_some() {
            return None;
        }
        let base = self
            .url
            .as_deref()
            .unwrap_or("https://libraries.minecraft.net/");
        let path = maven_path(&self.name)?;
        Some((
            format!("{}/{}", base.trim_end_matches('/'), path),
            FileCheck::default(),
        ))
    }

    /// Native classifier artifact for this platform, if the library ships one.
    pub fn native_artifact(&self, platform: &Platform) -> Option<&Artifact> {
        let classifier = self.natives.as_ref()?.get(platform.os)?;
        let classifier = classifier.replace("${arch}", platform.bitness());
        self.downloads
            .as_ref()?
            .classifiers
            .as_ref()?
            .get(&classifier)
    }
}

/// `group:artifact:version[:classifier][@ext]` to a repository-relative path.
pub fn maven_path(name: &str) -> Option<String> {
    let (coords, ext) = match name.split_once('@') {
        Some((coords, ext)) => (coords, ext),
        None => (name, "jar"),
    };
    let parts: Vec<&str> = coords.split(':').collect();
    if parts.len() < 3 {
        return None;
    }
    let group = parts[0].replace('.', "/");
    let artifact = parts[1];
    let version = parts[2];
    let file = match parts.get(3) {
        Some(classifier) => format!("{artifact}-{version}-{classifier}.{ext}"),
        None => format!("{artifact}-{version}.{ext}"),
    };
    Some(format!("{group}/{artifact}/{version}/{file}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX: Platform = Platform {
        os: "linux",
        arch: "x86_64",
    };
    const WINDOWS: Platform = Platform {
        os: "windows",
        arch: "x86_64",
    };
    const OSX: Platform = Platform {
        os: "osx",
        arch: "aarch64",
    };

    fn rules(json: &str) -> Vec<Rule> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn maps_maven_coordinates_to_paths() {
        assert_eq!(
            maven_path("net.fabricmc:fabric-loader:0.16.10").as_deref(),
            Some("net/fabricmc/fabric-loader/0.16.10/fabric-loader-0.16.10.jar")
        );
        assert_eq!(
            maven_path("org.lwjgl:lwjgl:3.3.1:natives-linux").as_deref(),
            Some("org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1-natives-linux.jar")
        );
        assert_eq!(
            maven_path("de.oceanlabs.mcp:mcp_config:1.20.1@zip").as_deref(),
            Some("de/oceanlabs/mcp/mcp_config/1.20.1/mcp_config-1.20.1.zip")
        );
        assert_eq!(maven_path("broken"), None);
    }

    #[test]
    fn last_matching_rule_wins() {
        let osx_excluded = rules(
            r#"[{"action":"allow"},{"action":"disallow","os":{"name":"osx"}}]"#,
        );
        assert!(rules_allow(&osx_excluded, &LINUX));
        assert!(rules_allow(&osx_excluded, &WINDOWS));
        assert!(!rules_allow(&osx_excluded, &OSX));

        let windows_only = rules(r#"[{"action":"allow","os":{"name":"windows"}}]"#);
        assert!(rules_allow(&windows_only, &WINDOWS));
        assert!(!rules_allow(&windows_only, &LINUX));
        assert!(rules_allow(&[], &LINUX));
    }

    #[test]
    fn feature_gated_rules_never_match() {
        let demo = rules(r#"[{"action":"allow","features":{"is_demo_user":true}}]"#);
        assert!(!rules_allow(&demo, &LINUX));
    }

    #[test]
    fn parses_modern_and_conditional_arguments() {
        let json = r#"{
            "id": "1.20.1",
            "mainClass": "net.minecraft.client.main.Main",
            "arguments": {
                "game": ["--username", "${auth_player_name}",
                    {"rules":[{"action":"allow","features":{"has_custom_resolution":true}}],
                     "value":["--width","${resolution_width}"]}],
                "jvm": [{"rules":[{"action":"allow","os":{"name":"osx"}}],"value":"-XstartOnFirstThread"}]
            },
            "assetIndex": {"id": "5", "url": "https://example.invalid/5.json"},
            "libraries": []
        }"#;
        let info: VersionInfo = serde_json::from_str(json).unwrap();
        let arguments = info.arguments.unwrap();
        assert_eq!(arguments.game.len(), 3);
        match &arguments.jvm[0] {
            Argument::Conditional { value, .. } => {
                assert_eq!(value.values(), vec!["-XstartOnFirstThread"]);
            }
            Argument::Plain(_) => panic!("expected conditional argument"),
        }
    }

    #[test]
    fn child_profile_inherits_parent() {
        let parent: VersionInfo = serde_json::from_str(
            r#"{"id":"1.20.1","mainClass":"net.minecraft.client.main.Main",
                "assetIndex":{"id":"5","url":"u"},
                "javaVersion":{"component":"java-runtime-gamma","majorVersion":17},
                "libraries":[{"name":"com.mojang:brigadier:1.1.8"}]}"#,
        )
        .unwrap();
        let child: VersionInfo = serde_json::from_str(
            r#"{"id":"fabric-loader-0.16.10-1.20.1","inheritsFrom":"1.20.1",
                "mainClass":"net.fabricmc.loader.impl.launch.knot.KnotClient",
                "libraries":[{"name":"net.fabricmc:fabric-loader:0.16.10","url":"https://maven.fabricmc.net/"}]}"#,
        )
        .unwrap();

        let merged = child.inherit(parent);
        assert_eq!(merged.id, "fabric-loader-0.16.10-1.20.1");
        assert_eq!(merged.jar_id(), "1.20.1");
        assert_eq!(
            merged.main_class.as_deref(),
            Some("net.fabricmc.loader.impl.launch.knot.KnotClient")
        );
        assert_eq!(merged.assets_id(), "5");
        assert_eq!(merged.libraries.len(), 2);
        assert_eq!(
            merged.java_version.as_ref().map(|java| java.component.as_str()),
            Some("java-runtime-gamma")
        );
        assert_eq!(
            merged.libraries[0].artifact_source().map(|(url, _)| url).as_deref(),
            Some("https://maven.fabricmc.net/net/fabricmc/fabric-loader/0.16.10/fabric-loader-0.16.10.jar")
        );
    }

    #[test]
    fn resolves_legacy_native_classifier() {
        let library: Library = serde_json::from_str(
            r#"{"name":"org.lwjgl.lwjgl:lwjgl-platform:2.9.4-nightly-20150209",
                "natives":{"linux":"natives-linux","windows":"natives-windows-${arch}"},
                "downloads":{"classifiers":{
                    "natives-linux":{"path":"a.jar","url":"https://example.invalid/a.jar","size":1},
                    "natives-windows-64":{"path":"b.jar","url":"https://example.invalid/b.jar","size":2}}}}"#,
        )
        .unwrap();
        assert_eq!(library.native_artifact(&LINUX).map(|a| a.size), Some(Some(1)));
        assert_eq!(library.native_artifact(&WINDOWS).map(|a| a.size), Some(Some(2)));
        assert!(library.native_artifact(&OSX).is_none());
        assert!(library.artifact_path().is_none());
        assert!(library.artifact_source().is_none());
    }

    #[test]
    fn carries_published_hashes() {
        let library: Library = serde_json::from_str(
            r#"{"name":"com.google.guava:guava:17.0",
                "downloads":{"artifact":{"path":"g.jar","url":"https://example.invalid/g.jar",
                    "size":3,"sha1":"a9993e364706816aba3e25717850c26c9cd0d89d"}}}"#,
        )
        .unwrap();
        let (url, check) = library.artifact_source().unwrap();
        assert_eq!(url, "https://example.invalid/g.jar");
        assert_eq!(check.size, Some(3));
        assert_eq!(
            check.sha1.as_deref(),
            Some("a9993e364706816aba3e25717850c26c9cd0d89d")
        );

        let maven: Library = serde_json::from_str(r#"{"name":"a:b:1"}"#).unwrap();
        assert_eq!(maven.artifact_source().map(|(_, check)| check), Some(FileCheck::default()));
    }
}
