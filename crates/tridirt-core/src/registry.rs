//! Static table of the tools the launcher manages.
//!
//! The set of tools is fixed at compile time. A JSON file named by
//! `TRIDIRT_REGISTRY` may override the download URL or freshness interval of a
//! known tool, but can never add one.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use tracing::warn;

use crate::config::LauncherConfig;
use crate::error::UpdateError;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub const TRID: &str = "trid";
pub const TRID_DEFS: &str = "triddefs";

struct ToolSpec {
    name: &'static str,
    download_url: &'static str,
    payload: &'static str,
    state_file: &'static str,
    freshness_interval: Duration,
    installer: SpecInstaller,
    interpreted: bool,
    depends_on: Option<&'static str>,
}

enum SpecInstaller {
    Direct,
    Delegated {
        via: &'static str,
        args: &'static [&'static str],
    },
}

const BUILTIN_TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: TRID,
        download_url: "https://mark0.net/download/trid.zip",
        payload: "trid.py",
        state_file: "TRID_LU",
        freshness_interval: Duration::from_secs(7 * DAY.as_secs()),
        installer: SpecInstaller::Direct,
        interpreted: true,
        depends_on: None,
    },
    ToolSpec {
        name: TRID_DEFS,
        download_url: "https://mark0.net/download/triddefs.zip",
        payload: "triddefs.trd",
        state_file: "TRID_DEFS_LU",
        freshness_interval: Duration::from_secs(2 * DAY.as_secs()),
        installer: SpecInstaller::Delegated {
            via: TRID,
            args: &["--update"],
        },
        interpreted: false,
        depends_on: Some(TRID),
    },
];

/// How a tool whose payload is absent gets installed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Installer {
    /// Fetch the tool's archive and extract it into the install directory.
    Direct,
    /// Run another registered tool with `args`; that tool owns this payload.
    Delegated { via: String, args: Vec<String> },
}

/// How an installed tool is started.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Launch {
    pub interpreter: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ToolDescriptor {
    pub name: String,
    pub download_url: String,
    pub install_dir: PathBuf,
    pub executable_path: PathBuf,
    pub state_file_path: PathBuf,
    pub freshness_interval: Duration,
    pub installer: Installer,
    pub launch: Option<Launch>,
    pub depends_on: Option<String>,
}

impl ToolDescriptor {
    pub fn is_installed(&self) -> bool {
        self.executable_path.exists()
    }

    pub fn is_launchable(&self) -> bool {
        self.launch.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct Registry {
    tools: Vec<ToolDescriptor>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RegistryOverrides {
    tools: Vec<ToolOverride>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct ToolOverride {
    name: String,
    download_url: Option<String>,
    freshness_interval_hours: Option<u64>,
}

impl Registry {
    pub fn builtin(config: &LauncherConfig) -> Self {
        let tools = BUILTIN_TOOLS
            .iter()
            .map(|spec| descriptor_from_spec(spec, config))
            .collect();
        Self { tools }
    }

    /// Built-in registry with the override file from `config` applied.
    /// A broken override file is logged and ignored.
    pub fn load(config: &LauncherConfig) -> Self {
        let mut registry = Self::builtin(config);
        if let Some(path) = config.registry_overrides.as_deref() {
            if let Err(err) = registry.apply_overrides_file(path) {
                warn!("{err}; using built-in registry");
            }
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn lookup(&self, name: &str) -> Result<&ToolDescriptor, UpdateError> {
        self.get(name)
            .ok_or_else(|| UpdateError::UnknownTool(name.to_string()))
    }

    /// Tools that depend on `name`, in registry order.
    pub fn dependents_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ToolDescriptor> {
        self.tools
            .iter()
            .filter(move |tool| tool.depends_on.as_deref() == Some(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    fn apply_overrides_file(&mut self, path: &Path) -> Result<(), UpdateError> {
        let raw = fs::read_to_string(path).map_err(|e| UpdateError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let overrides: RegistryOverrides =
            serde_json::from_str(&raw).map_err(|e| UpdateError::Config {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        self.apply_overrides(overrides);
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: RegistryOverrides) {
        for item in overrides.tools {
            let Some(tool) = self.tools.iter_mut().find(|tool| tool.name == item.name) else {
                warn!("Ignoring override for unknown tool '{}'", item.name);
                continue;
            };
            if let Some(url) = item.download_url.filter(|url| !url.trim().is_empty()) {
                tool.download_url = url.trim().to_string();
            }
            if let Some(hours) = item.freshness_interval_hours {
                tool.freshness_interval = Duration::from_secs(hours.saturating_mul(60 * 60));
            }
        }
    }
}

fn descriptor_from_spec(spec: &ToolSpec, config: &LauncherConfig) -> ToolDescriptor {
    let installer = match spec.installer {
        SpecInstaller::Direct => Installer::Direct,
        SpecInstaller::Delegated { via, args } => Installer::Delegated {
            via: via.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        },
    };
    let launch = spec.interpreted.then(|| Launch {
        interpreter: Some(config.python.clone()),
    });
    ToolDescriptor {
        name: spec.name.to_string(),
        download_url: spec.download_url.to_string(),
        install_dir: config.install_dir.clone(),
        executable_path: config.install_dir.join(spec.payload),
        state_file_path: config.install_dir.join(spec.state_file),
        freshness_interval: spec.freshness_interval,
        installer,
        launch,
        depends_on: spec.depends_on.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> LauncherConfig {
        LauncherConfig::with_install_dir(dir)
    }

    #[test]
    fn test_builtin_registry_layout() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::builtin(&config(dir.path()));

        let trid = registry.get(TRID).unwrap();
        assert_eq!(trid.executable_path, dir.path().join("trid.py"));
        assert_eq!(trid.state_file_path, dir.path().join("TRID_LU"));
        assert_eq!(trid.freshness_interval, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(trid.installer, Installer::Direct);
        assert!(trid.is_launchable());

        let defs = registry.get(TRID_DEFS).unwrap();
        assert_eq!(defs.executable_path, dir.path().join("triddefs.trd"));
        assert_eq!(defs.freshness_interval, Duration::from_secs(2 * 24 * 3600));
        assert_eq!(
            defs.installer,
            Installer::Delegated {
                via: TRID.into(),
                args: vec!["--update".into()]
            }
        );
        assert!(!defs.is_launchable());
        assert_ne!(trid.state_file_path, defs.state_file_path);
    }

    #[test]
    fn test_dependents_in_registry_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::builtin(&config(dir.path()));
        let names: Vec<_> = registry.dependents_of(TRID).map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec![TRID_DEFS]);
        assert_eq!(registry.dependents_of(TRID_DEFS).count(), 0);
    }

    #[test]
    fn test_lookup_unknown_tool() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::builtin(&config(dir.path()));
        assert!(matches!(
            registry.lookup("exiftool"),
            Err(UpdateError::UnknownTool(name)) if name == "exiftool"
        ));
    }

    #[test]
    fn test_overrides_only_touch_known_tools() {
        let dir = tempfile::tempdir().unwrap();
        let overrides_path = dir.path().join("registry.json");
        fs::write(
            &overrides_path,
            r#"{"tools": [
                {"name": "trid", "download_url": "http://mirror.local/trid.zip", "freshness_interval_hours": 24},
                {"name": "exiftool", "download_url": "http://mirror.local/exif.zip"}
            ]}"#,
        )
        .unwrap();
        let mut cfg = config(dir.path());
        cfg.registry_overrides = Some(overrides_path);

        let registry = Registry::load(&cfg);
        let trid = registry.get(TRID).unwrap();
        assert_eq!(trid.download_url, "http://mirror.local/trid.zip");
        assert_eq!(trid.freshness_interval, Duration::from_secs(24 * 3600));
        assert!(registry.get("exiftool").is_none());
        assert_eq!(registry.iter().count(), 2);
    }

    #[test]
    fn test_broken_overrides_fall_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let overrides_path = dir.path().join("registry.json");
        fs::write(&overrides_path, "{not json").unwrap();
        let mut cfg = config(dir.path());
        cfg.registry_overrides = Some(overrides_path);

        let registry = Registry::load(&cfg);
        assert_eq!(
            registry.get(TRID).unwrap().download_url,
            "https://mark0.net/download/trid.zip"
        );
    }
}
