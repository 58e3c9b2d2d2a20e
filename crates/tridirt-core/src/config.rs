use std::path::PathBuf;

use tridirt_util::{
    default_python, env_flag, env_var, expand_user, install_dir, ASSUME_YES_ENV, HOME_ENV,
    OFFLINE_ENV, PYTHON_ENV, REGISTRY_ENV,
};

use crate::error::UpdateError;

/// Launcher settings resolved from the environment.
#[derive(Clone, Debug)]
pub struct LauncherConfig {
    pub install_dir: PathBuf,
    pub python: String,
    pub assume_yes: bool,
    pub offline: bool,
    pub registry_overrides: Option<PathBuf>,
}

impl LauncherConfig {
    pub fn from_env() -> Result<Self, UpdateError> {
        let install_dir = install_dir().ok_or(UpdateError::NoInstallDir(HOME_ENV))?;
        let python = env_var(PYTHON_ENV, default_python());
        let python = if python.trim().is_empty() {
            default_python().to_string()
        } else {
            python.trim().to_string()
        };
        let registry_overrides = std::env::var(REGISTRY_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| expand_user(value.trim()));
        Ok(Self {
            install_dir,
            python,
            assume_yes: env_flag(ASSUME_YES_ENV),
            offline: env_flag(OFFLINE_ENV),
            registry_overrides,
        })
    }

    pub fn with_install_dir(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            python: default_python().to_string(),
            assume_yes: false,
            offline: false,
            registry_overrides: None,
        }
    }
}
