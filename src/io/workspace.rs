use std::path::{Path, PathBuf};

/// Per-workspace state directory
pub const STATE_DIR: &str = ".annofold";
pub const SETTINGS_FILE: &str = "settings.toml";
pub const SESSION_FILE: &str = "session.json";

/// Where settings and session state live for one invocation.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Workspace root (parent of `.annofold/`), if one was found
    pub workspace: Option<PathBuf>,
    /// Global configuration directory
    pub global_dir: PathBuf,
}

impl Paths {
    /// Discover the workspace from `start` and use the default global dir.
    pub fn resolve(start: &Path) -> Self {
        Paths {
            workspace: discover_workspace(start),
            global_dir: global_config_dir(),
        }
    }

    /// Directory holding session state and the lock file
    pub fn state_dir(&self) -> PathBuf {
        match &self.workspace {
            Some(root) => root.join(STATE_DIR),
            None => self.global_dir.clone(),
        }
    }

    pub fn workspace_settings(&self) -> Option<PathBuf> {
        self.workspace
            .as_ref()
            .map(|root| root.join(STATE_DIR).join(SETTINGS_FILE))
    }

    pub fn global_settings(&self) -> PathBuf {
        self.global_dir.join(SETTINGS_FILE)
    }

    pub fn session_file(&self) -> PathBuf {
        self.state_dir().join(SESSION_FILE)
    }
}

/// Find the workspace by walking up from `start`, looking for a directory
/// that contains `.annofold/settings.toml`.
pub fn discover_workspace(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(STATE_DIR).join(SETTINGS_FILE).is_file() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Global config directory, respecting XDG_CONFIG_HOME
pub fn global_config_dir() -> PathBuf {
    let config_dir = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"));
    config_dir.join("annofold")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/"))
}
