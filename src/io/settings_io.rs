use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use crate::host::{HostError, SettingScope, SettingsStore};
use crate::io::atomic_write;
use crate::io::workspace::Paths;
use crate::model::config::Settings;
use crate::parse::block_locator::MarkerError;

/// Error type for settings I/O
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml_edit::TomlError,
    },
    #[error("invalid settings in {path}: {source}")]
    ConfigError {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("`{key}` in {path} is not a table")]
    NotATable { key: String, path: PathBuf },
    #[error("no workspace is open")]
    NoWorkspace,
    #[error(transparent)]
    InvalidMarker(#[from] MarkerError),
}

/// Settings store backed by `settings.toml` files, one per scope.
///
/// Values are edited through `toml_edit` so comments and layout in the
/// user's file survive a write.
#[derive(Debug, Clone)]
pub struct FileSettings {
    workspace_file: Option<PathBuf>,
    global_file: PathBuf,
}

impl FileSettings {
    pub fn new(workspace_file: Option<PathBuf>, global_file: PathBuf) -> Self {
        FileSettings {
            workspace_file,
            global_file,
        }
    }

    pub fn from_paths(paths: &Paths) -> Self {
        FileSettings::new(paths.workspace_settings(), paths.global_settings())
    }

    pub fn path_for(&self, scope: SettingScope) -> Option<&Path> {
        match scope {
            SettingScope::Workspace => self.workspace_file.as_deref(),
            SettingScope::Global => Some(self.global_file.as_path()),
        }
    }

    /// Parsed settings from the preferred scope's file. A missing or
    /// corrupted file yields the defaults; only an unreadable file is an
    /// error.
    pub fn load(&self) -> Result<Settings, SettingsError> {
        let path = self.workspace_file.as_ref().unwrap_or(&self.global_file);
        if !path.exists() {
            return Ok(Settings::default());
        }
        let text = fs::read_to_string(path).map_err(|e| SettingsError::ReadError {
            path: path.clone(),
            source: e,
        })?;
        match toml::from_str(&text) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                let err = SettingsError::ConfigError {
                    path: path.clone(),
                    source: e,
                };
                warn!(error = %err, "ignoring corrupted settings; using defaults");
                Ok(Settings::default())
            }
        }
    }

    fn write_bool(&self, scope: SettingScope, key: &str, value: bool) -> Result<(), SettingsError> {
        let path = self.path_for(scope).ok_or(SettingsError::NoWorkspace)?;
        let mut doc = read_document(path)?.unwrap_or_default();
        set_bool_in(&mut doc, key, value).map_err(|key| SettingsError::NotATable {
            key,
            path: path.to_path_buf(),
        })?;
        write_document(path, &doc)
    }
}

#[async_trait(?Send)]
impl SettingsStore for FileSettings {
    fn has_workspace(&self) -> bool {
        self.workspace_file.is_some()
    }

    fn get_bool(&self, scope: SettingScope, key: &str) -> Option<bool> {
        let path = self.path_for(scope)?;
        match read_document(path) {
            Ok(doc) => doc.and_then(|doc| get_bool_in(&doc, key)),
            Err(e) => {
                warn!(%scope, error = %e, "ignoring unreadable settings");
                None
            }
        }
    }

    async fn set_bool(&self, scope: SettingScope, key: &str, value: bool) -> Result<(), HostError> {
        self.write_bool(scope, key, value)?;
        Ok(())
    }
}

/// Read a settings file for editing. Returns `None` if it doesn't exist.
pub fn read_document(path: &Path) -> Result<Option<toml_edit::DocumentMut>, SettingsError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|e| SettingsError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    let doc = text.parse::<toml_edit::DocumentMut>().map_err(|e| SettingsError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(Some(doc))
}

/// Write a settings document, creating parent directories as needed.
pub fn write_document(path: &Path, doc: &toml_edit::DocumentMut) -> Result<(), SettingsError> {
    let write_err = |e: std::io::Error| SettingsError::WriteError {
        path: path.to_path_buf(),
        source: e,
    };
    atomic_write(path, doc.to_string().as_bytes()).map_err(write_err)
}

/// Split `table.field` into its parts; a key without a dot is top-level.
fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once('.') {
        Some((table, field)) => (Some(table), field),
        None => (None, key),
    }
}

/// Look up a dotted boolean key in a settings document.
pub fn get_bool_in(doc: &toml_edit::DocumentMut, key: &str) -> Option<bool> {
    let item = match split_key(key) {
        (Some(table), field) => doc.get(table)?.get(field)?,
        (None, field) => doc.get(field)?,
    };
    item.as_bool()
}

/// Set a dotted boolean key, creating its table if needed. Fails with the
/// table name when that name is taken by a non-table value.
pub fn set_bool_in(doc: &mut toml_edit::DocumentMut, key: &str, value: bool) -> Result<(), String> {
    match split_key(key) {
        (Some(table), field) => {
            match doc.get(table) {
                None => doc[table] = toml_edit::Item::Table(toml_edit::Table::new()),
                Some(item) if !item.is_table_like() => return Err(table.to_string()),
                Some(_) => {}
            }
            doc[table][field] = toml_edit::value(value);
        }
        (None, field) => doc[field] = toml_edit::value(value),
    }
    Ok(())
}
