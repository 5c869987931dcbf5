//! API key for the remote HTTP backend.
//!
//! Lookup order: the `FLASHGEN_API_KEY` environment variable, then the key
//! saved with `flashgen backend --set-key`, then `api_key` in the settings.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dialoguer::{Password, theme::ColorfulTheme};
use serde::{Deserialize, Serialize};

use crate::config::BackendConfig;
use crate::palette::Palette;
use crate::utils::{get_data_dir, strip_controls_and_escapes, trim_line};

pub const API_KEY_ENV: &str = "FLASHGEN_API_KEY";

const CREDENTIALS_FILE_NAME: &str = "credentials.toml";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    remote_api_key: Option<String>,
}

/// The file holding a saved remote API key.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self> {
        Ok(Self::new(get_data_dir()?.join(CREDENTIALS_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn saved_key(&self) -> Result<Option<String>> {
        Ok(self.read()?.remote_api_key.and_then(non_blank))
    }

    pub fn save_key(&self, api_key: &str) -> Result<()> {
        let key = trim_line(api_key).context("Cannot store an empty API key")?;
        let credentials = Credentials {
            remote_api_key: Some(key.to_string()),
        };
        let contents = toml::to_string(&credentials)?;
        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    /// Returns whether a key was removed.
    pub fn clear_key(&self) -> Result<bool> {
        if self.saved_key()?.is_none() {
            return Ok(false);
        }
        fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        Ok(true)
    }

    fn read(&self) -> Result<Credentials> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", self.path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Credentials::default()),
            Err(err) => Err(err).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }
}

/// Key for the configured backend. Local backends never need one.
pub fn resolve_api_key(config: &BackendConfig) -> Result<Option<String>> {
    let from_env = std::env::var(API_KEY_ENV).ok();
    resolve_api_key_from(config, from_env, &CredentialStore::default_location()?)
}

fn resolve_api_key_from(
    config: &BackendConfig,
    from_env: Option<String>,
    store: &CredentialStore,
) -> Result<Option<String>> {
    let BackendConfig::RemoteHttp { api_key, .. } = config else {
        return Ok(None);
    };
    if let Some(key) = from_env.and_then(non_blank) {
        return Ok(Some(key));
    }
    if let Some(key) = store.saved_key()? {
        return Ok(Some(key));
    }
    Ok(api_key.clone().and_then(non_blank))
}

pub fn store_api_key(api_key: &str) -> Result<PathBuf> {
    let store = CredentialStore::default_location()?;
    store.save_key(api_key)?;
    Ok(store.path().to_path_buf())
}

pub fn clear_api_key() -> Result<bool> {
    CredentialStore::default_location()?.clear_key()
}

pub fn prompt_for_api_key() -> Result<String> {
    println!(
        "{} for the remote HTTP backend.",
        Palette::paint(Palette::SUCCESS, "Enter the API key")
    );
    let raw = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("API key")
        .interact()?;
    Ok(strip_controls_and_escapes(&raw))
}

fn non_blank(value: String) -> Option<String> {
    trim_line(&value).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn remote(api_key: Option<&str>) -> BackendConfig {
        BackendConfig::RemoteHttp {
            url: Some("http://127.0.0.1:9/generate".into()),
            api_key: api_key.map(str::to_string),
        }
    }

    #[test]
    fn saved_key_round_trips_and_clears() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join(CREDENTIALS_FILE_NAME));

        assert_eq!(store.saved_key().unwrap(), None);
        assert!(!store.clear_key().unwrap());

        store.save_key("first").unwrap();
        store.save_key("  second ").unwrap();
        assert_eq!(store.saved_key().unwrap().as_deref(), Some("second"));

        assert!(store.clear_key().unwrap());
        assert!(!store.path().exists());
    }

    #[test]
    fn blank_key_is_rejected() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join(CREDENTIALS_FILE_NAME));
        assert!(store.save_key("   ").is_err());
        assert!(!store.path().exists());
    }

    #[test]
    fn environment_beats_saved_key_beats_settings() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join(CREDENTIALS_FILE_NAME));
        let config = remote(Some("from-settings"));

        let key = resolve_api_key_from(&config, None, &store).unwrap();
        assert_eq!(key.as_deref(), Some("from-settings"));

        store.save_key("from-file").unwrap();
        let key = resolve_api_key_from(&config, None, &store).unwrap();
        assert_eq!(key.as_deref(), Some("from-file"));

        let key = resolve_api_key_from(&config, Some("from-env".into()), &store).unwrap();
        assert_eq!(key.as_deref(), Some("from-env"));

        let key = resolve_api_key_from(&config, Some("  ".into()), &store).unwrap();
        assert_eq!(key.as_deref(), Some("from-file"));
    }

    #[test]
    fn local_backends_need_no_key() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join(CREDENTIALS_FILE_NAME));
        store.save_key("unused").unwrap();

        let key =
            resolve_api_key_from(&BackendConfig::default(), Some("env".into()), &store).unwrap();
        assert_eq!(key, None);
    }

    #[test]
    fn unreadable_credentials_are_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CREDENTIALS_FILE_NAME);
        fs::write(&path, "remote_api_key = [").unwrap();
        assert!(CredentialStore::new(path).saved_key().is_err());
    }
}
