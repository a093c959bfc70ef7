//! Shared, observable settings store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::loader::{ConfigManager, TartConfig};

/// Cloneable handle to the live settings.
///
/// Updates are validated before they become visible, optionally persisted,
/// and then broadcast to every [`watch::Receiver`] obtained from
/// [`SettingsHandle::subscribe`].
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    sender: watch::Sender<TartConfig>,
    persist_to: Option<PathBuf>,
    update_lock: Mutex<()>,
}

impl SettingsHandle {
    /// In-memory settings; updates are not written anywhere.
    pub fn new(config: TartConfig) -> Self {
        Self::build(config, None)
    }

    /// Settings that are saved to `path` on every accepted update.
    pub fn with_persistence(config: TartConfig, path: impl Into<PathBuf>) -> Self {
        Self::build(config, Some(path.into()))
    }

    /// Settings seeded from a loaded manager, persisted to its save path.
    pub fn from_manager(manager: &ConfigManager) -> Result<Self> {
        let path = manager.save_path()?;
        Ok(Self::with_persistence(manager.config().clone(), path))
    }

    fn build(config: TartConfig, persist_to: Option<PathBuf>) -> Self {
        let (sender, _initial_receiver) = watch::channel(config);
        Self {
            inner: Arc::new(Inner {
                sender,
                persist_to,
                update_lock: Mutex::new(()),
            }),
        }
    }

    /// Snapshot of the current settings.
    pub fn get(&self) -> TartConfig {
        self.inner.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TartConfig> {
        self.inner.sender.subscribe()
    }

    pub fn persistence_path(&self) -> Option<&Path> {
        self.inner.persist_to.as_deref()
    }

    /// Apply `change` to a copy of the settings. Returns `Ok(false)` when the
    /// change is a no-op; invalid results are rejected and nothing changes.
    pub fn update<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut TartConfig),
    {
        let _guard = self.inner.update_lock.lock();
        let mut candidate = self.get();
        change(&mut candidate);

        if *self.inner.sender.borrow() == candidate {
            return Ok(false);
        }

        candidate
            .validate()
            .context("Rejected settings update")?;

        if let Some(path) = &self.inner.persist_to {
            ConfigManager::save_config_to_path(path, &candidate)
                .with_context(|| format!("Failed to persist settings to {}", path.display()))?;
        }

        tracing::info!(
            api_url = %candidate.api_url,
            refresh_rate = candidate.refresh_rate,
            "settings updated"
        );
        self.inner.sender.send_replace(candidate);
        Ok(true)
    }

    pub fn set_api_url(&self, api_url: impl Into<String>) -> Result<bool> {
        let api_url = api_url.into();
        self.update(|config| config.api_url = api_url.trim().to_owned())
    }

    pub fn set_refresh_rate(&self, seconds: u64) -> Result<bool> {
        self.update(|config| config.refresh_rate = seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_accepted_updates() {
        let handle = SettingsHandle::new(TartConfig::default());
        let mut receiver = handle.subscribe();

        assert!(handle.set_api_url("http://tart.local:9000").expect("update"));
        receiver.changed().await.expect("changed");
        assert_eq!(receiver.borrow_and_update().api_url, "http://tart.local:9000");
        assert_eq!(handle.get().api_url, "http://tart.local:9000");
    }

    #[test]
    fn noop_and_invalid_updates_leave_settings_untouched() {
        let handle = SettingsHandle::new(TartConfig::default());
        let receiver = handle.subscribe();

        assert!(!handle.set_refresh_rate(5).expect("noop"));
        assert!(handle.set_refresh_rate(0).is_err());
        assert!(handle.set_api_url("ws://wrong").is_err());

        assert_eq!(handle.get(), TartConfig::default());
        assert!(!receiver.has_changed().expect("sender alive"));
    }

    #[test]
    fn accepted_updates_are_persisted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tartwatch.toml");
        let handle = SettingsHandle::with_persistence(TartConfig::default(), &path);

        handle.set_refresh_rate(12).expect("update");

        let saved: TartConfig =
            toml::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(saved.refresh_rate, 12);
    }
}
