//! Best-effort persistence of user-adjustable settings.
//!
//! The controller works fine without it: a missing or unreadable file just
//! means config defaults apply, and a failed save is logged and forgotten.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::tariff::TariffWindow;
use crate::domain::types::ClockTime;

/// Settings the user can change at runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub target_soc_percent: f64,
    pub ready_by: Option<ClockTime>,
    pub tariff: TariffWindow,
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load persisted settings; `None` when absent or unreadable
    async fn load(&self) -> Option<UserSettings>;
    /// Persist settings; failures are logged, never propagated
    async fn save(&self, settings: &UserSettings);
}

/// TOML-file-backed store
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load(&self) -> Option<UserSettings> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "no persisted settings");
                return None;
            }
        };
        match toml::from_str(&raw) {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "persisted settings unreadable");
                None
            }
        }
    }

    async fn save(&self, settings: &UserSettings) {
        let serialized = match toml::to_string_pretty(settings) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "could not serialize settings");
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&self.path, serialized).await {
            warn!(path = %self.path.display(), error = %e, "could not persist settings");
        }
    }
}

/// In-memory store for tests and ephemeral deployments
#[derive(Default)]
pub struct MemorySettingsStore {
    inner: tokio::sync::RwLock<Option<UserSettings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Option<UserSettings> {
        self.inner.read().await.clone()
    }

    async fn save(&self, settings: &UserSettings) {
        *self.inner.write().await = Some(settings.clone());
    }
}
