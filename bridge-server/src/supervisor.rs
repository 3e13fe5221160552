//! Supervisor - owns the runtime configuration and the cloud poller
//!
//! All mutation of the runtime configuration goes through here. Pollers
//! never see changes: they get a snapshot at construction and are replaced
//! wholesale when anything relevant changes.

use crate::cloud::{CloudPoller, QueueStore};
use crate::config::{self, ConfigStore, RuntimeConfig};
use crate::error::BridgeResult;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct Supervisor {
    config_store: ConfigStore,
    config: Mutex<RuntimeConfig>,
    poller: Mutex<Option<CloudPoller>>,
    /// Claim identity, stable for the process lifetime
    device_id: String,
    /// Alternative document store endpoint (emulators, tests)
    store_base_url: Option<String>,
}

impl Supervisor {
    pub fn new(config_store: ConfigStore, initial: RuntimeConfig) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "bridge".to_string());
        let device_id = format!("{host}-{}", chrono::Utc::now().timestamp_millis());

        Self {
            config_store,
            config: Mutex::new(initial),
            poller: Mutex::new(None),
            device_id,
            store_base_url: None,
        }
    }

    /// Point new pollers at a different store endpoint (emulators, tests)
    pub fn with_store_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.store_base_url = Some(base_url.into());
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Snapshot of the current runtime configuration
    pub async fn runtime_config(&self) -> RuntimeConfig {
        self.config.lock().await.clone()
    }

    /// Commit a new restaurant binding: persist it, adopt it, restart the
    /// poller. The config file keeps any keys it already had.
    pub async fn set_restaurant_id(
        &self,
        restaurant_id: String,
        device_name: Option<String>,
    ) -> BridgeResult<()> {
        let mut saved = self.config_store.load();
        saved.insert(config::KEY_RESTAURANT_ID.to_string(), restaurant_id.clone());
        if let Some(name) = &device_name {
            saved.insert(config::KEY_DEVICE_NAME.to_string(), name.clone());
        }
        {
            let current = self.config.lock().await;
            if !current.cloud_project_id.is_empty() {
                saved
                    .entry(config::KEY_FIREBASE_PROJECT_ID.to_string())
                    .or_insert_with(|| current.cloud_project_id.clone());
            }
        }
        // Persist first: a write failure must leave the running state alone
        self.config_store.save(&saved)?;

        {
            let mut current = self.config.lock().await;
            current.restaurant_id = restaurant_id;
            if let Some(name) = device_name {
                current.device_name = name;
            }
        }

        self.restart_cloud().await;
        Ok(())
    }

    /// Drop the stored binding and stop cloud polling
    pub async fn clear_config(&self) {
        self.config_store.clear();
        {
            let mut current = self.config.lock().await;
            current.restaurant_id.clear();
            current.device_name.clear();
        }
        self.restart_cloud().await;
    }

    /// Stop the current poller, then start a fresh one when a restaurant is
    /// configured. Called at startup and after every config commit.
    pub async fn restart_cloud(&self) {
        let mut poller = self.poller.lock().await;
        if let Some(previous) = poller.take() {
            previous.stop();
        }

        let cfg = self.config.lock().await.clone();
        if cfg.restaurant_id.is_empty() {
            info!("Cloud polling disabled (no restaurant configured)");
            return;
        }
        if cfg.cloud_project_id.is_empty() {
            warn!(
                restaurant_id = %cfg.restaurant_id,
                "Restaurant configured but no cloud project set, cloud polling disabled"
            );
            return;
        }

        let mut store = match QueueStore::new(&cfg.cloud_project_id, &cfg.restaurant_id) {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "Could not build queue store, cloud polling disabled");
                return;
            }
        };
        if let Some(base_url) = &self.store_base_url {
            store = store.with_base_url(base_url.clone());
        }

        info!(
            restaurant_id = %cfg.restaurant_id,
            project_id = %cfg.cloud_project_id,
            device_id = %self.device_id,
            "Starting cloud queue poller"
        );
        let fresh = CloudPoller::new(store, self.device_id.clone(), cfg.device_name.clone());
        fresh.start();
        *poller = Some(fresh);
    }

    /// Whether a poller is currently running
    pub async fn cloud_active(&self) -> bool {
        self.poller.lock().await.is_some()
    }

    /// Stop polling without touching configuration (process shutdown)
    pub async fn shutdown(&self) {
        if let Some(poller) = self.poller.lock().await.take() {
            poller.stop();
        }
    }
}
