//! Device registry lookups. Actuation commands are forwarded to whatever this
//! resolves, never to a hardcoded address.

use tracing::warn;

use crate::store::{Device, Store};

/// Where to send an actuation command: a base URL like `http://192.168.1.100`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    pub base_url: String,
}

impl ForwardTarget {
    fn from_device(device: &Device) -> ForwardTarget {
        let base_url = if device.ip.starts_with("http://") || device.ip.starts_with("https://") {
            device.ip.clone()
        } else {
            format!("http://{}", device.ip)
        };
        ForwardTarget { base_url }
    }
}

#[derive(Clone)]
pub struct Directory {
    store: Store,
    default_target: Option<String>,
    controller_type: String,
}

impl Directory {
    pub fn new(store: Store, default_target: Option<String>, controller_type: String) -> Directory {
        Directory {
            store,
            default_target,
            controller_type,
        }
    }

    /// Idempotent upsert keyed by `name`; refreshes `last_seen` on every call.
    pub async fn register(
        &self,
        name: &str,
        ip: &str,
        device_type: &str,
    ) -> Result<Device, sqlx::Error> {
        self.store.upsert_device(name, ip, device_type).await
    }

    pub async fn list(&self) -> Result<Vec<Device>, sqlx::Error> {
        self.store.list_devices().await
    }

    /// Resolution order: the configured default target if one is set, else the
    /// most recently seen device of the controller type. `None` means there is
    /// nowhere to forward to.
    pub async fn resolve_target(&self) -> Option<ForwardTarget> {
        if let Some(base_url) = &self.default_target {
            return Some(ForwardTarget {
                base_url: base_url.clone(),
            });
        }
        match self
            .store
            .most_recent_device_of_type(&self.controller_type)
            .await
        {
            Ok(device) => device.as_ref().map(ForwardTarget::from_device),
            Err(e) => {
                warn!("target resolution failed: {e}");
                None
            }
        }
    }
}
