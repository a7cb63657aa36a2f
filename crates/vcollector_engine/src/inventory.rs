//! In-process `DeviceInventory` for standalone use and tests. The real DCIM
//! integration is out of scope (spec.md Non-goals, §6); this is a usable
//! stand-in that speaks the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use vcollector_model::{CredentialTestOutcome, Device, DeviceFilter, DeviceInventory};

pub struct InMemoryInventory {
    devices: RwLock<HashMap<String, Device>>,
}

impl InMemoryInventory {
    pub fn new(devices: Vec<Device>) -> Self {
        InMemoryInventory {
            devices: RwLock::new(devices.into_iter().map(|d| (d.id.clone(), d)).collect()),
        }
    }

    pub async fn insert(&self, device: Device) {
        self.devices.write().await.insert(device.id.clone(), device);
    }

    pub async fn get(&self, id: &str) -> Option<Device> {
        self.devices.read().await.get(id).cloned()
    }
}

#[async_trait]
impl DeviceInventory for InMemoryInventory {
    async fn query(&self, filter: &DeviceFilter, limit: Option<usize>) -> Vec<Device> {
        let devices = self.devices.read().await;
        let mut matched: Vec<Device> = devices.values().filter(|d| filter.matches(d)).cloned().collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = limit {
            matched.truncate(limit);
        }
        matched
    }

    async fn update_device(
        &self,
        device_id: &str,
        credential_name: Option<String>,
        tested_at: Option<DateTime<Utc>>,
        test_result: Option<CredentialTestOutcome>,
    ) {
        let mut devices = self.devices.write().await;
        if let Some(device) = devices.get_mut(device_id) {
            if let Some(credential_name) = credential_name {
                device.preferred_credential = Some(credential_name);
            }
            if let Some(tested_at) = tested_at {
                device.credential_tested_at = Some(tested_at);
            }
            if let Some(test_result) = test_result {
                device.credential_test_result = test_result;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcollector_model::PlatformHints;

    fn device(id: &str, site: &str) -> Device {
        Device {
            id: id.into(),
            name: format!("dev-{id}"),
            primary_ip4: "10.0.0.1".into(),
            ssh_port: 22,
            preferred_credential: None,
            platform: PlatformHints::default(),
            site: Some(site.into()),
            role: None,
            status: None,
            credential_test_result: CredentialTestOutcome::Untested,
            credential_tested_at: None,
        }
    }

    #[tokio::test]
    async fn query_filters_by_site_and_respects_limit() {
        let inventory = InMemoryInventory::new(vec![device("1", "dc1"), device("2", "dc1"), device("3", "dc2")]);
        let filter = DeviceFilter {
            site: Some("dc1".into()),
            ..Default::default()
        };
        let result = inventory.query(&filter, Some(1)).await;
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].site.as_deref(), Some("dc1"));
    }

    #[tokio::test]
    async fn update_device_writes_back_credential_fields() {
        let inventory = InMemoryInventory::new(vec![device("1", "dc1")]);
        let now = Utc::now();
        inventory
            .update_device("1", Some("lab".into()), Some(now), Some(CredentialTestOutcome::Success))
            .await;
        let updated = inventory.get("1").await.unwrap();
        assert_eq!(updated.preferred_credential.as_deref(), Some("lab"));
        assert_eq!(updated.credential_test_result, CredentialTestOutcome::Success);
    }
}
