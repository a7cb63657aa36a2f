use crate::device::{Device, DeviceFilter};
use crate::result::HistoryRow;
use async_trait::async_trait;

/// Query interface onto the external DCIM device source (§6). The DCIM
/// schema itself is out of scope (spec.md Non-goals); this is the boundary
/// the core reads through and, for discovery, writes back through.
#[async_trait]
pub trait DeviceInventory: Send + Sync {
    async fn query(&self, filter: &DeviceFilter, limit: Option<usize>) -> Vec<Device>;

    /// Update a device's preferred credential and/or credential test
    /// outcome (§6 "Mutation surface used: update_device"). A no-op default
    /// is provided for inventories that do not support mutation (e.g. a
    /// read-only snapshot used in job-running contexts).
    async fn update_device(
        &self,
        _device_id: &str,
        _credential_name: Option<String>,
        _tested_at: Option<chrono::DateTime<chrono::Utc>>,
        _test_result: Option<crate::device::CredentialTestOutcome>,
    ) {
    }
}

/// Collector-history store (§6 "History store (produced)"). Implemented by
/// `vcollector_engine` with an in-memory and a file-backed variant.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn create(&self, row: HistoryRow);
    async fn update(&self, row: HistoryRow);
    async fn get(&self, id: &str) -> Option<HistoryRow>;
}
