use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type DeviceId = String;

/// Outcome of the most recent credential test against a device (§3, §4.9).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialTestOutcome {
    Success,
    Failed,
    Untested,
}

impl Default for CredentialTestOutcome {
    fn default() -> Self {
        CredentialTestOutcome::Untested
    }
}

/// Vendor/platform metadata used to pick a paging-disable command and as a
/// hint to the template scorer's filter string (§4.5, §4.8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformHints {
    /// Free-form vendor name as reported by the DCIM source, e.g.
    /// "Cisco Systems, Inc.".
    pub vendor: Option<String>,
    /// Netmiko-style short platform tag, e.g. "cisco_ios", "arista_eos".
    pub netmiko_type: Option<String>,
    /// Command that disables output paging on this platform, if any.
    pub paging_disable_cmd: Option<String>,
}

/// A device consumed from the external DCIM source (§3, out of scope per
/// spec.md's Non-goals — this struct is only the shape the core reads).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub primary_ip4: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default)]
    pub preferred_credential: Option<String>,
    #[serde(default)]
    pub platform: PlatformHints,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub credential_test_result: CredentialTestOutcome,
    #[serde(default)]
    pub credential_tested_at: Option<DateTime<Utc>>,
}

fn default_ssh_port() -> u16 {
    22
}

/// Filter fields a job definition may apply when resolving its device set
/// (§3 JobDefinition, §6 DCIM repository).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceFilter {
    pub site: Option<String>,
    pub role: Option<String>,
    pub platform: Option<String>,
    pub status: Option<String>,
    pub name_pattern: Option<String>,
}

impl DeviceFilter {
    /// True if `device` satisfies every set field of this filter. An unset
    /// field matches anything.
    pub fn matches(&self, device: &Device) -> bool {
        if let Some(site) = &self.site {
            if device.site.as_deref() != Some(site.as_str()) {
                return false;
            }
        }
        if let Some(role) = &self.role {
            if device.role.as_deref() != Some(role.as_str()) {
                return false;
            }
        }
        if let Some(platform) = &self.platform {
            if device.platform.netmiko_type.as_deref() != Some(platform.as_str()) {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if device.status.as_deref() != Some(status.as_str()) {
                return false;
            }
        }
        if let Some(pattern) = &self.name_pattern {
            if !device.name.contains(pattern.as_str()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        Device {
            id: "1".into(),
            name: "core-sw-01".into(),
            primary_ip4: "10.0.0.1".into(),
            ssh_port: 22,
            preferred_credential: None,
            platform: PlatformHints {
                vendor: Some("Cisco Systems, Inc.".into()),
                netmiko_type: Some("cisco_ios".into()),
                paging_disable_cmd: Some("terminal length 0".into()),
            },
            site: Some("dc1".into()),
            role: Some("core".into()),
            status: Some("active".into()),
            credential_test_result: CredentialTestOutcome::Untested,
            credential_tested_at: None,
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(DeviceFilter::default().matches(&device()));
    }

    #[test]
    fn filter_rejects_on_mismatched_field() {
        let filter = DeviceFilter {
            role: Some("edge".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&device()));
    }

    #[test]
    fn name_pattern_is_substring_match() {
        let filter = DeviceFilter {
            name_pattern: Some("core-sw".into()),
            ..Default::default()
        };
        assert!(filter.matches(&device()));
    }
}
