//! Credential discovery (C9): probe a device with an ordered list of
//! candidate credentials and learn which one it accepts (§4.9).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use vcollector_model::{Credential, CredentialTestOutcome, Device, DeviceId, DeviceInventory};
use vcollector_ssh::{SessionError, SshSession};
use vcollector_vault::Vault;

/// §4.9 options: `skip_configured`, `skip_recently_tested`, `recent_hours`,
/// `update_devices`, plus the device-level worker pool size.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub skip_configured: bool,
    pub skip_recently_tested: bool,
    pub recent_hours: i64,
    pub update_devices: bool,
    pub max_workers: usize,
    /// Offer legacy KEX/cipher/host-key algorithms first during the probe
    /// connection (§4.3 Connect) — useful when discovering against the
    /// same older gear a legacy-mode job would target.
    pub legacy_mode: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        DiscoveryOptions {
            skip_configured: false,
            skip_recently_tested: false,
            recent_hours: 24,
            update_devices: true,
            max_workers: 12,
            legacy_mode: vcollector_ssh::config::legacy_mode(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiscoveryOutcome {
    /// A candidate credential authenticated (§4.9 step 5-7).
    Matched { credential_name: String, attempts: usize },
    /// Every candidate was rejected with `auth`/`kex`, or iteration stopped
    /// early on a non-auth error (§4.9 step 6, 8).
    NoMatch { attempts: usize },
    /// The device was never dispatched (no IP, already configured, or
    /// recently tested) — not counted as a match attempt (§4.9 steps 1-3).
    Skipped { reason: &'static str },
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DiscoveryResult {
    pub device: DeviceId,
    pub outcome: DiscoveryOutcome,
}

pub type ProgressCallback = Arc<dyn Fn(usize, usize, &DiscoveryResult) + Send + Sync>;

/// Build the per-device candidate order (§4.9 step 4): the device's
/// currently preferred credential first (deduplicated), then the rest of
/// the supplied candidate list in order.
pub fn candidate_order<'a>(device: &Device, candidate_names: &'a [String]) -> Vec<&'a str> {
    let mut order = Vec::with_capacity(candidate_names.len());
    if let Some(preferred) = &device.preferred_credential {
        if let Some(name) = candidate_names.iter().find(|n| *n == preferred) {
            order.push(name.as_str());
        }
    }
    for name in candidate_names {
        if !order.contains(&name.as_str()) {
            order.push(name.as_str());
        }
    }
    order
}

fn should_skip(device: &Device, options: &DiscoveryOptions, now: DateTime<Utc>) -> Option<&'static str> {
    if device.primary_ip4.trim().is_empty() {
        return Some("no primary ipv4");
    }
    if options.skip_configured && device.preferred_credential.is_some() {
        return Some("credential already configured");
    }
    if options.skip_recently_tested {
        if let Some(tested_at) = device.credential_tested_at {
            if now - tested_at < ChronoDuration::hours(options.recent_hours) {
                return Some("recently tested");
            }
        }
    }
    None
}

/// Probe a single candidate: open a session, detect the prompt, and close
/// it again — success means both steps completed (§4.9 step 5).
async fn probe_credential(
    host: &str,
    port: u16,
    credential: &Credential,
    legacy_mode: bool,
) -> Result<String, SessionError> {
    let mut session = SshSession::connect_with_timeout(
        host,
        port,
        credential,
        vcollector_ssh::config::connect_timeout(),
        legacy_mode,
    )
    .await?;
    session.open_shell().await?;
    let prompt = session.find_prompt().await?;
    if let Err(disconnect_err) = session.disconnect().await {
        debug!(%disconnect_err, "discovery probe: disconnect failed, ignoring");
    }
    Ok(prompt)
}

async fn discover_one(
    device: Device,
    candidate_names: Vec<String>,
    vault: Vault,
    options: DiscoveryOptions,
) -> DiscoveryResult {
    let now = Utc::now();
    if let Some(reason) = should_skip(&device, &options, now) {
        return DiscoveryResult {
            device: device.id.clone(),
            outcome: DiscoveryOutcome::Skipped { reason },
        };
    }

    let order = candidate_order(&device, &candidate_names);
    let mut attempts = 0usize;

    for name in order {
        attempts += 1;
        let credential = match vault.get(Some(name)).await {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                warn!(device = %device.name, credential = name, "candidate not found in vault, skipping");
                continue;
            }
            Err(err) => {
                warn!(device = %device.name, credential = name, %err, "vault lookup failed, skipping candidate");
                continue;
            }
        };

        match probe_credential(&device.primary_ip4, device.ssh_port, &credential, options.legacy_mode).await {
            Ok(_prompt) => {
                info!(device = %device.name, credential = name, attempts, "credential discovery matched");
                return DiscoveryResult {
                    device: device.id.clone(),
                    outcome: DiscoveryOutcome::Matched {
                        credential_name: name.to_string(),
                        attempts,
                    },
                };
            }
            Err(err) => {
                let category = err.category();
                if category.stops_discovery() {
                    debug!(device = %device.name, credential = name, %category, "non-auth error, stopping discovery for this device");
                    break;
                }
                debug!(device = %device.name, credential = name, %category, "credential rejected, trying next");
            }
        }
    }

    DiscoveryResult {
        device: device.id.clone(),
        outcome: DiscoveryOutcome::NoMatch { attempts },
    }
}

/// Run discovery against every device, fanned out across a bounded worker
/// pool (§4.9: "parallelized across devices ... per-device credential
/// iteration is sequential"). When `options.update_devices` is set and
/// `inventory` is provided, writes back the matched/failed preferred
/// credential and test outcome (§6 "Mutation surface used: update_device").
pub async fn discover(
    devices: Vec<Device>,
    candidate_names: Vec<String>,
    vault: Vault,
    inventory: Option<Arc<dyn DeviceInventory>>,
    options: DiscoveryOptions,
    progress: Option<ProgressCallback>,
) -> Vec<DiscoveryResult> {
    let total = devices.len();
    let semaphore = Arc::new(Semaphore::new(options.max_workers.max(1)));
    let mut tasks = FuturesUnordered::new();

    for device in devices {
        let semaphore = semaphore.clone();
        let candidate_names = candidate_names.clone();
        let vault = vault.clone();
        let options = options.clone();

        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            discover_one(device, candidate_names, vault, options).await
        }));
    }

    let mut results = Vec::with_capacity(total);
    let mut completed = 0usize;
    while let Some(joined) = tasks.next().await {
        let Ok(result) = joined else {
            continue;
        };
        completed += 1;

        if options.update_devices {
            if let Some(inventory) = &inventory {
                let (credential_name, tested_at, test_result) = match &result.outcome {
                    DiscoveryOutcome::Matched { credential_name, .. } => (
                        Some(credential_name.clone()),
                        Some(Utc::now()),
                        Some(CredentialTestOutcome::Success),
                    ),
                    DiscoveryOutcome::NoMatch { .. } => {
                        (None, Some(Utc::now()), Some(CredentialTestOutcome::Failed))
                    }
                    DiscoveryOutcome::Skipped { .. } => (None, None, None),
                };
                if tested_at.is_some() || credential_name.is_some() {
                    inventory
                        .update_device(&result.device, credential_name, tested_at, test_result)
                        .await;
                }
            }
        }

        if let Some(progress) = &progress {
            progress(completed, total, &result);
        }
        results.push(result);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcollector_model::PlatformHints;

    fn device(preferred: Option<&str>, ip: &str) -> Device {
        Device {
            id: "d1".into(),
            name: "r1".into(),
            primary_ip4: ip.into(),
            ssh_port: 22,
            preferred_credential: preferred.map(String::from),
            platform: PlatformHints::default(),
            site: None,
            role: None,
            status: None,
            credential_test_result: CredentialTestOutcome::Untested,
            credential_tested_at: None,
        }
    }

    #[test]
    fn candidate_order_puts_preferred_first() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let dev = device(Some("c"), "10.0.0.1");
        assert_eq!(candidate_order(&dev, &names), vec!["c", "a", "b"]);
    }

    #[test]
    fn candidate_order_without_preferred_keeps_supplied_order() {
        let names = vec!["a".to_string(), "b".to_string()];
        let dev = device(None, "10.0.0.1");
        assert_eq!(candidate_order(&dev, &names), vec!["a", "b"]);
    }

    #[test]
    fn skips_devices_with_no_ip() {
        let dev = device(None, "");
        let options = DiscoveryOptions::default();
        assert_eq!(should_skip(&dev, &options, Utc::now()), Some("no primary ipv4"));
    }

    #[test]
    fn skip_configured_honors_flag() {
        let dev = device(Some("a"), "10.0.0.1");
        let mut options = DiscoveryOptions::default();
        options.skip_configured = true;
        assert_eq!(
            should_skip(&dev, &options, Utc::now()),
            Some("credential already configured")
        );

        options.skip_configured = false;
        assert_eq!(should_skip(&dev, &options, Utc::now()), None);
    }

    #[test]
    fn skip_recently_tested_honors_window() {
        let mut dev = device(None, "10.0.0.1");
        dev.credential_tested_at = Some(Utc::now());
        let mut options = DiscoveryOptions::default();
        options.skip_recently_tested = true;
        options.recent_hours = 24;
        assert_eq!(should_skip(&dev, &options, Utc::now()), Some("recently tested"));

        let far_future = Utc::now() + ChronoDuration::hours(48);
        assert_eq!(should_skip(&dev, &options, far_future), None);
    }
}
