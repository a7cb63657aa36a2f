//! Job Runner (C8): resolves a job's device set, drives the executor pool,
//! validates and persists output, and keeps the history row in sync (§4.8).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::fs;
use tracing::{debug, warn};
use vcollector_model::{
    Credential, DeviceError, DeviceInventory, ErrorCategory, HistoryRow, HistoryStore,
    JobDefinition, JobResult, SaveRecord, ValidationFailure,
};
use vcollector_templates::TemplateStore;
use vcollector_vault::Vault;

use crate::pool::{ExecutorOptions, ExecutorPool, ExecutorTarget, ProgressCallback};

pub struct JobRunner {
    inventory: Arc<dyn DeviceInventory>,
    history: Arc<dyn HistoryStore>,
    vault: Vault,
    templates: Arc<dyn TemplateStore>,
}

impl JobRunner {
    pub fn new(
        inventory: Arc<dyn DeviceInventory>,
        history: Arc<dyn HistoryStore>,
        vault: Vault,
        templates: Arc<dyn TemplateStore>,
    ) -> Self {
        JobRunner {
            inventory,
            history,
            vault,
            templates,
        }
    }

    /// Run one resolved job definition end to end (§4.8 steps 2-9).
    /// Resolving a `JobRef` to a `JobDefinition` (step 1) is the caller's
    /// concern: both a database-backed and a legacy file-backed source
    /// produce the same `JobDefinition` shape before reaching here.
    pub async fn run(&self, job: &JobDefinition, progress: Option<ProgressCallback>) -> JobResult {
        let started_at = Utc::now();
        let history_id = uuid::Uuid::new_v4().to_string();
        self.history
            .create(HistoryRow::open(history_id.clone(), job.job_id.clone(), started_at))
            .await;

        let mut devices = self
            .inventory
            .query(&job.device_filter, job.limit)
            .await;

        if devices.is_empty() {
            warn!(job_id = %job.job_id, "no devices match filter");
            let finished_at = Utc::now();
            let mut row = HistoryRow::open(history_id.clone(), job.job_id.clone(), started_at);
            row.finished_at = Some(finished_at);
            row.status = vcollector_model::HistoryStatus::Failed;
            row.error_message = Some("no devices match filter".to_string());
            self.history.update(row).await;

            return JobResult {
                job_id: job.job_id.clone(),
                started_at,
                finished_at,
                success_count: 0,
                failed_count: 0,
                validation_skipped_count: 0,
                skipped_before_dispatch: 0,
                device_results: Vec::new(),
                saved_files: Vec::new(),
                device_errors: Vec::new(),
                validation_failures: Vec::new(),
                job_error: Some("no devices match filter".to_string()),
                history_id: Some(history_id),
            };
        }

        let skipped_before_dispatch = devices.iter().filter(|d| d.primary_ip4.trim().is_empty()).count();
        devices.retain(|d| !d.primary_ip4.trim().is_empty());

        let assembled_command = job.commands.assemble();
        let prompt_count = job.commands.default_prompt_count();

        let mut credential_cache: HashMap<String, Credential> = HashMap::new();
        let mut targets = Vec::with_capacity(devices.len());

        for device in &devices {
            let credential_override = match &device.preferred_credential {
                Some(name) => match self.lookup_credential(&mut credential_cache, name).await {
                    Some(credential) => Some(credential),
                    None => {
                        debug!(device = %device.name, credential = name, "preferred credential not resolvable, falling back to pool default");
                        None
                    }
                },
                None => None,
            };

            targets.push(ExecutorTarget {
                device_id: device.id.clone(),
                host: device.primary_ip4.clone(),
                port: device.ssh_port,
                command: assembled_command.clone(),
                prompt_count,
                credential_override,
            });
        }

        let default_credential = self.lookup_default_credential().await;

        let mut options = ExecutorOptions::default();
        options.max_workers = job.execution.max_workers;
        options.expect_prompt_timeout = Duration::from_secs(job.execution.timeout_secs.max(1));
        options.inter_command_time = Duration::from_secs_f64(job.execution.inter_command_time_secs.max(0.0));
        options.legacy_mode = job.execution.legacy_mode;

        let pool = ExecutorPool::new(default_credential, options);
        let (device_results, _summary) = pool.run(targets, progress).await;

        let mut success_count = 0usize;
        let mut failed_count = 0usize;
        let mut validation_skipped_count = 0usize;
        let mut device_errors = Vec::new();
        let mut validation_failures = Vec::new();
        let mut saved_files = Vec::new();

        for (device, result) in devices.iter().zip(device_results.iter()) {
            if !result.success {
                failed_count += 1;
                device_errors.push(DeviceError {
                    device: device.id.clone(),
                    category: result.error_category,
                    message: result.error.clone().unwrap_or_else(|| "unknown failure".to_string()),
                });
                continue;
            }

            let cleaned = vcollector_templates::clean_output(&result.transcript, Some(&job.commands.command));

            let (score, template_id, passed_validation) = if job.validation.use_textfsm {
                let hint = job
                    .validation
                    .template_filter
                    .clone()
                    .unwrap_or_else(|| default_filter_hint(device, job));
                let parsed = vcollector_templates::score_best(
                    self.templates.as_ref(),
                    Some(hint.as_str()),
                    &cleaned,
                    job.validation.min_score,
                );
                (parsed.score, parsed.template_id, parsed.is_valid)
            } else {
                (0.0, None, true)
            };

            if job.validation.use_textfsm && !passed_validation && !job.validation.store_failures {
                validation_skipped_count += 1;
                validation_failures.push(ValidationFailure {
                    device: device.id.clone(),
                    score,
                    template_id,
                });
                continue;
            }

            success_count += 1;

            match self.write_capture(job, device, &cleaned).await {
                Ok(path) => saved_files.push(SaveRecord {
                    device: device.id.clone(),
                    path,
                    bytes: cleaned.len(),
                    score,
                    template_id,
                }),
                Err(err) => {
                    warn!(device = %device.name, %err, "failed to write capture file");
                    device_errors.push(DeviceError {
                        device: device.id.clone(),
                        category: ErrorCategory::Unknown,
                        message: format!("capture write failed: {err}"),
                    });
                }
            }
        }

        let finished_at = Utc::now();
        let mut job_result = JobResult {
            job_id: job.job_id.clone(),
            started_at,
            finished_at,
            success_count,
            failed_count,
            validation_skipped_count,
            skipped_before_dispatch,
            device_results,
            saved_files,
            device_errors,
            validation_failures,
            job_error: None,
            history_id: Some(history_id.clone()),
        };

        let mut row = self.history.get(&history_id).await.unwrap_or_else(|| {
            HistoryRow::open(history_id.clone(), job.job_id.clone(), started_at)
        });
        row.finished_at = Some(finished_at);
        row.total_devices = job_result.total_devices();
        row.success_count = job_result.success_count;
        row.failed_count = job_result.failed_count;
        row.status = job_result.last_run_status();
        self.history.update(row).await;

        job_result.job_error = None;
        job_result
    }

    async fn lookup_credential(&self, cache: &mut HashMap<String, Credential>, name: &str) -> Option<Credential> {
        if let Some(credential) = cache.get(name) {
            return Some(credential.clone());
        }
        match self.vault.get(Some(name)).await {
            Ok(Some(credential)) => {
                cache.insert(name.to_string(), credential.clone());
                Some(credential)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(credential = name, %err, "vault lookup failed");
                None
            }
        }
    }

    async fn lookup_default_credential(&self) -> Option<Credential> {
        match self.vault.get(None).await {
            Ok(credential) => credential,
            Err(err) => {
                warn!(%err, "vault default credential lookup failed");
                None
            }
        }
    }

    async fn write_capture(
        &self,
        job: &JobDefinition,
        device: &vcollector_model::Device,
        cleaned: &str,
    ) -> std::io::Result<PathBuf> {
        let sub_dir = job
            .commands
            .output_directory
            .clone()
            .unwrap_or_else(|| job.capture_type.clone());
        let dir = job.storage.base_path.join(sub_dir);
        fs::create_dir_all(&dir).await?;

        let filename = expand_filename_pattern(&job.storage.filename_pattern, device, &job.capture_type);
        let path = dir.join(filename);
        fs::write(&path, cleaned.as_bytes()).await?;
        Ok(path)
    }
}

/// §4.8 step 7: `<normalized_vendor>_<capture_type>` when the job does not
/// pin an explicit template filter.
fn default_filter_hint(device: &vcollector_model::Device, job: &JobDefinition) -> String {
    let vendor = device
        .platform
        .vendor
        .as_deref()
        .or(job.vendor.as_deref())
        .unwrap_or("unknown");
    format!("{}_{}", normalize_vendor(vendor), job.capture_type)
}

/// Small normalization map from free-form DCIM vendor strings to the
/// short tag the template library keys on (§4.8 step 7 example:
/// `cisco_systems,_inc.` -> `cisco_ios`).
fn normalize_vendor(vendor: &str) -> String {
    let lower = vendor.to_lowercase();
    if lower.contains("cisco") {
        "cisco_ios".to_string()
    } else if lower.contains("arista") {
        "arista_eos".to_string()
    } else if lower.contains("juniper") {
        "juniper_junos".to_string()
    } else {
        lower
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect()
    }
}

/// Expand `{device_name}`, `{device_id}`, `{timestamp}` (local
/// `YYYYMMDD_HHMMSS`) and `{capture_type}` placeholders (§6).
fn expand_filename_pattern(pattern: &str, device: &vcollector_model::Device, capture_type: &str) -> String {
    pattern
        .replace("{device_name}", &device.name)
        .replace("{device_id}", &device.id)
        .replace("{timestamp}", &Utc::now().format("%Y%m%d_%H%M%S").to_string())
        .replace("{capture_type}", capture_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcollector_model::{CredentialTestOutcome, Device, PlatformHints};

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
                paging_disable_cmd: None,
            },
            site: None,
            role: None,
            status: None,
            credential_test_result: CredentialTestOutcome::Untested,
            credential_tested_at: None,
        }
    }

    #[test]
    fn normalizes_cisco_vendor_strings() {
        assert_eq!(normalize_vendor("Cisco Systems, Inc."), "cisco_ios");
    }

    #[test]
    fn expands_every_placeholder() {
        let name = expand_filename_pattern("{device_name}_{capture_type}.txt", &device(), "arp");
        assert_eq!(name, "core-sw-01_arp.txt");
    }

    #[test]
    fn default_hint_combines_normalized_vendor_and_capture_type() {
        let job = JobDefinition {
            job_id: "j1".into(),
            capture_type: "show_arp".into(),
            vendor: None,
            commands: Default::default(),
            device_filter: Default::default(),
            validation: Default::default(),
            execution: Default::default(),
            storage: Default::default(),
            credential: None,
            limit: None,
        };
        assert_eq!(default_filter_hint(&device(), &job), "cisco_ios_show_arp");
    }
}
