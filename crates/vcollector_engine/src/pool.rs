//! Executor pool (C7): bounded-concurrency fan-out of the SSH session
//! driver across many targets, with categorized errors and bounded retry
//! (§4.7).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};
use vcollector_model::{Credential, DeviceId, ErrorCategory, ExecutionResult};
use vcollector_ssh::SshSession;

/// One unit of work for the pool: a resolved host/port, the assembled
/// command string and the prompt count to expect (§4.2 `CommandSpec`),
/// and an optional per-device credential override (§4.7 step 1).
#[derive(Debug, Clone)]
pub struct ExecutorTarget {
    pub device_id: DeviceId,
    pub host: String,
    pub port: u16,
    pub command: String,
    pub prompt_count: usize,
    pub credential_override: Option<Credential>,
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub max_workers: usize,
    pub connect_timeout: Duration,
    pub inter_command_time: Duration,
    pub expect_prompt_timeout: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub capture_traceback: bool,
    /// Offer legacy KEX/cipher/host-key algorithms first during SSH
    /// negotiation (§4.3 Connect) instead of the modern-first default.
    pub legacy_mode: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        ExecutorOptions {
            max_workers: vcollector_ssh::config::max_workers(),
            connect_timeout: vcollector_ssh::config::connect_timeout(),
            inter_command_time: vcollector_ssh::config::inter_command_time(),
            expect_prompt_timeout: vcollector_ssh::config::expect_prompt_timeout(),
            retry_count: vcollector_ssh::config::retry_count() as u32,
            retry_delay: vcollector_ssh::config::retry_delay(),
            capture_traceback: false,
            legacy_mode: vcollector_ssh::config::legacy_mode(),
        }
    }
}

pub type ProgressCallback = Arc<dyn Fn(usize, usize, &ExecutionResult) + Send + Sync>;

/// Aggregate summary across one `ExecutorPool::run` call (§4.7 "Aggregate
/// summary").
#[derive(Debug, Clone)]
pub struct PoolSummary {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub category_counts: HashMap<ErrorCategory, usize>,
    pub elapsed: Duration,
}

/// Bounded-concurrency driver of (C3) against many targets (§4.7, §5).
pub struct ExecutorPool {
    default_credential: Option<Credential>,
    options: ExecutorOptions,
    cancelled: Arc<AtomicBool>,
}

impl ExecutorPool {
    pub fn new(default_credential: Option<Credential>, options: ExecutorOptions) -> Self {
        ExecutorPool {
            default_credential,
            options,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop dispatching new targets; in-flight workers finish naturally
    /// and slots not yet started resolve to `cancelled` (§4.7
    /// "Cancellation", §5).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Run every target, preserving input order in the returned vector
    /// even though workers may complete out of order (§4.7, §5 "Ordering
    /// guarantees").
    pub async fn run(
        &self,
        targets: Vec<ExecutorTarget>,
        progress: Option<ProgressCallback>,
    ) -> (Vec<ExecutionResult>, PoolSummary) {
        let total = targets.len();
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.options.max_workers.max(1)));
        let mut slots: Vec<Option<ExecutionResult>> = (0..total).map(|_| None).collect();
        let mut tasks = FuturesUnordered::new();

        for (index, target) in targets.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let cancelled = self.cancelled.clone();
            let default_credential = self.default_credential.clone();
            let options = self.options.clone();

            tasks.push(tokio::spawn(async move {
                if cancelled.load(Ordering::SeqCst) {
                    return (index, ExecutionResult::cancelled(target.host.clone()));
                }
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                if cancelled.load(Ordering::SeqCst) {
                    return (index, ExecutionResult::cancelled(target.host.clone()));
                }
                let result = run_target(target, default_credential, &options).await;
                (index, result)
            }));
        }

        let mut completed = 0usize;
        let mut successes = 0usize;
        let mut category_counts: HashMap<ErrorCategory, usize> = HashMap::new();

        while let Some(joined) = tasks.next().await {
            let Ok((index, result)) = joined else {
                continue;
            };
            completed += 1;
            *category_counts.entry(result.error_category).or_insert(0) += 1;
            if result.success {
                successes += 1;
            }
            if let Some(progress) = &progress {
                progress(completed, total, &result);
            }
            slots[index] = Some(result);
        }

        let results: Vec<ExecutionResult> = slots
            .into_iter()
            .map(|slot| slot.expect("every dispatched slot resolves before the stream drains"))
            .collect();

        let summary = PoolSummary {
            total,
            successes,
            failures: total - successes,
            category_counts,
            elapsed: started.elapsed(),
        };

        (results, summary)
    }
}

async fn run_target(
    target: ExecutorTarget,
    default_credential: Option<Credential>,
    options: &ExecutorOptions,
) -> ExecutionResult {
    let credential = target.credential_override.clone().or(default_credential);
    let Some(credential) = credential else {
        return ExecutionResult {
            host: target.host,
            success: false,
            transcript: String::new(),
            duration_ms: 0.0,
            error_category: ErrorCategory::Auth,
            error: Some("no credential available for this target".to_string()),
            error_traceback: None,
            retry_count: 0,
            prompt_detected: None,
            credential_name: None,
            disconnect_error: None,
        };
    };
    let credential_name = credential.name.clone();

    let mut attempt = 0u32;
    loop {
        let started = Instant::now();
        match drive_once(&target, &credential, options).await {
            Ok(DriveOutcome {
                transcript,
                prompt,
                disconnect_error,
                prompt_count_met: true,
            }) => {
                return ExecutionResult {
                    host: target.host.clone(),
                    success: true,
                    transcript,
                    duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                    error_category: ErrorCategory::Success,
                    error: None,
                    error_traceback: None,
                    retry_count: attempt,
                    prompt_detected: Some(prompt),
                    credential_name: Some(credential_name.clone()),
                    disconnect_error,
                };
            }
            Ok(DriveOutcome {
                transcript,
                prompt,
                disconnect_error,
                prompt_count_met: false,
            }) => {
                if retry(&mut attempt, ErrorCategory::CommandTimeout, options).await {
                    continue;
                }
                return ExecutionResult {
                    host: target.host.clone(),
                    success: false,
                    transcript,
                    duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                    error_category: ErrorCategory::CommandTimeout,
                    error: Some("expect-prompt deadline exceeded before prompt count was reached".to_string()),
                    error_traceback: None,
                    retry_count: attempt,
                    prompt_detected: Some(prompt),
                    credential_name: Some(credential_name.clone()),
                    disconnect_error,
                };
            }
            Err((category, message, disconnect_error)) => {
                if retry(&mut attempt, category, options).await {
                    continue;
                }
                return ExecutionResult {
                    host: target.host.clone(),
                    success: false,
                    transcript: String::new(),
                    duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                    error_category: category,
                    error: Some(message.clone()),
                    error_traceback: options.capture_traceback.then(|| message),
                    retry_count: attempt,
                    prompt_detected: None,
                    credential_name: Some(credential_name.clone()),
                    disconnect_error,
                };
            }
        }
    }
}

/// §4.7 step 4: retry bounded by `retry_count`, only for categories that
/// aren't auth/dns/kex, waiting `retry_delay` between attempts.
async fn retry(attempt: &mut u32, category: ErrorCategory, options: &ExecutorOptions) -> bool {
    if *attempt >= options.retry_count || !category.is_retry_eligible() {
        return false;
    }
    *attempt += 1;
    debug!(attempt, %category, "retrying after categorized failure");
    sleep(options.retry_delay).await;
    true
}

struct DriveOutcome {
    transcript: String,
    prompt: String,
    disconnect_error: Option<String>,
    prompt_count_met: bool,
}

/// One connect-auth-shell-execute-disconnect cycle against a single
/// target. `Err` carries `(category, message, disconnect_error)`; the
/// disconnect error is a non-fatal side note (§4.3 Disconnect, §7).
async fn drive_once(
    target: &ExecutorTarget,
    credential: &Credential,
    options: &ExecutorOptions,
) -> Result<DriveOutcome, (ErrorCategory, String, Option<String>)> {
    let mut session = SshSession::connect_with_timeout(
        &target.host,
        target.port,
        credential,
        options.connect_timeout,
        options.legacy_mode,
    )
    .await
    .map_err(|e| (e.category(), e.to_string(), None))?;

    if let Err(e) = session.open_shell().await {
        let category = e.category();
        let message = e.to_string();
        if let Err(disconnect_err) = session.disconnect().await {
            warn!(%disconnect_err, "disconnect after open_shell failure also failed");
        }
        return Err((category, message, None));
    }

    let prompt = match session.find_prompt().await {
        Ok(prompt) => prompt,
        Err(e) => {
            let category = e.category();
            let message = e.to_string();
            if let Err(disconnect_err) = session.disconnect().await {
                warn!(%disconnect_err, "disconnect after find_prompt failure also failed");
            }
            return Err((category, message, None));
        }
    };

    let transcript = match session
        .execute_with_timing(
            &target.command,
            target.prompt_count,
            options.inter_command_time,
            options.expect_prompt_timeout,
        )
        .await
    {
        Ok(transcript) => transcript,
        Err(e) => {
            let category = e.category();
            let message = e.to_string();
            if let Err(disconnect_err) = session.disconnect().await {
                warn!(%disconnect_err, "disconnect after command failure also failed");
            }
            return Err((category, message, None));
        }
    };

    let prompt_count_met = transcript.matches(prompt.as_str()).count() >= target.prompt_count;
    let disconnect_error = session.disconnect().await.err();

    Ok(DriveOutcome {
        transcript,
        prompt,
        disconnect_error,
        prompt_count_met,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(host: &str) -> ExecutorTarget {
        ExecutorTarget {
            device_id: host.to_string(),
            host: host.to_string(),
            port: 22,
            command: "show version".to_string(),
            prompt_count: 1,
            credential_override: None,
        }
    }

    #[tokio::test]
    async fn missing_credential_fails_fast_as_auth() {
        let pool = ExecutorPool::new(None, ExecutorOptions::default());
        let (results, summary) = pool.run(vec![target("10.0.0.1")], None).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(results[0].error_category, ErrorCategory::Auth);
        assert_eq!(summary.failures, 1);
    }

    #[tokio::test]
    async fn cancelling_before_run_marks_every_slot_cancelled() {
        let pool = ExecutorPool::new(None, ExecutorOptions::default());
        pool.cancel();
        let (results, summary) = pool.run(vec![target("a"), target("b")], None).await;
        assert!(results.iter().all(|r| r.error_category == ErrorCategory::Cancelled));
        assert_eq!(summary.total, 2);
    }

    #[tokio::test]
    async fn preserves_input_order_across_concurrent_completions() {
        let pool = ExecutorPool::new(None, ExecutorOptions::default());
        let targets = vec![target("a"), target("b"), target("c")];
        let (results, _summary) = pool.run(targets, None).await;
        assert_eq!(results[0].host, "a");
        assert_eq!(results[1].host, "b");
        assert_eq!(results[2].host, "c");
    }
}
