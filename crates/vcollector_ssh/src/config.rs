//! Environment-overridable defaults for SSH session behavior, mirroring
//! `ExecutorOptions` (§4.3, §6 env vars).

use once_cell::sync::Lazy;
use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 10;
const DEFAULT_INTER_COMMAND_MILLIS: u64 = 1_000;
const DEFAULT_EXPECT_PROMPT_TIMEOUT_MILLIS: u64 = 30_000;
const DEFAULT_PROMPT_COUNT: usize = 3;
const DEFAULT_RETRY_COUNT: usize = 0;
const DEFAULT_RETRY_DELAY_SECS: u64 = 2;
const DEFAULT_MAX_WORKERS: usize = 12;
const DEFAULT_LEGACY_MODE: bool = false;

static CONNECT_TIMEOUT: Lazy<Duration> = Lazy::new(|| {
    env_duration_secs(
        "VCOLLECTOR_CONNECT_TIMEOUT_SECS",
        Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
    )
});

static SHELL_TIMEOUT: Lazy<Duration> = Lazy::new(|| {
    env_duration_secs(
        "VCOLLECTOR_SHELL_TIMEOUT_SECS",
        Duration::from_secs(DEFAULT_SHELL_TIMEOUT_SECS),
    )
});

static INTER_COMMAND_TIME: Lazy<Duration> = Lazy::new(|| {
    env_duration_millis(
        "VCOLLECTOR_INTER_COMMAND_MILLIS",
        Duration::from_millis(DEFAULT_INTER_COMMAND_MILLIS),
    )
});

static EXPECT_PROMPT_TIMEOUT: Lazy<Duration> = Lazy::new(|| {
    env_duration_millis(
        "VCOLLECTOR_EXPECT_PROMPT_TIMEOUT_MILLIS",
        Duration::from_millis(DEFAULT_EXPECT_PROMPT_TIMEOUT_MILLIS),
    )
});

static PROMPT_COUNT: Lazy<usize> = Lazy::new(|| {
    env_usize("VCOLLECTOR_PROMPT_COUNT", DEFAULT_PROMPT_COUNT)
});

static RETRY_COUNT: Lazy<usize> = Lazy::new(|| {
    env_usize("VCOLLECTOR_RETRY_COUNT", DEFAULT_RETRY_COUNT)
});

static RETRY_DELAY: Lazy<Duration> = Lazy::new(|| {
    env_duration_secs(
        "VCOLLECTOR_RETRY_DELAY_SECS",
        Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
    )
});

static MAX_WORKERS: Lazy<usize> = Lazy::new(|| {
    env_usize("VCOLLECTOR_MAX_WORKERS", DEFAULT_MAX_WORKERS)
});

static LEGACY_MODE: Lazy<bool> = Lazy::new(|| {
    env_bool("VCOLLECTOR_LEGACY_MODE", DEFAULT_LEGACY_MODE)
});

pub fn connect_timeout() -> Duration {
    *CONNECT_TIMEOUT
}

pub fn shell_timeout() -> Duration {
    *SHELL_TIMEOUT
}

pub fn inter_command_time() -> Duration {
    *INTER_COMMAND_TIME
}

pub fn expect_prompt_timeout() -> Duration {
    *EXPECT_PROMPT_TIMEOUT
}

pub fn default_prompt_count() -> usize {
    *PROMPT_COUNT
}

pub fn retry_count() -> usize {
    *RETRY_COUNT
}

pub fn retry_delay() -> Duration {
    *RETRY_DELAY
}

pub fn max_workers() -> usize {
    *MAX_WORKERS
}

/// Process-wide default for "legacy-mode is requested" (§4.3 Connect):
/// a job or discovery run may still override this per-call.
pub fn legacy_mode() -> bool {
    *LEGACY_MODE
}

fn env_duration_secs(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|value| value.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_duration_millis(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|value| value.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn env_usize(var: &str, default: usize) -> usize {
    std::env::var(var)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_bool(var: &str, default: bool) -> bool {
    std::env::var(var)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
