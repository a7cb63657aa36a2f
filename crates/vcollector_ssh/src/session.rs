//! SSH session driver (C3): an interactive-shell state machine built on
//! `russh`, carrying legacy algorithm negotiation (§4.1/§B.6) and the
//! prompt-driven command loop (§4.3).

use crate::{ansi, config, error, prompt};
use russh::client::{self, Handle};
use russh::{ChannelId, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};
use vcollector_model::{Credential, ErrorCategory};

/// Ordered ahead-of-modern algorithm lists so legacy network gear that
/// only speaks old KEX/cipher/host-key suites still negotiates (§B.6).
/// Legacy entries are tried first; `russh` picks the first mutually
/// supported algorithm in each list.
pub fn legacy_preferred_algorithms() -> russh::Preferred {
    russh::Preferred {
        kex: std::borrow::Cow::Borrowed(&[
            russh::kex::DH_G1_SHA1,
            russh::kex::DH_G14_SHA1,
            russh::kex::DH_GEX_SHA1,
            russh::kex::DH_GEX_SHA256,
            russh::kex::ECDH_SHA2_NISTP256,
            russh::kex::ECDH_SHA2_NISTP384,
            russh::kex::ECDH_SHA2_NISTP521,
            russh::kex::CURVE25519,
            russh::kex::CURVE25519_PRE_RFC_8731,
        ]),
        key: std::borrow::Cow::Borrowed(&[
            russh_keys::key::SSH_RSA,
            russh_keys::key::ECDSA_SHA2_NISTP256,
            russh_keys::key::ECDSA_SHA2_NISTP384,
            russh_keys::key::ECDSA_SHA2_NISTP521,
            russh_keys::key::ED25519,
        ]),
        cipher: std::borrow::Cow::Borrowed(&[
            russh::cipher::AES_256_CTR,
            russh::cipher::AES_192_CTR,
            russh::cipher::AES_128_CTR,
            russh::cipher::AES_256_GCM,
            russh::cipher::AES_128_GCM,
            russh::cipher::CHACHA20_POLY1305,
        ]),
        ..Default::default()
    }
}

/// Modern-first ordering used when legacy-mode is *not* requested (§4.3
/// Connect: "modern algorithms otherwise"). `russh`'s own defaults are
/// already modern-first, so this simply makes that choice explicit at the
/// call site instead of relying on an implicit default.
pub fn modern_preferred_algorithms() -> russh::Preferred {
    russh::Preferred::default()
}

/// Picks the legacy or modern algorithm preference list depending on
/// whether legacy-mode was requested for this connection (§4.3).
fn preferred_algorithms(legacy_mode: bool) -> russh::Preferred {
    if legacy_mode {
        legacy_preferred_algorithms()
    } else {
        modern_preferred_algorithms()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Connecting,
    Authenticated,
    ShellOpen,
    Ready,
    Executing,
    Closed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("authentication failed")]
    AuthRejected,
    #[error("channel error: {0}")]
    Channel(String),
    #[error("no usable credential material provided")]
    NoCredential,
}

impl SessionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::Connect(msg) => error::categorize(msg),
            SessionError::AuthRejected => ErrorCategory::Auth,
            SessionError::Channel(msg) => error::categorize(msg),
            SessionError::NoCredential => ErrorCategory::Auth,
        }
    }
}

struct Handler;

#[async_trait::async_trait]
impl client::Handler for Handler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        // Legacy gear rarely has a stable, pre-shared host key record; the
        // spec places authenticity at the credential layer, not host-key
        // pinning (§4.1 Non-goals).
        Ok(true)
    }
}

/// A connected, authenticated interactive shell against one device.
pub struct SshSession {
    handle: Handle<Handler>,
    channel_id: ChannelId,
    channel: russh::Channel<client::Msg>,
    state: SessionState,
    prompt: Option<String>,
}

impl SshSession {
    /// Connect and authenticate using the process-wide default connect
    /// timeout and legacy-mode setting (§B.4 env-var defaults).
    pub async fn connect(
        host: &str,
        port: u16,
        credential: &Credential,
    ) -> Result<Self, SessionError> {
        Self::connect_with_timeout(
            host,
            port,
            credential,
            config::connect_timeout(),
            config::legacy_mode(),
        )
        .await
    }

    /// Connect and authenticate (NEW -> CONNECTING -> AUTHENTICATED), with
    /// an explicit connect deadline (§4.3 "Apply a connect-deadline of
    /// T_connect") and an explicit legacy-mode flag choosing which
    /// algorithm preference list to offer (§4.3 Connect). A job's own
    /// `execution.timeout`/`execution.legacy_mode` override the env
    /// defaults when present (§B.4).
    pub async fn connect_with_timeout(
        host: &str,
        port: u16,
        credential: &Credential,
        connect_timeout: Duration,
        legacy_mode: bool,
    ) -> Result<Self, SessionError> {
        let mut config = client::Config::default();
        config.preferred = preferred_algorithms(legacy_mode);
        config.connection_timeout = Some(connect_timeout);
        let config = Arc::new(config);

        let mut handle = timeout(
            connect_timeout,
            client::connect(config, (host, port), Handler),
        )
        .await
        .map_err(|_| SessionError::Connect("connection timed out".to_string()))?
        .map_err(|e| SessionError::Connect(e.to_string()))?;

        let authenticated = authenticate(&mut handle, credential).await?;
        if !authenticated {
            return Err(SessionError::AuthRejected);
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        let channel_id = channel.id();

        Ok(SshSession {
            handle,
            channel_id,
            channel,
            state: SessionState::Authenticated,
            prompt: None,
        })
    }

    /// Request a pty and an interactive shell (AUTHENTICATED -> SHELL_OPEN).
    pub async fn open_shell(&mut self) -> Result<(), SessionError> {
        self.channel
            .request_pty(false, "xterm", 200, 50, 0, 0, &[])
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        self.channel
            .request_shell(true)
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        self.state = SessionState::ShellOpen;
        Ok(())
    }

    /// Port of `find_prompt`: settle, send a bare newline, collect the
    /// echoed buffer, and extract a stable prompt string. Falls back to
    /// `"#"` if nothing recognizable ever turns up (source parity).
    pub async fn find_prompt(&mut self) -> Result<String, SessionError> {
        self.drain_pending(Duration::from_millis(50)).await;
        self.send_raw("\n").await?;
        sleep(Duration::from_secs(3)).await;
        let mut buffer = self.collect_for(Duration::from_secs(3)).await?;

        if let Some(detected) = prompt::extract_clean_prompt(&buffer) {
            self.prompt = Some(detected.clone());
            self.state = SessionState::Ready;
            return Ok(detected);
        }

        const ATTEMPTS: usize = 5;
        for attempt in 0..ATTEMPTS {
            self.send_raw("\n").await?;
            let chunk = self.collect_for(config::shell_timeout()).await?;
            buffer.push_str(&chunk);
            if let Some(detected) = prompt::extract_clean_prompt(&buffer) {
                self.prompt = Some(detected.clone());
                self.state = SessionState::Ready;
                return Ok(detected);
            }
            debug!(attempt, "prompt still undetected, retrying");
        }

        warn!(%buffer, "prompt detection exhausted all attempts, falling back to '#'");
        self.prompt = Some("#".to_string());
        self.state = SessionState::Ready;
        Ok("#".to_string())
    }

    /// Execute using the process-wide default inter-command delay and
    /// expect-prompt deadline (§B.4 env-var defaults).
    pub async fn execute(
        &mut self,
        assembled_command: &str,
        prompt_count: usize,
    ) -> Result<String, SessionError> {
        self.execute_with_timing(
            assembled_command,
            prompt_count,
            config::inter_command_time(),
            config::expect_prompt_timeout(),
        )
        .await
    }

    /// Execute an already-assembled comma-separated command string
    /// (`CommandSpec::assemble`), counting prompt occurrences the way the
    /// source's `_execute_shell_commands` does (§4.3, P6). `inter_command_time`
    /// and `expect_prompt_timeout` come from the job's own `execution` block
    /// when set, overriding the env defaults (§B.4).
    pub async fn execute_with_timing(
        &mut self,
        assembled_command: &str,
        prompt_count: usize,
        inter_command_time: Duration,
        expect_prompt_timeout: Duration,
    ) -> Result<String, SessionError> {
        self.state = SessionState::Executing;
        let expect_prompt = self.prompt.clone();
        let tokens: Vec<&str> = assembled_command.split(',').collect();
        let last_index = tokens.len().saturating_sub(1);
        let mut transcript = String::new();

        for (index, token) in tokens.iter().enumerate() {
            let trimmed = token.trim();
            if trimmed.is_empty() || trimmed == "\\n" {
                self.send_raw("\n").await?;
            } else {
                self.send_raw(&format!("{trimmed}\n")).await?;
            }

            if index != last_index {
                sleep(inter_command_time).await;
            }
        }

        if let Some(expect_prompt) = expect_prompt {
            let deadline = Instant::now() + expect_prompt_timeout;
            loop {
                let chunk = self
                    .collect_for(Duration::from_millis(10))
                    .await
                    .unwrap_or_default();
                transcript.push_str(&chunk);

                if transcript.matches(expect_prompt.as_str()).count() >= prompt_count {
                    break;
                }
                if Instant::now() >= deadline {
                    break;
                }
            }
        } else {
            transcript.push_str(&self.collect_for(config::shell_timeout()).await?);
        }

        self.state = SessionState::Ready;
        Ok(ansi::clean(&transcript))
    }

    async fn send_raw(&mut self, data: &str) -> Result<(), SessionError> {
        self.channel
            .data(data.as_bytes())
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))
    }

    async fn drain_pending(&mut self, quiet_for: Duration) {
        let _ = timeout(quiet_for, self.collect_for(quiet_for)).await;
    }

    async fn collect_for(&mut self, duration: Duration) -> Result<String, SessionError> {
        let deadline = Instant::now() + duration;
        let mut out = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, self.channel.wait()).await {
                Ok(Some(ChannelMsg::Data { data })) => out.extend_from_slice(&data),
                Ok(Some(ChannelMsg::ExtendedData { data, .. })) => out.extend_from_slice(&data),
                Ok(Some(ChannelMsg::Eof)) | Ok(Some(ChannelMsg::Close)) => break,
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => break,
            }
        }

        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    /// CLOSED: best-effort disconnect. A failure here never fails the
    /// overall execution result (source parity: `disconnect_error` is
    /// recorded but non-fatal).
    pub async fn disconnect(mut self) -> Result<(), String> {
        self.state = SessionState::Closed;
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| e.to_string())
    }
}

/// §4.3 Connect: "private key if supplied, else password. If both are
/// supplied the key is primary and the password is accepted as fallback."
async fn authenticate(handle: &mut Handle<Handler>, credential: &Credential) -> Result<bool, SessionError> {
    if let Some(key_data) = &credential.private_key {
        let key_pair = russh_keys::decode_secret_key(key_data, credential.key_passphrase.as_deref())
            .map_err(|e| SessionError::Connect(format!("decoding private key: {e}")))?;
        let key_ok = handle
            .authenticate_publickey(&credential.username, Arc::new(key_pair))
            .await
            .map_err(|e| SessionError::Connect(e.to_string()))?;

        if key_ok {
            return Ok(true);
        }
        if let Some(password) = &credential.password {
            debug!("key authentication rejected, falling back to password");
            return handle
                .authenticate_password(&credential.username, password)
                .await
                .map_err(|e| SessionError::Connect(e.to_string()));
        }
        return Ok(false);
    }

    if let Some(password) = &credential.password {
        return handle
            .authenticate_password(&credential.username, password)
            .await
            .map_err(|e| SessionError::Connect(e.to_string()));
    }

    Err(SessionError::NoCredential)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_categories_map_as_expected() {
        assert_eq!(SessionError::AuthRejected.category(), ErrorCategory::Auth);
        assert_eq!(SessionError::NoCredential.category(), ErrorCategory::Auth);
        assert_eq!(
            SessionError::Connect("connection refused".to_string()).category(),
            ErrorCategory::ConnectionRefused
        );
    }

    #[test]
    fn legacy_mode_picks_the_legacy_kex_list_first() {
        let legacy = preferred_algorithms(true);
        let modern = preferred_algorithms(false);
        assert_eq!(legacy.kex.first(), Some(&russh::kex::DH_G1_SHA1));
        assert_ne!(modern.kex.first(), Some(&russh::kex::DH_G1_SHA1));
    }
}
