use serde::{Deserialize, Serialize};

/// Closed error taxonomy shared by the SSH driver, executor pool and job
/// runner (spec §7). Every per-device failure is classified into exactly
/// one of these so retry policy and reporting can switch on it instead of
/// matching strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Success,
    ConnectionRefused,
    ConnectionTimeout,
    DnsFailure,
    Auth,
    Kex,
    CommandTimeout,
    PromptDetection,
    Channel,
    Socket,
    Protocol,
    Disconnect,
    Cancelled,
    Unknown,
}

impl ErrorCategory {
    /// Error categories that a retry is allowed to attempt again (§4.7,
    /// §7): not auth, dns, or kex, since those will not resolve by retrying.
    pub fn is_retry_eligible(self) -> bool {
        !matches!(
            self,
            ErrorCategory::Auth | ErrorCategory::DnsFailure | ErrorCategory::Kex
        )
    }

    /// Error categories that stop credential-discovery iteration early
    /// (§4.9 step 6): anything other than a rejected credential.
    pub fn stops_discovery(self) -> bool {
        !matches!(self, ErrorCategory::Auth | ErrorCategory::Kex)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Success => "success",
            ErrorCategory::ConnectionRefused => "connection_refused",
            ErrorCategory::ConnectionTimeout => "connection_timeout",
            ErrorCategory::DnsFailure => "dns_failure",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Kex => "kex",
            ErrorCategory::CommandTimeout => "command_timeout",
            ErrorCategory::PromptDetection => "prompt_detection",
            ErrorCategory::Channel => "channel",
            ErrorCategory::Socket => "socket",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Disconnect => "disconnect",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_dns_kex_are_not_retry_eligible() {
        assert!(!ErrorCategory::Auth.is_retry_eligible());
        assert!(!ErrorCategory::DnsFailure.is_retry_eligible());
        assert!(!ErrorCategory::Kex.is_retry_eligible());
        assert!(ErrorCategory::Socket.is_retry_eligible());
        assert!(ErrorCategory::CommandTimeout.is_retry_eligible());
    }

    #[test]
    fn only_auth_and_kex_stop_discovery() {
        assert!(!ErrorCategory::Auth.stops_discovery());
        assert!(!ErrorCategory::Kex.stops_discovery());
        assert!(ErrorCategory::ConnectionTimeout.stops_discovery());
    }
}
