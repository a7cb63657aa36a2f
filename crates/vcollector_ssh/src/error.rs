//! Error categorization (§7 Error Handling Design), ported from the
//! original `categorize_ssh_error()` string-heuristic ladder. `russh` and
//! `tokio::time::error::Elapsed` don't expose a structured error taxonomy
//! of their own, so categorization works the same way the source did: on
//! the lowercased message text, in a fixed precedence order.

use vcollector_model::ErrorCategory;

pub fn categorize(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();

    if lower.contains("connection refused") || lower.contains("errno 111") {
        return ErrorCategory::ConnectionRefused;
    }

    if lower.contains("timed out") || lower.contains("timeout") {
        if lower.contains("command") || lower.contains("execute") {
            return ErrorCategory::CommandTimeout;
        }
        return ErrorCategory::ConnectionTimeout;
    }

    if lower.contains("name or service not known")
        || lower.contains("getaddrinfo")
        || lower.contains("dns")
    {
        return ErrorCategory::DnsFailure;
    }

    if lower.contains("auth")
        || lower.contains("permission denied")
        || lower.contains("no supported authentication")
    {
        return ErrorCategory::Auth;
    }

    if lower.contains("key exchange")
        || lower.contains("kex")
        || lower.contains("incompatible")
        || lower.contains("no matching")
    {
        return ErrorCategory::Kex;
    }

    if lower.contains("prompt") {
        return ErrorCategory::PromptDetection;
    }

    if lower.contains("channel") || lower.contains("eof") {
        return ErrorCategory::Channel;
    }

    if lower.contains("socket") || lower.contains("os error") {
        return ErrorCategory::Socket;
    }

    if lower.contains("ssh") || lower.contains("protocol") {
        return ErrorCategory::Protocol;
    }

    ErrorCategory::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_refused_detected() {
        assert_eq!(
            categorize("Connection refused (os error 111)"),
            ErrorCategory::ConnectionRefused
        );
    }

    #[test]
    fn command_timeout_vs_connection_timeout() {
        assert_eq!(
            categorize("timed out waiting to execute command"),
            ErrorCategory::CommandTimeout
        );
        assert_eq!(
            categorize("connection timed out"),
            ErrorCategory::ConnectionTimeout
        );
    }

    #[test]
    fn dns_failure_detected() {
        assert_eq!(
            categorize("failed: Name or service not known"),
            ErrorCategory::DnsFailure
        );
    }

    #[test]
    fn auth_failure_detected() {
        assert_eq!(
            categorize("no supported authentication methods available"),
            ErrorCategory::Auth
        );
    }

    #[test]
    fn kex_failure_detected() {
        assert_eq!(
            categorize("key exchange failed: no matching key exchange method found"),
            ErrorCategory::Kex
        );
    }

    #[test]
    fn unrecognized_message_is_unknown() {
        assert_eq!(categorize("something unexpected happened"), ErrorCategory::Unknown);
    }
}
