// src/core/classifier.rs — Rule-based failure classification
//
// Deterministic and total: every failed result gets exactly one label.
// Fatal patterns are checked first so "Permission denied (publickey)"
// never falls through to the file-level "permission denied" rule.

use crate::core::types::{Classification, ExecResult};
use crate::infra::errors::CloudhandError;

/// Exit code `timeout(1)` uses when it kills the command.
const EXIT_TIMEOUT: i32 = 124;
/// Exit code ssh itself uses for connection/auth failures.
const EXIT_SSH: i32 = 255;

const FATAL_PATTERNS: &[&str] = &[
    "permission denied (publickey",
    "permission denied (password",
    "authentication failed",
    "host key verification failed",
    "no space left on device",
    "disk quota exceeded",
    "read-only file system",
];

const TRANSIENT_PATTERNS: &[&str] = &[
    "connection reset by peer",
    "connection timed out",
    "operation timed out",
    "temporary failure in name resolution",
    "network is unreachable",
    "could not resolve host",
    "connection closed by remote host",
    "broken pipe",
    "early eof",
    "rpc failed",
];

/// Classify a completed command that exited nonzero.
pub fn classify_exec(result: &ExecResult) -> Classification {
    debug_assert!(!result.success());

    let stderr = result.stderr.to_lowercase();

    if FATAL_PATTERNS.iter().any(|p| stderr.contains(p)) {
        return Classification::Fatal;
    }

    if result.exit_code == EXIT_TIMEOUT {
        return Classification::Transient;
    }
    if TRANSIENT_PATTERNS.iter().any(|p| stderr.contains(p)) {
        return Classification::Transient;
    }
    if result.exit_code == EXIT_SSH && stderr.contains("lost connection") {
        return Classification::Transient;
    }

    // Everything else: command not found (127), missing files, plain
    // permission problems, bad repo URLs. A re-plan or the user can act
    // on all of these.
    Classification::UserActionable
}

/// Classify an executor-level error (the loop routes TimeoutError and
/// ConnectionError here instead of propagating them raw).
pub fn classify_error(err: &CloudhandError) -> Classification {
    match err {
        CloudhandError::Timeout { .. } => Classification::Transient,
        CloudhandError::Connection { .. } => Classification::Transient,
        CloudhandError::Authentication { .. } => Classification::Fatal,
        _ => Classification::UserActionable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(exit_code: i32, stderr: &str) -> ExecResult {
        ExecResult {
            exit_code,
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_auth_revoked_is_fatal() {
        let r = failed(255, "git@github.com: Permission denied (publickey).");
        assert_eq!(classify_exec(&r), Classification::Fatal);
    }

    #[test]
    fn test_disk_full_is_fatal() {
        let r = failed(1, "write error: No space left on device");
        assert_eq!(classify_exec(&r), Classification::Fatal);
    }

    #[test]
    fn test_timeout_exit_code_is_transient() {
        let r = failed(124, "");
        assert_eq!(classify_exec(&r), Classification::Transient);
    }

    #[test]
    fn test_network_blip_is_transient() {
        let r = failed(1, "curl: (56) Connection reset by peer");
        assert_eq!(classify_exec(&r), Classification::Transient);

        let r = failed(
            128,
            "fatal: unable to access 'https://github.com/x/y/': Could not resolve host: github.com",
        );
        assert_eq!(classify_exec(&r), Classification::Transient);
    }

    #[test]
    fn test_repo_not_found_is_user_actionable() {
        let r = failed(128, "fatal: repository 'https://github.com/x/nope/' not found");
        assert_eq!(classify_exec(&r), Classification::UserActionable);
    }

    #[test]
    fn test_command_not_found_is_user_actionable() {
        let r = failed(127, "bash: cargoo: command not found");
        assert_eq!(classify_exec(&r), Classification::UserActionable);
    }

    #[test]
    fn test_file_permission_denied_is_user_actionable() {
        // Plain permission denied (no publickey) stays user-actionable.
        let r = failed(1, "cat: /etc/shadow: Permission denied");
        assert_eq!(classify_exec(&r), Classification::UserActionable);
    }

    #[test]
    fn test_unmatched_defaults_to_user_actionable() {
        let r = failed(42, "something nobody has seen before");
        assert_eq!(classify_exec(&r), Classification::UserActionable);
    }

    #[test]
    fn test_classify_error_routes() {
        let t = CloudhandError::Timeout {
            command: "sleep 99".into(),
            timeout_secs: 30,
        };
        assert_eq!(classify_error(&t), Classification::Transient);

        let c = CloudhandError::Connection {
            host: "h".into(),
            message: "reset".into(),
        };
        assert_eq!(classify_error(&c), Classification::Transient);

        let a = CloudhandError::Authentication {
            host: "h".into(),
            message: "publickey".into(),
        };
        assert_eq!(classify_error(&a), Classification::Fatal);
    }

    #[test]
    fn test_deterministic() {
        let r = failed(1, "Connection reset by peer");
        assert_eq!(classify_exec(&r), classify_exec(&r));
    }
}
