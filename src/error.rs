//! Shared error plumbing.
//!
//! Every error enum in the crate carries a grepable `E_*` code so batch and
//! interactive callers can branch on failures without matching message text.

/// Grepable error code and retryable flag for structured error results.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
