//! Shared helpers for binaries and retry policy.

pub mod bootstrap;
pub mod retry;
