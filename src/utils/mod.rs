//! Shared helpers for binaries and store access.

pub mod bootstrap;
pub mod retry;
