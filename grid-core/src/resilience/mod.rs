//! Resilience patterns: exponential backoff with jitter, reused by the
//! Accountant's persistence retry wrapper (spec.md §4.2) and anywhere
//! else a transient chain RPC failure needs a bounded retry.

pub mod backoff;

pub use backoff::{BackoffConfig, ExponentialBackoff};
