//! Monitoring and observability: spec.md §6's `getMetrics()` snapshot,
//! Prometheus export, and the HTTP server that scrapes both.

pub mod metrics;
pub mod server;

pub use metrics::{GridMetrics, MetricsRegistry, MetricsSnapshot};
pub use server::{MetricsServer, MetricsServerConfig};
