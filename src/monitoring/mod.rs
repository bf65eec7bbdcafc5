//! Monitoring module
//!
//! Provides:
//! - Structured logging with tracing
//! - Prometheus metrics for cache tiers, session locks and store latency

pub mod config;
pub mod metrics;
pub mod tracing_config;

pub use config::{LogFormat, MonitoringConfig};
pub use metrics::export_prometheus;
pub use tracing_config::init_tracing;
