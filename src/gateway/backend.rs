//! Backend registration records and per-backend metrics (§3).

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// A tool server registered with the gateway.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub name: String,
    pub base_url: String,
    pub enabled: bool,
    pub capabilities: Vec<String>,
    pub timeout: Duration,
    pub priority: i32,
}

impl BackendConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        BackendConfig {
            name: name.into(),
            base_url: base_url.into(),
            enabled: true,
            capabilities: Vec::new(),
            timeout: Duration::from_secs(30),
            priority: 0,
        }
    }
}

/// Per-backend operational counters.
#[derive(Debug, Clone, Default)]
pub struct BackendMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_latency_ms: u64,
    pub errors_by_kind: HashMap<String, u64>,
    pub last_request_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl BackendMetrics {
    pub fn record_success(&mut self, latency_ms: u64, now: DateTime<Utc>) {
        self.total_requests += 1;
        self.successful_requests += 1;
        self.total_latency_ms += latency_ms;
        self.last_request_time = Some(now);
    }

    pub fn record_failure(&mut self, kind: &str, now: DateTime<Utc>) {
        self.total_requests += 1;
        self.failed_requests += 1;
        self.last_request_time = Some(now);
        self.last_error = Some(kind.to_string());
        *self.errors_by_kind.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn average_latency_ms(&self) -> f64 {
        if self.successful_requests == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.successful_requests as f64
        }
    }
}
