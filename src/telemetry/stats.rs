//! Balancer-wide request statistics for the metrics snapshot.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

const MAX_HISTORY_POINTS: usize = 100;
const MAX_LAST_ERRORS: usize = 10;

/// One sample in the rolling response-time history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTimePoint {
    pub timestamp: DateTime<Utc>,
    /// Milliseconds.
    pub value: f64,
}

/// A recent request failure.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub server_id: String,
    pub message: String,
}

#[derive(Debug, Default)]
struct StatsInner {
    total_requests: u64,
    requests_per_server: HashMap<String, u64>,
    response_time_history: VecDeque<ResponseTimePoint>,
    avg_response_time: f64,
    error_rate: f64,
    last_errors: VecDeque<ErrorRecord>,
}

/// Aggregate request counters, guarded by a single mutex.
#[derive(Debug, Default)]
pub struct LbStats {
    inner: Mutex<StatsInner>,
}

/// Serializable view of the aggregate counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LbStatsSnapshot {
    pub total_requests: u64,
    pub requests_per_server: HashMap<String, u64>,
    pub avg_response_time: f64,
    pub response_time_history: Vec<ResponseTimePoint>,
    pub error_rate: f64,
    pub last_errors: Vec<ErrorRecord>,
}

impl LbStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished attempt against `server_id`.
    pub fn record_request(&self, server_id: &str, response_ms: f64, is_error: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        inner.total_requests += 1;
        *inner
            .requests_per_server
            .entry(server_id.to_string())
            .or_insert(0) += 1;

        if inner.response_time_history.len() >= MAX_HISTORY_POINTS {
            inner.response_time_history.pop_front();
        }
        inner.response_time_history.push_back(ResponseTimePoint {
            timestamp: Utc::now(),
            value: response_ms,
        });

        let total: f64 = inner.response_time_history.iter().map(|p| p.value).sum();
        inner.avg_response_time = total / inner.response_time_history.len() as f64;

        if is_error {
            if inner.last_errors.len() >= MAX_LAST_ERRORS {
                inner.last_errors.pop_front();
            }
            inner.last_errors.push_back(ErrorRecord {
                timestamp: Utc::now(),
                server_id: server_id.to_string(),
                message: "Request failed".to_string(),
            });
            inner.error_rate = inner.last_errors.len() as f64 / MAX_HISTORY_POINTS as f64;
        }
    }

    pub fn snapshot(&self) -> LbStatsSnapshot {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        LbStatsSnapshot {
            total_requests: inner.total_requests,
            requests_per_server: inner.requests_per_server.clone(),
            avg_response_time: inner.avg_response_time,
            response_time_history: inner.response_time_history.iter().cloned().collect(),
            error_rate: inner.error_rate,
            last_errors: inner.last_errors.iter().cloned().collect(),
        }
    }
}
