//! Position and telemetry reports.
//!
//! Neither is persisted; both are forwarded to subscribers as-is.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of a `position` notification.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionReport {
    pub from: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    /// Fix time (Unix seconds).
    pub time: Option<i64>,
}

/// Payload of a `telemetry` notification.
///
/// Metric blocks vary by firmware and sensor set, so they are passed through
/// as plain key/value structures.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReport {
    pub from: Option<String>,
    pub device_metrics: Option<Value>,
    pub environment_metrics: Option<Value>,
}
