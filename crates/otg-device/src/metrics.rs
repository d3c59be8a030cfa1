//! Metrics requests and replies

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Scope of a metrics request
///
/// An empty name list selects every port or flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricsRequest {
    Port(Vec<String>),
    Flow(Vec<String>),
}

impl MetricsRequest {
    pub fn all_flows() -> Self {
        MetricsRequest::Flow(Vec::new())
    }

    pub fn all_ports() -> Self {
        MetricsRequest::Port(Vec::new())
    }

    pub fn render(&self) -> Value {
        match self {
            MetricsRequest::Port(names) if names.is_empty() => json!({
                "choice": "port",
                "port": {},
            }),
            MetricsRequest::Port(names) => json!({
                "choice": "port",
                "port": { "port_names": names },
            }),
            MetricsRequest::Flow(names) if names.is_empty() => json!({
                "choice": "flow",
                "flow": {},
            }),
            MetricsRequest::Flow(names) => json!({
                "choice": "flow",
                "flow": { "flow_names": names },
            }),
        }
    }
}

/// Per-flow counters; fields other than the name and rate pass through untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowMetric {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_tx_rate: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FlowMetric {
    /// A flow without a reported rate counts as stopped
    pub fn is_below(&self, threshold: f64) -> bool {
        self.frames_tx_rate.map_or(true, |rate| rate < threshold)
    }
}

/// Metrics reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub port_metrics: Vec<Value>,
    #[serde(default)]
    pub flow_metrics: Vec<FlowMetric>,
}

impl Metrics {
    /// Append the rows of another reply
    pub fn merge(&mut self, other: Metrics) {
        self.port_metrics.extend(other.port_metrics);
        self.flow_metrics.extend(other.flow_metrics);
    }

    /// First flow at or above `threshold`, if any
    pub fn running_flow(&self, threshold: f64) -> Option<&FlowMetric> {
        self.flow_metrics.iter().find(|flow| !flow.is_below(threshold))
    }
}
