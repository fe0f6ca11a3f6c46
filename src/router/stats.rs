//! Cross-context aggregate statistics
//!
//! The latency comparison divides running averages of two independently
//! sampled streams. Treat it as an operational signal only.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::runtime::MetricsSnapshot;
use crate::tools::ExecutionContext;

/// Samples each context needs before latencies are compared.
pub const MIN_SAMPLES_FOR_COMPARISON: u64 = 10;

/// How much faster the low-latency context is than the general one, on average
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", content = "percent", rename_all = "snake_case")]
pub enum LatencyImprovement {
    InsufficientData,
    Percent(f64),
}

impl LatencyImprovement {
    pub fn percent(&self) -> Option<f64> {
        match self {
            Self::Percent(p) => Some(*p),
            Self::InsufficientData => None,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, Self::InsufficientData)
    }
}

/// One context's part of the total traffic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextShare {
    pub requests: u64,
    pub errors: u64,
    pub share_percent: f64,
    pub average_latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStats {
    pub total_requests: u64,
    pub total_errors: u64,
    pub contexts: BTreeMap<ExecutionContext, ContextShare>,
    pub latency_improvement: LatencyImprovement,
    /// Seconds since the last `start()`, absent while stopped
    pub uptime_seconds: Option<f64>,
}

#[allow(clippy::cast_precision_loss)]
fn share(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

pub(crate) fn latency_improvement(general: &MetricsSnapshot, low_latency: &MetricsSnapshot) -> LatencyImprovement {
    if general.request_count < MIN_SAMPLES_FOR_COMPARISON || low_latency.request_count < MIN_SAMPLES_FOR_COMPARISON {
        return LatencyImprovement::InsufficientData;
    }

    let baseline = general.average_latency_ms;
    if baseline <= 0.0 {
        return LatencyImprovement::Percent(0.0);
    }
    LatencyImprovement::Percent((baseline - low_latency.average_latency_ms) / baseline * 100.0)
}

pub(crate) fn aggregate(
    general: &MetricsSnapshot,
    low_latency: &MetricsSnapshot,
    uptime_seconds: Option<f64>,
) -> AggregateStats {
    let total_requests = general.request_count + low_latency.request_count;
    let total_errors = general.error_count + low_latency.error_count;

    let contexts = [
        (ExecutionContext::General, general),
        (ExecutionContext::LowLatency, low_latency),
    ]
    .into_iter()
    .map(|(ctx, snap)| {
        (
            ctx,
            ContextShare {
                requests: snap.request_count,
                errors: snap.error_count,
                share_percent: share(snap.request_count, total_requests),
                average_latency_ms: snap.average_latency_ms,
            },
        )
    })
    .collect();

    AggregateStats {
        total_requests,
        total_errors,
        contexts,
        latency_improvement: latency_improvement(general, low_latency),
        uptime_seconds,
    }
}
