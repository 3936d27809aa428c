//! Performance reporting: snapshots, baseline comparison, and derived
//! recommendations.

use batchline_cache::CacheStats;
use batchline_pipeline::PipelineMetrics;
use serde::Serialize;

/// Hit rate below which a larger cache or different policy is suggested.
const LOW_HIT_RATE: f64 = 0.5;
/// Worker utilisation above which a larger pool is suggested.
const HIGH_UTILIZATION: f64 = 0.9;
/// Throughput must beat baseline by this factor to count as improved.
const IMPROVEMENT_MARGIN: f64 = 1.1;

/// Combined view of both engines at one instant, handed to registered
/// optimisers and embedded in reports.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSnapshot {
    pub pipeline: PipelineMetrics,
    pub cache: CacheStats,
}

/// Structured performance report.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    /// Wall-clock milliseconds since the unix epoch.
    pub generated_at_ms: u64,
    pub pipeline: PipelineMetrics,
    pub cache: CacheStats,
    /// Throughput ratio against the captured baseline times a hit-rate
    /// bonus; 1.0 when no baseline has been set. Advisory only.
    pub improvement_factor: f64,
    pub recommendations: Vec<String>,
}

/// Throughput and hit rate captured by `set_baseline`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Baseline {
    pub(crate) throughput_per_sec: f64,
    pub(crate) hit_rate: f64,
}

pub(crate) fn improvement_factor(snapshot: &PerformanceSnapshot, baseline: Option<Baseline>) -> f64 {
    let Some(baseline) = baseline else {
        return 1.0;
    };
    let throughput_ratio = if baseline.throughput_per_sec > 0.0 {
        snapshot.pipeline.throughput_per_sec / baseline.throughput_per_sec
    } else {
        1.0
    };
    throughput_ratio * (1.0 + snapshot.cache.hit_rate)
}

pub(crate) fn recommendations(
    snapshot: &PerformanceSnapshot,
    baseline: Option<Baseline>,
) -> Vec<String> {
    let mut out = Vec::new();
    if snapshot.cache.hit_rate < LOW_HIT_RATE {
        out.push("increase cache size or change eviction policy".to_string());
    }
    if snapshot.pipeline.worker_utilization > HIGH_UTILIZATION {
        out.push("increase worker pool size".to_string());
    }
    if let Some(baseline) = baseline {
        if snapshot.pipeline.throughput_per_sec > baseline.throughput_per_sec * IMPROVEMENT_MARGIN
        {
            out.push("throughput improved over baseline".to_string());
        } else {
            out.push("no regression observed".to_string());
        }
    }
    out
}
