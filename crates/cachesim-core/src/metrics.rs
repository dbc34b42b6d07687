//! Metrics aggregation for simulation runs.
//!
//! After a run stops, the request log is folded into a [`SimulationReport`]:
//! latency distributions, throughput, cache-miss rate, per-server load and
//! fairness, plus whatever custom counters the router exposes.

use crate::clock::as_millis_f64;
use crate::request::Request;
use crate::server::{Server, ServerSummary};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Percentile values for a distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Percentiles {
    /// Compute percentiles from a slice of values.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                p50: 0.0,
                p75: 0.0,
                p90: 0.0,
                p95: 0.0,
                p99: 0.0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;

        Self {
            p50: percentile_sorted(&sorted, 50.0),
            p75: percentile_sorted(&sorted, 75.0),
            p90: percentile_sorted(&sorted, 90.0),
            p95: percentile_sorted(&sorted, 95.0),
            p99: percentile_sorted(&sorted, 99.0),
            min: sorted[0],
            max: sorted[n - 1],
            mean,
        }
    }

    fn from_durations(durations: impl Iterator<Item = Duration>) -> Self {
        let values: Vec<f64> = durations.map(as_millis_f64).collect();
        Self::from_values(&values)
    }
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Aggregated metrics for an entire simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Simulation name from the configuration.
    pub name: String,
    /// Router name.
    pub router: String,
    /// Measured run length (start to stop) in ms.
    pub duration_ms: f64,
    /// Requests created by the producer.
    pub total_requests: u64,
    pub completed_requests: u64,
    /// Created but never handed a destination.
    pub not_routed: u64,
    /// Routed but not completed before shutdown.
    pub not_completed: u64,

    // Cache
    pub cache_misses: u64,
    /// Misses over completed requests.
    pub cache_miss_rate: f64,

    // Throughput
    pub requests_per_sec: f64,

    // Latency (ms)
    pub routing_latency: Percentiles,
    pub work_latency: Percentiles,
    pub total_latency: Percentiles,

    // Per-server summary for the final registry
    pub servers: Vec<ServerSummary>,
    pub load_cv: f64,
    pub jains_fairness_index: f64,

    // Custom router metrics
    pub custom_metrics: HashMap<String, f64>,
}

impl SimulationReport {
    /// Fold the request log of a stopped run into a report.
    pub fn build(
        name: &str,
        router: &str,
        run_duration: Duration,
        requests: &[Arc<Request>],
        servers: &[Arc<Server>],
        custom_metrics: HashMap<String, f64>,
    ) -> Self {
        let mut not_routed = 0;
        let mut not_completed = 0;
        let mut completed = Vec::with_capacity(requests.len());
        for req in requests {
            if !req.is_routed() {
                not_routed += 1;
            } else if !req.is_completed() {
                not_completed += 1;
            } else {
                completed.push(req.as_ref());
            }
        }

        let completed_requests = completed.len() as u64;
        let cache_misses = completed.iter().filter(|r| r.is_cache_miss()).count() as u64;
        let cache_miss_rate = if completed_requests == 0 {
            0.0
        } else {
            cache_misses as f64 / completed_requests as f64
        };
        let secs = run_duration.as_secs_f64();
        let requests_per_sec = if secs > 0.0 {
            completed_requests as f64 / secs
        } else {
            0.0
        };

        let servers: Vec<ServerSummary> = servers.iter().map(|s| s.summary()).collect();
        let served: Vec<u64> = servers.iter().map(|s| s.served).collect();

        Self {
            name: name.to_string(),
            router: router.to_string(),
            duration_ms: as_millis_f64(run_duration),
            total_requests: requests.len() as u64,
            completed_requests,
            not_routed,
            not_completed,
            cache_misses,
            cache_miss_rate,
            requests_per_sec,
            routing_latency: Percentiles::from_durations(
                completed.iter().filter_map(|r| r.routing_latency()),
            ),
            work_latency: Percentiles::from_durations(
                completed.iter().filter_map(|r| r.work_latency()),
            ),
            total_latency: Percentiles::from_durations(
                completed.iter().filter_map(|r| r.total_latency()),
            ),
            load_cv: coefficient_of_variation(&served),
            jains_fairness_index: jains_fairness_index(&served),
            servers,
            custom_metrics,
        }
    }
}

/// Miss rate of completed requests over `buckets` equal slices of the log.
///
/// Slices are taken in creation order, so a falling series shows caches
/// warming up. Returns fewer buckets when there are fewer completed
/// requests than buckets.
pub fn miss_rate_timeline(requests: &[Arc<Request>], buckets: usize) -> Vec<f64> {
    let completed: Vec<&Request> = requests
        .iter()
        .filter(|r| r.is_completed())
        .map(|r| r.as_ref())
        .collect();
    if completed.is_empty() || buckets == 0 {
        return Vec::new();
    }
    let size = completed.len().div_ceil(buckets);
    completed
        .chunks(size)
        .map(|chunk| {
            let misses = chunk.iter().filter(|r| r.is_cache_miss()).count();
            misses as f64 / chunk.len() as f64
        })
        .collect()
}

/// Coefficient of variation (std / mean).
fn coefficient_of_variation(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<u64>() as f64 / n;
    if mean == 0.0 {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    variance.sqrt() / mean
}

/// Jain's fairness index: (sum(x_i))^2 / (n * sum(x_i^2)).
fn jains_fairness_index(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 1.0;
    }
    let n = values.len() as f64;
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    let sum_sq: f64 = values.iter().map(|&v| (v as f64).powi(2)).sum();
    if sum_sq == 0.0 {
        return 1.0;
    }
    (sum * sum) / (n * sum_sq)
}

/// Format a report as a pretty-printed table string.
pub fn format_table(report: &SimulationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n{:=<70}\n",
        format!("  {} / {} Results  ", report.name, report.router)
    ));
    out.push_str(&format!(
        "  Duration: {:.1}s | Requests: {} ({} completed)\n",
        report.duration_ms / 1000.0,
        report.total_requests,
        report.completed_requests
    ));
    out.push_str(&format!(
        "  Not routed: {} | Not completed: {}\n",
        report.not_routed, report.not_completed
    ));
    out.push_str(&format!("{:-<70}\n", "  Latency  "));
    for (label, p) in [
        ("Routing (ms)", &report.routing_latency),
        ("Work (ms)", &report.work_latency),
        ("Total (ms)", &report.total_latency),
    ] {
        out.push_str(&format!(
            "  {:<15} P50={:>8.3}  P90={:>8.3}  P99={:>8.3}  mean={:>8.3}\n",
            label, p.p50, p.p90, p.p99, p.mean
        ));
    }
    out.push_str(&format!("{:-<70}\n", "  Throughput  "));
    out.push_str(&format!(
        "  Requests/sec: {:.1}\n",
        report.requests_per_sec
    ));
    out.push_str(&format!("{:-<70}\n", "  Cache  "));
    out.push_str(&format!(
        "  Cache miss rate {}/{} ~= {:.2}%\n",
        report.cache_misses,
        report.completed_requests,
        report.cache_miss_rate * 100.0
    ));
    out.push_str(&format!("{:-<70}\n", "  Servers  "));
    for s in &report.servers {
        out.push_str(&format!(
            "  #{:<4} served={:<10} cached={:<6} hit rate={:.1}%\n",
            s.id,
            s.served,
            s.cached_keys,
            s.hit_rate * 100.0
        ));
    }
    out.push_str(&format!(
        "  Load CV: {:.3}  Jain's index: {:.4}\n",
        report.load_cv, report.jains_fairness_index,
    ));
    if !report.custom_metrics.is_empty() {
        out.push_str(&format!("{:-<70}\n", "  Router  "));
        let mut keys: Vec<&String> = report.custom_metrics.keys().collect();
        keys.sort();
        for key in keys {
            out.push_str(&format!("  {}: {:.3}\n", key, report.custom_metrics[key]));
        }
    }
    out.push_str(&format!("{:=<70}\n", ""));
    out
}

/// Format a comparison table of multiple router results.
pub fn format_comparison_table(results: &[SimulationReport]) -> String {
    if results.is_empty() {
        return String::from("No results to compare.\n");
    }

    let mut out = String::new();
    out.push_str(&format!("\n{:=<90}\n", "  Router Comparison  "));
    out.push_str(&format!(
        "{:<16} {:>10} {:>9} {:>9} {:>9} {:>9} {:>8} {:>8}\n",
        "Router", "Completed", "Work p50", "Work p99", "E2E p50", "E2E p99", "Miss%", "Jain's"
    ));
    out.push_str(&format!("{:-<90}\n", ""));

    for r in results {
        out.push_str(&format!(
            "{:<16} {:>10} {:>9.2} {:>9.2} {:>9.2} {:>9.2} {:>7.2}% {:>8.4}\n",
            r.router,
            r.completed_requests,
            r.work_latency.p50,
            r.work_latency.p99,
            r.total_latency.p50,
            r.total_latency.p99,
            r.cache_miss_rate * 100.0,
            r.jains_fairness_index,
        ));
    }
    out.push_str(&format!("{:=<90}\n", ""));
    out
}
