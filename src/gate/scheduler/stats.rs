//! Latency statistics.
//!
//! The order-book fan-out measures one round-trip latency sample per batch;
//! once a second the metrics loop folds the buffered samples into the
//! {50, 90, 99, 99.99} percentiles and publishes them together with the
//! running request counters.
//!
//! The percentile computation matches the reference deterministically: the
//! inclusive quantile definition with n = 10 000 cut points, indexed as
//! `quantiles[⌊len · k/100⌋ − 1]` with integer truncation.
//!
use serde::Serialize;
use tokio::time::Instant;

/// Number of quantile cut points the percentile lookup indexes into.
const QUANTILE_BUCKETS: usize = 10_000;

/// Computes `n - 1` inclusive quantile cut points over `data`.
///
/// The inclusive method treats the data as a complete population: the
/// minimum and maximum are the 0th and 100th percentiles, and interior cut
/// points interpolate linearly between neighbors. Requires at least two
/// samples; returns an empty vector otherwise.
pub fn inclusive_quantiles(data: &[u64], n: usize) -> Vec<f64> {
    if data.len() < 2 || n < 2 {
        return Vec::new();
    }
    let mut sorted: Vec<f64> = data.iter().map(|&v| v as f64).collect();
    sorted.sort_by(f64::total_cmp);

    let m = sorted.len() - 1;
    let mut cut_points = Vec::with_capacity(n - 1);
    for i in 1..n {
        let j = i * m / n;
        let delta = i * m - j * n;
        let interpolated =
            (sorted[j] * (n - delta) as f64 + sorted[j + 1] * delta as f64) / n as f64;
        cut_points.push(interpolated);
    }
    cut_points
}

/// Looks up the `p`-th percentile among precomputed quantile cut points.
///
/// Returns `None` when the cut points are empty or `p` maps below the first
/// cut point.
pub fn percentile(quantiles: &[f64], p: f64) -> Option<f64> {
    let position = quantiles.len() as f64 * (p / 100.0) - 1.0;
    if position < 0.0 {
        return None;
    }
    quantiles.get(position as usize).copied()
}

/// The percentile set published by the metrics loop, in microseconds.
///
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LatencyPercentiles {
    #[serde(rename = "50")]
    pub p50: u64,
    #[serde(rename = "90")]
    pub p90: u64,
    #[serde(rename = "99")]
    pub p99: u64,
    #[serde(rename = "99.99")]
    pub p99_99: u64,
}

/// Computes the published percentile set from raw latency samples.
///
/// Returns `None` with fewer than two samples: the inclusive quantile
/// definition needs a pair to interpolate between.
pub fn latency_percentile(data: &[u64]) -> Option<LatencyPercentiles> {
    let quantiles = inclusive_quantiles(data, QUANTILE_BUCKETS);
    Some(LatencyPercentiles {
        p50: percentile(&quantiles, 50.0)? as u64,
        p90: percentile(&quantiles, 90.0)? as u64,
        p99: percentile(&quantiles, 99.0)? as u64,
        p99_99: percentile(&quantiles, 99.99)? as u64,
    })
}

/// Buffers latency samples and request counters between metrics emissions.
///
pub struct StatsRecorder {
    latencies_us: Vec<u64>,
    window_requests: u64,
    window_started: Instant,
    orderbooks_received: u64,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self {
            latencies_us: Vec::new(),
            window_requests: 0,
            window_started: Instant::now(),
            orderbooks_received: 0,
        }
    }

    /// Records one fan-out batch: its round-trip latency and the number of
    /// requests it issued.
    pub fn record_batch(&mut self, latency_us: u64, requests: u64) {
        self.latencies_us.push(latency_us);
        self.window_requests += requests;
    }

    /// Counts order books successfully emitted to the core.
    pub fn record_order_books(&mut self, count: u64) {
        self.orderbooks_received += count;
    }

    pub fn orderbooks_received(&self) -> u64 {
        self.orderbooks_received
    }

    /// Folds the current window into a metrics payload and clears the
    /// buffers. `None` while fewer than two samples are buffered.
    pub fn take_window(&mut self) -> Option<serde_json::Value> {
        let percentiles = latency_percentile(&self.latencies_us)?;
        let elapsed = self.window_started.elapsed().as_secs_f64();
        let rps = if elapsed > 0.0 {
            self.window_requests as f64 / elapsed
        } else {
            0.0
        };

        self.latencies_us.clear();
        self.window_requests = 0;
        self.window_started = Instant::now();

        Some(serde_json::json!({
            "latency_percentiles_us": percentiles,
            "orderbook_rps": rps,
            "orderbooks_received": self.orderbooks_received,
        }))
    }
}

impl Default for StatsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
