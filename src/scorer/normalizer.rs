use crate::types::Metric;

/// Realistic domain extremes per metric. Static; values outside saturate.
/// Percent metrics are on a 0–100 scale.
pub const fn bounds(metric: Metric) -> (f64, f64) {
    match metric {
        Metric::Elo => (500.0, 4000.0),
        Metric::KdRatio => (0.4, 2.5),
        Metric::WinrateGlobal => (20.0, 90.0),
        Metric::WinrateMap => (10.0, 100.0),
        Metric::HeadshotPct => (0.0, 70.0),
        Metric::AvgKillsPerMatch => (5.0, 30.0),
    }
}

/// Linear clamp of `raw` onto [0, 1] using the metric's bounds.
pub fn normalize(metric: Metric, raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    let (lo, hi) = bounds(metric);
    ((raw - lo) / (hi - lo)).clamp(0.0, 1.0)
}
