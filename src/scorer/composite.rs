use std::collections::BTreeMap;

use crate::scorer::normalizer::normalize;
use crate::types::{Metric, PlayerMetricRecord};

/// Composite weights. Must sum to 1.0.
pub const WEIGHTS: [(Metric, f64); 6] = [
    (Metric::Elo, 0.30),
    (Metric::KdRatio, 0.20),
    (Metric::WinrateGlobal, 0.20),
    (Metric::WinrateMap, 0.20),
    (Metric::HeadshotPct, 0.05),
    (Metric::AvgKillsPerMatch, 0.05),
];

/// Metric name → normalized value for one player.
pub fn normalized_set(p: &PlayerMetricRecord) -> BTreeMap<Metric, f64> {
    Metric::ALL
        .iter()
        .map(|&m| (m, normalize(m, m.raw(p))))
        .collect()
}

/// Weighted sum of a normalized set, in [0, 1].
pub fn weighted_sum(set: &BTreeMap<Metric, f64>) -> f64 {
    WEIGHTS
        .iter()
        .map(|(m, w)| w * set.get(m).copied().unwrap_or(0.0))
        .sum::<f64>()
        .clamp(0.0, 1.0)
}

pub fn composite_score(p: &PlayerMetricRecord) -> f64 {
    weighted_sum(&normalized_set(p))
}
