use std::sync::Arc;
use tracing::{debug, warn};

use super::SignalAnalyzer;
use crate::core::DerivedPoint;

/// Lowest sample frequency the analysis is meaningful for, in Hz
pub const MIN_FREQUENCY_HZ: f64 = 200.0;

/// Minimum history length as a fraction of one second of samples
pub const MIN_HISTORY_SECS: f64 = 0.6;

/// Accepted analysis window widths in seconds
pub const MIN_WINDOW_SECS: f64 = 0.005;
pub const MAX_WINDOW_SECS: f64 = 1.0;

/// Post-session computation of the derived metric
#[derive(Clone)]
pub struct DerivedMetricFinalizer {
    analyzer: Arc<dyn SignalAnalyzer>,
}

impl DerivedMetricFinalizer {
    pub fn new(analyzer: Arc<dyn SignalAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Whether the analysis preconditions hold
    pub fn is_computable(sample_count: usize, frequency: f64, window_width: f64) -> bool {
        (sample_count as f64) >= MIN_HISTORY_SECS * frequency
            && frequency >= MIN_FREQUENCY_HZ
            && (MIN_WINDOW_SECS..=MAX_WINDOW_SECS).contains(&window_width)
    }

    /// Run the analyzer, or `None` when the metric is not computable
    pub fn compute(&self, samples: &[f64], frequency: f64, window_width: f64) -> Option<Vec<f64>> {
        if !Self::is_computable(samples.len(), frequency, window_width) {
            debug!(
                samples = samples.len(),
                frequency, window_width, "derived metric not computable"
            );
            return None;
        }
        self.analyzer.analyze(samples, frequency, window_width)
    }

    /// Compute the metric and pair it with session-relative timestamps
    ///
    /// `timestamps` holds one entry per sample. Pairs are built against
    /// `timestamps[..n - 1]`, so the last timestamp is dropped.
    pub fn finalize(
        &self,
        samples: &[f64],
        timestamps: &[f64],
        frequency: f64,
        window_width: f64,
    ) -> Option<Vec<DerivedPoint>> {
        let values = self.compute(samples, frequency, window_width)?;
        if values.len() != timestamps.len() {
            warn!(
                values = values.len(),
                timestamps = timestamps.len(),
                "analyzer output does not match timestamps"
            );
            return None;
        }

        let first = *timestamps.first()?;
        let points = timestamps[..timestamps.len() - 1]
            .iter()
            .zip(values)
            .map(|(t, y)| DerivedPoint { x: t - first, y })
            .collect();
        Some(points)
    }
}
