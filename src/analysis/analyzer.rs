/// Signal analysis routine applied to one channel's full session history
pub trait SignalAnalyzer: Send + Sync {
    /// One value per input sample, or `None` when the analysis is unavailable
    fn analyze(&self, samples: &[f64], frequency: f64, window_width: f64) -> Option<Vec<f64>>;
}

impl<F> SignalAnalyzer for F
where
    F: Fn(&[f64], f64, f64) -> Option<Vec<f64>> + Send + Sync,
{
    fn analyze(&self, samples: &[f64], frequency: f64, window_width: f64) -> Option<Vec<f64>> {
        self(samples, frequency, window_width)
    }
}

/// Trailing-window RMS of the mean-free signal
#[derive(Debug, Clone, Copy, Default)]
pub struct SlidingRmsAnalyzer;

impl SignalAnalyzer for SlidingRmsAnalyzer {
    fn analyze(&self, samples: &[f64], frequency: f64, window_width: f64) -> Option<Vec<f64>> {
        if samples.is_empty() || frequency <= 0.0 || window_width <= 0.0 {
            return None;
        }

        let window = ((window_width * frequency).round() as usize).clamp(1, samples.len());
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;

        let mut output = Vec::with_capacity(samples.len());
        let mut sum_sq = 0.0;
        for (i, sample) in samples.iter().enumerate() {
            let centered = sample - mean;
            sum_sq += centered * centered;
            if i >= window {
                let old = samples[i - window] - mean;
                sum_sq -= old * old;
            }
            let len = (i + 1).min(window) as f64;
            output.push((sum_sq.max(0.0) / len).sqrt());
        }
        Some(output)
    }
}
