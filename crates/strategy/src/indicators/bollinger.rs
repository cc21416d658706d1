use super::finite;

/// Bollinger bands over a trailing window of closes.
///
/// Uses the simple moving average and the *sample* standard deviation
/// (n - 1 denominator). The first `window - 1` rows are missing. With
/// `window == 1` the standard deviation, and therefore both bands, stay
/// missing.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub window: usize,
    pub std_dev: f64,
}

/// Indicator values for one row. Bands are present only when both the mean
/// and the deviation are.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BandPoint {
    pub sma: Option<f64>,
    pub std: Option<f64>,
    pub upper: Option<f64>,
    pub lower: Option<f64>,
}

impl BollingerBands {
    pub fn new(window: usize, std_dev: f64) -> Self {
        Self { window, std_dev }
    }

    /// Compute one row per close (oldest first).
    pub fn compute(&self, closes: &[f64]) -> Vec<BandPoint> {
        (0..closes.len())
            .map(|i| {
                if self.window == 0 || i + 1 < self.window {
                    return BandPoint::default();
                }
                let window = &closes[i + 1 - self.window..=i];
                let sma = mean(window);
                let std = sma.and_then(|m| sample_std(window, m));
                let (upper, lower) = match (sma, std) {
                    (Some(m), Some(s)) => (
                        finite(m + self.std_dev * s),
                        finite(m - self.std_dev * s),
                    ),
                    _ => (None, None),
                };
                BandPoint { sma, std, upper, lower }
            })
            .collect()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    finite(values.iter().sum::<f64>() / values.len() as f64)
}

fn sample_std(values: &[f64], mean: f64) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    finite((ss / (values.len() - 1) as f64).sqrt())
}
