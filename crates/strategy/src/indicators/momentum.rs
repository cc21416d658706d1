use super::finite;

/// Percentage change over a fixed look-back.
///
/// `momentum[i] = (close[i] - close[i - window]) / close[i - window]`.
/// The first `window` values are missing, as is any value whose reference
/// close is zero or whose result is not finite.
#[derive(Debug, Clone)]
pub struct MomentumIndicator {
    pub window: usize,
}

impl MomentumIndicator {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// Compute one value per close (oldest first).
    pub fn compute(&self, closes: &[f64]) -> Vec<Option<f64>> {
        (0..closes.len())
            .map(|i| {
                if i < self.window || self.window == 0 {
                    return None;
                }
                let reference = closes[i - self.window];
                if reference == 0.0 {
                    return None;
                }
                finite((closes[i] - reference) / reference)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_window_values_are_missing() {
        let m = MomentumIndicator::new(3);
        let values = m.compute(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(values.len(), 5);
        assert!(values[..3].iter().all(Option::is_none));
        assert_eq!(values[3], Some(3.0));
        assert_eq!(values[4], Some(1.5));
    }

    #[test]
    fn zero_reference_is_missing() {
        let m = MomentumIndicator::new(1);
        let values = m.compute(&[0.0, 5.0, 10.0]);
        assert_eq!(values, vec![None, None, Some(1.0)]);
    }

    #[test]
    fn nan_input_is_missing() {
        let m = MomentumIndicator::new(1);
        let values = m.compute(&[1.0, f64::NAN, 2.0]);
        assert_eq!(values[1], None);
        assert_eq!(values[2], None);
    }
}
