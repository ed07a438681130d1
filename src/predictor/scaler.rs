use serde::{Deserialize, Serialize};

/// Min-max scaling to [0, 1], fit once and then frozen
///
/// Values outside the fitted range map outside [0, 1]; nothing is clamped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MinMaxScaler {
    min: f64,
    max: f64,
}

impl MinMaxScaler {
    /// Fit on a set of values. `None` if there are no finite values.
    pub fn fit<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values.into_iter().filter(|v| v.is_finite()) {
            min = min.min(v);
            max = max.max(v);
        }

        if min.is_finite() && max.is_finite() {
            Some(Self { min, max })
        } else {
            None
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Width of the fitted range, 1.0 for a constant series
    fn scale(&self) -> f64 {
        let range = self.max - self.min;
        if range > 0.0 {
            range
        } else {
            1.0
        }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.min) / self.scale()
    }

    pub fn inverse_transform(&self, value: f64) -> f64 {
        value * self.scale() + self.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_and_transform() {
        let scaler = MinMaxScaler::fit([10.0, 20.0, 15.0]).unwrap();

        assert_eq!(scaler.min(), 10.0);
        assert_eq!(scaler.max(), 20.0);
        assert_eq!(scaler.transform(10.0), 0.0);
        assert_eq!(scaler.transform(20.0), 1.0);
        assert_eq!(scaler.transform(15.0), 0.5);
    }

    #[test]
    fn test_out_of_range_is_not_clamped() {
        let scaler = MinMaxScaler::fit([10.0, 20.0]).unwrap();

        assert_eq!(scaler.transform(30.0), 2.0);
        assert_eq!(scaler.transform(5.0), -0.5);
        assert_eq!(scaler.inverse_transform(2.0), 30.0);
    }

    #[test]
    fn test_inverse_round_trip() {
        let scaler = MinMaxScaler::fit([1.2345, 1.3012, 1.2799]).unwrap();
        let price = 1.2901;

        let back = scaler.inverse_transform(scaler.transform(price));
        assert!((back - price).abs() < 1e-12);
    }

    #[test]
    fn test_constant_series() {
        let scaler = MinMaxScaler::fit([5.0, 5.0]).unwrap();

        assert_eq!(scaler.transform(5.0), 0.0);
        assert_eq!(scaler.inverse_transform(0.0), 5.0);
    }

    #[test]
    fn test_empty_or_non_finite() {
        assert!(MinMaxScaler::fit(Vec::<f64>::new()).is_none());
        assert!(MinMaxScaler::fit([f64::NAN]).is_none());
    }
}
