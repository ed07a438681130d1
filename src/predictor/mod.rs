// Next-bar price prediction
pub mod ridge;
pub mod scaler;

pub use ridge::RidgeRegression;
pub use scaler::MinMaxScaler;

use crate::error::TraderError;
use crate::market::{FeatureWindow, FEATURES_PER_BAR};
use crate::Result;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Index of tick volume inside a feature row
const VOLUME_INDEX: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Fewest labelled windows `fit` accepts
    pub min_training_windows: usize,
    /// L2 penalty on the model coefficients
    pub ridge_lambda: f64,
    /// Share of windows held out for validation
    pub validation_fraction: f64,
    /// Seed for the train/validation shuffle
    pub seed: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            min_training_windows: 50,
            ridge_lambda: 1e-3,
            validation_fraction: 0.2,
            seed: 42,
        }
    }
}

/// Outcome of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub windows: usize,
    pub train_samples: usize,
    pub validation_samples: usize,
    /// Errors are in normalized price units
    pub train_mse: f64,
    pub validation_mse: Option<f64>,
    pub close_min: f64,
    pub close_max: f64,
}

/// Normalization transforms fixed at training time
#[derive(Debug, Clone, Copy)]
struct FittedScalers {
    close: MinMaxScaler,
    volume: MinMaxScaler,
}

/// Maps a feature window to an estimate of the next bar's close
///
/// Prices in the window are normalized with the close transform fit on the
/// training labels; tick volume has its own transform. Both are frozen after
/// `fit`, so prices beyond the training range extrapolate.
#[derive(Debug, Clone)]
pub struct Predictor {
    config: PredictorConfig,
    window: Option<usize>,
    scalers: Option<FittedScalers>,
    model: RidgeRegression,
}

impl Predictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            config,
            window: None,
            scalers: None,
            model: RidgeRegression::new(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.scalers.is_some() && self.model.is_fitted()
    }

    /// Fitted close transform, if any
    pub fn close_scaler(&self) -> Option<MinMaxScaler> {
        self.scalers.map(|s| s.close)
    }

    /// Train on labelled windows
    ///
    /// Unlabelled windows are ignored. Replaces any previous fit.
    pub fn fit(&mut self, windows: &[FeatureWindow]) -> Result<TrainingReport> {
        let labelled: Vec<(&FeatureWindow, f64)> = windows
            .iter()
            .filter_map(|w| w.label.map(|label| (w, label)))
            .collect();

        let required = self.config.min_training_windows.max(1);
        if labelled.len() < required {
            return Err(TraderError::InsufficientData {
                available: labelled.len(),
                required,
            });
        }

        let window = labelled[0].0.len();
        if window == 0 || labelled.iter().any(|(w, _)| w.len() != window) {
            return Err(TraderError::Model(
                "training windows must share one non-zero length".to_string(),
            ));
        }

        let close = MinMaxScaler::fit(labelled.iter().map(|(_, label)| *label))
            .ok_or_else(|| TraderError::Model("labels contain no finite prices".to_string()))?;
        let volume = MinMaxScaler::fit(
            labelled
                .iter()
                .flat_map(|(w, _)| w.rows.iter().map(|row| row[VOLUME_INDEX])),
        )
        .ok_or_else(|| TraderError::Model("windows contain no finite volume".to_string()))?;
        let scalers = FittedScalers { close, volume };

        // Shuffle once with a fixed seed so the split is reproducible
        let mut order: Vec<usize> = (0..labelled.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        order.shuffle(&mut rng);

        let fraction = self.config.validation_fraction.clamp(0.0, 0.9);
        let mut n_val = (labelled.len() as f64 * fraction).floor() as usize;
        if labelled.len() - n_val < 2 {
            n_val = 0;
        }
        let (val_idx, train_idx) = order.split_at(n_val);

        let (x_train, y_train) = design_matrix(&labelled, train_idx, window, &scalers);
        let mut model = RidgeRegression::new();
        model.fit(&x_train, &y_train, self.config.ridge_lambda)?;

        let train_mse = model.mse(&x_train, &y_train)?;
        let validation_mse = if val_idx.is_empty() {
            None
        } else {
            let (x_val, y_val) = design_matrix(&labelled, val_idx, window, &scalers);
            Some(model.mse(&x_val, &y_val)?)
        };

        self.window = Some(window);
        self.scalers = Some(scalers);
        self.model = model;

        let report = TrainingReport {
            windows: labelled.len(),
            train_samples: train_idx.len(),
            validation_samples: val_idx.len(),
            train_mse,
            validation_mse,
            close_min: close.min(),
            close_max: close.max(),
        };

        tracing::info!(
            windows = report.windows,
            train_mse = report.train_mse,
            validation_mse = ?report.validation_mse,
            "Predictor trained"
        );

        Ok(report)
    }

    /// De-normalized next-close estimate for one window
    pub fn predict(&self, window: &FeatureWindow) -> Result<f64> {
        let (scalers, expected) = match (self.scalers, self.window) {
            (Some(scalers), Some(expected)) if self.model.is_fitted() => (scalers, expected),
            _ => return Err(TraderError::NotFitted),
        };

        if window.len() != expected {
            return Err(TraderError::InsufficientData {
                available: window.len(),
                required: expected,
            });
        }

        let row = Array1::from(flatten(window, &scalers));
        let normalized = self.model.predict_row(row.view())?;
        Ok(scalers.close.inverse_transform(normalized))
    }
}

/// Flatten a window into one normalized feature row
fn flatten(window: &FeatureWindow, scalers: &FittedScalers) -> Vec<f64> {
    window
        .rows
        .iter()
        .flat_map(|row| {
            row.iter().enumerate().map(|(i, &v)| {
                if i == VOLUME_INDEX {
                    scalers.volume.transform(v)
                } else {
                    scalers.close.transform(v)
                }
            })
        })
        .collect()
}

fn design_matrix(
    labelled: &[(&FeatureWindow, f64)],
    indices: &[usize],
    window: usize,
    scalers: &FittedScalers,
) -> (Array2<f64>, Array1<f64>) {
    let n_features = window * FEATURES_PER_BAR;
    let mut x = Array2::<f64>::zeros((indices.len(), n_features));
    let mut y = Array1::<f64>::zeros(indices.len());

    for (row_idx, &i) in indices.iter().enumerate() {
        let (w, label) = labelled[i];
        for (j, v) in flatten(w, scalers).into_iter().enumerate() {
            x[[row_idx, j]] = v;
        }
        y[row_idx] = scalers.close.transform(label);
    }

    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::WindowBuilder;
    use crate::models::Bar;
    use chrono::{Duration, TimeZone, Utc};

    fn trending_bars(count: usize) -> Vec<Bar> {
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        (0..count)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.5 + (i as f64 * 0.7).sin();
                Bar {
                    timestamp: base + Duration::minutes(i as i64),
                    open: close - 0.2,
                    high: close + 0.4,
                    low: close - 0.6,
                    close,
                    tick_volume: 100.0 + (i % 7) as f64 * 10.0,
                }
            })
            .collect()
    }

    fn small_config() -> PredictorConfig {
        PredictorConfig {
            min_training_windows: 10,
            ..PredictorConfig::default()
        }
    }

    #[test]
    fn test_predict_before_fit() {
        let predictor = Predictor::new(small_config());
        let bars = trending_bars(30);
        let window = WindowBuilder::new(5).latest(&bars).unwrap();

        assert!(!predictor.is_fitted());
        assert!(matches!(
            predictor.predict(&window),
            Err(TraderError::NotFitted)
        ));
    }

    #[test]
    fn test_fit_requires_minimum_windows() {
        let mut predictor = Predictor::new(small_config());
        let bars = trending_bars(12);
        let windows: Vec<FeatureWindow> = WindowBuilder::new(5).build(&bars).collect();

        let result = predictor.fit(&windows);
        assert!(matches!(
            result,
            Err(TraderError::InsufficientData {
                available: 7,
                required: 10
            })
        ));
        assert!(!predictor.is_fitted());
    }

    #[test]
    fn test_fit_and_predict() {
        let mut predictor = Predictor::new(small_config());
        let bars = trending_bars(200);
        let builder = WindowBuilder::new(5);
        let windows: Vec<FeatureWindow> = builder.build(&bars).collect();

        let report = predictor.fit(&windows).unwrap();
        assert_eq!(report.windows, 195);
        assert_eq!(report.validation_samples, 39);
        assert_eq!(report.train_samples, 156);
        assert!(report.validation_mse.is_some());

        let window = builder.latest(&bars).unwrap();
        let predicted = predictor.predict(&window).unwrap();
        let last_close = window.last_close().unwrap();

        // A linear fit on a steady trend lands near the latest close
        assert!((predicted - last_close).abs() < 5.0);
    }

    #[test]
    fn test_predict_is_deterministic() {
        let bars = trending_bars(120);
        let builder = WindowBuilder::new(4);
        let windows: Vec<FeatureWindow> = builder.build(&bars).collect();

        let mut a = Predictor::new(small_config());
        let mut b = Predictor::new(small_config());
        a.fit(&windows).unwrap();
        b.fit(&windows).unwrap();

        let window = builder.latest(&bars).unwrap();
        let first = a.predict(&window).unwrap();
        assert_eq!(first, a.predict(&window).unwrap());
        assert_eq!(first, b.predict(&window).unwrap());
    }

    #[test]
    fn test_transform_is_frozen_after_fit() {
        let bars = trending_bars(120);
        let builder = WindowBuilder::new(4);
        let windows: Vec<FeatureWindow> = builder.build(&bars).collect();
        let mut predictor = Predictor::new(small_config());
        predictor.fit(&windows).unwrap();
        let scaler = predictor.close_scaler().unwrap();

        // Prices far above the training range still produce a finite estimate
        let mut window = builder.latest(&bars).unwrap();
        for row in window.rows.iter_mut() {
            for v in row.iter_mut().take(4) {
                *v += 1000.0;
            }
        }
        let predicted = predictor.predict(&window).unwrap();

        assert!(predicted.is_finite());
        assert_eq!(predictor.close_scaler().unwrap(), scaler);
    }

    #[test]
    fn test_window_length_mismatch() {
        let bars = trending_bars(120);
        let windows: Vec<FeatureWindow> = WindowBuilder::new(4).build(&bars).collect();
        let mut predictor = Predictor::new(small_config());
        predictor.fit(&windows).unwrap();

        let short = WindowBuilder::new(3).latest(&bars).unwrap();
        assert!(matches!(
            predictor.predict(&short),
            Err(TraderError::InsufficientData { .. })
        ));
    }
}
