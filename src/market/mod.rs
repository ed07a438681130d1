// Market data: bar history and feature windows
pub mod bar_store;
pub mod windows;

pub use bar_store::{AppendOutcome, BarStore};
pub use windows::{is_contiguous, FeatureWindow, WindowBuilder, FEATURES_PER_BAR};
