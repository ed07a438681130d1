use crate::models::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    OpenLong,
    Close,
    Hold,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionDecision {
    pub action: Decision,
    pub reason: String,
}

/// Two-state policy driven by the predicted next close
///
/// Flat and prediction above price → open long. In a position and prediction
/// below price → close. Everything else, ties included, holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine;

impl DecisionEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(
        &self,
        predicted_price: f64,
        current_price: f64,
        position: Option<&Position>,
    ) -> ExecutionDecision {
        match position {
            None if predicted_price > current_price => ExecutionDecision {
                action: Decision::OpenLong,
                reason: format!(
                    "Predicted {:.5} above current {:.5}",
                    predicted_price, current_price
                ),
            },
            None => ExecutionDecision {
                action: Decision::Hold,
                reason: "No position and no expected rise".to_string(),
            },
            Some(position) if predicted_price < current_price => ExecutionDecision {
                action: Decision::Close,
                reason: format!(
                    "Predicted {:.5} below current {:.5} (order {})",
                    predicted_price, current_price, position.id
                ),
            },
            Some(_) => ExecutionDecision {
                action: Decision::Hold,
                reason: "Holding open position".to_string(),
            },
        }
    }
}
