use std::fmt;

use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load dataset {source_id}: {reason}")]
    DataLoad { source_id: String, reason: String },

    #[error("dataset {source_id} is missing required column `{column}`")]
    MissingColumn { source_id: String, column: String },

    #[error("label `{label}` is not in the fitted {space} vocabulary")]
    UnknownLabel { space: &'static str, label: String },

    #[error("code {code} is out of range for the {space} vocabulary (size {size})")]
    InvalidCode {
        space: &'static str,
        code: usize,
        size: usize,
    },

    #[error("insufficient data for {stage}: {detail}")]
    InsufficientData { stage: &'static str, detail: String },

    #[error("feature contract violated: {0}")]
    FeatureContract(String),

    #[error("training cancelled before completion")]
    Cancelled,
}

impl EngineError {
    pub fn data_load(source_id: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::DataLoad {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn insufficient(stage: &'static str, detail: impl Into<String>) -> Self {
        Self::InsufficientData {
            stage,
            detail: detail.into(),
        }
    }

    /// True for caller/input mistakes, false for data-source outages and cancellation.
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::DataLoad { .. } | Self::Cancelled)
    }
}

/// Non-fatal: a ratio was requested with a zero denominator and defaulted to 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivisionGuardWarning {
    pub feature: &'static str,
    pub denominator: &'static str,
    pub row: Option<usize>,
}

impl fmt::Display for DivisionGuardWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row {
            Some(row) => write!(
                f,
                "{} = 0 on row {}, {} set to 0",
                self.denominator, row, self.feature
            ),
            None => write!(f, "{} = 0, {} set to 0", self.denominator, self.feature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DivisionGuardWarning, EngineError};

    #[test]
    fn structural_errors_are_distinct_from_load_failures() {
        let load = EngineError::data_load("formations.csv", "no such file");
        assert!(!load.is_structural());
        assert!(!EngineError::Cancelled.is_structural());

        let unknown = EngineError::UnknownLabel {
            space: "losing formation",
            label: "2-3-5".to_string(),
        };
        assert!(unknown.is_structural());
        assert!(EngineError::insufficient("balancing", "class `3-5-2` has 1 row").is_structural());
    }

    #[test]
    fn division_warning_names_the_feature() {
        let w = DivisionGuardWarning {
            feature: "shot_accuracy",
            denominator: "total_shots",
            row: None,
        };
        assert_eq!(w.to_string(), "total_shots = 0, shot_accuracy set to 0");
    }
}
