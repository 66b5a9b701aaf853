use thiserror::Error;

/// Configuration or input values rejected before any computation runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}

impl ValidationError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            ValidationError::InvalidField { field, .. } => field,
        }
    }
}

/// Errors surfaced by inference, design selection and the trial loop.
#[derive(Debug, Error)]
pub enum BadError {
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
    #[error("response label {value} is neither 0 (chose A) nor 1 (chose B)")]
    ResponseLabel { value: u8 },
    #[error("posterior collapsed: no particle keeps a finite weight after {trials} trials")]
    PosteriorCollapse { trials: usize },
    #[error("cannot broadcast {particles} parameter rows against {designs} design rows")]
    ShapeMismatch { particles: usize, designs: usize },
    #[error("parameter columns {found:?} do not match the model parameters {expected:?}")]
    ColumnMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("unknown parameter '{name}'")]
    UnknownParameter { name: String },
    #[error("`{operation}` is not allowed while the trial loop is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

pub type BadResult<T> = Result<T, BadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_convert_and_keep_field() {
        let err = ValidationError::invalid("design_space.pa", "out of range");
        assert_eq!(err.field(), "design_space.pa");
        let wrapped: BadError = err.into();
        assert!(wrapped.to_string().contains("design_space.pa: out of range"));
    }
}
