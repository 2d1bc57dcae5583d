use super::types::Variable;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolveError {
    #[error("invalid {field}: {message}")]
    Domain {
        field: &'static str,
        message: String,
    },

    #[error("no solution for {variable}: {reason}")]
    NoSolution { variable: Variable, reason: String },

    #[error("ambiguous unknowns: {0}")]
    AmbiguousUnknowns(String),
}

impl SolveError {
    pub(crate) fn domain(field: &'static str, message: impl Into<String>) -> Self {
        SolveError::Domain {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn no_solution(variable: Variable, reason: impl Into<String>) -> Self {
        SolveError::NoSolution {
            variable,
            reason: reason.into(),
        }
    }

    pub fn is_no_solution(&self) -> bool {
        matches!(self, SolveError::NoSolution { .. })
    }
}
