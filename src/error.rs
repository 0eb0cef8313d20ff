use thiserror::Error;

use crate::numerics::newton::SolveError;

/// Failures that abort a run: no usable basis, tensors, or report can be produced.
#[derive(Debug, Error)]
pub enum RomError {
    #[error("requested {requested} POD modes but the snapshot matrix only supports {available}")]
    RankTooLarge { requested: usize, available: usize },
    #[error("shape mismatch in {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("sample count mismatch in {what}: {left} vs {right}")]
    SampleCountMismatch {
        what: &'static str,
        left: usize,
        right: usize,
    },
    #[error("invalid design space: {0}")]
    InvalidDesignSpace(String),
    #[error("snapshot file is missing array `{0}`")]
    MissingArray(&'static str),
    #[error("invalid configuration value for `{key}`: {reason}")]
    InvalidConfig { key: &'static str, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Solve(#[from] SolveError),
}

pub type Result<T> = std::result::Result<T, RomError>;

pub(crate) fn ensure_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(RomError::ShapeMismatch {
            what,
            expected,
            found,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_error_mentions_both_counts() {
        let err = RomError::RankTooLarge {
            requested: 12,
            available: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("12") && msg.contains("10"), "{msg}");
    }

    #[test]
    fn ensure_len_reports_mismatch() {
        assert!(ensure_len("field", 4, 4).is_ok());
        match ensure_len("field", 4, 5) {
            Err(RomError::ShapeMismatch {
                expected, found, ..
            }) => assert_eq!((expected, found), (4, 5)),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
