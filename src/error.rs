use std::time::Duration;

use thiserror::Error;

/// Everything that can go wrong while turning a raw sample into a summary record.
///
/// `InvalidInput` and `NumericDomain` reject the whole sample. A [`FitFailure`] is normally
/// stored inside the summary instead of being raised, but it converts into this type for
/// callers that want to treat an unfitted sample as fatal.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("numeric domain error: {0}")]
    NumericDomain(String),
    #[error("lognormal fit failed: {0}")]
    Fit(#[from] FitFailure),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub(crate) fn domain(message: impl Into<String>) -> Self {
        Self::NumericDomain(message.into())
    }
}

/// Why a lognormal fit produced no parameters.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum FitFailure {
    #[error(
        "only {retained} non-empty bins after suppression and cutoff, at least {required} needed"
    )]
    TooFewBins { retained: usize, required: usize },
    #[error("solver did not converge within {iterations} iterations")]
    NotConverged { iterations: u64 },
    #[error("fit took {elapsed:?}, over the {budget:?} budget")]
    Timeout { elapsed: Duration, budget: Duration },
    #[error("optimiser error: {0}")]
    Optimiser(String),
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Error, FitFailure};

    #[test]
    fn fit_failures_convert_into_the_crate_error() {
        let failure = FitFailure::TooFewBins {
            retained: 2,
            required: 3,
        };
        let error: Error = failure.clone().into();
        assert!(matches!(error, Error::Fit(ref inner) if *inner == failure));
    }

    #[test]
    fn timeout_messages_name_both_durations() {
        let failure = FitFailure::Timeout {
            elapsed: Duration::from_millis(1500),
            budget: Duration::from_millis(1000),
        };
        let message = failure.to_string();
        assert!(message.contains("1.5s"));
        assert!(message.contains("1s"));
    }
}
