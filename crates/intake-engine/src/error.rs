use std::path::PathBuf;

use intake_spec::TemplateError;
use thiserror::Error;

/// Failure reported by a questionnaire or product source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Fatal error while preparing a session; no partial session is produced.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("questionnaire could not be loaded")]
    Questionnaire(#[source] SourceError),
    #[error("products for treatment '{treatment}' could not be loaded")]
    Products {
        treatment: String,
        #[source]
        source: SourceError,
    },
    #[error("plans for treatment '{treatment}' could not be loaded")]
    Plans {
        treatment: String,
        #[source]
        source: SourceError,
    },
}

/// Failure from the payment/subscription collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("payment service unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Message suitable for showing to the patient.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Declined(reason) | GatewayError::Rejected(reason) => reason.clone(),
            GatewayError::Unavailable(_) => {
                "We could not reach the payment service. Please try again.".to_string()
            }
        }
    }
}
