//! Error taxonomy for one orchestration run.
//!
//! Every stage reports a terminal `MailerError`; the orchestrator folds it
//! into a `SendOutcome` whose `FailureReason` the caller maps to a response.
//! The variants follow the taxonomy: configuration errors fail before any
//! process launches, environment and session errors are fatal for the run,
//! and `SendUnconfirmed` is its own category - never upgraded to success,
//! never collapsed into a hard failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cdp::CdpError;

/// Failure kinds surfaced to the caller for status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    InvalidConfiguration,
    AuthenticationRequired,
    LaunchTimeout,
    ConnectionLost,
    UiElementNotFound,
    SendUnconfirmed,
    InternalError,
}

#[derive(Error, Debug)]
pub enum MailerError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("not logged in to the webmail account; manual login is required")]
    AuthenticationRequired,

    #[error("browser debug port did not become ready: {0}")]
    LaunchTimeout(String),

    #[error("browser connection lost: {0}")]
    ConnectionLost(String),

    #[error("no candidate selector matched during {step}")]
    UiElementNotFound { step: String },

    #[error("send was triggered but no confirmation was observed")]
    SendUnconfirmed,

    #[error("environment error: {0}")]
    Environment(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MailerError {
    pub fn reason(&self) -> FailureReason {
        match self {
            MailerError::InvalidConfiguration(_) => FailureReason::InvalidConfiguration,
            MailerError::AuthenticationRequired => FailureReason::AuthenticationRequired,
            MailerError::LaunchTimeout(_) => FailureReason::LaunchTimeout,
            MailerError::ConnectionLost(_) => FailureReason::ConnectionLost,
            MailerError::UiElementNotFound { .. } => FailureReason::UiElementNotFound,
            MailerError::SendUnconfirmed => FailureReason::SendUnconfirmed,
            MailerError::Environment(_) | MailerError::Io(_) => FailureReason::InternalError,
        }
    }
}

impl From<CdpError> for MailerError {
    fn from(err: CdpError) -> Self {
        if err.is_connection_lost() {
            MailerError::ConnectionLost(err.to_string())
        } else {
            MailerError::Environment(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, MailerError>;

/// The sole return value of one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub succeeded: bool,
    pub reason: Option<FailureReason>,
    pub message: String,
}

impl SendOutcome {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            reason: None,
            message: "email sent".to_string(),
        }
    }

    pub fn failure(err: &MailerError) -> Self {
        Self {
            succeeded: false,
            reason: Some(err.reason()),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cdp_closed_maps_to_connection_lost() {
        let err: MailerError = CdpError::Closed.into();
        assert_eq!(err.reason(), FailureReason::ConnectionLost);
    }

    #[test]
    fn cdp_timeout_does_not_map_to_connection_lost() {
        let err: MailerError =
            CdpError::Timeout(Duration::from_secs(1), "Page.navigate".into()).into();
        assert_eq!(err.reason(), FailureReason::InternalError);
    }

    #[test]
    fn outcome_carries_reason_and_message() {
        let err = MailerError::UiElementNotFound {
            step: "compose trigger".into(),
        };
        let outcome = SendOutcome::failure(&err);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.reason, Some(FailureReason::UiElementNotFound));
        assert!(outcome.message.contains("compose trigger"));

        let ok = SendOutcome::success();
        assert!(ok.succeeded);
        assert_eq!(ok.reason, None);
    }

    #[test]
    fn unconfirmed_is_neither_success_nor_hard_failure_reason() {
        let outcome = SendOutcome::failure(&MailerError::SendUnconfirmed);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.reason, Some(FailureReason::SendUnconfirmed));
    }
}
