use thiserror::Error;

use crate::flows::FlowTransitionError;
use crate::recipients::RecipientPlan;

/// Malformed submission payloads, detected before any rendering starts.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingField { field: String },
    #[error("{field} is invalid: {reason}")]
    InvalidField { field: String, reason: String },
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField { field: field.into() }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField { field: field.into(), reason: reason.into() }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::MissingField { field } | Self::InvalidField { field, .. } => field,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("render failure: {0}")]
    Render(String),
    #[error("delivery failure: {message}")]
    Delivery { provider: String, message: String, recipients: RecipientPlan },
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Invalid quote request",
            Self::Render(_) => "Failed to generate quote",
            Self::Delivery { .. } => "Failed to send quote email",
            Self::FlowTransition(_) | Self::Configuration(_) => {
                "An unexpected internal error occurred"
            }
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
