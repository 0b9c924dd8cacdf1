// src/errors.rs
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DesignError {
    #[error("Network error: {0}")]
    NetworkUnreachable(String),

    #[error("Service error ({status}): {detail}")]
    Service { status: u16, detail: String },

    #[error("Service error ({status})")]
    ServiceUnstructured { status: u16 },

    #[error("Generation timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    #[error("Generation failed: {0}")]
    JobFailed(String),

    #[error("Image processing error: {0}")]
    LocalProcessing(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Superseded by a newer request")]
    Superseded,
}

impl DesignError {
    /// Message shown inline next to the action that failed.
    pub fn user_message(&self) -> String {
        match self {
            DesignError::NetworkUnreachable(_) => {
                "Cannot reach server, check your connection".to_string()
            }
            DesignError::Service { detail, .. } => detail.clone(),
            DesignError::ServiceUnstructured { .. } | DesignError::InvalidResponse(_) => {
                "Server error, please try again".to_string()
            }
            DesignError::Timeout { .. } => "Generation timed out, please try again".to_string(),
            DesignError::JobFailed(reason) => reason.clone(),
            DesignError::LocalProcessing(_) => "Could not process the image".to_string(),
            DesignError::Validation(reason) => reason.clone(),
            DesignError::Config(reason) => reason.clone(),
            DesignError::Superseded => String::new(),
        }
    }
}

impl From<reqwest::Error> for DesignError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() || err.is_body() {
            DesignError::InvalidResponse(err.to_string())
        } else {
            DesignError::NetworkUnreachable(err.to_string())
        }
    }
}

impl ResponseError for DesignError {
    fn error_response(&self) -> HttpResponse {
        match self {
            DesignError::NetworkUnreachable(_) => {
                HttpResponse::BadGateway().json(serde_json::json!({
                    "error": "Upstream unreachable",
                    "message": self.user_message()
                }))
            }
            DesignError::Service { .. }
            | DesignError::ServiceUnstructured { .. }
            | DesignError::InvalidResponse(_)
            | DesignError::JobFailed(_) => {
                HttpResponse::ServiceUnavailable().json(serde_json::json!({
                    "error": "Design service error",
                    "message": self.user_message()
                }))
            }
            DesignError::Timeout { .. } => HttpResponse::GatewayTimeout().json(serde_json::json!({
                "error": "Timeout",
                "message": self.user_message()
            })),
            DesignError::LocalProcessing(_) | DesignError::Validation(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Invalid request",
                    "message": self.to_string()
                }))
            }
            DesignError::Config(_) => HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Configuration error",
                "message": self.to_string()
            })),
            DesignError::Superseded => HttpResponse::Conflict().json(serde_json::json!({
                "error": "Superseded",
                "message": self.to_string()
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_distinguish_failure_kinds() {
        let unreachable = DesignError::NetworkUnreachable("connection refused".into());
        let structured = DesignError::Service {
            status: 500,
            detail: "OOM".into(),
        };
        let unstructured = DesignError::ServiceUnstructured { status: 502 };

        assert_eq!(structured.user_message(), "OOM");
        assert_ne!(unreachable.user_message(), unstructured.user_message());
        assert_ne!(unreachable.user_message(), structured.user_message());
        assert!(unreachable.user_message().contains("connection"));
    }

    #[test]
    fn timeout_message_mentions_retry() {
        let err = DesignError::Timeout { attempts: 60 };
        assert_eq!(err.user_message(), "Generation timed out, please try again");
    }
}
