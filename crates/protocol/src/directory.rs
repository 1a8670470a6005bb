//! DTOs for the session directory collaborator.
//!
//! The directory is a plain request/response API (list, rename, delete
//! sessions) living outside the realtime channel. The realtime client
//! only consumes it to refresh session-list metadata after a
//! protocol-driven session change; its implementation belongs to the
//! application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of one stored session, as listed by the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a directory mutation (rename, delete).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DirectoryOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_ok_omits_error_field() {
        let json = serde_json::to_value(DirectoryOutcome::ok()).unwrap();
        assert_eq!(json, serde_json::json!({"success": true}));
    }

    #[test]
    fn outcome_failed_carries_message() {
        let outcome = DirectoryOutcome::failed("session not found");
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("session not found"));
    }
}
