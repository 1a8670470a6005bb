//! Session directory collaborator boundary.
//!
//! The directory is the request/response API that stores session
//! metadata (list, rename, delete). The realtime client does not
//! implement it; the application supplies one, and the client calls
//! `list_sessions` to refresh metadata after a protocol-driven session
//! change.

use futures_util::future::BoxFuture;

use applyflow_protocol::directory::{DirectoryOutcome, SessionSummary};

/// Errors reaching the session directory.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Application-provided access to stored session metadata.
pub trait SessionDirectory: Send + Sync {
    fn list_sessions<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<SessionSummary>, DirectoryError>>;

    fn rename_session<'a>(
        &'a self,
        user_id: &'a str,
        session_id: &'a str,
        title: &'a str,
    ) -> BoxFuture<'a, Result<DirectoryOutcome, DirectoryError>>;

    fn delete_session<'a>(
        &'a self,
        user_id: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, Result<DirectoryOutcome, DirectoryError>>;
}
