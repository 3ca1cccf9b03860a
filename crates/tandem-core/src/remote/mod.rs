//! Remote side of reconciliation
//!
//! [`RemoteApi`] is the narrow seam to the server: four calls per entity
//! kind, each returning a `Result` whose error is a classified
//! [`RemoteError`]. Implementations must not panic on expected failures;
//! transport and decoding failures are converted at the call boundary.

mod http;
mod overlay;

pub use http::HttpRemoteApi;
pub use overlay::RemoteStore;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::AuthState;
use crate::models::Syncable;

/// Classified failure of a remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not authorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response payload: {0}")]
    Decode(String),
    #[error("Remote API error: {0}")]
    Unexpected(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Server operations for one entity kind.
#[async_trait]
pub trait RemoteApi<T: Syncable>: Send + Sync {
    /// All records owned by `owner`.
    async fn fetch(&self, owner: &str, auth: &AuthState) -> RemoteResult<Vec<T>>;

    /// Create a record with its client-assigned id.
    async fn create(&self, item: &T, auth: &AuthState) -> RemoteResult<T>;

    /// Replace an existing record.
    async fn update(&self, item: &T, auth: &AuthState) -> RemoteResult<T>;

    /// Remove a record.
    async fn delete(&self, item: &T, auth: &AuthState) -> RemoteResult<()>;
}

#[async_trait]
impl<T: Syncable, A: RemoteApi<T> + ?Sized> RemoteApi<T> for Arc<A> {
    async fn fetch(&self, owner: &str, auth: &AuthState) -> RemoteResult<Vec<T>> {
        (**self).fetch(owner, auth).await
    }

    async fn create(&self, item: &T, auth: &AuthState) -> RemoteResult<T> {
        (**self).create(item, auth).await
    }

    async fn update(&self, item: &T, auth: &AuthState) -> RemoteResult<T> {
        (**self).update(item, auth).await
    }

    async fn delete(&self, item: &T, auth: &AuthState) -> RemoteResult<()> {
        (**self).delete(item, auth).await
    }
}
