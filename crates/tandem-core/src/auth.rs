//! Credential state handed to the remote API.

use std::fmt;

/// Whether and how a remote endpoint can be called.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthState {
    /// The endpoint is public; no credential is sent.
    NotRequired,
    /// A credential is required but none is available. Sync does not run.
    Unauthenticated,
    /// Bearer token to send with every request.
    Authenticated(String),
}

impl AuthState {
    /// Build from an optional token, treating blank tokens as missing.
    pub fn from_token(token: Option<String>) -> Self {
        match crate::util::normalize_text_option(token) {
            Some(token) => Self::Authenticated(token),
            None => Self::Unauthenticated,
        }
    }

    pub fn bearer(&self) -> Option<&str> {
        match self {
            Self::Authenticated(token) => Some(token),
            Self::NotRequired | Self::Unauthenticated => None,
        }
    }

    pub const fn can_sync(&self) -> bool {
        !matches!(self, Self::Unauthenticated)
    }
}

impl fmt::Debug for AuthState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRequired => formatter.write_str("NotRequired"),
            Self::Unauthenticated => formatter.write_str("Unauthenticated"),
            Self::Authenticated(_) => formatter
                .debug_tuple("Authenticated")
                .field(&"[REDACTED]")
                .finish(),
        }
    }
}
