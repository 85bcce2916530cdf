//! Pluggable authentication run during the connect handshake.
//!
//! A connection carries one named method. The name is sent to the daemon,
//! then a fresh authenticator is built from the method's factory and run
//! before the daemon's verdict is read.

use std::fmt;

use crate::protocol::{DEFAULT_AUTH_NAME, MAX_AUTH_NAME};

/// Failure reported by an [`Authenticator`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct AuthError {
    reason: String,
}

impl AuthError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Runs one authentication exchange for a connection being established.
pub trait Authenticator: Send {
    fn authenticate(&mut self) -> Result<(), AuthError>;
}

/// Accepts unconditionally; used when no other method is registered.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuth;

impl Authenticator for NullAuth {
    fn authenticate(&mut self) -> Result<(), AuthError> {
        Ok(())
    }
}

type Factory = Box<dyn Fn() -> Box<dyn Authenticator> + Send + Sync>;

/// A named authentication method and the factory that builds it.
pub struct AuthMethod {
    name: String,
    factory: Factory,
}

impl AuthMethod {
    /// Names longer than the handshake slot are truncated.
    pub fn new<F, A>(name: &str, factory: F) -> Self
    where
        F: Fn() -> A + Send + Sync + 'static,
        A: Authenticator + 'static,
    {
        let mut name = name.to_string();
        if name.len() > MAX_AUTH_NAME {
            let mut end = MAX_AUTH_NAME;
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            name.truncate(end);
        }

        Self {
            name,
            factory: Box::new(move || Box::new(factory())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn instantiate(&self) -> Box<dyn Authenticator> {
        (self.factory)()
    }
}

impl Default for AuthMethod {
    fn default() -> Self {
        Self::new(DEFAULT_AUTH_NAME, || NullAuth)
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthMethod").field("name", &self.name).finish()
    }
}
