//! Session-token to acting-account resolution.
//!
//! Every mutating operation executes on behalf of a resolved identity.
//! Resolution is explicit per token; the engine never infers the actor
//! from a global login log.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::model::{AccountId, Pin, UserId};

/// Opaque handle for one login.
pub type SessionToken = u64;

/// The identity an operation executes under: the account being acted on,
/// its owning user, and the stored PIN to check credentials against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingAccount {
    pub account: AccountId,
    pub user: UserId,
    pub pin: Pin,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no active session for token")]
    NoActiveSession,
}

/// Maps a session token to the account acting through it.
pub trait IdentityResolver {
    fn resolve(&self, token: SessionToken) -> Result<ActingAccount, SessionError>;
}

/// In-process session registry. Tokens are issued at login and stay valid
/// until logout.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionToken, ActingAccount>>,
    next_token: AtomicU64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&self, identity: ActingAccount) -> SessionToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
        self.sessions
            .write()
            .expect("session lock poisoned")
            .insert(token, identity);
        token
    }

    pub fn logout(&self, token: SessionToken) {
        self.sessions
            .write()
            .expect("session lock poisoned")
            .remove(&token);
    }
}

impl IdentityResolver for SessionStore {
    fn resolve(&self, token: SessionToken) -> Result<ActingAccount, SessionError> {
        self.sessions
            .read()
            .expect("session lock poisoned")
            .get(&token)
            .copied()
            .ok_or(SessionError::NoActiveSession)
    }
}
