//! Error types for ledger operations.

use thiserror::Error;

use crate::Amount;
use crate::model::AccountId;

/// Top-level error returned by [`Engine::apply`](super::Engine::apply).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("registration failed: {0}")]
    Register(#[from] RegisterError),

    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("payment request failed: {0}")]
    Request(#[from] RequestError),

    #[error("badge claim failed: {0}")]
    Accrual(#[from] AccrualError),

    #[error("{0}")]
    Resolution(#[from] ResolutionError),
}

/// Transient persistence fault. Reads may be retried; a transfer must not
/// be retried blindly, since the prior attempt may have committed.
#[derive(Debug, Clone, Copy, Error)]
pub enum StoreError {
    #[error("store unavailable: lock wait exceeded the bounded timeout")]
    Unavailable,
}

/// Error during transfer execution.
#[derive(Debug, Error)]
pub enum TransferError {
    /// PIN mismatch. Nothing is recorded.
    #[error("invalid credential")]
    InvalidCredential,

    #[error("transfer amount {0} is not positive")]
    InvalidAmount(Amount),

    #[error("account {0} does not exist")]
    UnknownAccount(AccountId),

    /// Recorded as a `Failure` transaction before surfacing; the source
    /// balance is untouched.
    #[error("insufficient balance: have {balance}, requested {requested}")]
    InsufficientFunds { balance: Amount, requested: Amount },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error during payment-request upsert.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid credential")]
    InvalidCredential,

    #[error("request amount {0} is not positive")]
    InvalidAmount(Amount),

    #[error("account {0} does not exist")]
    UnknownAccount(AccountId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Badge subsystem fault. After a transfer has committed this is reported
/// as a secondary warning, never as a transfer failure.
#[derive(Debug, Clone, Copy, Error)]
pub enum AccrualError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error during user registration.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("user name '{0}' is already taken")]
    DuplicateName(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The acting account for an operation could not be resolved.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("cannot resolve acting account {0}")]
    UnknownAccount(AccountId),

    #[error(transparent)]
    Store(#[from] StoreError),
}
