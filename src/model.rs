//! Core domain types for the payment ledger.

use std::str::FromStr;

use thiserror::Error;

use crate::Amount;

/// Account handle ("fintop id"). One per registered user.
pub type AccountId = u32;

/// Owning user identifier.
pub type UserId = u32;

/// Transaction identifier, assigned by the engine at insertion.
pub type TxId = u64;

/// Server-assigned insertion stamp, monotonic across the whole engine.
/// Transaction times and badge award times share the same clock.
pub type Seq = u64;

/// A 4-digit account secret.
///
/// Comparison is numeric: a supplied `"0042"` matches a stored `42`, the
/// same normalization the PIN went through at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pin(u16);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("pin must be a number between 0000 and 9999")]
pub struct InvalidPin;

impl Pin {
    pub fn new(value: u16) -> Result<Self, InvalidPin> {
        if value > 9999 {
            return Err(InvalidPin);
        }
        Ok(Pin(value))
    }

    /// Numeric comparison against a user-supplied string.
    pub fn matches(&self, supplied: &str) -> bool {
        supplied
            .trim()
            .parse::<u16>()
            .is_ok_and(|value| value == self.0)
    }
}

impl FromStr for Pin {
    type Err = InvalidPin;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().parse::<u16>().map_err(|_| InvalidPin)?;
        Pin::new(value)
    }
}

/// Outcome of a transfer attempt. Both outcomes are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Failure,
}

/// One row of the transaction log. Immutable once appended; failed
/// attempts are recorded too, as audit entries.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub id: TxId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    pub status: TxStatus,
    pub at: Seq,
}

/// Payment-request state. Requests stay `Pending` until resolved out of
/// band; the book only ever holds one pending row per ordered pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestStatus {
    #[default]
    Pending,
}

/// A pending ask for funds from `from` (requester) to `to` (payer).
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    pub status: RequestStatus,
    pub at: Seq,
}

/// Badge catalog entry. Static reference data; lower tier = higher
/// prestige, so ascending difficulty runs from the highest tier number
/// (easiest) down to tier 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge {
    pub tier: u8,
    pub title: String,
    pub threshold: Amount,
    pub reward: Amount,
}

/// A badge granted to an account. At most one per (account, tier).
#[derive(Debug, Clone)]
pub struct BadgeAward {
    pub badge: Badge,
    pub at: Seq,
}

/// An operation fed to the engine by a driver (CSV file, test harness).
#[derive(Debug, Clone)]
pub enum Operation {
    /// Register a user and open their account with an explicit balance.
    Open {
        name: String,
        balance: Amount,
        pin: Pin,
    },
    /// Transfer funds from one account to another.
    Pay {
        from: AccountId,
        to: AccountId,
        amount: Amount,
        pin: String,
    },
    /// Ask the payer account for funds.
    Request {
        from: AccountId,
        to: AccountId,
        amount: Amount,
        pin: String,
    },
    /// Claim the next reward badge the account qualifies for.
    Claim { account: AccountId },
}
