//! Account and user store.
//!
//! Only the store owns account state; the engine mutates balances through
//! the per-account locks handed out here.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;
use tokio::sync::{Mutex, RwLock};

use crate::Amount;
use crate::model::{AccountId, Pin, UserId};
use crate::session::ActingAccount;

use super::bounded;
use super::error::{RegisterError, StoreError};

/// Registration grants a starting balance somewhere in this range
/// (whole currency units).
const STARTING_BALANCE_UNITS: std::ops::RangeInclusive<i64> = 55_000..=60_000;

/// A registered user.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

/// One account row: immutable identity, plus the balance, the only hot
/// mutable cell in the system. Locking the balance serializes the
/// read-check-write sequence per account.
#[derive(Debug)]
pub struct AccountEntry {
    pub id: AccountId,
    pub user: UserId,
    pin: Pin,
    pub(super) balance: Mutex<Amount>,
}

impl AccountEntry {
    fn new(id: AccountId, user: UserId, pin: Pin, balance: Amount) -> Self {
        Self {
            id,
            user,
            pin,
            balance: Mutex::new(balance),
        }
    }

    pub fn identity(&self) -> ActingAccount {
        ActingAccount {
            account: self.id,
            user: self.user,
            pin: self.pin,
        }
    }
}

/// Durable records of users and account balances, keyed by account handle.
#[derive(Debug, Default)]
pub struct Ledger {
    users: RwLock<HashMap<UserId, User>>,
    accounts: RwLock<HashMap<AccountId, Arc<AccountEntry>>>,
    next_user: AtomicU32,
    next_account: AtomicU32,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user and open their account with a randomized starting
    /// balance.
    pub async fn register(
        &self,
        name: &str,
        pin: Pin,
    ) -> Result<(UserId, AccountId), RegisterError> {
        let balance =
            Amount::from_units(rand::thread_rng().gen_range(STARTING_BALANCE_UNITS));
        self.register_with_balance(name, pin, balance).await
    }

    /// Register with an explicit starting balance (drivers, tests).
    ///
    /// The user row and the account row are created together or not at
    /// all: both maps are write-locked before either insert, so a failure
    /// leaves no orphan on either side.
    pub async fn register_with_balance(
        &self,
        name: &str,
        pin: Pin,
        balance: Amount,
    ) -> Result<(UserId, AccountId), RegisterError> {
        let mut users = bounded(self.users.write()).await?;
        if users.values().any(|user| user.name == name) {
            return Err(RegisterError::DuplicateName(name.to_string()));
        }
        let mut accounts = bounded(self.accounts.write()).await?;

        let user_id = self.next_user.fetch_add(1, Ordering::Relaxed) + 1;
        let account_id = self.next_account.fetch_add(1, Ordering::Relaxed) + 1;

        users.insert(
            user_id,
            User {
                id: user_id,
                name: name.to_string(),
            },
        );
        accounts.insert(
            account_id,
            Arc::new(AccountEntry::new(account_id, user_id, pin, balance)),
        );

        Ok((user_id, account_id))
    }

    /// Look up an account row.
    pub async fn entry(
        &self,
        account: AccountId,
    ) -> Result<Option<Arc<AccountEntry>>, StoreError> {
        let accounts = bounded(self.accounts.read()).await?;
        Ok(accounts.get(&account).cloned())
    }

    /// Current balance of an account, if it exists.
    pub async fn balance(&self, account: AccountId) -> Result<Option<Amount>, StoreError> {
        let Some(entry) = self.entry(account).await? else {
            return Ok(None);
        };
        let balance = bounded(entry.balance.lock()).await?;
        Ok(Some(*balance))
    }

    /// Look up a user row.
    pub async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let users = bounded(self.users.read()).await?;
        Ok(users.get(&id).cloned())
    }

    /// Resolved identity for an account, if it exists.
    pub async fn identity(
        &self,
        account: AccountId,
    ) -> Result<Option<ActingAccount>, StoreError> {
        Ok(self.entry(account).await?.map(|entry| entry.identity()))
    }

    /// All account rows, ascending by account id.
    pub async fn accounts(&self) -> Result<Vec<Arc<AccountEntry>>, StoreError> {
        let accounts = bounded(self.accounts.read()).await?;
        let mut rows: Vec<_> = accounts.values().cloned().collect();
        rows.sort_by_key(|entry| entry.id);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIN: u16 = 1234;

    fn pin() -> Pin {
        Pin::new(PIN).unwrap()
    }

    #[tokio::test]
    async fn register_assigns_sequential_ids() {
        let ledger = Ledger::new();
        let (user_a, account_a) = ledger
            .register_with_balance("alice", pin(), Amount::from_units(100))
            .await
            .unwrap();
        let (user_b, account_b) = ledger
            .register_with_balance("bob", pin(), Amount::from_units(100))
            .await
            .unwrap();

        assert_eq!((user_a, account_a), (1, 1));
        assert_eq!((user_b, account_b), (2, 2));
    }

    #[tokio::test]
    async fn register_grants_starting_balance_in_range() {
        let ledger = Ledger::new();
        for i in 0..20 {
            let (_, account) = ledger.register(&format!("user{i}"), pin()).await.unwrap();
            let balance = ledger.balance(account).await.unwrap().unwrap();
            assert!(balance >= Amount::from_units(55_000));
            assert!(balance <= Amount::from_units(60_000));
        }
    }

    #[tokio::test]
    async fn duplicate_name_leaves_no_orphan_account() {
        let ledger = Ledger::new();
        ledger
            .register_with_balance("alice", pin(), Amount::from_units(100))
            .await
            .unwrap();

        let result = ledger
            .register_with_balance("alice", pin(), Amount::from_units(100))
            .await;
        assert!(matches!(result, Err(RegisterError::DuplicateName(_))));

        assert_eq!(ledger.accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn identity_carries_the_stored_pin() {
        let ledger = Ledger::new();
        let (user, account) = ledger
            .register_with_balance("alice", pin(), Amount::from_units(100))
            .await
            .unwrap();

        let acting = ledger.identity(account).await.unwrap().unwrap();
        assert_eq!(acting.account, account);
        assert_eq!(acting.user, user);
        assert!(acting.pin.matches("1234"));
    }

    #[tokio::test]
    async fn unknown_account_resolves_to_none() {
        let ledger = Ledger::new();
        assert!(ledger.balance(42).await.unwrap().is_none());
        assert!(ledger.identity(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn accounts_are_sorted_by_id() {
        let ledger = Ledger::new();
        for name in ["a", "b", "c"] {
            ledger
                .register_with_balance(name, pin(), Amount::from_units(10))
                .await
                .unwrap();
        }

        let ids: Vec<_> = ledger
            .accounts()
            .await
            .unwrap()
            .iter()
            .map(|entry| entry.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
