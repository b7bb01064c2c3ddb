//! Payment and reward ledger engine.
//!
//! The engine executes transfers against account balances, tracks pending
//! payment requests, and accrues spend-based reward badges. Operations may
//! run concurrently, including against the same account; the balance
//! read-check-write sequence is serialized per account. Also supports an
//! async stream of driver operations.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::Amount;
use crate::model::{
    AccountId, Badge, BadgeAward, Operation, PaymentRequest, Pin, Seq, TransactionRecord, TxId,
    TxStatus, UserId,
};
use crate::session::ActingAccount;

mod ledger;
pub use ledger::{AccountEntry, Ledger, User};

mod requests;
pub use requests::{RequestBook, RequestOutcome};

mod badges;
pub use badges::{BadgeBook, standard_catalog};

mod error;
pub use error::{
    AccrualError, EngineError, RegisterError, RequestError, ResolutionError, StoreError,
    TransferError,
};

/// Upper bound on any single lock wait. An elapsed wait surfaces as
/// [`StoreError::Unavailable`] instead of blocking the operation forever.
const STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Await a store future under the bounded timeout.
pub(crate) async fn bounded<F: Future>(future: F) -> Result<F::Output, StoreError> {
    tokio::time::timeout(STORE_TIMEOUT, future)
        .await
        .map_err(|_| StoreError::Unavailable)
}

/// Append-only audit log of transfer attempts. Failed attempts are
/// recorded alongside successes and never rewritten.
#[derive(Debug, Default)]
struct TransactionLog {
    entries: tokio::sync::Mutex<Vec<TransactionRecord>>,
}

impl TransactionLog {
    /// Append a record, stamping it under the log lock so `at` stays
    /// monotonic in insertion order even across concurrent transfers.
    async fn append(
        &self,
        clock: &AtomicU64,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        status: TxStatus,
    ) -> Result<TransactionRecord, StoreError> {
        let mut entries = bounded(self.entries.lock()).await?;
        let record = TransactionRecord {
            id: entries.len() as TxId + 1,
            from,
            to,
            amount,
            status,
            at: clock.fetch_add(1, Ordering::Relaxed) + 1,
        };
        entries.push(record.clone());
        Ok(record)
    }

    /// Cumulative successful spend originating from `account`, re-derived
    /// from the full log.
    async fn total_spent(&self, account: AccountId) -> Result<Amount, StoreError> {
        let entries = bounded(self.entries.lock()).await?;
        Ok(entries
            .iter()
            .filter(|record| record.from == account && record.status == TxStatus::Success)
            .map(|record| record.amount)
            .sum())
    }

    /// Every transaction touching `account` on either side, newest first.
    async fn history(&self, account: AccountId) -> Result<Vec<TransactionRecord>, StoreError> {
        let entries = bounded(self.entries.lock()).await?;
        let mut rows: Vec<_> = entries
            .iter()
            .filter(|record| record.from == account || record.to == account)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.at.cmp(&a.at));
        Ok(rows)
    }

    async fn get(&self, id: TxId) -> Result<Option<TransactionRecord>, StoreError> {
        let entries = bounded(self.entries.lock()).await?;
        Ok(entries.iter().find(|record| record.id == id).cloned())
    }
}

/// Result of a successful transfer.
#[derive(Debug)]
pub struct TransferReceipt {
    /// Source balance after the debit.
    pub balance: Amount,
    /// Catalog tiers this transfer made newly eligible (not yet claimed).
    pub new_badges: Vec<Badge>,
    /// Badge evaluation fault, if any. The transfer itself has committed.
    pub accrual_warning: Option<AccrualError>,
}

/// Awarded badges plus cumulative successful spend for one account.
#[derive(Debug)]
pub struct RewardSummary {
    pub badges: Vec<BadgeAward>,
    pub total_spent: Amount,
}

/// Per-account line of the driver's output.
#[derive(Debug)]
pub struct AccountSummary {
    pub account: AccountId,
    pub owner: String,
    pub balance: Amount,
    pub total_spent: Amount,
    pub badges: usize,
}

/// The payment and reward ledger engine.
///
/// All operations take `&self` and are safe to call concurrently.
#[derive(Debug, Default)]
pub struct Engine {
    ledger: Ledger,
    log: TransactionLog,
    requests: RequestBook,
    badges: BadgeBook,
    /// Monotonic insertion clock shared by transactions, requests, and
    /// badge awards.
    clock: AtomicU64,
}

/// Public API
impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with a custom badge catalog.
    pub fn with_catalog(catalog: Vec<Badge>) -> Self {
        Self {
            badges: BadgeBook::with_catalog(catalog),
            ..Self::default()
        }
    }

    /// Register a user and open their account with a randomized starting
    /// balance. User row and account row are created together or not at
    /// all.
    pub async fn register(
        &self,
        name: &str,
        pin: Pin,
    ) -> Result<(UserId, AccountId), RegisterError> {
        self.ledger.register(name, pin).await
    }

    /// Register with an explicit starting balance (drivers, tests).
    pub async fn register_with_balance(
        &self,
        name: &str,
        pin: Pin,
        balance: Amount,
    ) -> Result<(UserId, AccountId), RegisterError> {
        self.ledger.register_with_balance(name, pin, balance).await
    }

    /// Resolve the identity an operation will act under.
    pub async fn identity(&self, account: AccountId) -> Result<ActingAccount, ResolutionError> {
        match self.ledger.identity(account).await {
            Ok(Some(acting)) => Ok(acting),
            Ok(None) => Err(ResolutionError::UnknownAccount(account)),
            Err(err) => Err(ResolutionError::Store(err)),
        }
    }

    /// Current balance of an account, if it exists.
    pub async fn balance(&self, account: AccountId) -> Result<Option<Amount>, StoreError> {
        self.ledger.balance(account).await
    }

    /// Execute a transfer from the acting account to `to`.
    ///
    /// The attempt is recorded whatever its outcome; balances move only on
    /// success, and the source balance can never go negative. On success
    /// the receipt carries the new balance plus any catalog tiers this
    /// spend made newly eligible. A badge-side fault after the commit is
    /// reported in the receipt, never as a transfer failure.
    pub async fn transfer(
        &self,
        actor: &ActingAccount,
        to: AccountId,
        amount: Amount,
        supplied_pin: &str,
    ) -> Result<TransferReceipt, TransferError> {
        if !actor.pin.matches(supplied_pin) {
            return Err(TransferError::InvalidCredential);
        }
        if !amount.is_positive() {
            return Err(TransferError::InvalidAmount(amount));
        }

        let source = self
            .ledger
            .entry(actor.account)
            .await?
            .ok_or(TransferError::UnknownAccount(actor.account))?;
        let dest = self
            .ledger
            .entry(to)
            .await?
            .ok_or(TransferError::UnknownAccount(to))?;

        let new_balance = if source.id == dest.id {
            // Self-transfer: one lock; debit and credit cancel out.
            let balance = bounded(source.balance.lock()).await?;
            let status = Self::outcome(*balance, amount);
            self.log
                .append(&self.clock, source.id, dest.id, amount, status)
                .await?;
            if status == TxStatus::Failure {
                return Err(TransferError::InsufficientFunds {
                    balance: *balance,
                    requested: amount,
                });
            }
            *balance
        } else {
            // Lock both balances in ascending account-id order so
            // concurrent transfers cannot deadlock.
            let (low, high) = if source.id < dest.id {
                (&source, &dest)
            } else {
                (&dest, &source)
            };
            let low_guard = bounded(low.balance.lock()).await?;
            let high_guard = bounded(high.balance.lock()).await?;
            let (mut src_balance, mut dst_balance) = if source.id < dest.id {
                (low_guard, high_guard)
            } else {
                (high_guard, low_guard)
            };

            let status = Self::outcome(*src_balance, amount);
            self.log
                .append(&self.clock, source.id, dest.id, amount, status)
                .await?;
            if status == TxStatus::Failure {
                return Err(TransferError::InsufficientFunds {
                    balance: *src_balance,
                    requested: amount,
                });
            }

            *src_balance -= amount;
            *dst_balance += amount;
            *src_balance
        };

        // The transfer has committed; badge evaluation must not undo or
        // mask it.
        let (new_badges, accrual_warning) =
            match self.fresh_eligibility(actor.account, amount).await {
                Ok(badges) => (badges, None),
                Err(err) => {
                    warn!(
                        account = actor.account,
                        reason = %err,
                        "badge evaluation failed after committed transfer"
                    );
                    (Vec::new(), Some(err))
                }
            };

        Ok(TransferReceipt {
            balance: new_balance,
            new_badges,
            accrual_warning,
        })
    }

    /// Ask `to` for funds. Repeating the ask for the same pair refreshes
    /// the pending request instead of duplicating it. No balance effect.
    pub async fn request_funds(
        &self,
        actor: &ActingAccount,
        to: AccountId,
        amount: Amount,
        supplied_pin: &str,
    ) -> Result<RequestOutcome, RequestError> {
        if !actor.pin.matches(supplied_pin) {
            return Err(RequestError::InvalidCredential);
        }
        if !amount.is_positive() {
            return Err(RequestError::InvalidAmount(amount));
        }
        if self.ledger.entry(to).await?.is_none() {
            return Err(RequestError::UnknownAccount(to));
        }

        let at = self.tick();
        Ok(self.requests.upsert(actor.account, to, amount, at).await?)
    }

    /// The pending request from `from` to `to`, if any.
    pub async fn pending_request(
        &self,
        from: AccountId,
        to: AccountId,
    ) -> Result<Option<PaymentRequest>, StoreError> {
        self.requests.pending_between(from, to).await
    }

    /// All pending asks addressed to `payer`, newest first.
    pub async fn pending_requests_for(
        &self,
        payer: AccountId,
    ) -> Result<Vec<PaymentRequest>, StoreError> {
        self.requests.pending_for(payer).await
    }

    /// Awarded badges (tier ascending, then award time ascending) plus
    /// cumulative successful spend. Read-only.
    pub async fn rewards(&self, account: AccountId) -> Result<RewardSummary, AccrualError> {
        let badges = self.badges.awarded(account).await?;
        let total_spent = self.log.total_spent(account).await?;
        Ok(RewardSummary {
            badges,
            total_spent,
        })
    }

    /// Claim the next unclaimed tier in ascending difficulty order, if
    /// cumulative spend covers its threshold. `None` when nothing
    /// qualifies.
    pub async fn claim_next(
        &self,
        account: AccountId,
    ) -> Result<Option<BadgeAward>, AccrualError> {
        let total_spent = self.log.total_spent(account).await?;
        let at = self.tick();
        self.badges.claim_next(account, total_spent, at).await
    }

    /// Every transaction touching `account` on either side, newest first.
    /// Failed attempts are included; filter on `status` to drop them.
    pub async fn history(
        &self,
        account: AccountId,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        self.log.history(account).await
    }

    /// One transaction by id.
    pub async fn transaction(&self, id: TxId) -> Result<Option<TransactionRecord>, StoreError> {
        self.log.get(id).await
    }

    /// Per-account summaries, ascending by account id.
    pub async fn snapshot(&self) -> Result<Vec<AccountSummary>, StoreError> {
        let mut rows = Vec::new();
        for entry in self.ledger.accounts().await? {
            let owner = self
                .ledger
                .user(entry.user)
                .await?
                .map(|user| user.name)
                .unwrap_or_default();
            let balance = *bounded(entry.balance.lock()).await?;
            let total_spent = self.log.total_spent(entry.id).await?;
            let badges = match self.badges.awarded(entry.id).await {
                Ok(awards) => awards.len(),
                Err(AccrualError::Store(err)) => return Err(err),
            };
            rows.push(AccountSummary {
                account: entry.id,
                owner,
                balance,
                total_spent,
                badges,
            });
        }
        Ok(rows)
    }

    /// Run the engine over a stream of driver operations. Failures are
    /// logged and skipped; the stream is always drained.
    pub async fn run(&self, mut stream: impl Stream<Item = Operation> + Unpin) {
        while let Some(op) = stream.next().await {
            let _ = self.apply(op).await;
        }
    }

    /// Apply a single driver operation, resolving the acting account from
    /// the ledger. Every outcome is logged.
    pub async fn apply(&self, op: Operation) -> Result<(), EngineError> {
        match op {
            Operation::Open { name, balance, pin } => {
                let result = self.register_with_balance(&name, pin, balance).await;
                match &result {
                    Ok((user, account)) => {
                        info!(name = %name, user, account, "open applied");
                    }
                    Err(e) => info!(name = %name, reason = %e, "open skipped"),
                }
                result?;
            }
            Operation::Pay {
                from,
                to,
                amount,
                pin,
            } => {
                let result = self.pay(from, to, amount, &pin).await;
                match &result {
                    Ok(receipt) => {
                        info!(from, to, amount = %amount, balance = %receipt.balance, "pay applied");
                    }
                    Err(e) => info!(from, to, amount = %amount, reason = %e, "pay skipped"),
                }
                result?;
            }
            Operation::Request {
                from,
                to,
                amount,
                pin,
            } => {
                let result = self.ask(from, to, amount, &pin).await;
                match &result {
                    Ok(outcome) => {
                        info!(from, to, amount = %amount, ?outcome, "request applied");
                    }
                    Err(e) => info!(from, to, amount = %amount, reason = %e, "request skipped"),
                }
                result?;
            }
            Operation::Claim { account } => {
                let result = self.claim_for(account).await;
                match &result {
                    Ok(Some(award)) => {
                        info!(account, badge = %award.badge.title, "claim applied");
                    }
                    Ok(None) => info!(account, "claim applied, nothing eligible"),
                    Err(e) => info!(account, reason = %e, "claim skipped"),
                }
                result?;
            }
        }
        Ok(())
    }
}

/// Private API
impl Engine {
    /// Next insertion stamp.
    fn tick(&self) -> Seq {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn outcome(balance: Amount, amount: Amount) -> TxStatus {
        if balance < amount {
            TxStatus::Failure
        } else {
            TxStatus::Success
        }
    }

    /// Tiers made newly eligible by a just-committed spend of `amount`.
    async fn fresh_eligibility(
        &self,
        account: AccountId,
        amount: Amount,
    ) -> Result<Vec<Badge>, AccrualError> {
        let total = self.log.total_spent(account).await?;
        let prior = total - amount;
        self.badges.newly_eligible(account, prior, total).await
    }

    async fn pay(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        pin: &str,
    ) -> Result<TransferReceipt, EngineError> {
        let actor = self.identity(from).await?;
        Ok(self.transfer(&actor, to, amount, pin).await?)
    }

    async fn ask(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        pin: &str,
    ) -> Result<RequestOutcome, EngineError> {
        let actor = self.identity(from).await?;
        Ok(self.request_funds(&actor, to, amount, pin).await?)
    }

    async fn claim_for(&self, account: AccountId) -> Result<Option<BadgeAward>, EngineError> {
        // resolve first so claims against unknown accounts surface as such
        self.identity(account).await?;
        Ok(self.claim_next(account).await?)
    }
}
