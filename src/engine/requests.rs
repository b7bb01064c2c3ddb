//! Payment-request book.
//!
//! At most one `Pending` request exists per ordered (requester, payer)
//! pair; a repeat ask refreshes the existing row instead of stacking a
//! duplicate.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tokio::sync::Mutex;

use crate::Amount;
use crate::model::{AccountId, PaymentRequest, RequestStatus, Seq};

use super::bounded;
use super::error::StoreError;

/// Whether an upsert created a new pending request or refreshed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Created,
    Updated,
}

#[derive(Debug, Default)]
pub struct RequestBook {
    pending: Mutex<HashMap<(AccountId, AccountId), PaymentRequest>>,
}

impl RequestBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert the pending request for the ordered pair (from → to).
    ///
    /// The existence check and the write happen under one lock, so two
    /// concurrent asks for the same pair cannot both insert.
    pub async fn upsert(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        at: Seq,
    ) -> Result<RequestOutcome, StoreError> {
        let mut pending = bounded(self.pending.lock()).await?;
        match pending.entry((from, to)) {
            Entry::Occupied(mut slot) => {
                let request = slot.get_mut();
                request.amount = amount;
                request.at = at;
                Ok(RequestOutcome::Updated)
            }
            Entry::Vacant(slot) => {
                slot.insert(PaymentRequest {
                    from,
                    to,
                    amount,
                    status: RequestStatus::Pending,
                    at,
                });
                Ok(RequestOutcome::Created)
            }
        }
    }

    /// The pending request from `from` to `to`, if any.
    pub async fn pending_between(
        &self,
        from: AccountId,
        to: AccountId,
    ) -> Result<Option<PaymentRequest>, StoreError> {
        let pending = bounded(self.pending.lock()).await?;
        Ok(pending.get(&(from, to)).cloned())
    }

    /// All pending asks addressed to `payer`, newest first.
    pub async fn pending_for(
        &self,
        payer: AccountId,
    ) -> Result<Vec<PaymentRequest>, StoreError> {
        let pending = bounded(self.pending.lock()).await?;
        let mut rows: Vec<_> = pending
            .values()
            .filter(|request| request.to == payer)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.at.cmp(&a.at));
        Ok(rows)
    }
}
