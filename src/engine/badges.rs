//! Badge catalog and accrual state.
//!
//! Tiers unlock strictly in ascending difficulty order: the easiest
//! unclaimed tier is always the next candidate, and a tier can be awarded
//! at most once per account.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::Amount;
use crate::model::{AccountId, Badge, BadgeAward, Seq};

use super::bounded;
use super::error::AccrualError;

/// The standard catalog. Tier 1 is the top prestige tier; difficulty
/// ascends as tier numbers descend.
pub fn standard_catalog() -> Vec<Badge> {
    vec![
        Badge {
            tier: 4,
            title: "Bronze".to_string(),
            threshold: Amount::from_units(5_000),
            reward: Amount::from_units(500),
        },
        Badge {
            tier: 3,
            title: "Silver".to_string(),
            threshold: Amount::from_units(25_000),
            reward: Amount::from_units(2_500),
        },
        Badge {
            tier: 2,
            title: "Gold".to_string(),
            threshold: Amount::from_units(50_000),
            reward: Amount::from_units(5_000),
        },
        Badge {
            tier: 1,
            title: "Diamond".to_string(),
            threshold: Amount::from_units(100_000),
            reward: Amount::from_units(1_000),
        },
    ]
}

#[derive(Debug)]
pub struct BadgeBook {
    /// Catalog kept in claim order: easiest tier first.
    catalog: Vec<Badge>,
    awards: Mutex<HashMap<AccountId, Vec<BadgeAward>>>,
}

impl Default for BadgeBook {
    fn default() -> Self {
        Self::with_catalog(standard_catalog())
    }
}

impl BadgeBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(mut catalog: Vec<Badge>) -> Self {
        catalog.sort_by_key(|badge| badge.threshold);
        Self {
            catalog,
            awards: Mutex::default(),
        }
    }

    pub fn catalog(&self) -> &[Badge] {
        &self.catalog
    }

    /// All badges awarded to an account, tier ascending then award time
    /// ascending.
    pub async fn awarded(&self, account: AccountId) -> Result<Vec<BadgeAward>, AccrualError> {
        let awards = bounded(self.awards.lock()).await?;
        let mut rows = awards.get(&account).cloned().unwrap_or_default();
        rows.sort_by(|a, b| a.badge.tier.cmp(&b.badge.tier).then(a.at.cmp(&b.at)));
        Ok(rows)
    }

    /// Grant the next unclaimed tier in ascending difficulty order,
    /// provided its threshold is covered by `total_spent`. Returns `None`
    /// when nothing qualifies; claiming is a no-op then, not an error.
    ///
    /// The eligibility check and the insert share one lock, so concurrent
    /// claims for the same account cannot double-award a tier.
    pub async fn claim_next(
        &self,
        account: AccountId,
        total_spent: Amount,
        at: Seq,
    ) -> Result<Option<BadgeAward>, AccrualError> {
        let mut awards = bounded(self.awards.lock()).await?;
        let owned = awards.entry(account).or_default();

        let next = self
            .catalog
            .iter()
            .find(|badge| owned.iter().all(|award| award.badge.tier != badge.tier));
        let Some(badge) = next else {
            return Ok(None);
        };
        if badge.threshold > total_spent {
            return Ok(None);
        }

        let award = BadgeAward {
            badge: badge.clone(),
            at,
        };
        owned.push(award.clone());
        Ok(Some(award))
    }

    /// Catalog tiers whose threshold was crossed by a spend moving from
    /// `prior` to `current`, excluding tiers already claimed. Read-only;
    /// used to report fresh eligibility alongside a transfer.
    pub async fn newly_eligible(
        &self,
        account: AccountId,
        prior: Amount,
        current: Amount,
    ) -> Result<Vec<Badge>, AccrualError> {
        let awards = bounded(self.awards.lock()).await?;
        let owned = awards.get(&account);
        Ok(self
            .catalog
            .iter()
            .filter(|badge| badge.threshold > prior && badge.threshold <= current)
            .filter(|badge| {
                owned.is_none_or(|rows| rows.iter().all(|award| award.badge.tier != badge.tier))
            })
            .cloned()
            .collect())
    }
}
