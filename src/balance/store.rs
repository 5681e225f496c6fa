//! Authoritative balance store boundary.
//!
//! The core only defines what must be written and when; the storage
//! technology lives behind this trait. `commit_delta` takes an idempotency
//! key so a retried settlement never double-applies.

use crate::errors::StoreError;
use crate::games::types::Amount;
use async_trait::async_trait;
use dashmap::DashMap;

/// External balance store consumed by the balance cache and settlement.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Current authoritative balance for a player, in minor units.
    async fn fetch_balance(&self, player_id: &str) -> Result<Amount, StoreError>;

    /// Apply a signed delta and return the resulting balance. Re-sending a
    /// key previously applied is a no-op that returns the current balance.
    async fn commit_delta(
        &self,
        player_id: &str,
        delta: i64,
        idempotency_key: &str,
    ) -> Result<Amount, StoreError>;
}

/// Reference in-memory store used by the binary and tests.
///
/// Deployments swap in a durable implementation behind the same trait.
pub struct InMemoryBalanceStore {
    accounts: DashMap<String, i64>,
    applied: DashMap<String, i64>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            applied: DashMap::new(),
        }
    }

    /// Seed a player's balance (testing / bootstrap only).
    pub fn set_balance(&self, player_id: &str, amount: Amount) {
        self.accounts.insert(player_id.to_string(), amount as i64);
    }

    fn balance_of(&self, player_id: &str) -> Amount {
        self.accounts
            .get(player_id)
            .map(|entry| (*entry.value()).max(0) as Amount)
            .unwrap_or(0)
    }
}

impl Default for InMemoryBalanceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    async fn fetch_balance(&self, player_id: &str) -> Result<Amount, StoreError> {
        Ok(self.balance_of(player_id))
    }

    async fn commit_delta(
        &self,
        player_id: &str,
        delta: i64,
        idempotency_key: &str,
    ) -> Result<Amount, StoreError> {
        if self.applied.insert(idempotency_key.to_string(), delta).is_some() {
            // Retried settlement: already applied.
            return Ok(self.balance_of(player_id));
        }

        let mut account = self.accounts.entry(player_id.to_string()).or_insert(0);
        *account += delta;
        Ok((*account).max(0) as Amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_unknown_player_is_zero() {
        let store = InMemoryBalanceStore::new();
        assert_eq!(store.fetch_balance("ghost").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_commit_delta_applies_once() {
        let store = InMemoryBalanceStore::new();
        store.set_balance("p1", 1_000);

        let after = store.commit_delta("p1", -300, "r1:p1:b1:stake").await.unwrap();
        assert_eq!(after, 700);

        // Same key again: no double-apply.
        let after = store.commit_delta("p1", -300, "r1:p1:b1:stake").await.unwrap();
        assert_eq!(after, 700);

        let after = store.commit_delta("p1", 900, "r1:p1:b1:payout").await.unwrap();
        assert_eq!(after, 1_600);
    }
}
