// packages/engine/src/identity/store.rs
//! In-memory identity store
//!
//! One [`IdentityRecord`] per configured identity, keyed by [`IdentityId`].
//! The store is shared through an `Arc` with every component that reads or
//! mutates identity state. Map guards are released before any method
//! returns, so no caller can hold one across an `.await`.
//!
//! Field ownership:
//!
//! - tokens: written by the authenticator only
//! - balances and simulation clock: written by the scheduler and the
//!   withdrawal gate
//! - everything else: fixed at load time, apart from the referral flag

use crate::identity::record::{Balances, IdentityId, IdentityRecord, SecretSeed, TokenPair};
use crate::identity::session::SessionDescriptor;
use crate::utils::errors::{Result, WorkerError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared per-identity state table
#[derive(Default)]
pub struct IdentityStore {
    records: DashMap<IdentityId, IdentityRecord>,

    /// Set while a scheduler cycle is in flight for the identity
    cycle_flags: DashMap<IdentityId, Arc<AtomicBool>>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from loaded records; later duplicates replace earlier ones
    pub fn from_records(records: impl IntoIterator<Item = IdentityRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Insert or replace a record
    pub fn insert(&self, record: IdentityRecord) -> Option<IdentityRecord> {
        self.cycle_flags
            .entry(record.id)
            .or_insert_with(|| Arc::new(AtomicBool::new(false)));
        self.records.insert(record.id, record)
    }

    pub fn contains(&self, id: IdentityId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All identity ids, sorted
    pub fn ids(&self) -> Vec<IdentityId> {
        let mut ids: Vec<IdentityId> = self.records.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    /// Copy of the full record
    pub fn snapshot(&self, id: IdentityId) -> Result<IdentityRecord> {
        self.read(id, |record| record.clone())
    }

    /// Display name for logs, or the id when the identity is unknown
    pub fn display_name(&self, id: IdentityId) -> String {
        self.read(id, |record| record.display_name.clone())
            .unwrap_or_else(|_| id.to_string())
    }

    /// Seed and session used to log in
    pub fn credentials(&self, id: IdentityId) -> Result<(SecretSeed, SessionDescriptor)> {
        self.read(id, |record| {
            (record.credential_seed.clone(), record.session.clone())
        })
    }

    pub fn tokens(&self, id: IdentityId) -> Result<TokenPair> {
        self.read(id, |record| record.tokens.clone())
    }

    /// Current access token, empty before the first login
    pub fn access_token(&self, id: IdentityId) -> Result<String> {
        self.read(id, |record| record.tokens.access_token.clone())
    }

    pub fn token_expired(&self, id: IdentityId, now: DateTime<Utc>) -> Result<bool> {
        self.read(id, |record| record.tokens.is_expired(now))
    }

    pub fn set_tokens(&self, id: IdentityId, tokens: TokenPair) -> Result<()> {
        self.update(id, |record| record.tokens = tokens)
    }

    pub fn balances(&self, id: IdentityId) -> Result<Balances> {
        self.read(id, |record| record.balances)
    }

    pub fn set_balances(&self, id: IdentityId, balances: Balances) -> Result<()> {
        self.update(id, |record| record.balances = balances)
    }

    pub fn simulation_clock(&self, id: IdentityId) -> Result<u64> {
        self.read(id, |record| record.simulation_clock)
    }

    /// Account for a transmitted batch: spend `taps` energy and move the
    /// clock to `clock`. Returns the remaining energy.
    pub fn record_batch(&self, id: IdentityId, taps: u64, clock: u64) -> Result<u64> {
        self.update(id, |record| {
            record.balances.energy = record.balances.energy.saturating_sub(taps);
            record.simulation_clock = record.simulation_clock.max(clock);
            record.balances.energy
        })
    }

    pub fn is_reserved(&self, id: IdentityId) -> Result<bool> {
        self.read(id, |record| record.reserved)
    }

    pub fn mark_referral_bound(&self, id: IdentityId) -> Result<()> {
        self.update(id, |record| record.referral_bound = true)
    }

    /// Run `f` against the record
    pub fn read<T>(&self, id: IdentityId, f: impl FnOnce(&IdentityRecord) -> T) -> Result<T> {
        self.records
            .get(&id)
            .map(|record| f(record.value()))
            .ok_or(WorkerError::UnknownIdentity(id))
    }

    /// Mutate the record in place
    pub fn update<T>(&self, id: IdentityId, f: impl FnOnce(&mut IdentityRecord) -> T) -> Result<T> {
        self.records
            .get_mut(&id)
            .map(|mut record| f(record.value_mut()))
            .ok_or(WorkerError::UnknownIdentity(id))
    }

    /// Claim the identity's cycle slot; `None` while another cycle holds it
    pub fn try_begin_cycle(&self, id: IdentityId) -> Option<CycleGuard> {
        let flag = self
            .cycle_flags
            .get(&id)
            .map(|flag| Arc::clone(flag.value()))?;

        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard { flag })
    }
}

/// Releases the identity's cycle slot when dropped
pub struct CycleGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::testing::record;

    #[test]
    fn test_insert_and_lookup() {
        let store = IdentityStore::new();
        store.insert(record(7, "Alice"));

        assert!(store.contains(IdentityId(7)));
        assert_eq!(store.display_name(IdentityId(7)), "Alice");
        assert_eq!(store.display_name(IdentityId(8)), "8");
        assert!(matches!(
            store.snapshot(IdentityId(8)),
            Err(WorkerError::UnknownIdentity(IdentityId(8)))
        ));
    }

    #[test]
    fn test_record_batch_never_goes_negative() {
        let store = IdentityStore::from_records([record(1, "A")]);
        store
            .set_balances(
                IdentityId(1),
                Balances {
                    energy: 25,
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(store.record_batch(IdentityId(1), 20, 14_000).unwrap(), 5);
        assert_eq!(store.record_batch(IdentityId(1), 20, 18_000).unwrap(), 0);
        assert_eq!(store.simulation_clock(IdentityId(1)).unwrap(), 18_000);
    }

    #[test]
    fn test_simulation_clock_is_monotonic() {
        let store = IdentityStore::from_records([record(1, "A")]);
        store.record_batch(IdentityId(1), 0, 20_000).unwrap();
        store.record_batch(IdentityId(1), 0, 15_000).unwrap();
        assert_eq!(store.simulation_clock(IdentityId(1)).unwrap(), 20_000);
    }

    #[test]
    fn test_tokens_round_trip() {
        let store = IdentityStore::from_records([record(1, "A")]);
        let now = Utc::now();
        assert!(store.token_expired(IdentityId(1), now).unwrap());

        store
            .set_tokens(
                IdentityId(1),
                TokenPair {
                    access_token: "tok".into(),
                    access_expiry: Some(now + chrono::Duration::hours(1)),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(store.access_token(IdentityId(1)).unwrap(), "tok");
        assert!(!store.token_expired(IdentityId(1), now).unwrap());
    }

    #[test]
    fn test_cycle_guard_is_exclusive() {
        let store = IdentityStore::from_records([record(1, "A"), record(2, "B")]);

        let guard = store.try_begin_cycle(IdentityId(1)).expect("first claim");
        assert!(store.try_begin_cycle(IdentityId(1)).is_none());
        // Other identities are independent
        assert!(store.try_begin_cycle(IdentityId(2)).is_some());

        drop(guard);
        assert!(store.try_begin_cycle(IdentityId(1)).is_some());
        assert!(store.try_begin_cycle(IdentityId(99)).is_none());
    }

    #[test]
    fn test_ids_sorted() {
        let store = IdentityStore::from_records([record(3, "C"), record(1, "A"), record(2, "B")]);
        assert_eq!(
            store.ids(),
            vec![IdentityId(1), IdentityId(2), IdentityId(3)]
        );
        assert_eq!(store.len(), 3);
    }
}
