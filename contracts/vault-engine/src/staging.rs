//! Staged writes
//!
//! Operations record balance changes against a read-only view of the
//! committed map and only write them back once every check has passed.

use casper_types::U256;
use std::collections::BTreeMap;

use keel_common::{math, KeelError, KeelResult};

pub(crate) struct Staged<'a, K: Ord + Copy> {
    committed: &'a BTreeMap<K, U256>,
    changes: BTreeMap<K, U256>,
}

impl<'a, K: Ord + Copy> Staged<'a, K> {
    pub(crate) fn new(committed: &'a BTreeMap<K, U256>) -> Self {
        Self { committed, changes: BTreeMap::new() }
    }

    pub(crate) fn balance(&self, key: &K) -> U256 {
        self.changes
            .get(key)
            .or_else(|| self.committed.get(key))
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn credit(&mut self, key: K, amount: U256) -> KeelResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let next = math::add(self.balance(&key), amount)?;
        self.changes.insert(key, next);
        Ok(())
    }

    /// Fails with `InsufficientBalance` rather than going negative.
    pub(crate) fn debit(&mut self, key: K, amount: U256) -> KeelResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let available = self.balance(&key);
        let next = math::sub(available, amount)
            .map_err(|_| KeelError::InsufficientBalance { available, requested: amount })?;
        self.changes.insert(key, next);
        Ok(())
    }

    pub(crate) fn into_changes(self) -> BTreeMap<K, U256> {
        self.changes
    }
}

/// Write staged balances back, dropping zeroed entries.
pub(crate) fn commit<K: Ord + Copy>(target: &mut BTreeMap<K, U256>, changes: BTreeMap<K, U256>) {
    for (key, value) in changes {
        if value.is_zero() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_changes_are_isolated_until_commit() {
        let mut committed = BTreeMap::new();
        committed.insert(1u8, U256::from(10u64));

        let mut staged = Staged::new(&committed);
        staged.debit(1, U256::from(4u64)).unwrap();
        staged.credit(2, U256::from(4u64)).unwrap();
        assert_eq!(staged.balance(&1), U256::from(6u64));
        assert_eq!(committed[&1], U256::from(10u64));

        let changes = staged.into_changes();
        commit(&mut committed, changes);
        assert_eq!(committed[&1], U256::from(6u64));
        assert_eq!(committed[&2], U256::from(4u64));
    }

    #[test]
    fn test_overdraw_and_zero_cleanup() {
        let mut committed = BTreeMap::new();
        committed.insert(1u8, U256::from(3u64));

        let mut staged = Staged::new(&committed);
        let err = staged.debit(1, U256::from(4u64)).unwrap_err();
        assert_eq!(
            err,
            KeelError::InsufficientBalance {
                available: U256::from(3u64),
                requested: U256::from(4u64),
            }
        );
        staged.debit(1, U256::from(3u64)).unwrap();
        let changes = staged.into_changes();
        commit(&mut committed, changes);
        assert!(committed.is_empty());
    }
}
