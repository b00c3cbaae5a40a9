//! The account ledger: address → balance, mutated only by block execution.

use crate::account::{Account, LedgerError};
use crate::crypto::Address;
use crate::hash::{hash, Hash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// In-memory account map.
///
/// Accounts are kept sorted by address so the state commitment does not
/// depend on insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    accounts: BTreeMap<Address, Account>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount`, opening the account at zero if it does not exist.
    pub fn credit(&mut self, address: &Address, amount: u64) -> Result<()> {
        self.accounts.entry(*address).or_default().credit(amount)
    }

    /// Debit `amount`. Fails without touching the balance if the account is
    /// unknown or would go negative.
    pub fn debit(&mut self, address: &Address, amount: u64) -> Result<()> {
        self.accounts
            .get_mut(address)
            .ok_or(LedgerError::UnknownAccount(*address))?
            .debit(amount)
    }

    /// Move `amount` from one account to another.
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: u64) -> Result<()> {
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    /// Get an account, if it exists.
    pub fn get(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Balance of an account (zero when absent).
    pub fn balance(&self, address: &Address) -> u64 {
        self.get(address).map(|a| a.balance).unwrap_or_default()
    }

    /// Check if an account has been opened.
    pub fn contains(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Iterate accounts in address order.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    /// Sum of all balances.
    pub fn total_supply(&self) -> u128 {
        self.accounts.values().map(|a| u128::from(a.balance)).sum()
    }

    /// Digest of the canonical encoding of every (address, balance) pair, in
    /// address order.
    pub fn state_commitment(&self) -> Hash {
        let encoded = bincode::serialize(&self.accounts).expect("serialization should not fail");
        hash(&encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    #[test]
    fn test_credit_opens_account() {
        let mut ledger = Ledger::new();
        assert!(!ledger.contains(&addr(1)));

        ledger.credit(&addr(1), 0).unwrap();
        assert!(ledger.contains(&addr(1)));
        assert_eq!(ledger.balance(&addr(1)), 0);

        ledger.credit(&addr(1), 32).unwrap();
        assert_eq!(ledger.balance(&addr(1)), 32);
    }

    #[test]
    fn test_debit_unknown_account() {
        let mut ledger = Ledger::new();
        assert_eq!(
            ledger.debit(&addr(9), 1),
            Err(LedgerError::UnknownAccount(addr(9)))
        );
        assert!(!ledger.contains(&addr(9)));
    }

    #[test]
    fn test_debit_never_clamps() {
        let mut ledger = Ledger::new();
        ledger.credit(&addr(1), 10).unwrap();
        assert!(matches!(
            ledger.debit(&addr(1), 11),
            Err(LedgerError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.balance(&addr(1)), 10);
    }

    #[test]
    fn test_transfer() {
        let mut ledger = Ledger::new();
        ledger.credit(&addr(1), 10).unwrap();
        ledger.transfer(&addr(1), &addr(2), 4).unwrap();
        assert_eq!(ledger.balance(&addr(1)), 6);
        assert_eq!(ledger.balance(&addr(2)), 4);
        assert_eq!(ledger.total_supply(), 10);
    }

    #[test]
    fn test_commitment_independent_of_insertion_order() {
        let mut a = Ledger::new();
        a.credit(&addr(3), 30).unwrap();
        a.credit(&addr(1), 10).unwrap();
        a.credit(&addr(2), 20).unwrap();

        let mut b = Ledger::new();
        b.credit(&addr(1), 10).unwrap();
        b.credit(&addr(2), 20).unwrap();
        b.credit(&addr(3), 30).unwrap();

        assert_eq!(a.state_commitment(), b.state_commitment());
    }

    #[test]
    fn test_commitment_tracks_balances() {
        let mut ledger = Ledger::new();
        ledger.credit(&addr(1), 10).unwrap();
        let before = ledger.state_commitment();

        ledger.credit(&addr(1), 1).unwrap();
        assert_ne!(before, ledger.state_commitment());
    }

    #[test]
    fn test_empty_account_changes_commitment() {
        let mut ledger = Ledger::new();
        ledger.credit(&addr(1), 10).unwrap();
        let before = ledger.state_commitment();

        ledger.credit(&addr(2), 0).unwrap();
        assert_ne!(before, ledger.state_commitment());
    }

    #[test]
    fn test_iter_is_sorted() {
        let mut ledger = Ledger::new();
        ledger.credit(&addr(5), 1).unwrap();
        ledger.credit(&addr(2), 1).unwrap();
        let keys: Vec<_> = ledger.iter().map(|(a, _)| *a).collect();
        assert_eq!(keys, vec![addr(2), addr(5)]);
    }
}
