//! Account state representation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when mutating balances.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("insufficient balance (required {required}, available {available})")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("unknown account {0}")]
    UnknownAccount(crate::crypto::Address),

    #[error("balance overflow")]
    BalanceOverflow,
}

/// An account in the ledger. Only the balance is tracked; the address is the
/// key it is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Account {
    /// Account balance in the native token.
    pub balance: u64,
}

impl Account {
    /// Create a new account with the given balance.
    pub fn new(balance: u64) -> Self {
        Self { balance }
    }

    /// Add balance to the account.
    pub fn credit(&mut self, amount: u64) -> Result<(), LedgerError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        Ok(())
    }

    /// Subtract balance from the account. The balance is left untouched on
    /// failure.
    pub fn debit(&mut self, amount: u64) -> Result<(), LedgerError> {
        if !self.has_balance(amount) {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        Ok(())
    }

    /// Check if the account can pay `amount` and stay at or above zero.
    pub fn has_balance(&self, amount: u64) -> bool {
        self.balance >= amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_and_debit() {
        let mut account = Account::new(100);

        account.credit(50).unwrap();
        assert_eq!(account.balance, 150);

        account.debit(100).unwrap();
        assert_eq!(account.balance, 50);

        assert_eq!(
            account.debit(100),
            Err(LedgerError::InsufficientBalance {
                required: 100,
                available: 50
            })
        );
        assert_eq!(account.balance, 50); // Balance unchanged
    }

    #[test]
    fn test_debit_to_exactly_zero() {
        let mut account = Account::new(32);
        assert!(account.debit(32).is_ok());
        assert_eq!(account.balance, 0);
    }

    #[test]
    fn test_credit_overflow() {
        let mut account = Account::new(u64::MAX);
        assert_eq!(account.credit(1), Err(LedgerError::BalanceOverflow));
        assert_eq!(account.balance, u64::MAX);
    }

    #[test]
    fn test_has_balance() {
        let account = Account::new(100);
        assert!(account.has_balance(50));
        assert!(account.has_balance(100));
        assert!(!account.has_balance(101));
    }

    #[test]
    fn test_default_account() {
        assert_eq!(Account::default().balance, 0);
    }
}
