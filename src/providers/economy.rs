//! Economy provider
//!
//! Consulted only when `engine.economy_mode` is on. Claim blocks are then
//! bought with currency instead of drawn from the player's block balance.

use crate::error::EconomyError;
use crate::model::UserId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[async_trait]
pub trait EconomyProvider: Send + Sync {
    async fn balance(&self, user: UserId) -> Result<f64, EconomyError>;

    async fn withdraw(&self, user: UserId, amount: f64) -> Result<(), EconomyError>;

    async fn deposit(&self, user: UserId, amount: f64) -> Result<(), EconomyError>;
}

/// In-process accounts with failure injection
#[derive(Debug, Default)]
pub struct MemoryEconomy {
    accounts: Mutex<HashMap<UserId, f64>>,
    fail_withdraw: AtomicBool,
    fail_deposit: AtomicBool,
}

impl MemoryEconomy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_account(&self, user: UserId, balance: f64) {
        if let Ok(mut accounts) = self.accounts.lock() {
            accounts.insert(user, balance);
        }
    }

    pub fn set_fail_withdraw(&self, fail: bool) {
        self.fail_withdraw.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deposit(&self, fail: bool) {
        self.fail_deposit.store(fail, Ordering::SeqCst);
    }

    fn with_account<T>(
        &self,
        user: UserId,
        f: impl FnOnce(&mut f64) -> Result<T, EconomyError>,
    ) -> Result<T, EconomyError> {
        let mut accounts = self
            .accounts
            .lock()
            .map_err(|_| EconomyError::Transaction("ledger poisoned".to_string()))?;
        let balance = accounts
            .get_mut(&user)
            .ok_or_else(|| EconomyError::AccountNotFound(user.to_string()))?;
        f(balance)
    }
}

#[async_trait]
impl EconomyProvider for MemoryEconomy {
    async fn balance(&self, user: UserId) -> Result<f64, EconomyError> {
        self.with_account(user, |balance| Ok(*balance))
    }

    async fn withdraw(&self, user: UserId, amount: f64) -> Result<(), EconomyError> {
        let fail = self.fail_withdraw.load(Ordering::SeqCst);
        self.with_account(user, |balance| {
            if fail {
                return Err(EconomyError::Transaction("withdraw rejected".to_string()));
            }
            if *balance < amount {
                return Err(EconomyError::InsufficientFunds {
                    balance: *balance,
                    required: amount,
                });
            }
            *balance -= amount;
            Ok(())
        })
    }

    async fn deposit(&self, user: UserId, amount: f64) -> Result<(), EconomyError> {
        let fail = self.fail_deposit.load(Ordering::SeqCst);
        self.with_account(user, |balance| {
            if fail {
                return Err(EconomyError::Transaction("deposit rejected".to_string()));
            }
            *balance += amount;
            Ok(())
        })
    }
}
