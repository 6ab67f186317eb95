//! In-memory store backend
//!
//! Each trait operation runs inside a single critical section, which mirrors
//! the per-command atomicity a remote store gives you: individual commands
//! are atomic, sequences of them are not. Row locks are per-user
//! `tokio::sync::Mutex`es so that waiting for a lock suspends the task
//! instead of blocking the runtime.

use crate::domain::{Balance, Price, Product, ProductName, User, Username};
use crate::store::{LockingStore, Store, StoreError, UserRowLock};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Shared-memory store, the always-available backend.
///
/// Cloning is cheap and every clone observes the same state, which stands in
/// for a pool of connections to one server.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    users: RwLock<HashMap<Username, UserRow>>,
    products: RwLock<HashMap<ProductName, Product>>,
}

struct UserRow {
    balance: Balance,
    lock: Arc<Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user(&self, username: &Username) -> Result<Option<User>, StoreError> {
        let users = self.inner.users.read();
        Ok(users.get(username).map(|row| User {
            username: username.clone(),
            balance: row.balance,
        }))
    }

    async fn find_product(&self, name: &ProductName) -> Result<Option<Product>, StoreError> {
        let products = self.inner.products.read();
        Ok(products.get(name).cloned())
    }

    async fn write_balance(
        &self,
        username: &Username,
        balance: Balance,
    ) -> Result<(), StoreError> {
        let mut users = self.inner.users.write();
        match users.get_mut(username) {
            Some(row) => {
                row.balance = balance;
                Ok(())
            }
            None => Err(StoreError::UserMissing(username.clone())),
        }
    }

    async fn decrement_balance(
        &self,
        username: &Username,
        amount: Price,
    ) -> Result<(), StoreError> {
        let mut users = self.inner.users.write();
        match users.get_mut(username) {
            Some(row) => {
                row.balance = row.balance.debit(amount);
                Ok(())
            }
            None => Err(StoreError::UserMissing(username.clone())),
        }
    }

    async fn decrement_balance_if_at_least(
        &self,
        username: &Username,
        amount: Price,
    ) -> Result<bool, StoreError> {
        let mut users = self.inner.users.write();
        match users.get_mut(username) {
            Some(row) if row.balance.covers(amount) => {
                row.balance = row.balance.debit(amount);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn seed(&self, initial_balance: Balance, price: Price) -> Result<(), StoreError> {
        let mut users = self.inner.users.write();
        let mut products = self.inner.products.write();

        users.clear();
        users.insert(
            crate::store::seed_username(),
            UserRow {
                balance: initial_balance,
                lock: Arc::new(Mutex::new(())),
            },
        );

        products.clear();
        products.insert(
            crate::store::seed_product_name(),
            Product {
                name: crate::store::seed_product_name(),
                price,
            },
        );

        Ok(())
    }
}

#[async_trait]
impl LockingStore for MemoryStore {
    async fn lock_user(&self, username: &Username) -> Result<Box<dyn UserRowLock>, StoreError> {
        let row_lock = {
            let users = self.inner.users.read();
            match users.get(username) {
                Some(row) => Arc::clone(&row.lock),
                None => return Err(StoreError::UserMissing(username.clone())),
            }
        };

        let permit = row_lock.lock_owned().await;

        // Re-read under the row lock; the balance may have moved while we
        // were waiting for the previous holder.
        let balance = {
            let users = self.inner.users.read();
            match users.get(username) {
                Some(row) => row.balance,
                None => return Err(StoreError::UserMissing(username.clone())),
            }
        };

        Ok(Box::new(MemoryRowLock {
            shared: Arc::clone(&self.inner),
            username: username.clone(),
            balance,
            staged: None,
            _permit: permit,
        }))
    }
}

struct MemoryRowLock {
    shared: Arc<Shared>,
    username: Username,
    balance: Balance,
    staged: Option<Balance>,
    _permit: OwnedMutexGuard<()>,
}

#[async_trait]
impl UserRowLock for MemoryRowLock {
    fn balance(&self) -> Balance {
        self.balance
    }

    fn stage_balance(&mut self, balance: Balance) {
        self.staged = Some(balance);
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if let Some(balance) = self.staged {
            let mut users = self.shared.users.write();
            match users.get_mut(&self.username) {
                Some(row) => row.balance = balance,
                None => return Err(StoreError::UserMissing(self.username.clone())),
            }
        }
        // The permit drops here, after the write has landed.
        Ok(())
    }
}
