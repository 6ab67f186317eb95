//! Latency-injecting store decorator
//!
//! Wraps any store and sleeps for a fixed interval before each operation,
//! simulating the network round-trip a remote store would cost. The point is
//! to widen the read-to-write window of the dangerous protocols so trials
//! against the in-memory backend exhibit the same interleavings a real
//! deployment would.

use crate::domain::{Balance, Price, Product, ProductName, User, Username};
use crate::store::{LockingStore, Store, StoreError, UserRowLock};
use async_trait::async_trait;
use std::time::Duration;

/// Store decorator that delays every operation by a fixed interval.
#[derive(Clone)]
pub struct LatencyStore<S> {
    inner: S,
    delay: Duration,
}

impl<S> LatencyStore<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        Self { inner, delay }
    }

    async fn round_trip(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl<S: Store> Store for LatencyStore<S> {
    async fn find_user(&self, username: &Username) -> Result<Option<User>, StoreError> {
        self.round_trip().await;
        self.inner.find_user(username).await
    }

    async fn find_product(&self, name: &ProductName) -> Result<Option<Product>, StoreError> {
        self.round_trip().await;
        self.inner.find_product(name).await
    }

    async fn write_balance(
        &self,
        username: &Username,
        balance: Balance,
    ) -> Result<(), StoreError> {
        self.round_trip().await;
        self.inner.write_balance(username, balance).await
    }

    async fn decrement_balance(
        &self,
        username: &Username,
        amount: Price,
    ) -> Result<(), StoreError> {
        self.round_trip().await;
        self.inner.decrement_balance(username, amount).await
    }

    async fn decrement_balance_if_at_least(
        &self,
        username: &Username,
        amount: Price,
    ) -> Result<bool, StoreError> {
        self.round_trip().await;
        self.inner
            .decrement_balance_if_at_least(username, amount)
            .await
    }

    async fn seed(&self, initial_balance: Balance, price: Price) -> Result<(), StoreError> {
        self.round_trip().await;
        self.inner.seed(initial_balance, price).await
    }
}

#[async_trait]
impl<S: LockingStore> LockingStore for LatencyStore<S> {
    async fn lock_user(&self, username: &Username) -> Result<Box<dyn UserRowLock>, StoreError> {
        self.round_trip().await;
        self.inner.lock_user(username).await
    }
}
