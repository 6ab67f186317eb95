//! Mutual exclusion probe for the row-locking strategy
//!
//! Wraps the in-memory backend in an instrumented store whose row locks
//! report how many holders exist at once. The measured hold starts after
//! the real lock is acquired and ends before it is released, so the gauge
//! can only under-report overlap, never invent it. Each hold is also
//! stretched by a millisecond so that two overlapping holders could not
//! slip past the measurement.

use async_trait::async_trait;
use overdraft::domain::{Balance, Price, Product, ProductName, User, Username};
use overdraft::harness::{run_trial, Concurrency, Trial};
use overdraft::protocols::Protocol;
use overdraft::store::{LockingStore, MemoryStore, Store, StoreError, UserRowLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct HoldGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl HoldGauge {
    fn acquire(&self) {
        let holders = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(holders, Ordering::SeqCst);
    }

    fn release(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
struct ProbedStore {
    inner: MemoryStore,
    gauge: Arc<HoldGauge>,
}

impl ProbedStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            gauge: Arc::new(HoldGauge::default()),
        }
    }
}

#[async_trait]
impl Store for ProbedStore {
    async fn find_user(&self, username: &Username) -> Result<Option<User>, StoreError> {
        self.inner.find_user(username).await
    }

    async fn find_product(&self, name: &ProductName) -> Result<Option<Product>, StoreError> {
        self.inner.find_product(name).await
    }

    async fn write_balance(
        &self,
        username: &Username,
        balance: Balance,
    ) -> Result<(), StoreError> {
        self.inner.write_balance(username, balance).await
    }

    async fn decrement_balance(
        &self,
        username: &Username,
        amount: Price,
    ) -> Result<(), StoreError> {
        self.inner.decrement_balance(username, amount).await
    }

    async fn decrement_balance_if_at_least(
        &self,
        username: &Username,
        amount: Price,
    ) -> Result<bool, StoreError> {
        self.inner
            .decrement_balance_if_at_least(username, amount)
            .await
    }

    async fn seed(&self, initial_balance: Balance, price: Price) -> Result<(), StoreError> {
        self.inner.seed(initial_balance, price).await
    }
}

#[async_trait]
impl LockingStore for ProbedStore {
    async fn lock_user(&self, username: &Username) -> Result<Box<dyn UserRowLock>, StoreError> {
        let inner = self.inner.lock_user(username).await?;
        self.gauge.acquire();
        Ok(Box::new(ProbedRowLock {
            inner: Some(inner),
            gauge: Arc::clone(&self.gauge),
        }))
    }
}

struct ProbedRowLock {
    inner: Option<Box<dyn UserRowLock>>,
    gauge: Arc<HoldGauge>,
}

#[async_trait]
impl UserRowLock for ProbedRowLock {
    fn balance(&self) -> Balance {
        self.inner.as_ref().expect("lock still held").balance()
    }

    fn stage_balance(&mut self, balance: Balance) {
        self.inner
            .as_mut()
            .expect("lock still held")
            .stage_balance(balance);
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let inner = self.inner.take().expect("lock still held");
        // Stretch the hold so overlapping holders could not evade the gauge
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.gauge.release();
        inner.commit().await
    }
}

impl Drop for ProbedRowLock {
    fn drop(&mut self) {
        if self.inner.is_some() {
            self.gauge.release();
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_no_two_attempts_hold_the_same_user_lock_concurrently() {
    let store = ProbedStore::new();
    store
        .seed(
            Balance::new(1_000),
            Price::try_new(10).expect("valid price"),
        )
        .await
        .expect("seed succeeds");
    let gauge = Arc::clone(&store.gauge);
    let store = Arc::new(store);

    let trial = Trial::new(
        Protocol::SafeLocking,
        Concurrency::try_new(32).expect("valid concurrency"),
    );
    let outcome = run_trial(&store, &trial).await;

    assert_eq!(outcome.successes, 32, "funds afford every attempt");
    assert_eq!(gauge.peak(), 1, "observed overlapping lock holders");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_exclusion_also_holds_when_attempts_are_refused() {
    // Only two attempts can be funded; the refused ones still take the lock
    // to read the balance, and must serialize the same way.
    let store = ProbedStore::new();
    store
        .seed(Balance::new(20), Price::try_new(10).expect("valid price"))
        .await
        .expect("seed succeeds");
    let gauge = Arc::clone(&store.gauge);
    let store = Arc::new(store);

    let trial = Trial::new(
        Protocol::SafeLocking,
        Concurrency::try_new(16).expect("valid concurrency"),
    );
    let outcome = run_trial(&store, &trial).await;

    assert_eq!(outcome.successes, 2);
    assert_eq!(outcome.insufficient_funds, 14);
    assert_eq!(gauge.peak(), 1, "observed overlapping lock holders");
}
