//! Store abstraction the purchase protocols are written against
//!
//! A store exposes two collections (`users`: username, balance; `products`:
//! name, price) plus the handful of write shapes the protocols differ on:
//! an unconditional absolute set, an unconditional relative decrement, a
//! combined check-and-decrement that the backend executes as a single
//! operation, and an exclusive per-user row lock. One conforming
//! implementation exists per backend; protocols are written once against
//! the traits.

pub mod latency;
pub mod memory;
pub mod postgres;

use crate::domain::{Balance, Price, Product, ProductName, User, Username};
use async_trait::async_trait;
use thiserror::Error;

pub use latency::LatencyStore;
pub use memory::MemoryStore;
pub use postgres::{IsolationLevel, PostgresStore};

/// Username created by [`Store::seed`].
pub const SEED_USERNAME: &str = "user";

/// Product name created by [`Store::seed`].
pub const SEED_PRODUCT: &str = "product";

/// Failures reported by a store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store detected a concurrent modification and rejected the write.
    /// Callers may retry; the protocols never retry internally.
    #[error("concurrent update conflict")]
    Conflict,

    /// Transport or connection failure, including pool exhaustion.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A write targeted a user row that does not exist.
    #[error("user {0} does not exist")]
    UserMissing(Username),

    /// Anything else the backend reports.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            // serialization_failure / deadlock_detected
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("40001") | Some("40P01") => Self::Conflict,
                _ => Self::Backend(error.to_string()),
            },
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => Self::Unavailable(error.to_string()),
            _ => Self::Backend(error.to_string()),
        }
    }
}

/// The minimal store surface shared by every backend.
///
/// Each method is a single round-trip from the store's point of view; the
/// backend guarantees per-operation atomicity, nothing more. Whether a
/// sequence of these operations is race-free is exactly what the purchase
/// protocols differ on.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user(&self, username: &Username) -> Result<Option<User>, StoreError>;

    async fn find_product(&self, name: &ProductName) -> Result<Option<Product>, StoreError>;

    /// Unconditional absolute set of a user's balance, keyed only by
    /// username. Errors with [`StoreError::UserMissing`] if no row matches.
    async fn write_balance(&self, username: &Username, balance: Balance)
        -> Result<(), StoreError>;

    /// Unconditional relative decrement. May drive the balance negative.
    async fn decrement_balance(&self, username: &Username, amount: Price)
        -> Result<(), StoreError>;

    /// Combined check-and-decrement executed as a single store-side
    /// operation: decrements only if the current balance covers `amount`.
    /// Returns whether the decrement was applied. A missing user counts as
    /// not applied, the same as insufficient funds.
    async fn decrement_balance_if_at_least(
        &self,
        username: &Username,
        amount: Price,
    ) -> Result<bool, StoreError>;

    /// (Re)creates exactly one user and one product with the given values,
    /// replacing any prior state. Calling it twice leaves one user and one
    /// product with the second call's values in effect.
    async fn seed(&self, initial_balance: Balance, price: Price) -> Result<(), StoreError>;
}

/// Exclusive claim on one user row, held for the duration of a
/// read-check-write sequence.
///
/// The balance is read under the lock at acquisition time. Writes are staged
/// and land on [`commit`](UserRowLock::commit); dropping an uncommitted
/// guard discards the staged write and releases the lock (rollback). The
/// lock is released only after a committed write is durably applied.
#[async_trait]
pub trait UserRowLock: Send {
    /// Balance as read under the lock.
    fn balance(&self) -> Balance;

    /// Stage a new balance to be written on commit.
    fn stage_balance(&mut self, balance: Balance);

    /// Apply the staged write (if any) and release the lock.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Stores that support exclusive row locks.
///
/// The lock scope is exactly one user row; no implementation ever locks
/// across users, so lock acquisition cannot deadlock.
#[async_trait]
pub trait LockingStore: Store {
    /// Acquire an exclusive lock on the named user's row, blocking until any
    /// current holder releases it. Errors with [`StoreError::UserMissing`]
    /// if no row matches.
    async fn lock_user(&self, username: &Username) -> Result<Box<dyn UserRowLock>, StoreError>;
}

/// The username every seeded trial runs against.
pub fn seed_username() -> Username {
    Username::try_new(SEED_USERNAME.to_string()).expect("seed username is valid")
}

/// The product name every seeded trial runs against.
pub fn seed_product_name() -> ProductName {
    ProductName::try_new(SEED_PRODUCT.to_string()).expect("seed product name is valid")
}
