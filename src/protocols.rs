//! The competing purchase protocols
//!
//! Four strategies for "decrement a named user's balance by a named
//! product's price, but only if sufficient funds exist", differing solely in
//! how the funds check composes with the write. The two dangerous variants
//! are implemented exactly as their race windows demand, with no added
//! guards, so the trial harness can observe the failure modes; the two safe
//! variants close the window at the store (atomic conditional update) or
//! above it (exclusive row lock).

use crate::domain::{ProductName, Username};
use crate::error::PurchaseError;
use crate::store::{LockingStore, Store, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A named purchase strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    UnsafeReadModifyWrite,
    UnsafeConditionalUpdate,
    SafeAtomicConditionalUpdate,
    SafeLocking,
}

impl Protocol {
    /// Every protocol, in escalating order of safety.
    pub const ALL: [Self; 4] = [
        Self::UnsafeReadModifyWrite,
        Self::UnsafeConditionalUpdate,
        Self::SafeAtomicConditionalUpdate,
        Self::SafeLocking,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::UnsafeReadModifyWrite => "unsafe-read-modify-write",
            Self::UnsafeConditionalUpdate => "unsafe-conditional-update",
            Self::SafeAtomicConditionalUpdate => "safe-atomic-conditional-update",
            Self::SafeLocking => "safe-locking",
        }
    }

    /// Whether the strategy is expected to hold the balance invariants for
    /// every interleaving.
    pub fn is_safe(self) -> bool {
        matches!(self, Self::SafeAtomicConditionalUpdate | Self::SafeLocking)
    }

    /// Run one purchase attempt with this strategy.
    pub async fn execute<S>(
        self,
        store: &S,
        username: &Username,
        product: &ProductName,
    ) -> Result<(), PurchaseError>
    where
        S: LockingStore + ?Sized,
    {
        match self {
            Self::UnsafeReadModifyWrite => read_modify_write(store, username, product).await,
            Self::UnsafeConditionalUpdate => conditional_update(store, username, product).await,
            Self::SafeAtomicConditionalUpdate => {
                atomic_conditional_update(store, username, product).await
            }
            Self::SafeLocking => locking(store, username, product).await,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A protocol name that matched none of the known strategies.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown protocol {0:?}, expected one of: unsafe-read-modify-write, unsafe-conditional-update, safe-atomic-conditional-update, safe-locking")]
pub struct UnknownProtocol(String);

impl FromStr for Protocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|protocol| protocol.name() == s)
            .ok_or_else(|| UnknownProtocol(s.to_string()))
    }
}

/// Two independent point reads, a comparison in application memory, then an
/// unconditional absolute write keyed only by username.
///
/// Between the read and the write another attempt may already have
/// decremented the balance; this write then silently clobbers that
/// decrement (lost update).
pub async fn read_modify_write<S>(
    store: &S,
    username: &Username,
    product: &ProductName,
) -> Result<(), PurchaseError>
where
    S: Store + ?Sized,
{
    let user = store
        .find_user(username)
        .await
        .map_err(|e| PurchaseError::from_store(e, username, product))?
        .ok_or_else(|| PurchaseError::UserNotFound(username.clone()))?;
    let product_row = store
        .find_product(product)
        .await
        .map_err(|e| PurchaseError::from_store(e, username, product))?
        .ok_or_else(|| PurchaseError::ProductNotFound(product.clone()))?;

    if !user.balance.covers(product_row.price) {
        return Err(PurchaseError::insufficient_funds(username, product));
    }

    store
        .write_balance(username, user.balance.debit(product_row.price))
        .await
        .map_err(|e| PurchaseError::from_store(e, username, product))
}

/// Same reads and in-memory comparison, but the write is a relative
/// decrement applied by the store.
///
/// Nothing gets clobbered, but two attempts can both pass the check against
/// the same stale balance and both decrement, driving the balance negative.
pub async fn conditional_update<S>(
    store: &S,
    username: &Username,
    product: &ProductName,
) -> Result<(), PurchaseError>
where
    S: Store + ?Sized,
{
    let user = store
        .find_user(username)
        .await
        .map_err(|e| PurchaseError::from_store(e, username, product))?
        .ok_or_else(|| PurchaseError::UserNotFound(username.clone()))?;
    let product_row = store
        .find_product(product)
        .await
        .map_err(|e| PurchaseError::from_store(e, username, product))?
        .ok_or_else(|| PurchaseError::ProductNotFound(product.clone()))?;

    if !user.balance.covers(product_row.price) {
        return Err(PurchaseError::insufficient_funds(username, product));
    }

    store
        .decrement_balance(username, product_row.price)
        .await
        .map_err(|e| PurchaseError::from_store(e, username, product))
}

/// One store-side operation that both checks the funds and applies the
/// decrement; no other writer can observe an intermediate state.
///
/// "Not applied" covers both a missing user and insufficient funds, and is
/// reported as [`PurchaseError::InsufficientFunds`], never as an ambiguous
/// success.
pub async fn atomic_conditional_update<S>(
    store: &S,
    username: &Username,
    product: &ProductName,
) -> Result<(), PurchaseError>
where
    S: Store + ?Sized,
{
    let product_row = store
        .find_product(product)
        .await
        .map_err(|e| PurchaseError::from_store(e, username, product))?
        .ok_or_else(|| PurchaseError::ProductNotFound(product.clone()))?;

    let applied = store
        .decrement_balance_if_at_least(username, product_row.price)
        .await
        .map_err(|e| PurchaseError::from_store(e, username, product))?;

    if applied {
        Ok(())
    } else {
        Err(PurchaseError::insufficient_funds(username, product))
    }
}

/// Exclusive row lock on the user, check and decrement under the lock,
/// release only after the write is committed.
///
/// Every concurrent attempt against the same user serializes on the lock,
/// so the check always sees the latest committed balance.
pub async fn locking<S>(
    store: &S,
    username: &Username,
    product: &ProductName,
) -> Result<(), PurchaseError>
where
    S: LockingStore + ?Sized,
{
    let product_row = store
        .find_product(product)
        .await
        .map_err(|e| PurchaseError::from_store(e, username, product))?
        .ok_or_else(|| PurchaseError::ProductNotFound(product.clone()))?;

    let mut lock = store.lock_user(username).await.map_err(|e| match e {
        StoreError::UserMissing(user) => PurchaseError::UserNotFound(user),
        other => PurchaseError::from_store(other, username, product),
    })?;

    if !lock.balance().covers(product_row.price) {
        // Guard drops here: staged nothing, lock released
        return Err(PurchaseError::insufficient_funds(username, product));
    }

    let updated = lock.balance().debit(product_row.price);
    lock.stage_balance(updated);
    lock.commit()
        .await
        .map_err(|e| PurchaseError::from_store(e, username, product))
}
