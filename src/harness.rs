//! Concurrent trial harness
//!
//! Fires N invocations of one purchase protocol against freshly seeded
//! state, all dispatched before any result is awaited and released together
//! through a barrier so the store genuinely experiences overlapping
//! operations. Every attempt's outcome is captured individually; a failing
//! attempt never aborts the trial or its siblings. The harness only counts
//! and reports. Deciding whether the resulting balance is *correct* is the
//! assertion layer's job, via [`TrialOutcome::check_invariants`].

use crate::domain::{Balance, Price, ProductName, Username};
use crate::error::PurchaseError;
use crate::protocols::Protocol;
use crate::store::LockingStore;
use nutype::nutype;
#[allow(unused_imports)] // These are used by nutype derive macros
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Barrier;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Number of concurrent purchase attempts in a trial.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10_000),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        AsRef,
        Display
    )
)]
pub struct Concurrency(usize);

/// Identifier correlating all log lines of one trial run.
#[nutype(derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize))]
pub struct TrialId(Uuid);

impl TrialId {
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

/// One trial: a protocol, a contention level, and the row pair to hammer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trial {
    pub protocol: Protocol,
    pub concurrency: Concurrency,
    pub username: Username,
    pub product: ProductName,
}

impl Trial {
    /// A trial against the rows that [`Store::seed`](crate::store::Store::seed)
    /// creates.
    pub fn new(protocol: Protocol, concurrency: Concurrency) -> Self {
        Self {
            protocol,
            concurrency,
            username: crate::store::seed_username(),
            product: crate::store::seed_product_name(),
        }
    }
}

/// Per-outcome tallies of one trial. The four counters partition the
/// attempts: they always sum to the requested concurrency.
#[derive(Debug, Clone, Serialize)]
pub struct TrialOutcome {
    pub successes: u32,
    pub insufficient_funds: u32,
    pub conflicts: u32,
    pub store_failures: u32,
    pub elapsed: Duration,
}

impl TrialOutcome {
    pub fn attempts(&self) -> u32 {
        self.successes + self.insufficient_funds + self.conflicts + self.store_failures
    }

    /// The balance the accounting invariant predicts from this outcome.
    pub fn expected_balance(&self, initial_balance: Balance, price: Price) -> Balance {
        Balance::new(initial_balance.into_inner() - i64::from(self.successes) * price.into_inner())
    }

    /// Check the two balance invariants against the observed final balance.
    pub fn check_invariants(
        &self,
        initial_balance: Balance,
        price: Price,
        final_balance: Balance,
    ) -> Result<(), InvariantViolation> {
        if final_balance.is_negative() {
            return Err(InvariantViolation::NegativeBalance {
                balance: final_balance,
            });
        }

        let expected = self.expected_balance(initial_balance, price);
        if final_balance != expected {
            return Err(InvariantViolation::Accounting {
                expected,
                actual: final_balance,
            });
        }

        Ok(())
    }
}

/// A balance invariant the trial's final state failed to uphold.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The balance was driven below zero (over-spend).
    #[error("balance went negative: {balance}")]
    NegativeBalance { balance: Balance },

    /// The final balance disagrees with `initial - successes * price`. A
    /// final balance above the prediction means decrements were overwritten
    /// (lost updates).
    #[error("accounting mismatch: expected {expected}, found {actual}")]
    Accounting { expected: Balance, actual: Balance },
}

/// Run one trial: fire exactly `trial.concurrency` purchase attempts
/// concurrently and tally every attempt's outcome.
///
/// Each task clones the store handle; checking out a connection per
/// operation is the backend's pool concern, so concurrent attempts never
/// share a session. The harness waits for every attempt, successful or not,
/// before returning.
#[instrument(
    skip(store, trial),
    fields(
        trial_id = ?TrialId::generate(),
        protocol = %trial.protocol,
        concurrency = %trial.concurrency,
    )
)]
pub async fn run_trial<S>(store: &Arc<S>, trial: &Trial) -> TrialOutcome
where
    S: LockingStore + ?Sized + 'static,
{
    let n = trial.concurrency.into_inner();
    let barrier = Arc::new(Barrier::new(n));
    let mut tasks = JoinSet::new();
    let started = Instant::now();

    for attempt in 0..n {
        let store = Arc::clone(store);
        let barrier = Arc::clone(&barrier);
        let protocol = trial.protocol;
        let username = trial.username.clone();
        let product = trial.product.clone();

        tasks.spawn(async move {
            barrier.wait().await;
            let result = protocol.execute(store.as_ref(), &username, &product).await;
            (attempt, result)
        });
    }

    let mut successes = 0;
    let mut insufficient_funds = 0;
    let mut conflicts = 0;
    let mut store_failures = 0;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((attempt, Ok(()))) => {
                debug!(attempt, "purchase applied");
                successes += 1;
            }
            Ok((attempt, Err(PurchaseError::InsufficientFunds { .. }))) => {
                debug!(attempt, "insufficient funds");
                insufficient_funds += 1;
            }
            Ok((attempt, Err(PurchaseError::UpdateConflict { .. }))) => {
                debug!(attempt, "update conflict");
                conflicts += 1;
            }
            Ok((attempt, Err(error))) => {
                warn!(attempt, %error, "purchase attempt failed");
                store_failures += 1;
            }
            Err(join_error) => {
                warn!(%join_error, "purchase task did not complete");
                store_failures += 1;
            }
        }
    }

    let outcome = TrialOutcome {
        successes,
        insufficient_funds,
        conflicts,
        store_failures,
        elapsed: started.elapsed(),
    };

    info!(
        successes = outcome.successes,
        insufficient_funds = outcome.insufficient_funds,
        conflicts = outcome.conflicts,
        store_failures = outcome.store_failures,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "trial complete"
    );

    outcome
}
