use crate::domain::{ProductName, Username};
use crate::store::StoreError;
use thiserror::Error;

/// Outcome taxonomy for a single purchase attempt.
#[derive(Error, Debug)]
pub enum PurchaseError {
    /// The funds check failed and nothing was mutated. Terminal for this
    /// attempt; retrying cannot succeed until the balance changes.
    #[error("insufficient funds: {username} cannot afford {product}")]
    InsufficientFunds {
        username: Username,
        product: ProductName,
    },

    /// The store rejected the write after detecting a concurrent
    /// modification. The caller decides whether to retry; nothing retries
    /// internally.
    #[error("update conflict: a concurrent write beat the purchase of {product} for {username}")]
    UpdateConflict {
        username: Username,
        product: ProductName,
    },

    #[error("user {0} not found")]
    UserNotFound(Username),

    #[error("product {0} not found")]
    ProductNotFound(ProductName),

    /// Transport or backend failure unrelated to the purchase logic.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PurchaseError {
    pub fn insufficient_funds(username: &Username, product: &ProductName) -> Self {
        Self::InsufficientFunds {
            username: username.clone(),
            product: product.clone(),
        }
    }

    /// Attach purchase context to a store failure, promoting a detected
    /// write conflict to its own variant so callers can tell the two
    /// non-successes apart.
    pub(crate) fn from_store(
        error: StoreError,
        username: &Username,
        product: &ProductName,
    ) -> Self {
        match error {
            StoreError::Conflict => Self::UpdateConflict {
                username: username.clone(),
                product: product.clone(),
            },
            other => Self::Store(other),
        }
    }
}

/// Top-level application error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Purchase(#[from] PurchaseError),
}

pub type Result<T> = std::result::Result<T, Error>;
