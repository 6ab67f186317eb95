use crate::domain::product::Price;
use nutype::nutype;
#[allow(unused_imports)] // These are used by nutype derive macros
use serde::{Deserialize, Serialize};

/// Unique key for a user row.
///
/// Limited to 50 characters to match the store schema's username column.
#[nutype(
    validate(not_empty, len_char_max = 50),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        Serialize,
        Deserialize,
        AsRef,
        Display
    )
)]
pub struct Username(String);

/// Account balance in whole currency units.
///
/// Deliberately unvalidated: the dangerous purchase protocols can drive a
/// balance below zero, and the trial harness must be able to observe that
/// rather than have the type system mask it.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    AsRef,
    Display
))]
pub struct Balance(i64);

impl Balance {
    /// Whether this balance is sufficient to pay `price`.
    pub fn covers(self, price: Price) -> bool {
        self.into_inner() >= price.into_inner()
    }

    /// The balance after paying `price`. May go negative.
    pub fn debit(self, price: Price) -> Self {
        Self::new(self.into_inner() - price.into_inner())
    }

    pub fn is_negative(self) -> bool {
        self.into_inner() < 0
    }
}

/// A user row as stored in the `users` collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: Username,
    pub balance: Balance,
}
