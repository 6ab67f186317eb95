use nutype::nutype;
#[allow(unused_imports)] // These are used by nutype derive macros
use serde::{Deserialize, Serialize};

/// Unique key for a product row.
///
/// Limited to 50 characters to match the store schema's name column.
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
pub struct ProductName(String);

/// Product price in whole currency units, always positive.
#[nutype(
    validate(greater_or_equal = 1),
    derive(
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
    )
)]
pub struct Price(i64);

/// A product row as stored in the `products` collection.
///
/// Immutable for the duration of a trial; created once during seeding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: ProductName,
    pub price: Price,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_name_validation() {
        assert!(ProductName::try_new("product".to_string()).is_ok());
        assert!(ProductName::try_new("".to_string()).is_err());
        assert!(ProductName::try_new("a".repeat(51)).is_err());
    }

    #[test]
    fn test_price_must_be_positive() {
        assert!(Price::try_new(1).is_ok());
        assert!(Price::try_new(10).is_ok());
        assert!(Price::try_new(0).is_err());
        assert!(Price::try_new(-10).is_err());
    }
}
