//! Numeric field adjustments.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// How a numeric column changes in a write.
///
/// `Increment` is relative to the value stored at the moment the write is
/// applied, so two queued `Increment(100)` updates add up to `+200` no matter
/// when they were enqueued.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "value")]
pub enum Amount {
    Set(i64),
    Increment(i64),
}

impl ValueObject for Amount {}

impl Amount {
    pub fn set(value: i64) -> Self {
        Self::Set(value)
    }

    pub fn increment(delta: i64) -> Self {
        Self::Increment(delta)
    }

    pub fn decrement(delta: i64) -> Self {
        Self::Increment(delta.saturating_neg())
    }

    /// Apply the adjustment to `current`.
    ///
    /// Fails on `i64` overflow; sign constraints are checked by the record.
    pub fn apply(self, current: i64) -> DomainResult<i64> {
        match self {
            Amount::Set(value) => Ok(value),
            Amount::Increment(delta) => current.checked_add(delta).ok_or_else(|| {
                DomainError::invariant(format!("amount overflow: {current} + {delta}"))
            }),
        }
    }

    /// Value a freshly created column takes (it starts from zero).
    pub fn initial(self) -> DomainResult<i64> {
        self.apply(0)
    }
}

/// Apply an optional adjustment to a column that must stay non-negative.
pub(crate) fn apply_non_negative(
    field: &'static str,
    current: i64,
    change: Option<Amount>,
) -> DomainResult<i64> {
    let Some(change) = change else {
        return Ok(current);
    };

    let next = change.apply(current)?;
    if next < 0 {
        return Err(DomainError::invariant(format!(
            "{field} cannot go negative (current {current}, change {change:?})"
        )));
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_value() {
        assert_eq!(Amount::set(7).apply(1_000).unwrap(), 7);
    }

    #[test]
    fn increment_is_relative() {
        assert_eq!(Amount::increment(250).apply(1_000).unwrap(), 1_250);
        assert_eq!(Amount::decrement(250).apply(1_000).unwrap(), 750);
    }

    #[test]
    fn overflow_is_an_invariant_error() {
        let err = Amount::increment(1).apply(i64::MAX).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn non_negative_guard() {
        assert_eq!(apply_non_negative("cash", 10, None).unwrap(), 10);
        assert_eq!(apply_non_negative("cash", 10, Some(Amount::decrement(10))).unwrap(), 0);
        assert!(apply_non_negative("cash", 10, Some(Amount::decrement(11))).is_err());
    }

    #[test]
    fn serializes_tagged() {
        let json = serde_json::to_value(Amount::increment(5)).unwrap();
        assert_eq!(json, serde_json::json!({"op": "increment", "value": 5}));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 512,
                ..ProptestConfig::default()
            })]

            /// Property: two increments compose like one increment of their sum.
            #[test]
            fn increments_compose(
                start in -1_000_000i64..1_000_000,
                a in -1_000_000i64..1_000_000,
                b in -1_000_000i64..1_000_000,
            ) {
                let stepwise = Amount::increment(b)
                    .apply(Amount::increment(a).apply(start).unwrap())
                    .unwrap();
                let combined = Amount::increment(a + b).apply(start).unwrap();
                prop_assert_eq!(stepwise, combined);
            }

            /// Property: the non-negative guard never yields a negative value.
            #[test]
            fn guarded_result_is_never_negative(
                start in 0i64..1_000_000,
                delta in -2_000_000i64..2_000_000,
            ) {
                let change = Some(Amount::increment(delta));
                if let Ok(next) = apply_non_negative("bank", start, change) {
                    prop_assert!(next >= 0);
                }
            }
        }
    }
}
