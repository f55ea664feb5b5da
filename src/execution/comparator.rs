//! Cross-type ordering of order-by values
//!
//! Values are ranked by type first: undefined < null < boolean < number < string.
//! Values of the same type compare by value. Arrays and objects have no position in
//! this order; comparing one is an invariant violation.

use std::cmp::Ordering;

use serde_json::Value;

use crate::continuation::OrderByItem;
use crate::error::{QueryError, QueryResult};
use crate::model::SortOrder;

/// An order-by value classified into the sortable type domain
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryItem<'a> {
    NoValue,
    Null,
    Boolean(bool),
    Number(f64),
    String(&'a str),
}

impl<'a> QueryItem<'a> {
    pub fn classify(value: Option<&'a Value>) -> QueryResult<Self> {
        match value {
            None => Ok(QueryItem::NoValue),
            Some(Value::Null) => Ok(QueryItem::Null),
            Some(Value::Bool(b)) => Ok(QueryItem::Boolean(*b)),
            Some(Value::Number(n)) => n.as_f64().map(QueryItem::Number).ok_or_else(|| {
                QueryError::invariant(format!("number {} has no f64 representation", n))
            }),
            Some(Value::String(s)) => Ok(QueryItem::String(s)),
            Some(other) => Err(QueryError::invariant(format!(
                "order-by value {} is not a scalar",
                other
            ))),
        }
    }

    pub fn type_ordinal(&self) -> u8 {
        match self {
            QueryItem::NoValue => 0,
            QueryItem::Null => 1,
            QueryItem::Boolean(_) => 2,
            QueryItem::Number(_) => 3,
            QueryItem::String(_) => 4,
        }
    }
}

/// Stateless comparator for order-by merges
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemComparator;

impl ItemComparator {
    pub fn new() -> Self {
        Self
    }

    pub fn compare(&self, a: Option<&Value>, b: Option<&Value>) -> QueryResult<Ordering> {
        let a = QueryItem::classify(a)?;
        let b = QueryItem::classify(b)?;

        let by_type = a.type_ordinal().cmp(&b.type_ordinal());
        if by_type != Ordering::Equal {
            return Ok(by_type);
        }

        match (a, b) {
            (QueryItem::NoValue, QueryItem::NoValue) | (QueryItem::Null, QueryItem::Null) => {
                Ok(Ordering::Equal)
            }
            (QueryItem::Boolean(x), QueryItem::Boolean(y)) => Ok(x.cmp(&y)),
            (QueryItem::Number(x), QueryItem::Number(y)) => x.partial_cmp(&y).ok_or_else(|| {
                QueryError::invariant(format!("numbers {} and {} are not comparable", x, y))
            }),
            (QueryItem::String(x), QueryItem::String(y)) => Ok(x.cmp(y)),
            (x, y) => Err(QueryError::invariant(format!(
                "cannot compare {:?} with {:?}",
                x, y
            ))),
        }
    }

    /// Compares two order-by tuples under the given sort orders
    pub fn compare_items(
        &self,
        a: &[OrderByItem],
        b: &[OrderByItem],
        orders: &[SortOrder],
    ) -> QueryResult<Ordering> {
        if a.len() != b.len() || a.len() != orders.len() {
            return Err(QueryError::invariant(format!(
                "order-by arity mismatch: {} vs {} values for {} sort orders",
                a.len(),
                b.len(),
                orders.len()
            )));
        }
        for ((x, y), order) in a.iter().zip(b).zip(orders) {
            let ordering = self.compare(x.item.as_ref(), y.item.as_ref())?;
            let ordering = match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return Ok(ordering);
            }
        }
        Ok(Ordering::Equal)
    }

    /// Tie-break between rows with equal order-by values
    ///
    /// Rids order in the direction of the first sort column. Numeric rids compare by value.
    pub fn compare_rids(&self, a: &str, b: &str, orders: &[SortOrder]) -> Ordering {
        let ordering = match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.cmp(b),
        };
        match orders.first() {
            Some(SortOrder::Descending) => ordering.reverse(),
            _ => ordering,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn cmp(a: Option<Value>, b: Option<Value>) -> Ordering {
        ItemComparator::new()
            .compare(a.as_ref(), b.as_ref())
            .unwrap()
    }

    #[test]
    fn test_type_ordinals() {
        let ladder = vec![
            None,
            Some(json!(null)),
            Some(json!(false)),
            Some(json!(-5)),
            Some(json!("")),
        ];
        for (i, a) in ladder.iter().enumerate() {
            for (j, b) in ladder.iter().enumerate() {
                assert_eq!(cmp(a.clone(), b.clone()), i.cmp(&j));
            }
        }
    }

    #[test]
    fn test_same_type_comparisons() {
        assert_eq!(cmp(Some(json!(false)), Some(json!(true))), Ordering::Less);
        assert_eq!(cmp(Some(json!(2)), Some(json!(10.5))), Ordering::Less);
        assert_eq!(cmp(Some(json!(3)), Some(json!(3.0))), Ordering::Equal);
        assert_eq!(cmp(Some(json!("b")), Some(json!("a"))), Ordering::Greater);
    }

    #[test]
    fn test_non_scalar_is_fatal() {
        let err = ItemComparator::new()
            .compare(Some(&json!([1])), Some(&json!(1)))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_compare_items_with_descending() {
        let comparator = ItemComparator::new();
        let a = vec![OrderByItem::new(json!(1)), OrderByItem::new(json!("x"))];
        let b = vec![OrderByItem::new(json!(1)), OrderByItem::new(json!("y"))];

        let asc = [SortOrder::Ascending, SortOrder::Ascending];
        let mixed = [SortOrder::Ascending, SortOrder::Descending];
        assert_eq!(comparator.compare_items(&a, &b, &asc).unwrap(), Ordering::Less);
        assert_eq!(
            comparator.compare_items(&a, &b, &mixed).unwrap(),
            Ordering::Greater
        );
        assert!(comparator.compare_items(&a, &b, &asc[..1]).is_err());
    }

    #[test]
    fn test_rid_ties_follow_first_sort_order() {
        let comparator = ItemComparator::new();
        let asc = [SortOrder::Ascending];
        let desc = [SortOrder::Descending, SortOrder::Ascending];

        assert_eq!(comparator.compare_rids("3", "5", &asc), Ordering::Less);
        // The row after "5" in a descending scan is "3"
        assert_eq!(comparator.compare_rids("3", "5", &desc), Ordering::Greater);
        assert_eq!(comparator.compare_rids("10", "9", &asc), Ordering::Greater);
        assert_eq!(comparator.compare_rids("b", "a", &asc), Ordering::Greater);
        assert_eq!(comparator.compare_rids("b", "b", &desc), Ordering::Equal);
    }

    fn scalar() -> impl Strategy<Value = Option<Value>> {
        prop_oneof![
            Just(None),
            Just(Some(Value::Null)),
            any::<bool>().prop_map(|b| Some(json!(b))),
            (-1000i64..1000).prop_map(|n| Some(json!(n))),
            (-1000.0f64..1000.0).prop_map(|n| Some(json!(n))),
            "[a-c]{0,3}".prop_map(|s| Some(json!(s))),
        ]
    }

    proptest! {
        #[test]
        fn prop_antisymmetric(a in scalar(), b in scalar()) {
            prop_assert_eq!(cmp(a.clone(), b.clone()), cmp(b, a).reverse());
        }

        #[test]
        fn prop_transitive(a in scalar(), b in scalar(), c in scalar()) {
            if cmp(a.clone(), b.clone()) != Ordering::Greater
                && cmp(b.clone(), c.clone()) != Ordering::Greater
            {
                prop_assert_ne!(cmp(a, c), Ordering::Greater);
            }
        }

        #[test]
        fn prop_reflexive(a in scalar()) {
            prop_assert_eq!(cmp(a.clone(), a), Ordering::Equal);
        }
    }
}
