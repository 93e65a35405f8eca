//! Condition evaluation for the in-memory store.

use std::cmp::Ordering;

use crate::core::{AttributeValue, ComparisonOperator, Condition, Conditions, Record, StoreError};

/// Check an operator's operand count the way the store validates requests
pub fn validate(attribute: &str, condition: &Condition) -> Result<(), StoreError> {
    let operands = condition.attribute_value_list.as_deref().unwrap_or_default();
    let op = condition.comparison_operator;

    let valid = match op {
        ComparisonOperator::Null | ComparisonOperator::NotNull => operands.is_empty(),
        ComparisonOperator::Between => operands.len() == 2,
        ComparisonOperator::In => !operands.is_empty(),
        _ => operands.len() == 1,
    };

    if valid {
        Ok(())
    } else {
        Err(StoreError::Validation(format!(
            "Invalid number of argument(s) for the {op} ComparisonOperator on '{attribute}'"
        )))
    }
}

/// Evaluate one condition against an attribute value (absent when missing)
pub fn matches(value: Option<&AttributeValue>, condition: &Condition) -> bool {
    let operands = condition.attribute_value_list.as_deref().unwrap_or_default();
    let first = operands.first();

    match condition.comparison_operator {
        ComparisonOperator::Null => value.is_none(),
        ComparisonOperator::NotNull => value.is_some(),
        ComparisonOperator::Ne => match (value, first) {
            (Some(v), Some(o)) => v != o,
            (None, _) => true,
            (Some(_), None) => false,
        },
        ComparisonOperator::NotContains => match (value, first) {
            (Some(v), Some(o)) => !contains(v, o),
            (None, _) => true,
            (Some(_), None) => false,
        },
        op => {
            let Some(value) = value else {
                return false;
            };
            match op {
                ComparisonOperator::Eq => first.is_some_and(|o| value == o),
                ComparisonOperator::In => operands.iter().any(|o| value == o),
                ComparisonOperator::Lt => ordered(value, first, Ordering::is_lt),
                ComparisonOperator::Le => ordered(value, first, Ordering::is_le),
                ComparisonOperator::Gt => ordered(value, first, Ordering::is_gt),
                ComparisonOperator::Ge => ordered(value, first, Ordering::is_ge),
                ComparisonOperator::Between => {
                    ordered(value, operands.first(), Ordering::is_ge)
                        && ordered(value, operands.get(1), Ordering::is_le)
                }
                ComparisonOperator::Contains => first.is_some_and(|o| contains(value, o)),
                ComparisonOperator::BeginsWith => first.is_some_and(|o| begins_with(value, o)),
                _ => false,
            }
        }
    }
}

/// Evaluate a condition group; `any` selects OR semantics
pub fn matches_all(record: &Record, conditions: &Conditions, any: bool) -> bool {
    if conditions.is_empty() {
        return true;
    }
    let mut results = conditions
        .iter()
        .map(|(name, condition)| matches(record.get(name), condition));
    if any {
        results.any(|r| r)
    } else {
        results.all(|r| r)
    }
}

fn ordered(value: &AttributeValue, operand: Option<&AttributeValue>, test: fn(Ordering) -> bool) -> bool {
    operand
        .and_then(|o| value.compare(o))
        .is_some_and(test)
}

fn contains(value: &AttributeValue, operand: &AttributeValue) -> bool {
    match (value, operand) {
        (AttributeValue::S(s), AttributeValue::S(needle)) => s.contains(needle.as_str()),
        (AttributeValue::B(b), AttributeValue::B(needle)) => {
            needle.is_empty() || b.windows(needle.len()).any(|w| w == needle.as_slice())
        }
        (AttributeValue::Ss(set), AttributeValue::S(member)) => set.contains(member),
        (AttributeValue::Ns(set), AttributeValue::N(member)) => set.contains(member),
        (AttributeValue::Bs(set), AttributeValue::B(member)) => set.contains(member),
        _ => false,
    }
}

fn begins_with(value: &AttributeValue, operand: &AttributeValue) -> bool {
    match (value, operand) {
        (AttributeValue::S(s), AttributeValue::S(prefix)) => s.starts_with(prefix.as_str()),
        (AttributeValue::B(b), AttributeValue::B(prefix)) => b.starts_with(prefix),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(op: ComparisonOperator, values: Vec<AttributeValue>) -> Condition {
        Condition::new(op, if values.is_empty() { None } else { Some(values) })
    }

    #[test]
    fn test_ordering_operators() {
        let v = AttributeValue::from(10_i64);
        assert!(matches(Some(&v), &cond(ComparisonOperator::Ge, vec![AttributeValue::from(10.0)])));
        assert!(matches(Some(&v), &cond(ComparisonOperator::Lt, vec![AttributeValue::from(11_i64)])));
        assert!(!matches(Some(&v), &cond(ComparisonOperator::Gt, vec![AttributeValue::from("a")])));
        assert!(matches(
            Some(&v),
            &cond(
                ComparisonOperator::Between,
                vec![AttributeValue::from(8.0), AttributeValue::from(14.0)]
            )
        ));
    }

    #[test]
    fn test_presence_operators() {
        assert!(matches(None, &cond(ComparisonOperator::Null, vec![])));
        assert!(!matches(None, &cond(ComparisonOperator::NotNull, vec![])));
        assert!(matches(None, &cond(ComparisonOperator::Ne, vec![AttributeValue::from("x")])));
        assert!(!matches(None, &cond(ComparisonOperator::Eq, vec![AttributeValue::from("x")])));
    }

    #[test]
    fn test_contains_on_sets_and_strings() {
        let set = AttributeValue::Ss(vec!["a".into(), "b".into()]);
        assert!(matches(Some(&set), &cond(ComparisonOperator::Contains, vec!["a".into()])));
        assert!(matches(Some(&set), &cond(ComparisonOperator::NotContains, vec!["z".into()])));

        let s = AttributeValue::from("europe");
        assert!(matches(Some(&s), &cond(ComparisonOperator::Contains, vec!["rop".into()])));
        assert!(matches(Some(&s), &cond(ComparisonOperator::BeginsWith, vec!["eu".into()])));
    }

    #[test]
    fn test_operand_validation() {
        assert!(validate("a", &cond(ComparisonOperator::Between, vec![AttributeValue::from(1_i64)])).is_err());
        assert!(validate("a", &cond(ComparisonOperator::Null, vec![])).is_ok());
        assert!(validate("a", &cond(ComparisonOperator::In, vec![])).is_err());
    }

    #[test]
    fn test_or_groups() {
        let mut record = Record::new();
        record.insert("subtotal".into(), AttributeValue::from(100.0));

        let mut conditions = Conditions::new();
        conditions.insert("subtotal".into(), cond(ComparisonOperator::Eq, vec![AttributeValue::from(100.0)]));
        conditions.insert("region".into(), cond(ComparisonOperator::Eq, vec!["asia".into()]));

        assert!(!matches_all(&record, &conditions, false));
        assert!(matches_all(&record, &conditions, true));
        assert!(matches_all(&record, &Conditions::new(), false));
    }
}
