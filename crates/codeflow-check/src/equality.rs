//! Structural equality between a test's expected value and the actual result.

use serde_json::{Number, Value};

/// Deep equality: arrays compare element-wise in order, objects by key set and
/// per-key value, numbers by numeric value (`1` equals `1.0`).
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| deep_equal(x, y)))
        }
        _ => a == b,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    if x.is_f64() || y.is_f64() {
        x.as_f64() == y.as_f64()
    } else {
        x == y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn integers_equal_their_float_form() {
        assert!(deep_equal(&json!(1), &json!(1.0)));
        assert!(deep_equal(&json!([0, 1]), &json!([0.0, 1.0])));
        assert!(!deep_equal(&json!(1), &json!(1.5)));
    }

    #[test]
    fn arrays_are_order_sensitive() {
        assert!(!deep_equal(&json!([0, 1]), &json!([1, 0])));
        assert!(!deep_equal(&json!([0]), &json!([0, 0])));
    }

    #[test]
    fn objects_are_key_set_sensitive() {
        assert!(deep_equal(&json!({"a": 1, "b": 2}), &json!({"b": 2, "a": 1})));
        assert!(!deep_equal(&json!({"a": 1}), &json!({"a": 1, "b": null})));
    }

    #[test]
    fn different_types_differ() {
        assert!(!deep_equal(&json!("1"), &json!(1)));
        assert!(!deep_equal(&json!(null), &json!(false)));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            (-1.0e6f64..1.0e6).prop_map(|f| json!(f)),
            "[a-z]{0,6}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,3}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn equality_is_reflexive(value in arb_json()) {
            prop_assert!(deep_equal(&value, &value));
        }

        #[test]
        fn equality_is_symmetric(a in arb_json(), b in arb_json()) {
            prop_assert_eq!(deep_equal(&a, &b), deep_equal(&b, &a));
        }
    }
}
