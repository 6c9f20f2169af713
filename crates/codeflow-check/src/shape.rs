//! Mapping a test's `input` onto call arguments.

use serde_json::Value;

/// Arguments for one test call. The first matching shape wins:
///
/// 1. an array is passed positionally,
/// 2. an object with `input` and `target` becomes two arguments,
/// 3. an object with an `args` array is spread,
/// 4. anything else is a single argument.
pub fn arguments(input: &Value) -> Vec<Value> {
    match input {
        Value::Array(items) => items.clone(),
        Value::Object(map) => {
            if let (Some(input), Some(target)) = (map.get("input"), map.get("target")) {
                return vec![input.clone(), target.clone()];
            }
            match map.get("args") {
                Some(Value::Array(args)) => args.clone(),
                _ => vec![input.clone()],
            }
        }
        other => vec![other.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arrays_are_positional() {
        assert_eq!(
            arguments(&json!([[2, 7, 11, 15], 9])),
            vec![json!([2, 7, 11, 15]), json!(9)]
        );
    }

    #[test]
    fn input_target_pairs() {
        assert_eq!(
            arguments(&json!({"input": [1, 2], "target": 3, "args": [0]})),
            vec![json!([1, 2]), json!(3)]
        );
    }

    #[test]
    fn args_are_spread() {
        assert_eq!(arguments(&json!({"args": ["a", 1]})), vec![json!("a"), json!(1)]);
    }

    #[test]
    fn everything_else_is_one_argument() {
        assert_eq!(arguments(&json!("racecar")), vec![json!("racecar")]);
        assert_eq!(arguments(&json!({"args": 5})), vec![json!({"args": 5})]);
        assert_eq!(arguments(&json!({"input": 1})), vec![json!({"input": 1})]);
        assert_eq!(arguments(&Value::Null), vec![Value::Null]);
    }
}
