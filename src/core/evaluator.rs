use serde_json::{Number, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub passed: bool,
    /// Decoded stdout, or the trimmed raw text when stdout is not JSON.
    pub output: Value,
}

/// Decides whether one executed test passed.
///
/// Stdout that decodes as JSON is compared structurally against the decoded
/// expected output. Stdout that does not decode falls back to comparing its
/// trimmed text with the raw expected text (or with the expected string when
/// the expected output is a JSON string).
pub fn evaluate(actual_stdout: &str, expected_output: &str) -> Evaluation {
    let expected: Option<Value> = serde_json::from_str(expected_output).ok();

    match serde_json::from_str::<Value>(actual_stdout) {
        Ok(actual) => {
            let passed = match &expected {
                Some(expected) => json_eq(&actual, expected),
                None => actual_stdout.trim() == expected_output.trim(),
            };
            Evaluation {
                passed,
                output: actual,
            }
        }
        Err(_) => {
            let actual = actual_stdout.trim();
            let passed = actual == expected_output.trim()
                || matches!(&expected, Some(Value::String(s)) if s == actual);
            Evaluation {
                passed,
                output: Value::String(actual.to_string()),
            }
        }
    }
}

/// Deep equality where numbers compare by value, so `5` equals `5.0`.
/// Arrays are order sensitive; objects ignore key order.
pub fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_eq(x, y),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, x)| y.get(key).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Largest magnitude up to which every integer has an exact `f64`.
const MAX_EXACT_INTEGER: u64 = 1 << 53;

fn numbers_eq(x: &Number, y: &Number) -> bool {
    if !x.is_f64() && !y.is_f64() {
        return match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_u64().is_some_and(|x| y.as_u64() == Some(x)),
        };
    }
    match (exact_f64(x), exact_f64(y)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// `n` as an `f64`, or `None` for an integer the conversion would round.
fn exact_f64(n: &Number) -> Option<f64> {
    if n.is_f64() {
        return n.as_f64();
    }
    let magnitude = match (n.as_i64(), n.as_u64()) {
        (Some(i), _) => i.unsigned_abs(),
        (None, Some(u)) => u,
        (None, None) => return None,
    };
    (magnitude <= MAX_EXACT_INTEGER).then(|| n.as_f64()).flatten()
}
