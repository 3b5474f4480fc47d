use serde_json::Value;

use super::Verdict;

pub(super) fn run(output: &str, config: &Value) -> Verdict {
    let min_length = config
        .get("min_length")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let max_length = config
        .get("max_length")
        .and_then(Value::as_u64)
        .unwrap_or(u64::MAX);

    let len = output.chars().count() as u64;

    if len >= min_length && len <= max_length {
        Verdict::pass(format!("Length {len} within [{min_length}, {max_length}]"))
    } else {
        Verdict::fail(format!(
            "Length {len} outside [{min_length}, {max_length}]"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_allow_any_length() {
        assert!(run("", &json!({})).passed);
        assert!(run("anything at all", &json!({})).passed);
    }

    #[test]
    fn enforces_bounds() {
        assert!(!run("hi", &json!({"min_length": 5})).passed);
        assert!(!run("way too long", &json!({"max_length": 3})).passed);
        assert!(run("ok", &json!({"min_length": 1, "max_length": 5})).passed);
    }
}
