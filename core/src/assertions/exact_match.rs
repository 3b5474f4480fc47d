use serde_json::Value;

use super::Verdict;

pub(super) fn run(output: &str, expected: Option<&Value>, config: &Value) -> Verdict {
    let Some(expected) = expected else {
        return Verdict::fail("No expected output to compare against");
    };
    if expected.is_null() {
        return Verdict::fail("Expected output is null");
    }

    let expected_str = match expected {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    let case_sensitive = config
        .get("case_sensitive")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let matches = if case_sensitive {
        output == expected_str
    } else {
        output.to_lowercase() == expected_str.to_lowercase()
    };

    if matches {
        Verdict::pass("Exact match")
    } else {
        Verdict::fail(format!("Expected \"{expected_str}\", got \"{output}\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn matches_case_sensitively_by_default() {
        let verdict = run("Hello", Some(&json!("Hello")), &json!({}));
        assert!(verdict.passed);
    }

    #[test]
    fn case_sensitive_mismatch_fails() {
        let verdict = run("hello", Some(&json!("Hello")), &json!({}));
        assert!(!verdict.passed);
    }

    #[test]
    fn case_insensitive_flag_folds_case() {
        let verdict = run("hello", Some(&json!("Hello")), &json!({"case_sensitive": false}));
        assert!(verdict.passed);
    }

    #[test]
    fn null_expected_fails() {
        let verdict = run("hello", Some(&Value::Null), &json!({}));
        assert!(!verdict.passed);
        assert_eq!(verdict.score, 0.0);
    }
}
