use serde_json::Value;

use super::Verdict;

pub(super) fn run(output: &str, expected: Option<&Value>, config: &Value) -> Verdict {
    let substring = config
        .get("substring")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .or_else(|| expected.and_then(Value::as_str).map(ToString::to_string));

    let Some(substring) = substring else {
        return Verdict::fail("No substring to search for (missing config.substring and expected)");
    };

    let case_sensitive = config
        .get("case_sensitive")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let found = if case_sensitive {
        output.contains(&substring)
    } else {
        output.to_lowercase().contains(&substring.to_lowercase())
    };

    if found {
        Verdict::pass(format!("Output contains \"{substring}\""))
    } else {
        Verdict::fail(format!("Output does not contain \"{substring}\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn passes_when_substring_present() {
        let verdict = run("hello world", None, &json!({"substring": "world"}));
        assert!(verdict.passed);
    }

    #[test]
    fn falls_back_to_expected_output() {
        let verdict = run("hello world", Some(&json!("world")), &json!({}));
        assert!(verdict.passed);
    }

    #[test]
    fn case_insensitive_search() {
        let verdict = run("HELLO", None, &json!({"substring": "hello", "case_sensitive": false}));
        assert!(verdict.passed);
    }
}
