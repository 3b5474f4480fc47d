use regex::RegexBuilder;
use serde_json::Value;

use super::Verdict;

/// An invalid pattern is a failed assertion with an explanatory reason, never a hard error.
pub(super) fn run(output: &str, config: &Value) -> Verdict {
    let Some(pattern) = config.get("pattern").and_then(Value::as_str) else {
        return Verdict::fail("No pattern provided (missing config.pattern)");
    };

    let case_sensitive = config
        .get("case_sensitive")
        .and_then(Value::as_bool)
        .unwrap_or(true);

    let compiled = RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build();

    match compiled {
        Ok(re) => {
            if re.is_match(output) {
                Verdict::pass(format!("Output matches pattern \"{pattern}\""))
            } else {
                Verdict::fail(format!("Output does not match pattern \"{pattern}\""))
            }
        }
        Err(err) => Verdict::fail(format!("Invalid regex pattern \"{pattern}\": {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn matches_pattern() {
        let verdict = run("hello123", &json!({"pattern": r"\d+"}));
        assert!(verdict.passed);
    }

    #[test]
    fn invalid_pattern_fails_without_panic() {
        let verdict = run("hello", &json!({"pattern": "("}));
        assert!(!verdict.passed);
        assert!(verdict.reason.contains("Invalid regex pattern"));
    }

    #[test]
    fn case_insensitive_flag() {
        let verdict = run("HELLO", &json!({"pattern": "^hello$", "case_sensitive": false}));
        assert!(verdict.passed);
    }
}
