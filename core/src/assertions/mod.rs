//! Declarative assertion evaluators and their aggregation.
//!
//! Each evaluator is a pure function over `(output, expected, config)`. The duck-typed
//! evaluator registry of the original implementation becomes a closed `AssertionKind`
//! dispatch here; an unrecognized kind is a data value (`AssertionKind::Unknown`), not a
//! missing match arm, so it can produce the documented `passed=false` verdict instead of
//! a panic.

mod contains;
mod exact_match;
mod json_schema;
mod json_valid;
mod length;
mod regex;

use serde_json::Value;

use crate::entities::{Assertion, AssertionVerdict, Grading};

pub struct Verdict {
    pub passed: bool,
    pub score: f64,
    pub reason: String,
}

impl Verdict {
    fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            score: 1.0,
            reason: reason.into(),
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            score: 0.0,
            reason: reason.into(),
        }
    }
}

enum AssertionKind<'a> {
    ExactMatch,
    Contains,
    Regex,
    JsonValid,
    JsonSchema,
    Length,
    Unknown(&'a str),
}

impl<'a> AssertionKind<'a> {
    fn from_str(kind: &'a str) -> Self {
        match kind {
            "exact_match" => AssertionKind::ExactMatch,
            "contains" => AssertionKind::Contains,
            "regex" => AssertionKind::Regex,
            "json_valid" => AssertionKind::JsonValid,
            "json_schema" => AssertionKind::JsonSchema,
            "length" => AssertionKind::Length,
            other => AssertionKind::Unknown(other),
        }
    }
}

/// Runs a single assertion against `output`/`expected`. Never panics: an unrecognized
/// `kind` or a malformed `config` produces a failed verdict with an explanatory reason.
pub fn run_assertion(output: &str, expected: Option<&Value>, assertion: &Assertion) -> Verdict {
    match AssertionKind::from_str(&assertion.kind) {
        AssertionKind::ExactMatch => exact_match::run(output, expected, &assertion.config),
        AssertionKind::Contains => contains::run(output, expected, &assertion.config),
        AssertionKind::Regex => regex::run(output, &assertion.config),
        AssertionKind::JsonValid => json_valid::run(output),
        AssertionKind::JsonSchema => json_schema::run(output, &assertion.config),
        AssertionKind::Length => length::run(output, &assertion.config),
        AssertionKind::Unknown(kind) => Verdict::fail(format!("Unknown assertion type: {kind}")),
    }
}

/// Aggregates the per-assertion verdicts of a single model output into a `Grading`.
///
/// `pass = all passed`, `score = mean(score)`. An empty assertion list is a trivial pass.
pub fn run_assertions(output: &str, expected: Option<&Value>, assertions: &[Assertion]) -> Grading {
    if assertions.is_empty() {
        return Grading::empty_pass();
    }

    let verdicts: Vec<AssertionVerdict> = assertions
        .iter()
        .map(|assertion| {
            let verdict = run_assertion(output, expected, assertion);
            AssertionVerdict {
                kind: assertion.kind.clone(),
                passed: verdict.passed,
                score: verdict.score,
                reason: verdict.reason,
            }
        })
        .collect();

    let total = verdicts.len();
    let failed = verdicts.iter().filter(|v| !v.passed).count();
    let pass = failed == 0;
    #[allow(clippy::cast_precision_loss)]
    let score = verdicts.iter().map(|v| v.score).sum::<f64>() / total as f64;
    let reason = if pass {
        "All assertions passed".to_string()
    } else {
        format!("{failed} of {total} assertions failed")
    };

    Grading {
        pass,
        score,
        reason,
        assertions: verdicts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assertion(kind: &str, config: Value) -> Assertion {
        Assertion {
            kind: kind.to_string(),
            config,
        }
    }

    #[test]
    fn empty_assertions_is_a_trivial_pass() {
        let grading = run_assertions("anything", None, &[]);
        assert!(grading.pass);
        assert_eq!(grading.score, 1.0);
    }

    #[test]
    fn unknown_assertion_type_fails_without_panic() {
        let grading = run_assertions("x", None, &[assertion("nonsense", json!({}))]);
        assert!(!grading.pass);
        assert_eq!(grading.assertions[0].reason, "Unknown assertion type: nonsense");
    }

    #[test]
    fn aggregation_reports_k_of_n_failed() {
        let assertions = vec![
            assertion("contains", json!({"substring": "foo"})),
            assertion("regex", json!({"pattern": "^bar"})),
        ];
        let grading = run_assertions("foo", None, &assertions);
        assert!(!grading.pass);
        assert_eq!(grading.score, 0.5);
        assert_eq!(grading.reason, "1 of 2 assertions failed");
    }
}
