use serde_json::Value;

use super::Verdict;

/// Parse failure short-circuits before the schema check runs.
pub(super) fn run(output: &str, config: &Value) -> Verdict {
    let parsed = match serde_json::from_str::<Value>(output) {
        Ok(value) => value,
        Err(err) => return Verdict::fail(format!("Output is not valid JSON: {err}")),
    };

    let Some(schema) = config.get("schema") else {
        return Verdict::fail("No schema provided (missing config.schema)");
    };

    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(err) => return Verdict::fail(format!("Invalid JSON schema: {err}")),
    };

    let errors: Vec<String> = validator
        .iter_errors(&parsed)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Verdict::pass("Output validates against schema")
    } else {
        Verdict::fail(format!("Schema validation failed: {}", errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_payload_passes() {
        let schema = json!({"type": "object", "properties": {"foo": {"type": "string"}}, "required": ["foo"]});
        let verdict = run(r#"{"foo": "bar"}"#, &json!({"schema": schema}));
        assert!(verdict.passed);
    }

    #[test]
    fn schema_mismatch_fails() {
        let schema = json!({"type": "object", "properties": {"foo": {"type": "string"}}, "required": ["foo"]});
        let verdict = run(r#"{"foo": 1}"#, &json!({"schema": schema}));
        assert!(!verdict.passed);
    }

    #[test]
    fn malformed_json_short_circuits_before_schema_check() {
        let schema = json!({"type": "object"});
        let verdict = run("not json", &json!({"schema": schema}));
        assert!(!verdict.passed);
        assert!(verdict.reason.contains("not valid JSON"));
    }
}
