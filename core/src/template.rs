//! Variable extraction and substitution for `{{name}}` style templates.
//!
//! Substitution is a single regex pass over the original template text: a replacement
//! value that itself contains `{{...}}` is never re-expanded, unlike a sequential
//! `str.replace` loop over each variable in turn.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::{ChatMessage, PromptVersionType, Role};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("static pattern is valid"));

/// Extracts the deduplicated set of variable names referenced by `template`.
pub fn extract_variables(template: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// `missing = required - keys(provided)`. Extra provided keys are allowed.
pub fn validate(
    required: &BTreeSet<String>,
    provided: &HashMap<String, Value>,
) -> (bool, Vec<String>) {
    let mut missing: Vec<String> = required
        .iter()
        .filter(|name| !provided.contains_key(*name))
        .cloned()
        .collect();
    missing.sort();
    (missing.is_empty(), missing)
}

/// Renders a JSON value the way a missing-type-annotation template variable should render:
/// scalars as their plain string form, everything else as canonical JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Substitutes every `{{name}}` occurrence in `template` with the rendered form of
/// `vars[name]`, in a single pass over the original text.
pub fn compile(template: &str, vars: &HashMap<String, Value>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            vars.get(name)
                .map(render_value)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub fn compile_messages(messages: &[ChatMessage], vars: &HashMap<String, Value>) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|m| ChatMessage {
            role: m.role,
            content: compile(&m.content, vars),
        })
        .collect()
}

fn extract_variables_messages(messages: &[ChatMessage]) -> BTreeSet<String> {
    let mut vars = BTreeSet::new();
    for message in messages {
        vars.extend(extract_variables(&message.content));
    }
    vars
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompiledKind {
    Text,
    Chat,
}

/// The response shape of a template dry run: no side effect, no model quota consumed.
#[derive(Debug, Clone, Serialize)]
pub struct DryRunResult {
    #[serde(rename = "type")]
    pub kind: CompiledKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiled_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiled_messages: Option<Vec<ChatMessage>>,
    pub required_variables: Vec<String>,
    pub provided_variables: Vec<String>,
    pub missing_variables: Vec<String>,
    pub is_valid: bool,
}

pub fn dry_run(
    kind: PromptVersionType,
    template_text: Option<&str>,
    template_messages: Option<&[ChatMessage]>,
    vars: &HashMap<String, Value>,
) -> DryRunResult {
    let required = match kind {
        PromptVersionType::Text => extract_variables(template_text.unwrap_or_default()),
        PromptVersionType::Chat => extract_variables_messages(template_messages.unwrap_or_default()),
    };
    let (is_valid, missing_variables) = validate(&required, vars);

    let (compiled_text, compiled_messages) = if is_valid {
        match kind {
            PromptVersionType::Text => (
                template_text.map(|t| compile(t, vars)),
                None,
            ),
            PromptVersionType::Chat => (
                None,
                template_messages.map(|m| compile_messages(m, vars)),
            ),
        }
    } else {
        (None, None)
    };

    DryRunResult {
        kind: match kind {
            PromptVersionType::Text => CompiledKind::Text,
            PromptVersionType::Chat => CompiledKind::Chat,
        },
        compiled_text,
        compiled_messages,
        required_variables: required.into_iter().collect(),
        provided_variables: vars.keys().cloned().collect(),
        missing_variables,
        is_valid,
    }
}

/// Builds the final message list sent to the model invoker for a given template type.
pub fn build_messages(
    kind: PromptVersionType,
    template_text: Option<&str>,
    template_messages: Option<&[ChatMessage]>,
    vars: &HashMap<String, Value>,
) -> Vec<ChatMessage> {
    match kind {
        PromptVersionType::Text => vec![ChatMessage {
            role: Role::User,
            content: compile(template_text.unwrap_or_default(), vars),
        }],
        PromptVersionType::Chat => compile_messages(template_messages.unwrap_or_default(), vars),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn extracts_deduplicated_variables() {
        let found = extract_variables("Hello {{name}}, your id is {{id}} ({{name}} again)");
        assert_eq!(found.len(), 2);
        assert!(found.contains("name"));
        assert!(found.contains("id"));
    }

    #[test]
    fn validate_reports_missing_keys_only() {
        let required = extract_variables("{{x}} and {{y}}");
        let provided = vars(&[("x", json!("A")), ("z", json!("extra"))]);
        let (ok, missing) = validate(&required, &provided);
        assert!(!ok);
        assert_eq!(missing, vec!["y".to_string()]);
    }

    #[test]
    fn compile_substitutes_scalars() {
        let provided = vars(&[("x", json!("A")), ("n", json!(3))]);
        assert_eq!(compile("Echo {{x}} x{{n}}", &provided), "Echo A x3");
    }

    #[test]
    fn compile_is_single_pass_over_original_template() {
        // A replacement value containing `{{...}}` must not be re-expanded.
        let provided = vars(&[
            ("a", json!("{{b}}")),
            ("b", json!("should-not-appear")),
        ]);
        assert_eq!(compile("{{a}}", &provided), "{{b}}");
    }

    #[test]
    fn compile_renders_non_scalars_as_json() {
        let provided = vars(&[("obj", json!({"k": "v"}))]);
        assert_eq!(compile("{{obj}}", &provided), r#"{"k":"v"}"#);
    }

    #[test]
    fn dry_run_omits_compiled_field_when_invalid() {
        let provided = vars(&[]);
        let result = dry_run(PromptVersionType::Text, Some("{{x}}"), None, &provided);
        assert!(!result.is_valid);
        assert!(result.compiled_text.is_none());
        assert_eq!(result.missing_variables, vec!["x".to_string()]);
    }
}
