use super::Verdict;

pub(super) fn run(output: &str) -> Verdict {
    match serde_json::from_str::<serde_json::Value>(output) {
        Ok(_) => Verdict::pass("Output is valid JSON"),
        Err(err) => Verdict::fail(format!("Output is not valid JSON: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_json_passes() {
        assert!(run(r#"{"a": 1}"#).passed);
    }

    #[test]
    fn invalid_json_fails() {
        assert!(!run("{not json").passed);
    }
}
