//! A thin adapter over model providers. Never raises to its caller: every provider fault
//! is captured into the `error` field of the returned response, since the fan-out driver
//! is what decides whether and how to retry.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::entities::{ChatMessage, ModelConfig, Role, Tokens};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Gemini,
}

impl Provider {
    fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
        }
    }
}

/// `model` may carry an explicit `openai/`, `anthropic/`, or `gemini/` prefix; otherwise
/// it is looked up in a small static table, defaulting to `openai`.
pub fn infer_provider(model: &str, explicit: Option<&str>) -> Provider {
    if let Some(explicit) = explicit {
        if let Some(provider) = provider_from_name(explicit) {
            return provider;
        }
    }
    if let Some(rest) = model.strip_prefix("openai/") {
        let _ = rest;
        return Provider::OpenAi;
    }
    if let Some(rest) = model.strip_prefix("anthropic/") {
        let _ = rest;
        return Provider::Anthropic;
    }
    if let Some(rest) = model.strip_prefix("gemini/") {
        let _ = rest;
        return Provider::Gemini;
    }
    match model {
        "claude-3-5-sonnet-20241022"
        | "claude-3-opus-20240229"
        | "claude-3-sonnet-20240229"
        | "claude-3-haiku-20240307" => Provider::Anthropic,
        _ => Provider::OpenAi,
    }
}

fn provider_from_name(name: &str) -> Option<Provider> {
    match name {
        "openai" => Some(Provider::OpenAi),
        "anthropic" => Some(Provider::Anthropic),
        "gemini" | "google" => Some(Provider::Gemini),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub output: String,
    pub model: String,
    pub provider: String,
    pub latency_ms: i64,
    pub tokens: Tokens,
    pub cost_usd: Option<f64>,
    pub error: Option<String>,
}

pub struct ModelInvoker {
    client: Client,
}

impl Default for ModelInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelInvoker {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Single async call to the inferred provider. `timeout` applies per call; a timeout
    /// is captured into `error` identically to any other provider fault.
    #[tracing::instrument(skip_all, fields(model = %config.model))]
    pub async fn invoke(
        &self,
        messages: &[ChatMessage],
        config: &ModelConfig,
        timeout: Duration,
    ) -> InvokeResponse {
        let provider = infer_provider(&config.model, config.provider.as_deref());
        let start = Instant::now();

        let result = tokio::time::timeout(timeout, self.dispatch(provider, messages, config)).await;

        let latency_ms = i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);

        match result {
            Ok(Ok(mut response)) => {
                response.latency_ms = latency_ms;
                response.provider = provider.as_str().to_string();
                response
            }
            Ok(Err(message)) => InvokeResponse {
                output: String::new(),
                model: config.model.clone(),
                provider: provider.as_str().to_string(),
                latency_ms,
                tokens: Tokens {
                    prompt: 0,
                    completion: 0,
                    total: 0,
                },
                cost_usd: None,
                error: Some(message),
            },
            Err(_) => InvokeResponse {
                output: String::new(),
                model: config.model.clone(),
                provider: provider.as_str().to_string(),
                latency_ms,
                tokens: Tokens {
                    prompt: 0,
                    completion: 0,
                    total: 0,
                },
                cost_usd: None,
                error: Some(format!("Timed out after {}ms", timeout.as_millis())),
            },
        }
    }

    async fn dispatch(
        &self,
        provider: Provider,
        messages: &[ChatMessage],
        config: &ModelConfig,
    ) -> Result<InvokeResponse, String> {
        match provider {
            Provider::OpenAi => self.invoke_openai_compatible(
                "https://api.openai.com/v1/chat/completions",
                "OPENAI_API_KEY",
                messages,
                config,
            )
            .await,
            Provider::Gemini => self
                .invoke_openai_compatible(
                    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                    "GEMINI_API_KEY",
                    messages,
                    config,
                )
                .await,
            Provider::Anthropic => self.invoke_anthropic(messages, config).await,
        }
    }

    async fn invoke_openai_compatible(
        &self,
        url: &str,
        api_key_env: &str,
        messages: &[ChatMessage],
        config: &ModelConfig,
    ) -> Result<InvokeResponse, String> {
        let api_key = std::env::var(api_key_env)
            .map_err(|_| format!("Missing environment variable {api_key_env}"))?;

        let mut body = json!({
            "model": config.model,
            "messages": messages.iter().map(message_json).collect::<Vec<_>>(),
            "max_tokens": config.max_tokens.unwrap_or(1024),
        });
        apply_parameter_policy(&mut body, config, false);

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("{status}: {text}"));
        }

        let payload: Value = response.json().await.map_err(|e| e.to_string())?;
        parse_openai_compatible(&payload, &config.model)
    }

    async fn invoke_anthropic(
        &self,
        messages: &[ChatMessage],
        config: &ModelConfig,
    ) -> Result<InvokeResponse, String> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| "Missing environment variable ANTHROPIC_API_KEY".to_string())?;

        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let chat_messages: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(message_json)
            .collect();

        let mut body = json!({
            "model": config.model,
            "messages": chat_messages,
            "max_tokens": config.max_tokens.unwrap_or(1024),
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n"));
        }
        apply_parameter_policy(&mut body, config, true);

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("{status}: {text}"));
        }

        let payload: Value = response.json().await.map_err(|e| e.to_string())?;
        parse_anthropic(&payload, &config.model)
    }
}

fn message_json(message: &ChatMessage) -> Value {
    json!({
        "role": match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        },
        "content": message.content,
    })
}

/// If `reasoning_effort` is set: omit both `temperature` and `top_p`. Otherwise include
/// `temperature`, and include `top_p` only when the provider is not Anthropic and
/// `top_p != 1.0` (Anthropic's API rejects setting both temperature and top_p).
fn apply_parameter_policy(body: &mut Value, config: &ModelConfig, is_anthropic: bool) {
    if let Some(effort) = &config.reasoning_effort {
        body["reasoning_effort"] = json!(effort);
        return;
    }
    body["temperature"] = json!(config.temperature.unwrap_or(0.7));
    if !is_anthropic {
        if let Some(top_p) = config.top_p {
            if (top_p - 1.0).abs() > f64::EPSILON {
                body["top_p"] = json!(top_p);
            }
        }
    }
}

fn parse_openai_compatible(payload: &Value, model: &str) -> Result<InvokeResponse, String> {
    let choice = payload
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| "Response has no choices".to_string())?;
    let message = choice
        .get("message")
        .ok_or_else(|| "Response choice has no message".to_string())?;
    let content = message.get("content").and_then(Value::as_str).unwrap_or("");
    let reasoning = message.get("reasoning_content").and_then(Value::as_str);
    let output = render_output(content, reasoning);

    let tokens = payload
        .get("usage")
        .map(|usage| Tokens {
            prompt: usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
            completion: usage
                .get("completion_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            total: usage.get("total_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        })
        .unwrap_or(Tokens {
            prompt: 0,
            completion: 0,
            total: 0,
        });

    Ok(InvokeResponse {
        output,
        model: model.to_string(),
        provider: String::new(),
        latency_ms: 0,
        tokens,
        cost_usd: None,
        error: None,
    })
}

fn parse_anthropic(payload: &Value, model: &str) -> Result<InvokeResponse, String> {
    let content = payload
        .get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| blocks.iter().find(|b| b.get("type").and_then(Value::as_str) == Some("text")))
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str)
        .unwrap_or("");

    let tokens = payload
        .get("usage")
        .map(|usage| {
            let input = usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
            let output = usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
            Tokens {
                prompt: input,
                completion: output,
                total: input + output,
            }
        })
        .unwrap_or(Tokens {
            prompt: 0,
            completion: 0,
            total: 0,
        });

    Ok(InvokeResponse {
        output: content.to_string(),
        model: model.to_string(),
        provider: String::new(),
        latency_ms: 0,
        tokens,
        cost_usd: None,
        error: None,
    })
}

fn render_output(content: &str, reasoning: Option<&str>) -> String {
    match reasoning {
        Some(reasoning) if !reasoning.is_empty() => {
            format!("<thinking>\n{reasoning}\n</thinking>\n\n{content}")
        }
        _ => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_provider_from_prefix() {
        assert_eq!(infer_provider("openai/gpt-4o", None), Provider::OpenAi);
        assert_eq!(infer_provider("anthropic/claude-3-5-sonnet-20241022", None), Provider::Anthropic);
        assert_eq!(infer_provider("gemini/gemini-1.5-pro", None), Provider::Gemini);
    }

    #[test]
    fn infers_provider_from_static_table() {
        assert_eq!(infer_provider("claude-3-opus-20240229", None), Provider::Anthropic);
    }

    #[test]
    fn defaults_to_openai() {
        assert_eq!(infer_provider("gpt-4o-mini", None), Provider::OpenAi);
    }

    fn config(temperature: Option<f64>, top_p: Option<f64>, reasoning_effort: Option<&str>) -> ModelConfig {
        ModelConfig {
            id: "model_0".to_string(),
            provider: None,
            model: "gpt-4o".to_string(),
            temperature,
            max_tokens: Some(1024),
            top_p,
            reasoning_effort: reasoning_effort.map(ToString::to_string),
        }
    }

    #[test]
    fn reasoning_effort_omits_temperature_and_top_p() {
        let mut body = json!({});
        apply_parameter_policy(&mut body, &config(Some(0.7), Some(0.9), Some("high")), false);
        assert!(body.get("temperature").is_none());
        assert!(body.get("top_p").is_none());
        assert_eq!(body["reasoning_effort"], json!("high"));
    }

    #[test]
    fn anthropic_never_gets_top_p() {
        let mut body = json!({});
        apply_parameter_policy(&mut body, &config(Some(0.7), Some(0.5), None), true);
        assert!(body.get("top_p").is_none());
        assert_eq!(body["temperature"], json!(0.7));
    }

    #[test]
    fn top_p_of_one_is_omitted_even_for_non_anthropic() {
        let mut body = json!({});
        apply_parameter_policy(&mut body, &config(Some(0.7), Some(1.0), None), false);
        assert!(body.get("top_p").is_none());
    }

    #[test]
    fn reasoning_channel_wraps_thinking_block() {
        assert_eq!(
            render_output("final answer", Some("step by step")),
            "<thinking>\nstep by step\n</thinking>\n\nfinal answer"
        );
        assert_eq!(render_output("final answer", None), "final answer");
    }
}
