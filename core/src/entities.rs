//! Typed row shapes shared by the gateway and worker binaries.
//!
//! Columns that are genuinely open-ended (`models`, `assertions`, `model_config`) keep a
//! `serde_json::Value` escape hatch; columns with a closed shape (`progress`, `summary`,
//! `grading`, `metrics`) are modelled as structs per the design notes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PromptVersionType {
    Text,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Production,
    Beta,
    Alpha,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Production => "production",
            Label::Beta => "beta",
            Label::Alpha => "alpha",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefaults {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
}

/// One entry of `EvalRun.models`. `id` is assigned by the scheduler at creation time
/// (`model_{index}`) when the caller omits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub provider: Option<String>,
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub reasoning_effort: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EvalRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl EvalRunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EvalRunStatus::Completed | EvalRunStatus::Failed | EvalRunStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Progress {
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    pub percent: i64,
}

impl Progress {
    pub fn new(total: i64) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            percent: 0,
        }
    }

    pub fn recompute_percent(&mut self) {
        self.percent = if self.total > 0 {
            (100 * (self.completed + self.failed)) / self.total
        } else {
            0
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Summary {
    pub total: i64,
    pub passed: i64,
    pub failed: i64,
    pub pass_rate: f64,
    pub avg_score: f64,
    pub total_latency_ms: i64,
    pub avg_latency_ms: f64,
    pub total_cost_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionVerdict {
    #[serde(rename = "type")]
    pub kind: String,
    pub passed: bool,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grading {
    pub pass: bool,
    pub score: f64,
    pub reason: String,
    pub assertions: Vec<AssertionVerdict>,
}

impl Grading {
    pub fn empty_pass() -> Self {
        Self {
            pass: true,
            score: 1.0,
            reason: "All assertions passed".to_string(),
            assertions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tokens {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub latency_ms: i64,
    pub tokens: Tokens,
    pub cost_usd: Option<f64>,
    pub retries: i32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledRequest {
    pub messages: Vec<ChatMessage>,
    pub variables: serde_json::Value,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UseCase {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Prompt {
    pub id: Uuid,
    pub use_case_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PromptVersion {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub version_number: i32,
    #[sqlx(rename = "type")]
    pub kind: PromptVersionType,
    pub template_text: Option<String>,
    pub template_messages: Option<serde_json::Value>,
    pub model_defaults: Option<serde_json::Value>,
    pub labels: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Dataset {
    pub id: Uuid,
    pub use_case_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DatasetItem {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub input: serde_json::Value,
    pub expected_output: Option<serde_json::Value>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EvalRun {
    pub id: Uuid,
    pub name: Option<String>,
    pub prompt_version_id: Uuid,
    pub dataset_id: Uuid,
    pub models: serde_json::Value,
    pub assertions: serde_json::Value,
    pub status: EvalRunStatus,
    pub progress: serde_json::Value,
    pub summary: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub share_token: Option<String>,
    pub share_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl EvalRun {
    pub fn models_typed(&self) -> Result<Vec<ModelConfig>, serde_json::Error> {
        serde_json::from_value(self.models.clone())
    }

    pub fn assertions_typed(&self) -> Result<Vec<Assertion>, serde_json::Error> {
        serde_json::from_value(self.assertions.clone())
    }

    pub fn progress_typed(&self) -> Progress {
        serde_json::from_value(self.progress.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EvalResult {
    pub id: Uuid,
    pub eval_run_id: Uuid,
    pub dataset_item_id: Uuid,
    pub model_id: String,
    pub model_config: serde_json::Value,
    pub request: serde_json::Value,
    pub output: Option<String>,
    pub grading: serde_json::Value,
    pub metrics: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaygroundSubResult {
    pub model_id: String,
    pub output: Option<String>,
    pub metrics: serde_json::Value,
    pub error: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PlaygroundRun {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub version_id: Option<Uuid>,
    pub config: serde_json::Value,
    pub results: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
