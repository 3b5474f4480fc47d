//! End-to-end flow against a running gateway process: project hierarchy creation,
//! running an eval, and reading it back through both the authenticated and the
//! share-token surfaces. Requires `DATABASE_URL` to point at a reachable Postgres.

mod common;

use serde_json::{json, Value};

use common::start_gateway_on_random_port;

#[tokio::test]
async fn create_project_through_eval_run_and_share() {
    let gateway = start_gateway_on_random_port().await;
    let client = reqwest::Client::new();
    let base = gateway.base_url();

    let project: Value = client
        .post(format!("{base}/projects"))
        .json(&json!({"name": "flow-test-project"}))
        .send()
        .await
        .expect("create project request")
        .json()
        .await
        .expect("project response body");
    let project_id = project["id"].as_str().expect("project id");

    let use_case: Value = client
        .post(format!("{base}/use-cases"))
        .json(&json!({"project_id": project_id, "name": "flow-test-use-case"}))
        .send()
        .await
        .expect("create use case request")
        .json()
        .await
        .expect("use case response body");
    let use_case_id = use_case["id"].as_str().expect("use case id");

    let prompt: Value = client
        .post(format!("{base}/prompts"))
        .json(&json!({"use_case_id": use_case_id, "name": "flow-test-prompt"}))
        .send()
        .await
        .expect("create prompt request")
        .json()
        .await
        .expect("prompt response body");
    let prompt_id = prompt["id"].as_str().expect("prompt id");

    let version: Value = client
        .post(format!("{base}/prompts/{prompt_id}/versions"))
        .json(&json!({"type": "text", "template_text": "Echo {{x}}."}))
        .send()
        .await
        .expect("create prompt version request")
        .json()
        .await
        .expect("prompt version response body");
    let version_id = version["id"].as_str().expect("version id");
    assert_eq!(version["version_number"], 1);

    let dataset: Value = client
        .post(format!("{base}/datasets"))
        .json(&json!({"use_case_id": use_case_id, "name": "flow-test-dataset"}))
        .send()
        .await
        .expect("create dataset request")
        .json()
        .await
        .expect("dataset response body");
    let dataset_id = dataset["id"].as_str().expect("dataset id");

    for letter in ["A", "B", "C"] {
        let status = client
            .post(format!("{base}/datasets/{dataset_id}/items"))
            .json(&json!({"input": {"x": letter}}))
            .send()
            .await
            .expect("create dataset item request")
            .status();
        assert!(status.is_success(), "dataset item creation failed: {status}");
    }

    let run: Value = client
        .post(format!("{base}/eval-runs"))
        .json(&json!({
            "prompt_version_id": version_id,
            "dataset_id": dataset_id,
            "models": [{"id": "m1", "model": "gpt-4o-mini", "provider": "openai"}],
        }))
        .send()
        .await
        .expect("create eval run request")
        .json()
        .await
        .expect("eval run response body");
    let run_id = run["id"].as_str().expect("run id");
    assert_eq!(run["status"], "pending");

    let fetched: Value = client
        .get(format!("{base}/eval-runs/{run_id}"))
        .send()
        .await
        .expect("get eval run request")
        .json()
        .await
        .expect("get eval run response body");
    assert_eq!(fetched["id"], run["id"]);

    let share: Value = client
        .post(format!("{base}/eval-runs/{run_id}/share"))
        .send()
        .await
        .expect("issue share request")
        .json()
        .await
        .expect("share response body");
    let token = share["share_token"].as_str().expect("share token");
    assert_eq!(token.len(), 22);

    let report = client
        .get(format!("{base}/reports/{token}"))
        .send()
        .await
        .expect("get report request");
    assert!(report.status().is_success());

    let revoke_status = client
        .delete(format!("{base}/eval-runs/{run_id}/share"))
        .send()
        .await
        .expect("revoke share request")
        .status();
    assert!(revoke_status.is_success());

    let after_revoke = client
        .get(format!("{base}/reports/{token}"))
        .send()
        .await
        .expect("get report after revoke request");
    assert_eq!(after_revoke.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_rejects_from_terminal_status() {
    // A run that was never created returns 404, not a cancellation conflict — cancel only
    // ever rejects a run that exists but is already terminal.
    let gateway = start_gateway_on_random_port().await;
    let client = reqwest::Client::new();
    let missing_id = uuid::Uuid::now_v7();

    let response = client
        .post(format!("{}/eval-runs/{missing_id}/cancel", gateway.base_url()))
        .send()
        .await
        .expect("cancel request");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
