//! HTTP route table (§6, §10.1). Kept as a single flat module aggregating one file per
//! resource family, the way the teacher groups its own endpoint handlers.

pub mod crud;
pub mod eval_runs;
pub mod exports;
pub mod playground;
pub mod share;

use axum::routing::{get, post};
use axum::Router;

use crate::gateway_util::AppStateData;

pub fn router() -> Router<AppStateData> {
    Router::new()
        .route("/projects", post(crud::create_project).get(crud::list_projects))
        .route("/projects/{id}", get(crud::get_project))
        .route("/use-cases", post(crud::create_use_case).get(crud::list_use_cases))
        .route("/use-cases/{id}", get(crud::get_use_case))
        .route("/prompts", post(crud::create_prompt).get(crud::list_prompts))
        .route("/prompts/{id}", get(crud::get_prompt))
        .route(
            "/prompts/{id}/versions",
            post(crud::create_prompt_version).get(crud::list_prompt_versions),
        )
        .route("/prompt-versions/{id}", get(crud::get_prompt_version))
        .route("/prompt-versions/{id}/label", post(crud::promote_label))
        .route("/datasets", post(crud::create_dataset).get(crud::list_datasets))
        .route("/datasets/{id}", get(crud::get_dataset))
        .route(
            "/datasets/{id}/items",
            post(crud::create_dataset_item).get(crud::list_dataset_items),
        )
        .route("/eval-runs", post(eval_runs::create).get(eval_runs::list))
        .route("/eval-runs/{id}", get(eval_runs::get))
        .route("/eval-runs/{id}/cancel", post(eval_runs::cancel))
        .route("/eval-runs/{id}/results", get(eval_runs::results))
        .route("/eval-runs/{id}/share", post(share::issue).delete(share::revoke))
        .route("/eval-runs/{id}/export.json", get(exports::export_json))
        .route("/eval-runs/{id}/export.md", get(exports::export_markdown))
        .route("/reports/{token}", get(share::get_report))
        .route("/reports/{token}/results", get(share::get_report_results))
        .route("/playground/compile", post(playground::compile))
        .route("/playground/run", post(playground::run))
        .route("/playground/run-version/{id}", post(playground::run_version))
        .route("/playground/run-multi", post(playground::run_multi))
        .route("/playground/run-versions", post(playground::run_versions))
}
