use axum::extract::{rejection::JsonRejection, FromRequest, Json, Request};
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use tracing::instrument;

use crate::error::Error;

/// State for the API: a single Postgres pool shared by every handler.
#[derive(Clone)]
pub struct AppStateData {
    pub pool: PgPool,
}
pub type AppState = axum::extract::State<AppStateData>;

impl AppStateData {
    pub async fn new(database_url: &str) -> Result<Self, Error> {
        let pool = prompt_eval_core::db::connect(database_url).await?;
        Ok(Self { pool })
    }
}

/// Custom Axum extractor that validates the JSON body and deserializes it into a custom type.
///
/// When this extractor is present, we don't check if the `Content-Type` header is
/// `application/json`, and instead simply assume that the request body is a JSON object.
pub struct StructuredJson<T>(pub T);

impl<S, T> FromRequest<S> for StructuredJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: Send + Sync + DeserializeOwned,
{
    type Rejection = Error;

    #[instrument(skip_all, level = "trace", name = "StructuredJson::from_request")]
    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = bytes::Bytes::from_request(req, state)
            .await
            .map_err(|e| Error::JsonRequest {
                message: format!("{} ({})", e, e.status()),
            })?;

        let value = Json::<serde_json::Value>::from_bytes(&bytes)
            .map_err(|e| Error::JsonRequest {
                message: format!("{} ({})", e, e.status()),
            })?
            .0;

        let deserialized: T =
            serde_path_to_error::deserialize(&value).map_err(|e| Error::JsonRequest {
                message: e.to_string(),
            })?;

        Ok(StructuredJson(deserialized))
    }
}
