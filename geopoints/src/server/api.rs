//! api.rs — Rutas HTTP: subidas por categoría, listado, limpieza, matching y estado

use std::{path::PathBuf, sync::Arc};

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, services::ServeDir};
use tracing::{error, info, warn};

use crate::error::GeoError;
use crate::ingest::IngestService;
use crate::matcher::{Matcher, MATCHED_FILE};
use crate::models::types::{Category, ProcessingState, StoredFile};

use super::upload::{upload_batch, upload_category, upload_manual};

#[derive(Clone)]
pub struct ApiState {
    pub ingest: IngestService,
    pub matcher: Arc<Matcher>,
    pub web_dir: PathBuf,
    pub max_upload_bytes: usize,
}

pub fn router(state: ApiState) -> Router {
    let web = ServeDir::new(&state.web_dir);
    let limit = state.max_upload_bytes;

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/upload", post(upload_batch))
        .route("/upload/{category}", post(upload_category))
        .route("/uploadManual/{category}", post(upload_manual))
        .route("/uploads", get(list_uploads))
        .route("/clearUploads/{category}", delete(clear_uploads))
        .route("/matchPoints", post(match_points))
        .route("/downloads/{name}", get(download))
        .route("/status", get(processing_status))
        .fallback_service(web)
        .with_state(state)
        .layer(DefaultBodyLimit::max(limit))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
}

impl IntoResponse for GeoError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            GeoError::Validation(m) => (StatusCode::BAD_REQUEST, m),
            GeoError::TooLarge(m) => (StatusCode::PAYLOAD_TOO_LARGE, m),
            GeoError::Storage(e) => {
                error!("storage: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage failure".to_string())
            }
            GeoError::Processing(m) => {
                warn!("processing: {m}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Processing failed".to_string())
            }
            e @ GeoError::ProcessExit { .. } => {
                warn!("processing: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Processing failed".to_string())
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

/// Contenido actual de ambos slots (`null` si vacío)
#[derive(Serialize)]
struct UploadsView {
    your_points: Option<StoredFile>,
    option_points: Option<StoredFile>,
}

async fn list_uploads(State(st): State<ApiState>) -> Result<Json<UploadsView>, GeoError> {
    let store = st.ingest.store();
    Ok(Json(UploadsView {
        your_points: store.current(Category::YourPoints).await?,
        option_points: store.current(Category::OptionPoints).await?,
    }))
}

async fn clear_uploads(
    State(st): State<ApiState>,
    Path(category): Path<String>,
) -> Result<Json<serde_json::Value>, GeoError> {
    let category: Category = category.parse()?;
    let n = st.ingest.store().clear(category).await?;
    info!("{category}: limpiado ({n} ficheros)");
    Ok(Json(json!({ "message": format!("Cleared all files in {category}") })))
}

async fn match_points(State(st): State<ApiState>) -> Result<Json<serde_json::Value>, GeoError> {
    st.matcher.run(st.ingest.store()).await?;
    Ok(Json(json!({
        "message": "Points matched successfully",
        "downloadUrl": format!("/downloads/{MATCHED_FILE}"),
    })))
}

/// Solo se sirve el CSV de matching; cualquier otro nombre es 404.
async fn download(State(st): State<ApiState>, Path(name): Path<String>) -> Result<Response, GeoError> {
    if name != MATCHED_FILE {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }
    let body = match tokio::fs::read(st.matcher.output()).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StatusCode::NOT_FOUND.into_response()),
        Err(e) => return Err(e.into()),
    };
    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{MATCHED_FILE}\"")),
        ],
        body,
    )
        .into_response())
}

async fn processing_status(State(st): State<ApiState>) -> Json<ProcessingState> {
    Json(st.ingest.tracker().snapshot().await)
}
