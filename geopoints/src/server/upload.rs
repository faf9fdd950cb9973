//! upload.rs — Handlers de subida: multipart por categoría, texto pegado y legacy multi-fichero

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        Multipart, Path, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::GeoError;
use crate::ingest::IncomingFile;
use crate::models::types::{BatchEntry, Category};

use super::api::ApiState;

const FILE_FIELD: &str = "csvFile";
const BATCH_FIELDS: [&str; 2] = ["csvFiles", "csvFiles[]"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualUpload {
    #[serde(default)]
    pub csv_data: Option<String>,
}

fn no_file() -> GeoError {
    GeoError::Validation("No file uploaded".into())
}

fn too_large() -> GeoError {
    GeoError::TooLarge("Upload exceeds the size limit".into())
}

fn bad_multipart(e: MultipartError) -> GeoError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return too_large();
    }
    GeoError::Validation(e.body_text())
}

/// POST /upload/{category} — campo `csvFile`
pub async fn upload_category(
    State(st): State<ApiState>,
    Path(category): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, GeoError> {
    let category: Category = category.parse()?;
    let mut multipart = multipart.map_err(|_| no_file())?;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(bad_multipart)?;
        let file = st.ingest.ingest_file(category, filename.as_deref(), &bytes).await?;
        return Ok(Json(json!({
            "message": format!("{} uploaded and processed successfully", category.label()),
            "file": file,
        })));
    }
    Err(no_file())
}

/// POST /uploadManual/{category} — JSON `{csvData}`
pub async fn upload_manual(
    State(st): State<ApiState>,
    Path(category): Path<String>,
    body: Result<Json<ManualUpload>, JsonRejection>,
) -> Result<Json<Value>, GeoError> {
    let category: Category = category.parse()?;
    // Cuerpo ausente o JSON inválido cuenta como "sin datos"
    let text = match body {
        Ok(Json(b)) => b.csv_data.unwrap_or_default(),
        Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => return Err(too_large()),
        Err(_) => String::new(),
    };

    let file = st.ingest.ingest_manual(category, &text).await?;
    Ok(Json(json!({
        "message": format!("{category} CSV data saved and processed successfully"),
        "file": file,
    })))
}

/// POST /upload — legacy, campo `csvFiles` (o `csvFiles[]`), varios ficheros
pub async fn upload_batch(
    State(st): State<ApiState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, GeoError> {
    let mut multipart = multipart.map_err(|_| GeoError::Validation("No files uploaded".into()))?;

    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if !field.name().is_some_and(|n| BATCH_FIELDS.contains(&n)) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(bad_multipart)?;
        files.push(IncomingFile { filename, bytes: bytes.to_vec() });
    }

    let stored = st.ingest.ingest_batch(files).await?;
    let entries: Vec<BatchEntry> = stored.iter().map(BatchEntry::from).collect();
    Ok(Json(json!({
        "message": "Files uploaded successfully",
        "files": entries,
    })))
}
