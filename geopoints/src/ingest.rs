//! ingest.rs
//! Valida la entrada (fichero o texto pegado), la guarda vía `CategoryStore`
//! y dispara el parser externo sin esperar su resultado.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::{GeoError, Result};
use crate::models::types::{Category, StoredFile};
use crate::processor::{spawn_processing, ProcessingTracker, Processor};
use crate::store::CategoryStore;

/// Fichero recibido en la subida legacy multi-fichero
#[derive(Clone, Debug)]
pub struct IncomingFile {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct IngestService {
    store: Arc<CategoryStore>,
    processor: Arc<dyn Processor>,
    tracker: ProcessingTracker,
    max_batch_files: usize,
}

impl IngestService {
    pub fn new(
        store: Arc<CategoryStore>,
        processor: Arc<dyn Processor>,
        tracker: ProcessingTracker,
        max_batch_files: usize,
    ) -> Self {
        Self { store, processor, tracker, max_batch_files }
    }

    pub fn store(&self) -> &Arc<CategoryStore> {
        &self.store
    }

    pub fn tracker(&self) -> &ProcessingTracker {
        &self.tracker
    }

    pub async fn ingest_file(&self, category: Category, filename: Option<&str>, bytes: &[u8]) -> Result<StoredFile> {
        let filename = filename
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| GeoError::Validation("No file uploaded".into()))?;
        if bytes.is_empty() {
            return Err(GeoError::Validation("Uploaded file is empty".into()));
        }

        let stored = self.store.put(category, filename, bytes).await?;
        info!("{category}: guardado {} ({} bytes)", stored.filename, stored.size);
        self.dispatch(Some(category), &stored).await;
        Ok(stored)
    }

    pub async fn ingest_manual(&self, category: Category, text: &str) -> Result<StoredFile> {
        if text.trim().is_empty() {
            return Err(GeoError::Validation("No CSV data provided".into()));
        }

        let filename = manual_filename();
        let stored = self.store.put(category, &filename, text.as_bytes()).await?;
        info!("{category}: CSV manual guardado como {} ({} bytes)", stored.filename, stored.size);
        self.dispatch(Some(category), &stored).await;
        Ok(stored)
    }

    /// Subida legacy: todos los ficheros se validan antes de escribir nada.
    pub async fn ingest_batch(&self, files: Vec<IncomingFile>) -> Result<Vec<StoredFile>> {
        if files.is_empty() {
            return Err(GeoError::Validation("No files uploaded".into()));
        }
        if files.len() > self.max_batch_files {
            return Err(GeoError::Validation(format!(
                "Too many files: {} (max {})",
                files.len(),
                self.max_batch_files
            )));
        }
        let mut checked = Vec::with_capacity(files.len());
        for f in &files {
            let name = f
                .filename
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| GeoError::Validation("File without name".into()))?;
            if f.bytes.is_empty() {
                return Err(GeoError::Validation(format!("Uploaded file is empty: {name}")));
            }
            checked.push((name, f.bytes.as_slice()));
        }

        let mut out = Vec::with_capacity(checked.len());
        for (name, bytes) in checked {
            let stored = self.store.stash(name, bytes).await?;
            self.dispatch(None, &stored).await;
            out.push(stored);
        }
        info!("batch: {} ficheros guardados", out.len());
        Ok(out)
    }

    async fn dispatch(&self, category: Option<Category>, stored: &StoredFile) {
        // fire-and-forget: el handle no se espera
        let _ = spawn_processing(self.processor.clone(), self.tracker.clone(), category, stored.path.clone()).await;
    }
}

/// `manual_<epoch-millis>.csv`
pub fn manual_filename() -> String {
    format!("manual_{}.csv", Utc::now().timestamp_millis())
}
