//! main.rs — Servidor de subida de puntos (your_points / option_points)

use std::{env, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use geopoints::{
    ingest::IngestService,
    matcher::Matcher,
    models::types::{split_cmd, AppCfg},
    processor::{CommandProcessor, ProcessingTracker},
    server::api::{router, ApiState},
    store::CategoryStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs (RUST_LOG manda si está definido)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = app_cfg_from_env();

    // Slots en disco
    let store = Arc::new(CategoryStore::new(&cfg.uploads_dir));
    store
        .ensure_layout()
        .await
        .with_context(|| format!("creando directorios en {}", cfg.uploads_dir.display()))?;

    let processor = CommandProcessor::new(&cfg.processor_cmd).context("PROCESSOR_CMD vacío")?;
    info!("Parser externo: {}", cfg.processor_cmd.join(" "));

    let ingest = IngestService::new(
        store.clone(),
        Arc::new(processor),
        ProcessingTracker::default(),
        cfg.max_batch_files,
    );
    let matcher = Arc::new(Matcher::new(cfg.matcher_cmd.clone(), &cfg.uploads_dir));

    // API
    let app = router(ApiState {
        ingest,
        matcher,
        web_dir: cfg.web_dir.clone(),
        max_upload_bytes: cfg.max_upload_bytes,
    });
    info!("Escuchando en http://{}", cfg.bind);
    let listener = tokio::net::TcpListener::bind(&cfg.bind)
        .await
        .with_context(|| format!("bind {}", cfg.bind))?;
    let serve = axum::serve(listener, app);
    tokio::select! {
        r = serve => { r?; },
        _ = signal::ctrl_c() => { info!("Señal de salida recibida"); }
    }

    Ok(())
}

fn app_cfg_from_env() -> AppCfg {
    let mut c = AppCfg::default();
    if let Ok(v) = env::var("BIND") { c.bind = v; }
    if let Ok(v) = env::var("UPLOADS_DIR") { c.uploads_dir = PathBuf::from(v); }
    if let Ok(v) = env::var("WEB_DIR") { c.web_dir = PathBuf::from(v); }
    if let Ok(v) = env::var("PROCESSOR_CMD") { c.processor_cmd = split_cmd(&v); }
    if let Ok(v) = env::var("MATCHER_CMD") { c.matcher_cmd = split_cmd(&v); }
    if let Ok(v) = env::var("MAX_BATCH_FILES") { c.max_batch_files = v.parse().unwrap_or(c.max_batch_files); }
    if let Ok(v) = env::var("MAX_UPLOAD_BYTES") { c.max_upload_bytes = v.parse().unwrap_or(c.max_upload_bytes); }
    c
}
