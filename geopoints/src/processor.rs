//! processor.rs
//! Colaborador externo: parser CSV invocado como `<programa> <args..> <ruta>`.
//! El resultado solo se registra (logs + estado por categoría), nunca vuelve
//! al cliente que subió el fichero.

use std::{
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::{process::Command, sync::RwLock};
use tracing::{info, warn};

use crate::error::{GeoError, Result};
use crate::models::types::{Category, ProcessingRun, ProcessingState, RunState};

/// Máximo de salida guardada en el estado
const MAX_OUTPUT_CHARS: usize = 4096;

#[derive(Clone, Debug, Default)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// stdout, o stderr si stdout viene vacío
    pub fn summary(&self) -> &str {
        if self.stdout.trim().is_empty() { &self.stderr } else { &self.stdout }
    }
}

#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, path: &Path) -> Result<ProcessOutput>;
}

/// Lanza el comando configurado y espera su salida.
#[derive(Clone, Debug)]
pub struct CommandProcessor {
    program: String,
    args: Vec<String>,
}

impl CommandProcessor {
    pub fn new(cmd: &[String]) -> Result<Self> {
        let (program, args) = cmd
            .split_first()
            .ok_or_else(|| GeoError::Processing("empty processor command".into()))?;
        Ok(Self { program: program.clone(), args: args.to_vec() })
    }
}

#[async_trait]
impl Processor for CommandProcessor {
    async fn process(&self, path: &Path) -> Result<ProcessOutput> {
        let out = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .output()
            .await
            .map_err(|e| GeoError::Processing(format!("spawn {}: {e}", self.program)))?;

        let po = ProcessOutput {
            exit_code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        };
        if !out.status.success() {
            return Err(GeoError::ProcessExit {
                program: self.program.clone(),
                code: po.exit_code,
                output: po.summary().to_string(),
            });
        }
        Ok(po)
    }
}

/// Estado de la última ejecución por categoría (para `/status`)
#[derive(Clone, Default)]
pub struct ProcessingTracker {
    state: Arc<RwLock<ProcessingState>>,
    seq: Arc<AtomicU64>,
}

impl ProcessingTracker {
    pub async fn snapshot(&self) -> ProcessingState {
        self.state.read().await.clone()
    }

    async fn start(&self, category: Category, path: &Path) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let mut s = self.state.write().await;
        *s.slot_mut(category) = Some(ProcessingRun {
            seq,
            path: path.to_path_buf(),
            state: RunState::Pending,
            exit_code: None,
            output: String::new(),
            started_at: Utc::now(),
            finished_at: None,
        });
        seq
    }

    async fn finish(&self, category: Category, seq: u64, result: &Result<ProcessOutput>) {
        let mut s = self.state.write().await;
        // Si ya hay otra ejecución más nueva para la categoría, no la pisamos
        let Some(run) = s.slot_mut(category).as_mut().filter(|r| r.seq == seq) else {
            return;
        };
        run.finished_at = Some(Utc::now());
        match result {
            Ok(out) => {
                run.state = RunState::Succeeded;
                run.exit_code = out.exit_code;
                run.output = truncate(out.summary());
            }
            Err(GeoError::ProcessExit { code, output, .. }) => {
                run.state = RunState::Failed;
                run.exit_code = *code;
                run.output = truncate(output);
            }
            Err(e) => {
                run.state = RunState::Failed;
                run.output = truncate(&e.to_string());
            }
        }
    }
}

/// Marca la ejecución como pendiente y lanza el procesado en segundo plano.
/// El handle solo interesa a los tests.
pub async fn spawn_processing(
    processor: Arc<dyn Processor>,
    tracker: ProcessingTracker,
    category: Option<Category>,
    path: std::path::PathBuf,
) -> tokio::task::JoinHandle<()> {
    let run = match category {
        Some(c) => Some((c, tracker.start(c, &path).await)),
        None => None,
    };
    tokio::spawn(async move {
        info!("🔄 Ejecutando parser sobre: {}", path.display());
        let result = processor.process(&path).await;
        match &result {
            Ok(out) => info!("✅ Parser OK ({}):\n{}", path.display(), out.summary().trim_end()),
            Err(e) => warn!("❌ Parser falló ({}): {e}", path.display()),
        }

        if let Some((c, seq)) = run {
            tracker.finish(c, seq, &result).await;
        }
    })
}

fn truncate(s: &str) -> String {
    s.chars().take(MAX_OUTPUT_CHARS).collect()
}
