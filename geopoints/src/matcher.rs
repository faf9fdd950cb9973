//! matcher.rs
//! `/matchPoints`: empareja los dos CSV actuales con un comando externo
//! `<matcher> <your_points> <option_points> <salida>`. El algoritmo vive fuera.
//! A diferencia del parser, aquí sí se espera el resultado.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{GeoError, Result};
use crate::models::types::Category;
use crate::store::CategoryStore;

pub const MATCHED_FILE: &str = "matched_pairs.csv";

#[derive(Clone, Debug)]
pub struct Matcher {
    cmd: Vec<String>,
    output: PathBuf,
}

impl Matcher {
    pub fn new(cmd: Vec<String>, uploads_dir: &Path) -> Self {
        Self { cmd, output: uploads_dir.join(MATCHED_FILE) }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Lanza el matcher sobre los slots actuales y devuelve la ruta del CSV generado.
    /// Los slots quedan bloqueados hasta que el comando termina; eso también
    /// serializa dos matchings que compartirían la misma salida.
    pub async fn run(&self, store: &CategoryStore) -> Result<PathBuf> {
        let _slots = store.lock_slots().await;
        let mut inputs = Vec::with_capacity(2);
        for c in Category::ALL {
            let f = store
                .current(c)
                .await?
                .ok_or_else(|| GeoError::Validation(format!("No {} file uploaded", c.as_str())))?;
            inputs.push(f.path);
        }

        let (program, args) = self
            .cmd
            .split_first()
            .ok_or_else(|| GeoError::Processing("empty matcher command".into()))?;

        // Sin restos de un matching anterior
        match tokio::fs::remove_file(&self.output).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        info!("🧮 Matching {} ↔ {}", inputs[0].display(), inputs[1].display());
        let out = Command::new(program)
            .args(args)
            .args(&inputs)
            .arg(&self.output)
            .output()
            .await
            .map_err(|e| GeoError::Processing(format!("spawn {program}: {e}")))?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            warn!("matcher falló ({:?}): {stderr}", out.status.code());
            return Err(GeoError::ProcessExit { program: program.clone(), code: out.status.code(), output: stderr });
        }
        if !tokio::fs::try_exists(&self.output).await? {
            return Err(GeoError::Processing(format!("{program} produced no output")));
        }

        info!("Matched pairs guardados en {}", self.output.display());
        Ok(self.output.clone())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::{
        sync::Arc,
        time::{Duration, Instant},
    };

    fn concat_cmd() -> Vec<String> {
        ["sh", "-c", "cat \"$1\" \"$2\" > \"$3\"", "sh"].map(String::from).to_vec()
    }

    #[tokio::test]
    async fn needs_both_slots() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CategoryStore::new(tmp.path());
        store.put(Category::YourPoints, "a.csv", b"lat,lng\n1,2\n").await.unwrap();

        let err = Matcher::new(concat_cmd(), tmp.path()).run(&store).await.unwrap_err();
        assert!(matches!(err, GeoError::Validation(ref m) if m.contains("option_points")));
    }

    #[tokio::test]
    async fn passes_inputs_and_output_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CategoryStore::new(tmp.path());
        store.put(Category::YourPoints, "a.csv", b"mine\n").await.unwrap();
        store.put(Category::OptionPoints, "b.csv", b"theirs\n").await.unwrap();

        let m = Matcher::new(concat_cmd(), tmp.path());
        let out = m.run(&store).await.unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "mine\ntheirs\n");
    }

    #[tokio::test]
    async fn failing_matcher_is_processing_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CategoryStore::new(tmp.path());
        store.put(Category::YourPoints, "a.csv", b"1").await.unwrap();
        store.put(Category::OptionPoints, "b.csv", b"2").await.unwrap();

        let err = Matcher::new(vec!["false".into()], tmp.path()).run(&store).await.unwrap_err();
        assert!(matches!(err, GeoError::ProcessExit { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn upload_waits_for_running_match() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(CategoryStore::new(tmp.path()));
        store.put(Category::YourPoints, "old.csv", b"old\n").await.unwrap();
        store.put(Category::OptionPoints, "b.csv", b"theirs\n").await.unwrap();

        let slow = ["sh", "-c", "sleep 0.3; cat \"$1\" \"$2\" > \"$3\"", "sh"].map(String::from).to_vec();
        let m = Matcher::new(slow, tmp.path());
        let matching = {
            let store = store.clone();
            tokio::spawn(async move { m.run(&store).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        let started = Instant::now();
        store.put(Category::YourPoints, "new.csv", b"new\n").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));

        let out = matching.await.unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "old\ntheirs\n");
        let current = store.current(Category::YourPoints).await.unwrap().unwrap();
        assert_eq!(current.filename, "new.csv");
    }
}
