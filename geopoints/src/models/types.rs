//! types.rs
//! Modelos de datos compartidos por el servicio: categorías de subida,
//! descriptor del fichero guardado, estado del procesado y configuración

use std::{fmt, path::PathBuf, str::FromStr};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::GeoError;

/// Cubo de subida. Cada categoría tiene su propio slot (directorio) en disco.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    YourPoints,
    OptionPoints,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::YourPoints, Category::OptionPoints];

    /// Nombre en la ruta HTTP y en disco
    pub fn as_str(self) -> &'static str {
        match self {
            Category::YourPoints => "your_points",
            Category::OptionPoints => "option_points",
        }
    }

    /// Índice estable para los arrays por categoría (locks, estado)
    pub fn index(self) -> usize {
        match self {
            Category::YourPoints => 0,
            Category::OptionPoints => 1,
        }
    }

    /// Etiqueta para los mensajes de respuesta
    pub fn label(self) -> &'static str {
        match self {
            Category::YourPoints => "Your Points",
            Category::OptionPoints => "Option Points",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "your_points" => Ok(Category::YourPoints),
            "option_points" => Ok(Category::OptionPoints),
            other => Err(GeoError::Validation(format!("Unknown category: {other}"))),
        }
    }
}

/// Fichero retenido en un slot (o en el área batch).
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub category: Option<Category>,
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Vista reducida para el endpoint legacy `/upload`
#[derive(Clone, Debug, Serialize)]
pub struct BatchEntry {
    pub filename: String,
    pub path: PathBuf,
}

impl From<&StoredFile> for BatchEntry {
    fn from(f: &StoredFile) -> Self {
        Self { filename: f.filename.clone(), path: f.path.clone() }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Succeeded,
    Failed,
}

/// Última ejecución del procesador externo para una categoría
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRun {
    #[serde(skip)]
    pub seq: u64,
    pub path: PathBuf,
    pub state: RunState,
    pub exit_code: Option<i32>,
    pub output: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Estado compartido del procesado (una entrada por categoría)
#[derive(Clone, Debug, Default, Serialize)]
pub struct ProcessingState {
    pub your_points: Option<ProcessingRun>,
    pub option_points: Option<ProcessingRun>,
}

impl ProcessingState {
    pub fn slot_mut(&mut self, category: Category) -> &mut Option<ProcessingRun> {
        match category {
            Category::YourPoints => &mut self.your_points,
            Category::OptionPoints => &mut self.option_points,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppCfg {
    /// Dirección/puerto del servidor HTTP (Axum)
    pub bind: String,

    /// Raíz de los slots: `<uploads_dir>/your_points`, `<uploads_dir>/option_points`
    pub uploads_dir: PathBuf,

    /// Directorio con el formulario HTML estático
    pub web_dir: PathBuf,

    /// Parser externo: programa + args; la ruta del fichero se añade al final
    pub processor_cmd: Vec<String>,

    /// Matcher externo: recibe `<your_points> <option_points> <salida>`
    pub matcher_cmd: Vec<String>,

    /// Máximo de ficheros en la subida legacy `/upload`
    pub max_batch_files: usize,

    /// Límite del cuerpo HTTP (bytes)
    pub max_upload_bytes: usize,
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:4000".into(),
            uploads_dir: PathBuf::from("uploads"),
            web_dir: PathBuf::from("web"),
            processor_cmd: split_cmd("python3 processing/csv_parser.py"),
            matcher_cmd: split_cmd("python3 processing/match_points.py"),
            max_batch_files: 10,
            max_upload_bytes: 20 * 1024 * 1024, // 20 MiB
        }
    }
}

/// Parte una línea de comando por espacios (sin comillas)
pub fn split_cmd(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
