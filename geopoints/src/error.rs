//! error.rs
//! Taxonomía de errores del servicio: validación (400), cuerpo demasiado grande (413),
//! almacenamiento (500) y procesado externo (solo log, salvo en `/matchPoints`)

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoError {
    /// Entrada ausente o vacía
    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Cuerpo por encima de `MAX_UPLOAD_BYTES` (413)
    #[error("{0}")]
    TooLarge(String),

    /// Fallo del parser/matcher externo
    #[error("processing error: {0}")]
    Processing(String),

    /// El comando externo terminó con código distinto de 0
    #[error("{program} exited with {code:?}")]
    ProcessExit { program: String, code: Option<i32>, output: String },
}

pub type Result<T> = std::result::Result<T, GeoError>;
