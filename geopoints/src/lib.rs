//! geopoints — subida de CSV de puntos a slots de un solo fichero por
//! categoría, con parser externo en segundo plano y matching bajo demanda.

pub mod error;
pub mod ingest;
pub mod matcher;
pub mod models;
pub mod processor;
pub mod server;
pub mod store;

pub use error::{GeoError, Result};
pub use models::types::{AppCfg, Category, StoredFile};
