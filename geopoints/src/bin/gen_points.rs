//! gen_points.rs
//! Genera CSV de ejemplo para probar el formulario:
//! `data/your_points.csv` y `data/option_points.csv`.
//! Uso: cargo run --bin gen_points [directorio]

use anyhow::{Context, Result};
use std::{env, fs, path::Path};

fn write_points(path: &Path, rows: &[(&str, &str, &str)]) -> Result<()> {
    let mut w = csv::Writer::from_path(path).with_context(|| format!("abrir {}", path.display()))?;
    w.write_record(["code", "latitude", "longitude"])?;
    for (code, lat, lon) in rows {
        w.write_record([code, lat, lon])?;
    }
    w.flush()?;
    println!("OK -> {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    let dir = env::args().nth(1).unwrap_or_else(|| "data".into());
    let dir = Path::new(&dir);
    fs::create_dir_all(dir).with_context(|| format!("crear {}", dir.display()))?;

    // Puntos propios (formatos mezclados: decimal, direccional, DM y DMS)
    let yours = [
        ("NYC", "40.7128", "-74.0060"),
        ("LA", "34°03' N", "118°14' W"),
        ("CHI", "41.8781 N", "87.6298 W"),
        ("MAD", "40°25'01\" N", "3°42'13\" W"),
    ];

    // Opciones candidatas
    let options = [
        ("BOS", "42.3601", "-71.0589"),
        ("SF", "37.7749", "-122.4194"),
        ("DET", "42.3314", "-83.0458"),
        ("LIS", "38.7223", "-9.1393"),
        ("LON", "51.5074", "-0.1278"),
    ];

    write_points(&dir.join("your_points.csv"), &yours)?;
    write_points(&dir.join("option_points.csv"), &options)?;
    Ok(())
}
