//! store.rs
//!
//! Slot de un solo fichero por categoría sobre disco.
//!
//! - Cada categoría tiene su directorio `<root>/<categoria>` con 0 o 1 fichero.
//! - La escritura va a `<root>/.staging` y después se renombra dentro del slot,
//!   así nadie ve un CSV a medio escribir.
//! - `put` + limpieza y `clear` se serializan con un mutex por categoría.
//!
//! No hay caché en memoria: el estado siempre sale de listar el directorio.

use std::{
    cmp::Ordering,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering as AtomicOrdering},
    time::SystemTime,
};

use chrono::{DateTime, Utc};
use tokio::{
    fs,
    sync::{Mutex, MutexGuard},
};
use tracing::{debug, info};

use crate::error::{GeoError, Result};
use crate::models::types::{Category, StoredFile};

const STAGING_DIR: &str = ".staging";
const BATCH_DIR: &str = "batch";

#[derive(Debug)]
struct SlotEntry {
    name: String,
    path: PathBuf,
    modified: SystemTime,
}

pub struct CategoryStore {
    root: PathBuf,
    locks: [Mutex<()>; 2],
    seq: AtomicU64,
}

impl CategoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: [Mutex::new(()), Mutex::new(())],
            seq: AtomicU64::new(0),
        }
    }

    pub fn slot_dir(&self, category: Category) -> PathBuf {
        self.root.join(category.as_str())
    }

    pub fn batch_dir(&self) -> PathBuf {
        self.root.join(BATCH_DIR)
    }

    /// Crea slots, staging y área batch (arranque)
    pub async fn ensure_layout(&self) -> Result<()> {
        for c in Category::ALL {
            fs::create_dir_all(self.slot_dir(c)).await?;
        }
        fs::create_dir_all(self.root.join(STAGING_DIR)).await?;
        fs::create_dir_all(self.batch_dir()).await?;
        Ok(())
    }

    /// Escribe `content` en el slot con `filename` y borra todo lo demás del slot.
    pub async fn put(&self, category: Category, filename: &str, content: &[u8]) -> Result<StoredFile> {
        let name = sanitize_filename(filename)?;
        let _guard = self.locks[category.index()].lock().await;

        let dir = self.slot_dir(category);
        fs::create_dir_all(&dir).await?;
        let target = dir.join(&name);
        self.write_atomic(&target, content).await?;

        // El recién escrito gana siempre, aunque otro tenga mtime mayor
        for stale in list_entries(&dir).await?.into_iter().filter(|e| e.name != name) {
            debug!("{category}: borrando {}", stale.name);
            remove_if_exists(&stale.path).await?;
        }

        describe(Some(category), &target).await
    }

    /// Deja solo la entrada más reciente (mtime; empate -> nombre mayor).
    pub async fn enforce_single(&self, category: Category) -> Result<Option<StoredFile>> {
        let _guard = self.locks[category.index()].lock().await;
        let mut entries = list_entries(&self.slot_dir(category)).await?;
        if entries.is_empty() {
            return Ok(None);
        }
        entries.sort_by(newest_first);
        let keep = entries.remove(0);
        for stale in &entries {
            info!("{category}: slot con {} ficheros, borrando {}", entries.len() + 1, stale.name);
            remove_if_exists(&stale.path).await?;
        }
        describe(Some(category), &keep.path).await.map(Some)
    }

    /// Fichero actual del slot (si hay restos sueltos, el más reciente)
    pub async fn current(&self, category: Category) -> Result<Option<StoredFile>> {
        let entries = list_entries(&self.slot_dir(category)).await?;
        match entries.into_iter().min_by(newest_first) {
            Some(e) => describe(Some(category), &e.path).await.map(Some),
            None => Ok(None),
        }
    }

    /// Vacía el slot. Devuelve cuántos ficheros se borraron.
    pub async fn clear(&self, category: Category) -> Result<usize> {
        let _guard = self.locks[category.index()].lock().await;
        let entries = list_entries(&self.slot_dir(category)).await?;
        for e in &entries {
            remove_if_exists(&e.path).await?;
        }
        Ok(entries.len())
    }

    /// Bloquea los dos slots (siempre en orden `Category::ALL`) mientras
    /// vivan los guards. Lo usa el matcher para que nadie sustituya sus entradas.
    pub async fn lock_slots(&self) -> Vec<MutexGuard<'_, ()>> {
        let mut guards = Vec::with_capacity(self.locks.len());
        for c in Category::ALL {
            guards.push(self.locks[c.index()].lock().await);
        }
        guards
    }

    /// Área de la subida legacy: sin invariante de fichero único.
    pub async fn stash(&self, filename: &str, content: &[u8]) -> Result<StoredFile> {
        let name = sanitize_filename(filename)?;
        let dir = self.batch_dir();
        fs::create_dir_all(&dir).await?;
        let target = dir.join(&name);
        self.write_atomic(&target, content).await?;
        describe(None, &target).await
    }

    async fn write_atomic(&self, target: &Path, content: &[u8]) -> Result<()> {
        let staging = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging).await?;
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let tmp = staging.join(format!("{}-{seq}.part", std::process::id()));

        fs::write(&tmp, content).await?;
        if let Err(e) = fs::rename(&tmp, target).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Reduce el nombre a su último componente y rechaza nombres vacíos u ocultos.
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if last.is_empty() || last.starts_with('.') {
        return Err(GeoError::Validation(format!("Invalid filename: {raw:?}")));
    }
    Ok(last.to_string())
}

fn newest_first(a: &SlotEntry, b: &SlotEntry) -> Ordering {
    b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name))
}

async fn list_entries(dir: &Path) -> Result<Vec<SlotEntry>> {
    let mut rd = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut out = Vec::new();
    while let Some(entry) = rd.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        out.push(SlotEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    Ok(out)
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

async fn describe(category: Option<Category>, path: &Path) -> Result<StoredFile> {
    let meta = fs::metadata(path).await?;
    let abs = fs::canonicalize(path).await?;
    let filename = abs
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let created_at: DateTime<Utc> = meta.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());
    Ok(StoredFile { category, filename, path: abs, size: meta.len(), created_at })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    fn names(dir: &Path) -> Vec<String> {
        let mut v: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        v.sort();
        v
    }

    fn touch(path: &Path, body: &str, age_s: u64) {
        std::fs::write(path, body).unwrap();
        let t = SystemTime::now() - Duration::from_secs(age_s);
        std::fs::File::options().write(true).open(path).unwrap().set_modified(t).unwrap();
    }

    #[tokio::test]
    async fn put_replaces_previous_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CategoryStore::new(tmp.path());

        store.put(Category::YourPoints, "a.csv", b"lat,lng\n1,2").await.unwrap();
        let b = store.put(Category::YourPoints, "b.csv", b"lat,lng\n3,4").await.unwrap();

        assert_eq!(names(&store.slot_dir(Category::YourPoints)), vec!["b.csv"]);
        let cur = store.current(Category::YourPoints).await.unwrap().unwrap();
        assert_eq!(cur.filename, "b.csv");
        assert_eq!(cur.path, b.path);
        assert!(cur.path.is_absolute());
        assert_eq!(std::fs::read(&cur.path).unwrap(), b"lat,lng\n3,4");
    }

    #[tokio::test]
    async fn put_same_name_overwrites_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CategoryStore::new(tmp.path());

        store.put(Category::OptionPoints, "p.csv", b"old").await.unwrap();
        let f = store.put(Category::OptionPoints, "p.csv", b"new!").await.unwrap();

        assert_eq!(names(&store.slot_dir(Category::OptionPoints)), vec!["p.csv"]);
        assert_eq!(f.size, 4);
        assert_eq!(std::fs::read(&f.path).unwrap(), b"new!");
    }

    #[tokio::test]
    async fn categories_do_not_share_slots() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CategoryStore::new(tmp.path());

        store.put(Category::YourPoints, "mine.csv", b"x").await.unwrap();
        store.put(Category::OptionPoints, "theirs.csv", b"y").await.unwrap();

        assert_eq!(store.current(Category::YourPoints).await.unwrap().unwrap().filename, "mine.csv");
        assert_eq!(store.current(Category::OptionPoints).await.unwrap().unwrap().filename, "theirs.csv");
    }

    #[tokio::test]
    async fn missing_directory_reads_as_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CategoryStore::new(tmp.path().join("nope"));

        assert!(store.current(Category::YourPoints).await.unwrap().is_none());
        assert_eq!(store.clear(Category::YourPoints).await.unwrap(), 0);
        assert!(store.enforce_single(Category::YourPoints).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_empties_slot_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CategoryStore::new(tmp.path());
        store.ensure_layout().await.unwrap();

        store.put(Category::YourPoints, "a.csv", b"1").await.unwrap();
        assert_eq!(store.clear(Category::YourPoints).await.unwrap(), 1);
        assert!(store.current(Category::YourPoints).await.unwrap().is_none());
        assert_eq!(store.clear(Category::YourPoints).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn enforce_single_keeps_most_recent() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CategoryStore::new(tmp.path());
        store.ensure_layout().await.unwrap();
        let dir = store.slot_dir(Category::OptionPoints);

        // "z_old" sale antes en orden alfabético inverso, pero es el más viejo
        touch(&dir.join("z_old.csv"), "old", 120);
        touch(&dir.join("a_new.csv"), "new", 1);
        touch(&dir.join("m_mid.csv"), "mid", 60);

        let kept = store.enforce_single(Category::OptionPoints).await.unwrap().unwrap();
        assert_eq!(kept.filename, "a_new.csv");
        assert_eq!(names(&dir), vec!["a_new.csv"]);
    }

    #[tokio::test]
    async fn enforce_single_breaks_ties_by_name() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CategoryStore::new(tmp.path());
        store.ensure_layout().await.unwrap();
        let dir = store.slot_dir(Category::YourPoints);

        let t = SystemTime::now() - Duration::from_secs(30);
        for n in ["b.csv", "c.csv", "a.csv"] {
            let p = dir.join(n);
            std::fs::write(&p, n).unwrap();
            std::fs::File::options().write(true).open(&p).unwrap().set_modified(t).unwrap();
        }

        let kept = store.enforce_single(Category::YourPoints).await.unwrap().unwrap();
        assert_eq!(kept.filename, "c.csv");
        assert_eq!(names(&dir), vec!["c.csv"]);
    }

    #[tokio::test]
    async fn concurrent_puts_leave_exactly_one_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(CategoryStore::new(tmp.path()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                s.put(Category::YourPoints, &format!("f{i}.csv"), format!("row{i}").as_bytes()).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(names(&store.slot_dir(Category::YourPoints)).len(), 1);
        // staging no deja restos
        assert!(names(&tmp.path().join(STAGING_DIR)).is_empty());
    }

    #[tokio::test]
    async fn traversal_names_are_rejected_or_flattened() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CategoryStore::new(tmp.path());

        let f = store.put(Category::YourPoints, "../../etc/points.csv", b"x").await.unwrap();
        assert_eq!(f.filename, "points.csv");
        assert!(f.path.starts_with(std::fs::canonicalize(store.slot_dir(Category::YourPoints)).unwrap()));

        for bad in ["", "..", ".", "dir/", ".hidden", "  "] {
            let err = store.put(Category::YourPoints, bad, b"x").await.unwrap_err();
            assert!(matches!(err, GeoError::Validation(_)), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn stash_keeps_every_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CategoryStore::new(tmp.path());

        let a = store.stash("a.csv", b"1").await.unwrap();
        store.stash("b.csv", b"2").await.unwrap();

        assert!(a.category.is_none());
        assert_eq!(names(&store.batch_dir()), vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn sanitize_handles_windows_paths() {
        assert_eq!(sanitize_filename(r"C:\Users\me\pts.csv").unwrap(), "pts.csv");
        assert_eq!(sanitize_filename(" pts.csv ").unwrap(), "pts.csv");
    }
}
