use crate::error::CatalogError;
use crate::models::{Category, Collection, Entry, Season};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Whole-file JSON store, one file per category under the data directory.
///
/// Every mutation is a load-mutate-save sequence guarded by a per-category
/// mutex, so two concurrent mutations of the same category serialize within
/// this process. Across processes the files stay last-writer-wins.
pub struct Store {
    data_dir: PathBuf,
    locks: HashMap<Category, Arc<Mutex<()>>>,
}

impl Store {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let locks = Category::ALL
            .iter()
            .map(|&c| (c, Arc::new(Mutex::new(()))))
            .collect();
        Self {
            data_dir: data_dir.into(),
            locks,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn file_path(&self, category: Category) -> PathBuf {
        self.data_dir.join(category.file_name())
    }

    /// Load a category collection.
    ///
    /// Fails softly: a missing file is materialized as an empty collection;
    /// an unparseable file is reset to empty (logged, previous content
    /// discarded). Series data passes through the legacy-shape migration
    /// before anything else observes it.
    pub async fn load(&self, category: Category) -> Result<Collection, CatalogError> {
        let path = self.file_path(category);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("creating empty {} file at {}", category, path.display());
                self.write_file(category, &Collection::new()).await?;
                return Ok(Collection::new());
            }
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Collection::new());
        }

        let mut collection: Collection = match serde_json::from_str(&content) {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    "corrupted {} file at {} ({}), resetting to empty",
                    category,
                    path.display(),
                    e
                );
                self.write_file(category, &Collection::new()).await?;
                return Ok(Collection::new());
            }
        };

        if category == Category::Series {
            let migrated = migrate_legacy_series(&mut collection);
            if migrated > 0 {
                info!("migrated {migrated} legacy series record(s) to the season format");
            }
        }

        Ok(collection)
    }

    /// Replace the persisted collection. Written to a temp file in the same
    /// directory and renamed over the target, so readers never observe a
    /// partial write.
    pub async fn save(
        &self,
        category: Category,
        collection: &Collection,
    ) -> Result<(), CatalogError> {
        self.write_file(category, collection).await
    }

    async fn write_file(
        &self,
        category: Category,
        collection: &Collection,
    ) -> Result<(), CatalogError> {
        fs::create_dir_all(&self.data_dir).await?;
        let path = self.file_path(category);
        let tmp = path.with_extension("json.tmp");
        let bytes =
            serde_json::to_vec_pretty(collection).map_err(|e| std::io::Error::other(e))?;
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// One locked load-mutate-save sequence. The closure sees the freshly
    /// loaded collection; its return value is handed back after the save.
    pub async fn modify<R, F>(&self, category: Category, f: F) -> Result<R, CatalogError>
    where
        F: FnOnce(&mut Collection) -> R + Send,
        R: Send,
    {
        let lock = Arc::clone(&self.locks[&category]);
        let _guard = lock.lock().await;
        let mut collection = self.load(category).await?;
        let result = f(&mut collection);
        self.save(category, &collection).await?;
        Ok(result)
    }

    /// Fresh read of a single entry.
    pub async fn get(
        &self,
        category: Category,
        key: &str,
    ) -> Result<Option<Entry>, CatalogError> {
        let key = crate::models::normalize_key(key);
        Ok(self.load(category).await?.remove(&key))
    }

    pub async fn put(
        &self,
        category: Category,
        key: &str,
        entry: Entry,
    ) -> Result<(), CatalogError> {
        let key = crate::models::normalize_key(key);
        self.modify(category, move |collection| {
            collection.insert(key, entry);
        })
        .await
    }

    /// Remove a key; `false` when it was absent.
    pub async fn delete(&self, category: Category, key: &str) -> Result<bool, CatalogError> {
        let key = crate::models::normalize_key(key);
        self.modify(category, move |collection| collection.remove(&key).is_some())
            .await
    }
}

/// Rewrite legacy series records (`{"url": ...}` with no seasons) into the
/// season-based shape. Idempotent: already-migrated records are untouched.
pub fn migrate_legacy_series(collection: &mut Collection) -> usize {
    let mut migrated = 0;
    for (key, entry) in collection.iter_mut() {
        if entry.seasons.is_none() {
            if let Some(url) = entry.url.take() {
                info!("migrating legacy series record '{key}'");
                entry.seasons = Some(vec![Season {
                    number: 1,
                    title: "Season 1".to_string(),
                    url,
                }]);
                migrated += 1;
            }
        }
    }
    migrated
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn film(url: &str) -> Entry {
        Entry {
            url: Some(url.to_string()),
            ..Entry::default()
        }
    }

    #[tokio::test]
    async fn missing_file_yields_empty_and_materializes() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        let collection = store.load(Category::Films).await.unwrap();
        assert!(collection.is_empty());
        assert!(dir.path().join("films.json").is_file());
    }

    #[tokio::test]
    async fn corrupted_file_resets_to_empty() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("games.json"), "{not json").unwrap();
        let store = Store::new(dir.path());
        let collection = store.load(Category::Games).await.unwrap();
        assert!(collection.is_empty());
        let on_disk = std::fs::read_to_string(dir.path().join("games.json")).unwrap();
        let parsed: Collection = serde_json::from_str(&on_disk).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn put_get_delete_roundtrip_with_key_normalization() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        store
            .put(Category::Films, "Dune", film("http://x"))
            .await
            .unwrap();

        let fetched = store.get(Category::Films, "DUNE").await.unwrap().unwrap();
        assert_eq!(fetched.url.as_deref(), Some("http://x"));

        assert!(store.delete(Category::Films, "dune").await.unwrap());
        assert!(!store.delete(Category::Films, "dune").await.unwrap());
    }

    #[tokio::test]
    async fn legacy_series_record_is_migrated_on_load() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("series.json"),
            r#"{"foo": {"url": "http://x"}}"#,
        )
        .unwrap();
        let store = Store::new(dir.path());

        let collection = store.load(Category::Series).await.unwrap();
        let entry = &collection["foo"];
        assert_eq!(entry.url, None);
        let seasons = entry.seasons.as_ref().unwrap();
        assert_eq!(seasons.len(), 1);
        assert_eq!(seasons[0].number, 1);
        assert_eq!(seasons[0].title, "Season 1");
        assert_eq!(seasons[0].url, "http://x");

        // Save and re-load: migration must be a no-op the second time and
        // the legacy shape must never reappear on disk.
        store.save(Category::Series, &collection).await.unwrap();
        let reloaded = store.load(Category::Series).await.unwrap();
        assert_eq!(reloaded, collection);
        let on_disk = std::fs::read_to_string(dir.path().join("series.json")).unwrap();
        let parsed: Collection = serde_json::from_str(&on_disk).unwrap();
        assert_eq!(parsed["foo"].url, None);
        assert!(parsed["foo"].seasons.is_some());
    }

    #[tokio::test]
    async fn modify_applies_under_lock_and_persists() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path());
        let inserted = store
            .modify(Category::Software, |collection| {
                collection.insert("gimp".into(), film("http://g"));
                collection.len()
            })
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.load(Category::Software).await.unwrap().len(), 1);
    }
}
