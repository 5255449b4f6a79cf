use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::domain::TVError;

pub const MAX_RECENT_FILES: usize = 30;

/// On-disk layout of the recent files store: a plain JSON array. Entries that
/// are not strings are skipped rather than failing the whole list.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct RecentList(Vec<serde_json::Value>);

/// Most recently opened files, newest first.
#[derive(Debug)]
pub struct RecentFiles {
    store: PathBuf,
    max_items: usize,
}

impl RecentFiles {
    pub fn new(store: impl Into<PathBuf>) -> Self {
        RecentFiles {
            store: store.into(),
            max_items: MAX_RECENT_FILES,
        }
    }

    pub fn store(&self) -> &Path {
        &self.store
    }

    /// Existing files from the store. A missing or unreadable store is an
    /// empty list.
    pub fn load(&self) -> Vec<PathBuf> {
        match self.read() {
            Ok(items) => items,
            Err(e) => {
                debug!("No recent files from {}: {e}", self.store.display());
                Vec::new()
            }
        }
    }

    /// Moves `path` to the front of the list and saves it.
    pub fn push(&self, path: &Path) -> Result<Vec<PathBuf>, TVError> {
        let path = path.to_path_buf();
        let mut items = vec![path.clone()];
        items.extend(self.load().into_iter().filter(|p| *p != path));
        items.truncate(self.max_items);
        self.save(&items)?;
        Ok(items)
    }

    pub fn save(&self, items: &[PathBuf]) -> Result<(), TVError> {
        let mut seen = Vec::with_capacity(items.len());
        for item in items {
            if !seen.contains(item) {
                seen.push(item.clone());
            }
        }
        let list: Vec<String> = seen
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();

        if let Some(parent) = self.store.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.store, serde_json::to_string_pretty(&list)?).inspect_err(|e| {
            error!("Failed to write {}: {e}", self.store.display())
        })?;
        Ok(())
    }

    fn read(&self) -> Result<Vec<PathBuf>, TVError> {
        let text = fs::read_to_string(&self.store)?;
        let RecentList(raw) = serde_json::from_str(&text)?;
        Ok(raw
            .iter()
            .filter_map(|v| v.as_str())
            .map(PathBuf::from)
            .filter(|p| p.exists())
            .take(self.max_items)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_store_is_empty() {
        let dir = tempdir().unwrap();
        let recent = RecentFiles::new(dir.path().join("saved_sets.json"));
        assert!(recent.load().is_empty());
    }

    #[test]
    fn test_garbage_store_is_empty() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("saved_sets.json");
        fs::write(&store, "{ not json").unwrap();
        assert!(RecentFiles::new(&store).load().is_empty());
    }

    #[test]
    fn test_push_moves_to_front_and_dedupes() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(&a, "x").unwrap();
        fs::write(&b, "x").unwrap();

        let recent = RecentFiles::new(dir.path().join("state").join("saved_sets.json"));
        recent.push(&a).unwrap();
        recent.push(&b).unwrap();
        let items = recent.push(&a).unwrap();
        assert_eq!(items, vec![a.clone(), b.clone()]);
        assert_eq!(recent.load(), vec![a, b]);
    }

    #[test]
    fn test_load_skips_missing_files_and_non_strings() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.csv");
        fs::write(&a, "x").unwrap();
        let store = dir.path().join("saved_sets.json");
        let json = serde_json::json!([a.to_string_lossy(), 42, "/gone/set.csv", null]);
        fs::write(&store, json.to_string()).unwrap();

        assert_eq!(RecentFiles::new(&store).load(), vec![a]);
    }

    #[test]
    fn test_list_is_capped() {
        let dir = tempdir().unwrap();
        let recent = RecentFiles::new(dir.path().join("saved_sets.json"));
        for i in 0..(MAX_RECENT_FILES + 5) {
            let p = dir.path().join(format!("{i}.csv"));
            fs::write(&p, "x").unwrap();
            recent.push(&p).unwrap();
        }
        let items = recent.load();
        assert_eq!(items.len(), MAX_RECENT_FILES);
        assert_eq!(items[0], dir.path().join(format!("{}.csv", MAX_RECENT_FILES + 4)));
    }
}
