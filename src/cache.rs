use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::document::Document;
use crate::error::Result;
use crate::filesys::{normalize_path, FileSystem};
use crate::proxy::RoutedSubDocument;

/// Parsed and routed instance files for one collapse run. Entries are never
/// invalidated; the same path always yields the same `RoutedSubDocument`.
#[derive(Default)]
pub struct InstanceCache {
    by_path: HashMap<String, Arc<RoutedSubDocument>>,
    /// Content hash → routed file, so copies of one file under several names parse once.
    by_hash: HashMap<String, Arc<RoutedSubDocument>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub paths: usize,
    pub distinct_files: usize,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute_hash(source: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn cache_key(path: &str) -> String {
        normalize_path(path).to_lowercase()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.by_path.contains_key(&Self::cache_key(path))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            paths: self.by_path.len(),
            distinct_files: self.by_hash.len(),
        }
    }

    /// The routed file for `path`, reading and routing it on first use.
    pub fn get(&mut self, fsys: &dyn FileSystem, path: &str) -> Result<Arc<RoutedSubDocument>> {
        let key = Self::cache_key(path);
        if let Some(file) = self.by_path.get(&key) {
            return Ok(Arc::clone(file));
        }
        let source = fsys.read_to_string(path)?;
        let hash = Self::compute_hash(&source);
        let file = match self.by_hash.get(&hash) {
            Some(file) => Arc::clone(file),
            None => {
                let file = Arc::new(load(&source, path)?);
                self.by_hash.insert(hash, Arc::clone(&file));
                file
            }
        };
        self.by_path.insert(key, Arc::clone(&file));
        Ok(file)
    }

    /// Read and route every not-yet-cached path in parallel. The first failure
    /// in path order is returned; successful loads are kept either way.
    pub fn preload(&mut self, fsys: &dyn FileSystem, paths: &[String]) -> Result<()> {
        let mut pending: Vec<&String> = paths.iter().filter(|p| !self.contains(p)).collect();
        pending.sort_by_key(|p| Self::cache_key(p.as_str()));
        pending.dedup_by_key(|p| Self::cache_key(p.as_str()));
        if pending.is_empty() {
            return Ok(());
        }
        log::debug!("Preloading {} instance files", pending.len());

        let sources: Vec<(&String, Result<String>)> = pending
            .par_iter()
            .map(|path| (*path, fsys.read_to_string(path)))
            .collect();

        let mut unseen: Vec<(&String, String, String)> = Vec::new();
        let mut first_error = None;
        for (path, source) in sources {
            match source {
                Ok(source) => {
                    let hash = Self::compute_hash(&source);
                    match self.by_hash.get(&hash) {
                        Some(file) => {
                            self.by_path.insert(Self::cache_key(path), Arc::clone(file));
                        }
                        None => unseen.push((path, hash, source)),
                    }
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        let loaded: Vec<(&String, String, Result<RoutedSubDocument>)> = unseen
            .into_par_iter()
            .map(|(path, hash, source)| {
                let file = load(&source, path);
                (path, hash, file)
            })
            .collect();

        for (path, hash, file) in loaded {
            match file {
                Ok(file) => {
                    let file = Arc::clone(self.by_hash.entry(hash).or_insert_with(|| Arc::new(file)));
                    self.by_path.insert(Self::cache_key(path), file);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn load(source: &str, path: &str) -> Result<RoutedSubDocument> {
    let tree = Document::parse(source, path)?;
    Ok(RoutedSubDocument::route(tree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollapseError;
    use crate::filesys::MemoryFileSystem;

    const RELAY: &str = "entity { \"id\" \"1\" \"classname\" \"logic_relay\" \"targetname\" \"r\" }";

    #[test]
    fn test_same_path_returns_same_entry() {
        let fs = MemoryFileSystem::new().with_file("a.vmf", RELAY);
        let mut cache = InstanceCache::new();
        let first = cache.get(&fs, "a.vmf").unwrap();
        let second = cache.get(&fs, "A.VMF").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_identical_contents_share_one_entry() {
        let fs = MemoryFileSystem::new()
            .with_file("a.vmf", RELAY)
            .with_file("copy/a.vmf", RELAY);
        let mut cache = InstanceCache::new();
        let first = cache.get(&fs, "a.vmf").unwrap();
        let second = cache.get(&fs, "copy/a.vmf").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                paths: 2,
                distinct_files: 1
            }
        );
    }

    #[test]
    fn test_missing_file_fails_fast() {
        let fs = MemoryFileSystem::new();
        let mut cache = InstanceCache::new();
        assert!(matches!(
            cache.get(&fs, "gone.vmf"),
            Err(CollapseError::MissingFile { .. })
        ));
        assert!(!cache.contains("gone.vmf"));
    }

    #[test]
    fn test_preload_fills_cache_and_reports_errors() {
        let fs = MemoryFileSystem::new()
            .with_file("a.vmf", RELAY)
            .with_file("b.vmf", "entity { \"classname\" \"info_target\" }")
            .with_file("broken.vmf", "entity {");
        let mut cache = InstanceCache::new();
        let paths = vec!["a.vmf".to_string(), "b.vmf".to_string(), "A.vmf".to_string()];
        cache.preload(&fs, &paths).unwrap();
        assert!(cache.contains("a.vmf"));
        assert!(cache.contains("b.vmf"));
        assert_eq!(cache.stats().paths, 2);

        let err = cache.preload(&fs, &["broken.vmf".to_string()]).unwrap_err();
        assert!(matches!(err, CollapseError::Parse(_)));
    }
}
