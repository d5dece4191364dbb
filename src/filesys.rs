//! Filesystem Module
//!
//! Where instance files are read from. Paths inside maps are relative, use either
//! slash, and are often spelled with the wrong case, so every lookup normalises
//! separators and falls back to a case-insensitive search.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{CollapseError, Result};

/// Normalise a map-relative path: forward slashes, no leading `./` or `/`.
pub fn normalize_path(path: &str) -> String {
    let path = path.trim().replace('\\', "/");
    let mut path = path.as_str();
    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest;
        } else if let Some(rest) = path.strip_prefix('/') {
            path = rest;
        } else {
            break;
        }
    }
    path.to_string()
}

pub trait FileSystem: Send + Sync {
    /// Read `path`, or fail with `CollapseError::MissingFile` listing where it looked.
    fn read_to_string(&self, path: &str) -> Result<String>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// RAW (ON DISK)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct RawFileSystem {
    root: PathBuf,
}

impl RawFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        RawFileSystem { root: root.into() }
    }

    fn find_case_insensitive(&self, relative: &str) -> Option<PathBuf> {
        let wanted = relative.to_lowercase();
        let depth = relative.split('/').count();
        WalkDir::new(&self.root)
            .follow_links(true)
            .max_depth(depth)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .find(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.root)
                    .map(|rel| rel.to_string_lossy().replace('\\', "/").to_lowercase() == wanted)
                    .unwrap_or(false)
            })
            .map(|entry| entry.into_path())
    }
}

impl FileSystem for RawFileSystem {
    fn read_to_string(&self, path: &str) -> Result<String> {
        let relative = normalize_path(path);
        let direct = self.root.join(&relative);
        let found = if direct.is_file() {
            Some(direct.clone())
        } else {
            self.find_case_insensitive(&relative)
        };
        let Some(found) = found else {
            return Err(CollapseError::MissingFile {
                path: path.to_string(),
                searched: vec![direct],
            });
        };
        fs::read_to_string(&found).map_err(|source| CollapseError::Io {
            path: found.display().to_string(),
            source,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN
// ═══════════════════════════════════════════════════════════════════════════════

/// Tries each filesystem in order; the first one holding the file wins.
#[derive(Default)]
pub struct FileSystemChain {
    systems: Vec<Box<dyn FileSystem>>,
}

impl FileSystemChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sys(&mut self, sys: impl FileSystem + 'static) {
        self.systems.push(Box::new(sys));
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

impl FileSystem for FileSystemChain {
    fn read_to_string(&self, path: &str) -> Result<String> {
        let mut searched = Vec::new();
        for sys in &self.systems {
            match sys.read_to_string(path) {
                Err(CollapseError::MissingFile { searched: tried, .. }) => searched.extend(tried),
                other => return other,
            }
        }
        Err(CollapseError::MissingFile {
            path: path.to_string(),
            searched,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEMORY
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory files, keyed case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: HashMap<String, String>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: &str, contents: impl Into<String>) {
        self.files
            .insert(normalize_path(path).to_lowercase(), contents.into());
    }

    pub fn with_file(mut self, path: &str, contents: impl Into<String>) -> Self {
        self.add_file(path, contents);
        self
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_to_string(&self, path: &str) -> Result<String> {
        let key = normalize_path(path).to_lowercase();
        self.files
            .get(&key)
            .cloned()
            .ok_or_else(|| CollapseError::MissingFile {
                path: path.to_string(),
                searched: vec![PathBuf::from(format!("memory:{}", key))],
            })
    }
}

/// Lookup locations for a map's instances: the map's own directory, then the
/// enclosing `sdk_content/maps` directory if the map lives under one.
pub fn instance_search_paths(map_path: &Path) -> FileSystemChain {
    let map_dir = map_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let mut chain = FileSystemChain::new();
    chain.add_sys(RawFileSystem::new(&map_dir));
    for parent in map_path.ancestors().skip(1) {
        let is_maps = parent
            .file_name()
            .is_some_and(|name| name.eq_ignore_ascii_case("maps"));
        let in_sdk_content = parent
            .parent()
            .and_then(Path::file_name)
            .is_some_and(|name| name.eq_ignore_ascii_case("sdk_content"));
        if is_maps && in_sdk_content {
            if parent != map_dir {
                chain.add_sys(RawFileSystem::new(parent));
            }
            break;
        }
    }
    chain
}
