// src/registry/mod.rs
//!
//! # File-Type Registry
//!
//! A process-wide, lazily-initialized classifier that maps a path's
//! extension to an image/binary/language tag, cached on both the raw path
//! and the normalized extension.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use once_cell::sync::Lazy;

const MIN_EXTENSION_LEN: usize = 2;
const CACHE_CAPACITY: usize = 4096;
const MAX_ENTRIES_PER_LIST: usize = 1000;
const MAX_ENTRY_LEN: usize = 100;

/// Result of classifying a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileClassification {
    pub extension: String,
    pub is_image: bool,
    pub is_binary: bool,
    pub language: String,
}

impl FileClassification {
    fn unknown() -> Self {
        FileClassification {
            extension: String::new(),
            is_image: false,
            is_binary: false,
            language: String::new(),
        }
    }
}

#[derive(Default)]
struct Stats {
    total_lookups: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_evictions: AtomicU64,
}

/// Snapshot of the registry's running counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryStats {
    pub total_lookups: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
}

struct Inner {
    image_exts: HashMap<String, ()>,
    binary_exts: HashMap<String, ()>,
    languages: HashMap<String, String>,
    special_files: HashMap<String, ()>,
    path_cache: HashMap<String, String>,
    classification_cache: HashMap<String, FileClassification>,
}

impl Inner {
    fn with_defaults() -> Self {
        let mut image_exts = HashMap::new();
        for ext in ["png", "jpg", "jpeg", "gif", "bmp", "webp", "ico", "svg", "tiff"] {
            image_exts.insert(ext.to_string(), ());
        }

        let mut binary_exts = HashMap::new();
        for ext in [
            "exe", "dll", "so", "dylib", "bin", "o", "a", "class", "wasm", "pdf", "zip", "gz",
            "tar", "rar", "7z", "db", "sqlite",
        ] {
            binary_exts.insert(ext.to_string(), ());
        }

        let mut languages = HashMap::new();
        for (ext, lang) in [
            ("rs", "rust"),
            ("go", "go"),
            ("py", "python"),
            ("js", "javascript"),
            ("ts", "typescript"),
            ("java", "java"),
            ("c", "c"),
            ("h", "c"),
            ("cpp", "cpp"),
            ("hpp", "cpp"),
            ("rb", "ruby"),
            ("php", "php"),
            ("md", "markdown"),
            ("json", "json"),
            ("yaml", "yaml"),
            ("yml", "yaml"),
            ("toml", "toml"),
            ("sh", "bash"),
            ("html", "html"),
            ("css", "css"),
        ] {
            languages.insert(ext.to_string(), lang.to_string());
        }

        let mut special_files = HashMap::new();
        for name in [".ds_store", "thumbs.db", ".gitkeep"] {
            special_files.insert(name.to_string(), ());
        }

        Inner {
            image_exts,
            binary_exts,
            languages,
            special_files,
            path_cache: HashMap::new(),
            classification_cache: HashMap::new(),
        }
    }

    fn invalidate_caches(&mut self) {
        self.path_cache.clear();
        self.classification_cache.clear();
    }
}

/// The process-wide classifier.
pub struct Registry {
    inner: RwLock<Inner>,
    stats: Stats,
}

impl Registry {
    fn new() -> Self {
        Registry {
            inner: RwLock::new(Inner::with_defaults()),
            stats: Stats::default(),
        }
    }

    /// Classifies `path`, consulting the path cache first and the
    /// extension-classification cache second.
    pub fn classify(&self, path: &Path) -> FileClassification {
        self.stats.total_lookups.fetch_add(1, Ordering::Relaxed);

        let path_key = path.to_string_lossy().to_string();

        if let Some(classification) = self.try_cached(&path_key) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return classification;
        }
        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        let extension = normalized_extension(path);
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let mut guard = self.inner.write().unwrap();

        let classification = if let Some(c) = guard.classification_cache.get(&extension) {
            let mut c = c.clone();
            if extension.is_empty() && guard.special_files.contains_key(&basename) {
                c.is_binary = true;
            }
            c
        } else {
            let mut c = FileClassification::unknown();
            c.extension = extension.clone();
            if extension.len() >= MIN_EXTENSION_LEN {
                c.is_image = guard.image_exts.contains_key(&extension);
                c.is_binary = guard.binary_exts.contains_key(&extension);
                c.language = guard
                    .languages
                    .get(&extension)
                    .cloned()
                    .unwrap_or_default();
            }
            evict_if_full(&mut guard.classification_cache, &self.stats);
            guard
                .classification_cache
                .insert(extension.clone(), c.clone());
            if extension.is_empty() && guard.special_files.contains_key(&basename) {
                c.is_binary = true;
            }
            c
        };

        evict_if_full(&mut guard.path_cache, &self.stats);
        guard.path_cache.insert(path_key, extension);

        classification
    }

    fn try_cached(&self, path_key: &str) -> Option<FileClassification> {
        let guard = self.inner.read().unwrap();
        let extension = guard.path_cache.get(path_key)?;
        guard.classification_cache.get(extension).cloned()
    }

    pub fn is_image(&self, path: &Path) -> bool {
        self.classify(path).is_image
    }

    pub fn is_binary(&self, path: &Path) -> bool {
        self.classify(path).is_binary
    }

    pub fn language(&self, path: &Path) -> String {
        self.classify(path).language
    }

    pub fn add_image_extension(&self, ext: &str) {
        let mut guard = self.inner.write().unwrap();
        guard.image_exts.insert(ext.to_lowercase(), ());
        guard.invalidate_caches();
    }

    pub fn add_binary_extension(&self, ext: &str) {
        let mut guard = self.inner.write().unwrap();
        guard.binary_exts.insert(ext.to_lowercase(), ());
        guard.invalidate_caches();
    }

    pub fn add_language_mapping(&self, ext: &str, language: &str) {
        let mut guard = self.inner.write().unwrap();
        guard
            .languages
            .insert(ext.to_lowercase(), language.to_string());
        guard.invalidate_caches();
    }

    /// Bulk-applies user-supplied classification overrides, validating each
    /// list before any mutation occurs.
    pub fn apply_config(
        &self,
        custom_images: &[String],
        custom_binary: &[String],
        custom_languages: &[(String, String)],
    ) -> Result<(), crate::error::DigestError> {
        validate_entry_list(custom_images)?;
        validate_entry_list(custom_binary)?;
        let language_exts: Vec<String> = custom_languages.iter().map(|(e, _)| e.clone()).collect();
        validate_entry_list(&language_exts)?;

        let mut guard = self.inner.write().unwrap();
        for ext in custom_images {
            if ext.is_empty() {
                continue;
            }
            guard.image_exts.insert(ext.to_lowercase(), ());
        }
        for ext in custom_binary {
            if ext.is_empty() {
                continue;
            }
            guard.binary_exts.insert(ext.to_lowercase(), ());
        }
        for (ext, lang) in custom_languages {
            if ext.is_empty() || lang.is_empty() {
                continue;
            }
            guard.languages.insert(ext.to_lowercase(), lang.clone());
        }
        guard.invalidate_caches();
        Ok(())
    }

    /// Removes extensions from the image/binary/language tables. Empty
    /// entries are ignored.
    pub fn disable(&self, images: &[String], binary: &[String], languages: &[String]) {
        let mut guard = self.inner.write().unwrap();
        for ext in images {
            if !ext.is_empty() {
                guard.image_exts.remove(&ext.to_lowercase());
            }
        }
        for ext in binary {
            if !ext.is_empty() {
                guard.binary_exts.remove(&ext.to_lowercase());
            }
        }
        for ext in languages {
            if !ext.is_empty() {
                guard.languages.remove(&ext.to_lowercase());
            }
        }
        guard.invalidate_caches();
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_lookups: self.stats.total_lookups.load(Ordering::Relaxed),
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.stats.cache_misses.load(Ordering::Relaxed),
            cache_evictions: self.stats.cache_evictions.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    pub fn default_for_test() -> Self {
        Registry::new()
    }

    #[cfg(test)]
    pub fn reset_for_test(&self) {
        let mut guard = self.inner.write().unwrap();
        *guard = Inner::with_defaults();
        self.stats.total_lookups.store(0, Ordering::Relaxed);
        self.stats.cache_hits.store(0, Ordering::Relaxed);
        self.stats.cache_misses.store(0, Ordering::Relaxed);
        self.stats.cache_evictions.store(0, Ordering::Relaxed);
    }
}

fn validate_entry_list(entries: &[String]) -> Result<(), crate::error::DigestError> {
    if entries.len() > MAX_ENTRIES_PER_LIST {
        return Err(crate::error::DigestError::Validation {
            path: None,
            message: format!(
                "registry config list exceeds {MAX_ENTRIES_PER_LIST} entries"
            ),
        });
    }
    for entry in entries {
        if entry.is_empty() {
            continue;
        }
        if entry.len() > MAX_ENTRY_LEN {
            return Err(crate::error::DigestError::Validation {
                path: None,
                message: format!("registry config entry '{entry}' exceeds {MAX_ENTRY_LEN} chars"),
            });
        }
        if entry.contains('/') || entry.contains('\\') || entry.contains("..") {
            return Err(crate::error::DigestError::Validation {
                path: None,
                message: format!("registry config entry '{entry}' must be a bare extension"),
            });
        }
        if Path::new(entry).is_absolute() {
            return Err(crate::error::DigestError::Validation {
                path: None,
                message: format!("registry config entry '{entry}' must not be absolute"),
            });
        }
    }
    Ok(())
}

fn evict_if_full<K: Clone + std::hash::Hash + Eq, V>(map: &mut HashMap<K, V>, stats: &Stats) {
    if map.len() < CACHE_CAPACITY {
        return;
    }
    let keep: Vec<K> = map.keys().take(map.len() / 2).cloned().collect();
    let evicted = map.len() - keep.len();
    let mut kept = HashMap::with_capacity(keep.len());
    for k in keep {
        if let Some(v) = map.remove(&k) {
            kept.insert(k, v);
        }
    }
    *map = kept;
    stats
        .cache_evictions
        .fetch_add(evicted as u64, Ordering::Relaxed);
}

fn normalized_extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Returns the process-wide registry singleton.
pub fn global() -> &'static Registry {
    &REGISTRY
}
