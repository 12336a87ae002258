//! Process-wide cache of compiled stencils, keyed by exact source text.
//!
//! Lookups and inserts each take one short lock on a single map. Values are
//! immutable [`ArtifactHandle`]s, so a hit hands out another reference and
//! never copies compiled code. The cache never evicts and never blocks a
//! compile: two threads that miss on the same source may both compile it,
//! and the artifact inserted first is the one every later lookup sees.

use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::Mutex;
use stencil_engine::ArtifactHandle;

/// Result of [`CompilationCache::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The artifact was stored under a new key.
    Inserted,
    /// The key already had an artifact; the offered one was dropped.
    AlreadyPresent,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    /// Inserts that found the key already present.
    pub duplicates: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct CompilationCache {
    scripts: Mutex<AHashMap<String, ArtifactHandle>>,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    duplicates: AtomicU64,
}

impl CompilationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared reference to the artifact compiled from `source`, if any.
    pub fn find(&self, source: &str) -> Option<ArtifactHandle> {
        let found = self.scripts.lock().get(source).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store `artifact` under `source` unless the key is already present.
    pub fn insert(&self, source: &str, artifact: ArtifactHandle) -> InsertOutcome {
        let mut scripts = self.scripts.lock();
        if scripts.contains_key(source) {
            drop(scripts);
            self.duplicates.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                filename = artifact.filename(),
                "Script already cached, discarding duplicate compile"
            );
            return InsertOutcome::AlreadyPresent;
        }
        scripts.insert(source.to_string(), artifact);
        drop(scripts);
        self.inserts.fetch_add(1, Ordering::Relaxed);
        InsertOutcome::Inserted
    }

    /// Whether `source` has a cached artifact. Does not count as a lookup.
    pub fn contains(&self, source: &str) -> bool {
        self.scripts.lock().contains_key(source)
    }

    pub fn len(&self) -> usize {
        self.scripts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
        }
    }
}

impl Drop for CompilationCache {
    fn drop(&mut self) {
        tracing::info!("Destructing cache holding {} scripts", self.scripts.get_mut().len());
    }
}
