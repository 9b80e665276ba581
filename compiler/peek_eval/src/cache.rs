//! Compiled fragments, kept for one suspension.

use std::sync::Arc;

use peek_codegen::CompilationResult;
use peek_resolve::DebugPosition;
use rustc_hash::FxHashMap;
use tracing::debug;

/// A compiled fragment with what is needed to run it again.
#[derive(Clone, Debug)]
pub struct CompiledDataDescriptor {
    pub compilation: CompilationResult,
    pub position: DebugPosition,
    /// Classes other than the main one, loaded ahead of invocation.
    pub auxiliary: Vec<String>,
}

impl CompiledDataDescriptor {
    pub fn new(compilation: CompilationResult, position: DebugPosition) -> Self {
        let auxiliary = compilation
            .auxiliary_classes()
            .map(|c| c.class_name.clone())
            .collect();
        CompiledDataDescriptor {
            compilation,
            position,
            auxiliary,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    text: String,
    position: DebugPosition,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Compilations run, forced ones included.
    pub computations: u64,
}

/// Compiled fragments keyed by text and position.
///
/// Entries belong to one suspension of the debuggee: a lookup with a
/// different generation than the previous one empties the cache first.
#[derive(Default)]
pub struct CompilationCache {
    entries: FxHashMap<CacheKey, Arc<CompiledDataDescriptor>>,
    generation: Option<u64>,
    stats: CacheStats,
}

impl CompilationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The entry for `text` at `position`, computing it on a miss or when
    /// `force` is set. The flag is `true` when the entry came from the cache.
    ///
    /// A failed computation leaves the cache unchanged.
    pub fn get<E>(
        &mut self,
        text: &str,
        position: DebugPosition,
        generation: u64,
        force: bool,
        compute: impl FnOnce() -> Result<CompiledDataDescriptor, E>,
    ) -> Result<(Arc<CompiledDataDescriptor>, bool), E> {
        if self.generation != Some(generation) {
            if !self.entries.is_empty() {
                debug!(
                    dropped = self.entries.len(),
                    generation, "debuggee resumed since last lookup"
                );
            }
            self.entries.clear();
            self.generation = Some(generation);
        }

        let key = CacheKey {
            text: text.to_owned(),
            position,
        };
        if !force {
            if let Some(entry) = self.entries.get(&key) {
                self.stats.hits += 1;
                debug!(text, line = position.line, "compilation cache hit");
                return Ok((Arc::clone(entry), true));
            }
            self.stats.misses += 1;
        }

        debug!(text, line = position.line, force, "compiling fragment");
        self.stats.computations += 1;
        let entry = Arc::new(compute()?);
        self.entries.insert(key, Arc::clone(&entry));
        Ok((entry, false))
    }

    /// Entry for `text` at `position`, without computing or counting.
    pub fn lookup(&self, text: &str, position: DebugPosition) -> Option<Arc<CompiledDataDescriptor>> {
        self.entries
            .get(&CacheKey {
                text: text.to_owned(),
                position,
            })
            .cloned()
    }

    pub fn invalidate_all(&mut self) {
        if !self.entries.is_empty() {
            debug!(dropped = self.entries.len(), "compilation cache invalidated");
        }
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
