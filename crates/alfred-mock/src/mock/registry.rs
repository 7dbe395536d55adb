//! The live set of mocks.
//!
//! A snapshot is built completely off to the side and then swapped in with a
//! single pointer store. Requests hold an `Arc` to the snapshot they started
//! with, so a reload never shows them a mix of old and new mocks.

use super::core::{compile, CompileContext, CompiledMock, ScriptCache};
use super::types::{LoadError, MockDefinition, MockError};
use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// An immutable, versioned, ordered set of mocks
#[derive(Debug, Default)]
pub struct MockSnapshot {
    generation: u64,
    mocks: Vec<Arc<CompiledMock>>,
}

impl MockSnapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Mocks in declaration order
    pub fn mocks(&self) -> &[Arc<CompiledMock>] {
        &self.mocks
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<CompiledMock>> {
        self.mocks.iter().find(|m| m.name == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.mocks.iter().map(|m| m.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.mocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mocks.is_empty()
    }
}

pub struct MockRegistry {
    current: ArcSwap<MockSnapshot>,
    generation: AtomicU64,
    context: CompileContext,
}

impl MockRegistry {
    /// An empty registry at generation 0
    pub fn new(context: CompileContext) -> Self {
        Self {
            current: ArcSwap::from_pointee(MockSnapshot::default()),
            generation: AtomicU64::new(0),
            context,
        }
    }

    pub fn context(&self) -> &CompileContext {
        &self.context
    }

    /// Latest published snapshot; never blocks
    pub fn current(&self) -> Arc<MockSnapshot> {
        self.current.load_full()
    }

    /// Compile every definition without publishing anything.
    ///
    /// All failures are collected so one reload reports every broken mock.
    pub fn compile(&self, definitions: Vec<MockDefinition>) -> Result<Vec<CompiledMock>, LoadError> {
        let mut scripts = ScriptCache::new();
        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(definitions.len());
        let mut errors = Vec::new();

        for definition in definitions {
            match compile(definition, &self.context, &mut scripts) {
                Ok(mock) => {
                    if !seen.insert(mock.name.clone()) {
                        errors.push(MockError::DuplicateName(mock.name));
                        continue;
                    }
                    compiled.push(mock);
                }
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(compiled)
        } else {
            Err(LoadError { errors })
        }
    }

    /// Swap in a new snapshot built from already-compiled mocks
    pub fn publish(&self, mocks: Vec<Arc<CompiledMock>>) -> Arc<MockSnapshot> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(MockSnapshot { generation, mocks });
        self.current.store(Arc::clone(&snapshot));

        info!(
            "Published mock snapshot generation {} with {} mocks",
            generation,
            snapshot.len()
        );
        snapshot
    }

    /// Compile and publish. On any failure the previous snapshot stays live.
    pub fn load(&self, definitions: Vec<MockDefinition>) -> Result<Arc<MockSnapshot>, LoadError> {
        let compiled = self.compile(definitions)?;
        Ok(self.publish(compiled.into_iter().map(Arc::new).collect()))
    }
}
