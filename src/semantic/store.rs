use ahash::AHashMap;
use parking_lot::RwLock;

use crate::semantic::{Delta, Statement};

/// Local queryable mirror of everything the fleet publishes.
///
/// `apply_delta` is replace-by-subject: all existing statements about every
/// subject appearing in the delta are retracted, then the delta's statements
/// are inserted. Writers must not interleave inside one application; this is
/// the store's transaction boundary.
pub trait LocalStore: Send + Sync {
    fn apply_delta(&self, delta: &Delta);
}

/// In-memory [`LocalStore`] keyed by subject.
#[derive(Debug, Default)]
pub struct MemoryStore {
    statements: RwLock<AHashMap<String, Vec<Statement>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All statements currently held about one subject.
    pub fn statements_about(&self, subject: &str) -> Vec<Statement> {
        self.statements
            .read()
            .get(subject)
            .cloned()
            .unwrap_or_default()
    }

    pub fn subject_count(&self) -> usize {
        self.statements.read().len()
    }
}

impl LocalStore for MemoryStore {
    fn apply_delta(&self, delta: &Delta) {
        let mut statements = self.statements.write();
        for subject in delta.subjects() {
            statements.remove(subject);
        }
        for statement in delta.statements() {
            statements
                .entry(statement.subject.clone())
                .or_default()
                .push(statement.clone());
        }
    }
}
