//! Interfaces to the value runtime and the transpilation pipeline.

use crate::realm::RealmError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// Rough shape of an exported value, used for type declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    /// A callable.
    Function {
        /// Number of parameters.
        arity: usize,
    },
    /// A string.
    String,
    /// A number.
    Number,
    /// A boolean.
    Boolean,
    /// A plain object with the given keys.
    Object(Vec<String>),
    /// Anything else.
    Unknown,
}

/// An exported value as seen through the value runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteValue {
    /// Export name.
    pub name: String,
    /// Shape of the value.
    pub kind: ValueKind,
}

/// Access to module exports through the value runtime.
#[async_trait]
pub trait RemoteValues: Send + Sync {
    /// Names of every export of `module`.
    async fn export_names_of(&self, module: &str) -> Result<BTreeSet<String>, RealmError>;

    /// Look up one export. `Ok(None)` if the module does not export it.
    async fn resolve_remote_value(
        &self,
        module: &str,
        export: &str,
    ) -> Result<Option<RemoteValue>, RealmError>;
}

/// Registration of generated modules with the transpilation pipeline.
#[async_trait]
pub trait VirtualFiles: Send + Sync {
    /// Register `content` under `path` and return the path it is served at.
    async fn add_virtual_file(&self, path: &str, content: String) -> Result<String, RealmError>;
}

/// In-memory export table.
#[derive(Debug, Default)]
pub struct ExportTable {
    modules: DashMap<String, BTreeMap<String, ValueKind>>,
}

impl ExportTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the exports of a module, replacing earlier ones.
    pub fn set_exports(
        &self,
        module: impl Into<String>,
        exports: impl IntoIterator<Item = (String, ValueKind)>,
    ) {
        self.modules.insert(module.into(), exports.into_iter().collect());
    }

    /// Remove a module.
    pub fn remove(&self, module: &str) {
        self.modules.remove(module);
    }
}

#[async_trait]
impl RemoteValues for ExportTable {
    async fn export_names_of(&self, module: &str) -> Result<BTreeSet<String>, RealmError> {
        Ok(self
            .modules
            .get(module)
            .map(|exports| exports.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn resolve_remote_value(
        &self,
        module: &str,
        export: &str,
    ) -> Result<Option<RemoteValue>, RealmError> {
        Ok(self.modules.get(module).and_then(|exports| {
            exports.get(export).map(|kind| RemoteValue {
                name: export.to_string(),
                kind: kind.clone(),
            })
        }))
    }
}

/// In-memory virtual file store.
#[derive(Debug, Default)]
pub struct MemoryFiles {
    files: DashMap<String, String>,
    writes: AtomicU64,
}

impl MemoryFiles {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a file.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<String> {
        self.files.get(path).map(|content| content.clone())
    }

    /// Number of stored files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total number of writes.
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl VirtualFiles for MemoryFiles {
    async fn add_virtual_file(&self, path: &str, content: String) -> Result<String, RealmError> {
        self.files.insert(path.to_string(), content);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(path.to_string())
    }
}
