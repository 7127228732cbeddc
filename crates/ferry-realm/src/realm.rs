//! Realm classification.
//!
//! Every module of an app lives in exactly one realm. The realm decides
//! where the module runs and which other modules it may import.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Realm errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealmError {
    /// Path lies outside every configured realm directory.
    #[error("Path is not inside a frontend, backend or common directory: {0}")]
    Unresolvable(PathBuf),

    /// The import crosses realms in a direction that cannot work.
    #[error("Cannot import modules from a {imported} directory in a {importer} module ({module})")]
    IllegalImport {
        /// Realm of the importing module.
        importer: Realm,
        /// Realm of the imported module.
        imported: Realm,
        /// The importing module.
        module: PathBuf,
    },

    /// Specifier imports are only resolved for frontend modules.
    #[error("Cannot resolve specifier {specifier:?} from a {importer} module")]
    InvalidSpecifier {
        /// The specifier.
        specifier: String,
        /// Realm of the importing module.
        importer: Realm,
    },

    /// The value runtime failed.
    #[error("Remote value error: {0}")]
    Remote(String),

    /// Registering a virtual file failed.
    #[error("Virtual file error: {0}")]
    VirtualFile(String),
}

/// Execution realm of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Realm {
    /// Runs in the browser.
    Frontend,
    /// Runs on the server.
    Backend,
    /// Runs on both sides.
    Common,
}

impl Realm {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Realm::Frontend => "frontend",
            Realm::Backend => "backend",
            Realm::Common => "common",
        }
    }
}

impl fmt::Display for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured realm directories.
#[derive(Debug, Clone, Default)]
pub struct RealmRoots {
    roots: Vec<(PathBuf, Realm)>,
}

impl RealmRoots {
    /// Create an empty set of roots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory for a realm.
    #[must_use]
    pub fn with_root(mut self, dir: impl AsRef<Path>, realm: Realm) -> Self {
        self.roots.push((normalize(dir.as_ref()), realm));
        self
    }

    /// Iterate over configured roots.
    pub fn roots(&self) -> impl Iterator<Item = (&Path, Realm)> {
        self.roots.iter().map(|(dir, realm)| (dir.as_path(), *realm))
    }

    /// Classify `path`. The deepest root containing it wins.
    ///
    /// # Errors
    ///
    /// Returns [`RealmError::Unresolvable`] if no root contains the path.
    pub fn classify(&self, path: impl AsRef<Path>) -> Result<Realm, RealmError> {
        let path = normalize(path.as_ref());
        self.roots
            .iter()
            .filter(|(dir, _)| path.starts_with(dir))
            .max_by_key(|(dir, _)| dir.components().count())
            .map(|(_, realm)| *realm)
            .ok_or(RealmError::Unresolvable(path))
    }

    /// Check that `importer` may import `imported` and return both realms.
    ///
    /// # Errors
    ///
    /// Returns an error if either path is unresolvable or a common module
    /// imports a frontend module.
    pub fn check_import(
        &self,
        importer: impl AsRef<Path>,
        imported: impl AsRef<Path>,
    ) -> Result<(Realm, Realm), RealmError> {
        let importer_realm = self.classify(importer.as_ref())?;
        let imported_realm = self.classify(imported)?;

        if importer_realm == Realm::Common && imported_realm == Realm::Frontend {
            return Err(RealmError::IllegalImport {
                importer: importer_realm,
                imported: imported_realm,
                module: normalize(importer.as_ref()),
            });
        }
        Ok((importer_realm, imported_realm))
    }
}

/// Fold `.` and `..` components without touching the file system.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
