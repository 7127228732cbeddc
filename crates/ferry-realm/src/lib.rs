//! # ferry-realm
//!
//! Realm classification and cross-realm module exposure for Ferry.
//!
//! Modules live in the frontend, backend or common realm. When a frontend
//! module imports a backend module, the [`Exposer`] replaces the import with
//! a generated stub that forwards the imported names through the remote
//! access runtime, and keeps that stub in sync with what importers use.

pub mod exposer;
pub mod imports;
pub mod realm;
pub mod remote;
pub mod stubgen;

pub use exposer::{
    escape_specifier, Exposer, ExposerConfig, ExposerStats, ImportResolution, ImportTarget,
    StubEvent,
};
pub use imports::ImportSet;
pub use realm::{Realm, RealmError, RealmRoots};
pub use remote::{ExportTable, MemoryFiles, RemoteValue, RemoteValues, ValueKind, VirtualFiles};
