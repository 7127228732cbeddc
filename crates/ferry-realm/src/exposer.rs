//! Cross-realm import exposure.
//!
//! The exposer resolves imports that cross realm boundaries. Backend modules
//! imported from the frontend are replaced by generated stubs that forward
//! every imported name through the remote access runtime. Import sets are
//! tracked per importer and stubs are regenerated, debounced, whenever the
//! combined set of imported names changes.

use crate::imports::ImportSet;
use crate::realm::{normalize, Realm, RealmError, RealmRoots};
use crate::remote::{RemoteValues, VirtualFiles};
use crate::stubgen::{self, StubInput};
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Exposer configuration.
#[derive(Debug, Clone)]
pub struct ExposerConfig {
    /// App base directory; web paths are relative to it.
    pub base_dir: PathBuf,
    /// Web path prefix of backend module stubs.
    pub src_prefix: String,
    /// Web path prefix of specifier stubs.
    pub external_prefix: String,
    /// Extensions of interface modules, which also get type declarations.
    pub interface_extensions: Vec<String>,
    /// Quiet period before a stub is regenerated.
    pub debounce: Duration,
    /// Capacity of the stub event channel.
    pub event_capacity: usize,
}

impl Default for ExposerConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            src_prefix: "/@ferry/src/".to_string(),
            external_prefix: "/@ferry/external/".to_string(),
            interface_extensions: vec!["dx".to_string(), "dxb".to_string()],
            debounce: Duration::from_millis(500),
            event_capacity: 256,
        }
    }
}

/// What an import resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportResolution {
    /// Import the generated stub at this web path.
    Remote {
        /// Path the importer should load.
        web_path: String,
    },
    /// The module is served by its common realm pipeline.
    Common,
    /// The module is resolved by the importer's own realm.
    Local,
}

/// The module a stub is generated for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportTarget {
    /// A file path.
    Path(PathBuf),
    /// An endpoint-style specifier such as `@example`.
    Specifier(String),
}

impl ImportTarget {
    /// Create a specifier target.
    #[must_use]
    pub fn specifier(specifier: impl Into<String>) -> Self {
        ImportTarget::Specifier(specifier.into())
    }
}

impl From<&Path> for ImportTarget {
    fn from(path: &Path) -> Self {
        ImportTarget::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for ImportTarget {
    fn from(path: PathBuf) -> Self {
        ImportTarget::Path(path)
    }
}

impl From<&str> for ImportTarget {
    fn from(path: &str) -> Self {
        ImportTarget::Path(PathBuf::from(path))
    }
}

/// Published after a stub was regenerated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubEvent {
    /// Web path of the runtime stub.
    pub web_path: String,
    /// Names the stub exposes.
    pub exports: BTreeSet<String>,
    /// Path of the type declaration stub, if any.
    pub declarations: Option<String>,
}

#[derive(Debug, Default)]
struct ExposedState {
    importers: HashMap<String, ImportSet>,
    scheduled: BTreeSet<String>,
    generated: Option<BTreeSet<String>>,
}

/// Descriptor of one exposed module.
#[derive(Debug)]
struct Exposed {
    module: String,
    interface: bool,
    state: Mutex<ExposedState>,
    generation: AtomicU64,
    regenerating: tokio::sync::Mutex<()>,
}

/// Exposer statistics.
#[derive(Debug, Clone, Default)]
pub struct ExposerStats {
    /// Number of exposed modules.
    pub exposed_modules: usize,
    /// Number of modules with a generated stub.
    pub generated_modules: usize,
    /// Number of distinct importers across modules.
    pub importers: usize,
}

/// Resolves cross-realm imports and keeps generated stubs up to date.
pub struct Exposer {
    roots: RealmRoots,
    config: ExposerConfig,
    remote: Arc<dyn RemoteValues>,
    files: Arc<dyn VirtualFiles>,
    exposed: DashMap<String, Arc<Exposed>>,
    events: broadcast::Sender<StubEvent>,
}

impl Exposer {
    /// Create an exposer.
    pub fn new(
        roots: RealmRoots,
        config: ExposerConfig,
        remote: Arc<dyn RemoteValues>,
        files: Arc<dyn VirtualFiles>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            roots,
            config,
            remote,
            files,
            exposed: DashMap::new(),
            events,
        }
    }

    /// Get the realm roots.
    #[must_use]
    pub fn roots(&self) -> &RealmRoots {
        &self.roots
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &ExposerConfig {
        &self.config
    }

    /// Subscribe to stub regeneration events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StubEvent> {
        self.events.subscribe()
    }

    /// Resolve an import of `imported` by `importer`.
    ///
    /// Backend modules imported from frontend or common modules resolve to a
    /// stub web path and the import set is recorded. Specifiers imported from
    /// frontend modules resolve to an interface stub.
    ///
    /// # Errors
    ///
    /// Returns an error if either side is outside every realm, the import is
    /// illegal or a specifier is imported from a non-frontend module.
    pub async fn resolve_import(
        &self,
        importer: impl AsRef<Path>,
        imported: impl Into<ImportTarget>,
        imports: ImportSet,
    ) -> Result<ImportResolution, RealmError> {
        let importer = importer.as_ref();
        let importer_key = self.module_id(importer);

        match imported.into() {
            ImportTarget::Specifier(specifier) => {
                let importer_realm = self.roots.classify(importer)?;
                if importer_realm != Realm::Frontend {
                    return Err(RealmError::InvalidSpecifier {
                        specifier,
                        importer: importer_realm,
                    });
                }
                let web_path = format!(
                    "{}{}.dx.ts",
                    self.config.external_prefix,
                    escape_specifier(&specifier)
                );
                self.observe(&web_path, &specifier, true, &importer_key, imports)
                    .await;
                Ok(ImportResolution::Remote { web_path })
            }
            ImportTarget::Path(path) => {
                let (importer_realm, imported_realm) = self.roots.check_import(importer, &path)?;
                match (importer_realm, imported_realm) {
                    (Realm::Frontend | Realm::Common, Realm::Backend) => {
                        let interface = self.is_interface(&path);
                        let module = self.module_id(&path);
                        let stub_path = if interface {
                            format!("{}{}.ts", self.config.src_prefix, module)
                        } else {
                            format!("{}{}", self.config.src_prefix, module)
                        };
                        self.observe(&stub_path, &module, interface, &importer_key, imports)
                            .await;
                        Ok(ImportResolution::Remote {
                            web_path: format!("{}{}", self.config.src_prefix, module),
                        })
                    }
                    (_, Realm::Common) => Ok(ImportResolution::Common),
                    _ => Ok(ImportResolution::Local),
                }
            }
        }
    }

    /// Replace the import set `importer` uses for the stub at `web_path`.
    ///
    /// Returns `true` if a regeneration was scheduled.
    pub async fn observe_imports(
        &self,
        web_path: &str,
        importer: &str,
        imports: ImportSet,
    ) -> bool {
        let Some(exposed) = self.exposed.get(web_path).map(|entry| entry.value().clone()) else {
            debug!(web_path, "Ignoring imports for unknown stub");
            return false;
        };
        self.update(web_path, exposed, Some((importer, imports))).await
    }

    /// Drop every import set recorded for `importer`.
    ///
    /// Returns the number of stubs scheduled for regeneration.
    pub async fn forget_importer(&self, importer: impl AsRef<Path>) -> usize {
        let importer = self.module_id(importer.as_ref());
        let affected = self
            .exposed
            .iter()
            .filter(|entry| lock(&entry.state).importers.contains_key(&importer))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect::<Vec<_>>();

        let mut scheduled = 0;
        for (web_path, exposed) in affected {
            lock(&exposed.state).importers.remove(&importer);
            if self.update(&web_path, exposed, None).await {
                scheduled += 1;
            }
        }
        scheduled
    }

    /// Names most recently scheduled for the stub at `web_path`.
    #[must_use]
    pub fn scheduled_exports(&self, web_path: &str) -> Option<BTreeSet<String>> {
        self.exposed
            .get(web_path)
            .map(|entry| lock(&entry.state).scheduled.clone())
    }

    /// Names of the last successfully generated stub at `web_path`.
    #[must_use]
    pub fn generated_exports(&self, web_path: &str) -> Option<BTreeSet<String>> {
        self.exposed
            .get(web_path)
            .and_then(|entry| lock(&entry.state).generated.clone())
    }

    /// Get exposer statistics.
    #[must_use]
    pub fn stats(&self) -> ExposerStats {
        let mut importers = BTreeSet::new();
        let mut generated_modules = 0;
        for entry in &self.exposed {
            let state = lock(&entry.state);
            importers.extend(state.importers.keys().cloned());
            if state.generated.is_some() {
                generated_modules += 1;
            }
        }
        ExposerStats {
            exposed_modules: self.exposed.len(),
            generated_modules,
            importers: importers.len(),
        }
    }

    async fn observe(
        &self,
        web_path: &str,
        module: &str,
        interface: bool,
        importer: &str,
        imports: ImportSet,
    ) -> bool {
        let exposed = self
            .exposed
            .entry(web_path.to_string())
            .or_insert_with(|| {
                Arc::new(Exposed {
                    module: module.to_string(),
                    interface,
                    state: Mutex::new(ExposedState::default()),
                    generation: AtomicU64::new(0),
                    regenerating: tokio::sync::Mutex::new(()),
                })
            })
            .value()
            .clone();
        self.update(web_path, exposed, Some((importer, imports))).await
    }

    async fn update(
        &self,
        web_path: &str,
        exposed: Arc<Exposed>,
        change: Option<(&str, ImportSet)>,
    ) -> bool {
        let combined = {
            let mut state = lock(&exposed.state);
            if let Some((importer, imports)) = change {
                state.importers.insert(importer.to_string(), imports);
            }
            ImportSet::union(state.importers.values())
        };

        let mut names = combined.expand(&BTreeSet::new());
        if combined.is_wildcard() {
            match self.remote.export_names_of(&exposed.module).await {
                Ok(all) => names = combined.expand(&all),
                Err(e) => warn!(module = %exposed.module, error = %e, "Cannot list exports"),
            }
        }
        if exposed.interface {
            names.insert("default".to_string());
        }

        let generation = {
            let mut state = lock(&exposed.state);
            if state.scheduled == names {
                return false;
            }
            state.scheduled = names;
            exposed.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        debug!(web_path, generation, "Scheduling stub regeneration");
        self.spawn_regeneration(web_path.to_string(), exposed, generation);
        true
    }

    fn spawn_regeneration(&self, web_path: String, exposed: Arc<Exposed>, generation: u64) {
        let debounce = self.config.debounce;
        let remote = self.remote.clone();
        let files = self.files.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if exposed.generation.load(Ordering::SeqCst) != generation {
                return;
            }

            let _guard = exposed.regenerating.lock().await;
            if exposed.generation.load(Ordering::SeqCst) != generation {
                return;
            }

            let (names, previous) = {
                let state = lock(&exposed.state);
                (state.scheduled.clone(), state.generated.clone().unwrap_or_default())
            };

            match regenerate(&web_path, &exposed, &names, remote.as_ref(), files.as_ref()).await {
                Ok(event) => {
                    let added = names.difference(&previous).cloned().collect::<Vec<_>>();
                    let removed = previous.difference(&names).cloned().collect::<Vec<_>>();
                    info!(
                        module = %exposed.module,
                        added = %added.join(", "),
                        removed = %removed.join(", "),
                        "Exposed exports"
                    );
                    lock(&exposed.state).generated = Some(names);
                    let _ = events.send(event);
                }
                Err(e) => {
                    warn!(web_path = %web_path, error = %e, "Stub regeneration failed");
                    // a newer schedule owns `scheduled` and will regenerate itself
                    let mut state = lock(&exposed.state);
                    if exposed.generation.load(Ordering::SeqCst) == generation {
                        state.scheduled = state.generated.clone().unwrap_or_default();
                    }
                }
            }
        });
    }

    fn is_interface(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.config.interface_extensions.iter().any(|e| e == ext))
    }

    /// Identifier of the module at `path`: its path relative to the base
    /// directory. Importer keys and remote module names use this form.
    #[must_use]
    pub fn module_id(&self, path: &Path) -> String {
        let path = normalize(path);
        let base = normalize(&self.config.base_dir);
        path.strip_prefix(&base)
            .unwrap_or(&path)
            .to_string_lossy()
            .trim_start_matches('/')
            .to_string()
    }
}

async fn regenerate(
    web_path: &str,
    exposed: &Exposed,
    names: &BTreeSet<String>,
    remote: &dyn RemoteValues,
    files: &dyn VirtualFiles,
) -> Result<StubEvent, RealmError> {
    let mut exports = Vec::with_capacity(names.len());
    for name in names {
        let value = remote.resolve_remote_value(&exposed.module, name).await?;
        exports.push((name.clone(), value));
    }

    let importer = {
        let state = lock(&exposed.state);
        let mut importers = state.importers.keys().cloned().collect::<Vec<_>>();
        importers.sort();
        importers.join(", ")
    };
    let input = StubInput {
        module: &exposed.module,
        importer: (!importer.is_empty()).then_some(importer.as_str()),
        exports: &exports,
    };

    let stub_path = files
        .add_virtual_file(web_path, stubgen::generate_ts(&input))
        .await?;

    let declarations = if exposed.interface {
        let dts_path = match stub_path.strip_suffix(".ts") {
            Some(stem) => format!("{stem}.d.ts"),
            None => format!("{stub_path}.d.ts"),
        };
        Some(
            files
                .add_virtual_file(&dts_path, stubgen::generate_dts(&input))
                .await?,
        )
    } else {
        None
    };

    Ok(StubEvent {
        web_path: stub_path,
        exports: names.clone(),
        declarations,
    })
}

fn lock(state: &Mutex<ExposedState>) -> std::sync::MutexGuard<'_, ExposedState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Replace every character outside `[A-Za-z0-9_.-]` by `_`.
#[must_use]
pub fn escape_specifier(specifier: &str) -> String {
    specifier
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{ExportTable, MemoryFiles, RemoteValue, ValueKind};
    use async_trait::async_trait;

    const API: &str = "/app/backend/api.ts";
    const STUB: &str = "/@ferry/src/backend/api.ts";

    fn roots() -> RealmRoots {
        RealmRoots::new()
            .with_root("/app/frontend", Realm::Frontend)
            .with_root("/app/backend", Realm::Backend)
            .with_root("/app/common", Realm::Common)
    }

    fn config() -> ExposerConfig {
        ExposerConfig {
            base_dir: PathBuf::from("/app"),
            ..ExposerConfig::default()
        }
    }

    fn setup() -> (Exposer, Arc<MemoryFiles>) {
        let table = Arc::new(ExportTable::new());
        table.set_exports(
            "backend/api.ts",
            [
                ("foo".to_string(), ValueKind::Function { arity: 0 }),
                ("bar".to_string(), ValueKind::Number),
                ("baz".to_string(), ValueKind::String),
            ],
        );
        let files = Arc::new(MemoryFiles::new());
        let exposer = Exposer::new(roots(), config(), table, files.clone());
        (exposer, files)
    }

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_import_from_frontend() {
        let (exposer, files) = setup();
        let mut events = exposer.subscribe();

        let resolution = exposer
            .resolve_import("/app/frontend/main.ts", API, ImportSet::from_iter(["foo"]))
            .await
            .unwrap();
        assert_eq!(
            resolution,
            ImportResolution::Remote {
                web_path: STUB.to_string()
            }
        );

        let event = events.recv().await.unwrap();
        assert_eq!(event.web_path, STUB);
        assert_eq!(event.exports, names(&["foo"]));
        assert!(event.declarations.is_none());
        assert!(files.get(STUB).unwrap().contains("export const foo"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_union_and_forget() {
        let (exposer, _files) = setup();
        let mut events = exposer.subscribe();

        exposer
            .resolve_import("/app/frontend/a.ts", API, ImportSet::from_iter(["foo"]))
            .await
            .unwrap();
        exposer
            .resolve_import("/app/frontend/b.ts", API, ImportSet::from_iter(["bar"]))
            .await
            .unwrap();
        assert_eq!(exposer.scheduled_exports(STUB), Some(names(&["bar", "foo"])));
        assert_eq!(events.recv().await.unwrap().exports, names(&["bar", "foo"]));

        assert_eq!(exposer.forget_importer("/app/frontend/a.ts").await, 1);
        assert_eq!(events.recv().await.unwrap().exports, names(&["bar"]));
        assert_eq!(exposer.generated_exports(STUB), Some(names(&["bar"])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_runs_last_only() {
        let (exposer, files) = setup();
        let mut events = exposer.subscribe();

        for set in [&["foo"][..], &["foo", "bar"], &["baz"]] {
            exposer
                .resolve_import(
                    "/app/frontend/main.ts",
                    API,
                    ImportSet::from_iter(set.iter().copied()),
                )
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let event = events.recv().await.unwrap();
        assert_eq!(event.exports, names(&["baz"]));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(events.try_recv().is_err());
        assert_eq!(files.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_imports_do_not_regenerate() {
        let (exposer, files) = setup();
        let mut events = exposer.subscribe();

        exposer
            .resolve_import("/app/frontend/main.ts", API, ImportSet::from_iter(["foo"]))
            .await
            .unwrap();
        events.recv().await.unwrap();

        let same = ImportSet::from_iter(["foo"]);
        assert!(!exposer.observe_imports(STUB, "frontend/main.ts", same).await);
        assert!(
            !exposer
                .observe_imports("/nope.ts", "frontend/main.ts", ImportSet::all())
                .await
        );
        assert_eq!(files.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wildcard_expansion() {
        let (exposer, _files) = setup();
        let mut events = exposer.subscribe();

        exposer
            .resolve_import("/app/common/shared.ts", API, ImportSet::all())
            .await
            .unwrap();
        assert_eq!(events.recv().await.unwrap().exports, names(&["bar", "baz", "foo"]));
    }

    #[tokio::test]
    async fn test_illegal_and_local_imports() {
        let (exposer, _files) = setup();

        let err = exposer
            .resolve_import("/app/common/x.ts", "/app/frontend/y.ts", ImportSet::all())
            .await
            .unwrap_err();
        assert!(matches!(err, RealmError::IllegalImport { .. }));

        let local = exposer
            .resolve_import("/app/frontend/x.ts", "/app/frontend/y.ts", ImportSet::all())
            .await
            .unwrap();
        assert_eq!(local, ImportResolution::Local);

        let common = exposer
            .resolve_import("/app/frontend/x.ts", "/app/common/y.ts", ImportSet::all())
            .await
            .unwrap();
        assert_eq!(common, ImportResolution::Common);
    }

    #[tokio::test(start_paused = true)]
    async fn test_specifier_import() {
        let (exposer, files) = setup();
        let mut events = exposer.subscribe();

        let resolution = exposer
            .resolve_import(
                "/app/frontend/main.ts",
                ImportTarget::specifier("@example/app"),
                ImportSet::from_iter(["greet"]),
            )
            .await
            .unwrap();
        let web_path = "/@ferry/external/_example_app.dx.ts";
        assert_eq!(
            resolution,
            ImportResolution::Remote {
                web_path: web_path.to_string()
            }
        );

        let event = events.recv().await.unwrap();
        assert_eq!(event.exports, names(&["default", "greet"]));
        assert_eq!(
            event.declarations.as_deref(),
            Some("/@ferry/external/_example_app.dx.d.ts")
        );
        assert!(files.get(web_path).unwrap().contains("console.warn"));

        let err = exposer
            .resolve_import(
                "/app/backend/x.ts",
                ImportTarget::specifier("@example"),
                ImportSet::all(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RealmError::InvalidSpecifier { .. }));
    }

    struct Offline;

    #[async_trait]
    impl RemoteValues for Offline {
        async fn export_names_of(&self, _module: &str) -> Result<BTreeSet<String>, RealmError> {
            Err(RealmError::Remote("offline".into()))
        }

        async fn resolve_remote_value(
            &self,
            _module: &str,
            _export: &str,
        ) -> Result<Option<RemoteValue>, RealmError> {
            Err(RealmError::Remote("offline".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_retried() {
        let files = Arc::new(MemoryFiles::new());
        let exposer = Exposer::new(roots(), config(), Arc::new(Offline), files.clone());

        let imports = ImportSet::from_iter(["foo"]);
        exposer
            .resolve_import("/app/frontend/main.ts", API, imports.clone())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(exposer.generated_exports(STUB), None);
        assert!(exposer.observe_imports(STUB, "frontend/main.ts", imports).await);
        assert_eq!(files.writes(), 0);
    }

    /// Fails the first lookup, each lookup takes 100ms.
    struct Flaky {
        table: ExportTable,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl RemoteValues for Flaky {
        async fn export_names_of(&self, module: &str) -> Result<BTreeSet<String>, RealmError> {
            self.table.export_names_of(module).await
        }

        async fn resolve_remote_value(
            &self,
            module: &str,
            export: &str,
        ) -> Result<Option<RemoteValue>, RealmError> {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(RealmError::Remote("connection reset".into()));
            }
            self.table.resolve_remote_value(module, export).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_keeps_newer_schedule() {
        let table = ExportTable::new();
        table.set_exports(
            "backend/api.ts",
            [
                ("foo".to_string(), ValueKind::Function { arity: 0 }),
                ("bar".to_string(), ValueKind::Number),
            ],
        );
        let remote = Arc::new(Flaky {
            table,
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let files = Arc::new(MemoryFiles::new());
        let exposer = Exposer::new(roots(), config(), remote, files);
        let mut events = exposer.subscribe();

        exposer
            .resolve_import("/app/frontend/a.ts", API, ImportSet::from_iter(["foo"]))
            .await
            .unwrap();
        // debounce elapsed, the first run is waiting on its failing lookup
        tokio::time::sleep(Duration::from_millis(550)).await;
        exposer
            .resolve_import("/app/frontend/b.ts", API, ImportSet::from_iter(["bar"]))
            .await
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.exports, names(&["bar", "foo"]));
        assert_eq!(exposer.scheduled_exports(STUB), Some(names(&["bar", "foo"])));
        assert_eq!(exposer.generated_exports(STUB), Some(names(&["bar", "foo"])));
    }
}
