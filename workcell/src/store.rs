//! Keyed project coordinator.
//!
//! One `Mutex<Project>` per id serializes the read-modify-persist sequence of
//! that project. The registry lock is held only to look up, reserve or insert
//! a handle. Loading a ledger and initializing version control happen outside
//! it, so a slow git call on one project never stalls another.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::error::LedgerError;
use crate::io::config::WorkcellConfig;
use crate::io::git::VersionControl;
use crate::io::ledger_store::ProjectPaths;
use crate::project::Project;

pub type ProjectHandle = Arc<Mutex<Project>>;

pub struct ProjectStore {
    data_dir: PathBuf,
    code_dir: PathBuf,
    vcs: Arc<dyn VersionControl>,
    registry: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    open: HashMap<String, ProjectHandle>,
    /// Ids whose creation is in progress.
    creating: HashSet<String>,
}

impl ProjectStore {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        code_dir: impl Into<PathBuf>,
        vcs: Arc<dyn VersionControl>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            code_dir: code_dir.into(),
            vcs,
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn from_config(config: &WorkcellConfig, vcs: Arc<dyn VersionControl>) -> Self {
        Self::new(config.data_dir.clone(), config.code_dir_path(), vcs)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn paths(&self, id: &str) -> Result<ProjectPaths, LedgerError> {
        validate_id(id)?;
        Ok(ProjectPaths::new(&self.data_dir, id))
    }

    /// Create a project with a persisted empty ledger.
    #[instrument(skip_all, fields(project_id = id))]
    pub fn create(&self, id: &str) -> Result<ProjectHandle, LedgerError> {
        let paths = self.paths(id)?;
        {
            let mut registry = lock(&self.registry);
            if registry.open.contains_key(id)
                || registry.creating.contains(id)
                || paths.ledger.exists()
            {
                return Err(LedgerError::ProjectExists { id: id.to_string() });
            }
            registry.creating.insert(id.to_string());
        }

        let created = Project::create(id, paths, &self.code_dir, self.vcs.clone());
        let mut registry = lock(&self.registry);
        registry.creating.remove(id);
        let handle = Arc::new(Mutex::new(created?));
        Ok(registry.open.entry(id.to_string()).or_insert(handle).clone())
    }

    /// Handle for `id`, reloading it from its ledger if not yet in memory.
    #[instrument(skip_all, fields(project_id = id))]
    pub fn open(&self, id: &str) -> Result<ProjectHandle, LedgerError> {
        let paths = self.paths(id)?;
        if let Some(handle) = lock(&self.registry).open.get(id) {
            return Ok(handle.clone());
        }
        if !paths.ledger.exists() {
            return Err(LedgerError::ProjectNotFound { id: id.to_string() });
        }
        let project = Project::load(id, paths, &self.code_dir, self.vcs.clone())?;
        // A concurrent open may have won; its handle may already carry newer state.
        let handle = lock(&self.registry)
            .open
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!("project reopened from ledger");
                Arc::new(Mutex::new(project))
            })
            .clone();
        Ok(handle)
    }

    /// Run `f` with exclusive access to project `id`.
    pub fn with_project<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Project) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let handle = self.open(id)?;
        let mut project = lock(&handle);
        f(&mut project)
    }

    /// Ids of every project with a ledger on disk, sorted.
    pub fn list(&self) -> Result<Vec<String>, LedgerError> {
        let read_dir = match fs::read_dir(&self.data_dir) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(self.listing_error(err)),
        };
        let mut ids = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|err| self.listing_error(err))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_id(&name).is_ok() && ProjectPaths::new(&self.data_dir, &name).ledger.is_file()
            {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn listing_error(&self, err: io::Error) -> LedgerError {
        LedgerError::Persistence {
            path: self.data_dir.clone(),
            reason: anyhow::Error::new(err).context("list projects"),
        }
    }
}

/// Fresh id of the form `proj-<UTC timestamp>-<random hex>`.
pub fn generate_project_id() -> String {
    let id = format!(
        "proj-{}-{:08x}",
        Utc::now().format("%Y%m%d%H%M%S"),
        rand::random::<u32>()
    );
    info!(project_id = %id, "generated project id");
    id
}

/// Ids become directory names; keep them to `[A-Za-z0-9._-]`.
pub fn validate_id(id: &str) -> Result<(), LedgerError> {
    let reject = |reason: &str| -> Result<(), LedgerError> {
        Err(LedgerError::InvalidProjectId {
            id: id.to_string(),
            reason: reason.to_string(),
        })
    };
    if id.is_empty() {
        return reject("id must not be empty");
    }
    if id == "." || id == ".." {
        return reject("id must not be a relative path component");
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return reject("id must be [A-Za-z0-9._-] only");
    }
    Ok(())
}

/// Every project mutation is clone-mutate-persist-swap, so a poisoned lock
/// never guards a half-applied state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use anyhow::Result;

    use super::*;
    use crate::core::types::{HistoryEntry, StatusUpdate};
    use crate::io::git::ResetMode;
    use crate::test_support::ScriptedVcs;

    /// Blocks the next `ensure_initialized` until released.
    struct GatedVcs {
        inner: ScriptedVcs,
        gated: AtomicBool,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl VersionControl for GatedVcs {
        fn ensure_initialized(&self, code_dir: &Path) -> Result<()> {
            if self.gated.swap(false, Ordering::SeqCst) {
                lock(&self.entered).send(()).expect("signal entered");
                lock(&self.release).recv().expect("wait release");
            }
            self.inner.ensure_initialized(code_dir)
        }

        fn commit(&self, code_dir: &Path, message: &str) -> Result<String> {
            self.inner.commit(code_dir, message)
        }

        fn head(&self, code_dir: &Path) -> Result<String> {
            self.inner.head(code_dir)
        }

        fn rollback_to_previous(&self, code_dir: &Path) -> Result<()> {
            self.inner.rollback_to_previous(code_dir)
        }

        fn reset_to(&self, code_dir: &Path, commit_id: &str, mode: ResetMode) -> Result<()> {
            self.inner.reset_to(code_dir, commit_id, mode)
        }
    }

    fn store() -> (tempfile::TempDir, ProjectStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ProjectStore::new(
            temp.path().join("data"),
            temp.path().join("code"),
            Arc::new(ScriptedVcs::new()),
        );
        (temp, store)
    }

    #[test]
    fn validate_id_rejects_path_like_ids() {
        for bad in ["", ".", "..", "a/b", "a b", "proj\u{e9}"] {
            assert!(
                matches!(validate_id(bad), Err(LedgerError::InvalidProjectId { .. })),
                "{bad:?}"
            );
        }
        validate_id("proj-20260101120000-0a1b2c3d").expect("valid");
        validate_id(&generate_project_id()).expect("generated id is valid");
    }

    #[test]
    fn create_then_list_and_duplicate_rejected() {
        let (_temp, store) = store();
        assert!(store.list().expect("list").is_empty());
        store.create("b-proj").expect("create");
        store.create("a-proj").expect("create");
        assert_eq!(store.list().expect("list"), vec!["a-proj", "b-proj"]);
        assert!(matches!(
            store.create("a-proj").unwrap_err(),
            LedgerError::ProjectExists { .. }
        ));
    }

    #[test]
    fn open_unknown_project_fails() {
        let (_temp, store) = store();
        assert!(matches!(
            store.open("ghost").unwrap_err(),
            LedgerError::ProjectNotFound { .. }
        ));
    }

    #[test]
    fn open_reloads_after_restart() {
        let temp = tempfile::tempdir().expect("tempdir");
        let vcs = Arc::new(ScriptedVcs::new());
        let data = temp.path().join("data");
        let code = temp.path().join("code");
        {
            let store = ProjectStore::new(&data, &code, vcs.clone());
            store.create("p1").expect("create");
            store
                .with_project("p1", |p| p.add_prompt("Initial submission"))
                .expect("prompt");
        }
        let store = ProjectStore::new(&data, &code, vcs);
        let history = store
            .with_project("p1", |p| Ok(p.history().to_vec()))
            .expect("reopen");
        assert_eq!(
            history,
            vec![HistoryEntry::Prompt("Initial submission".to_string())]
        );
    }

    #[test]
    fn concurrent_status_updates_get_distinct_indices() {
        let (_temp, store) = store();
        store.create("p1").expect("create");
        let store = Arc::new(store);

        let workers: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                thread::spawn(move || {
                    store
                        .with_project("p1", |p| {
                            p.add_status(StatusUpdate::new("Step", format!("worker {n}")))
                        })
                        .expect("status")
                        .index
                })
            })
            .collect();
        let mut indices: Vec<u32> = workers
            .into_iter()
            .map(|w| w.join().expect("join"))
            .collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..8).collect::<Vec<u32>>());
    }

    #[test]
    fn slow_initialization_does_not_block_other_projects() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let vcs = Arc::new(GatedVcs {
            inner: ScriptedVcs::new(),
            gated: AtomicBool::new(false),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let store = Arc::new(ProjectStore::new(
            temp.path().join("data"),
            temp.path().join("code"),
            vcs.clone(),
        ));
        store.create("ready").expect("create");

        vcs.gated.store(true, Ordering::SeqCst);
        let creator = {
            let store = store.clone();
            thread::spawn(move || store.create("slow").map(|_| ()))
        };
        entered_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("creation reached version control");

        let (done_tx, done_rx) = mpsc::channel();
        {
            let store = store.clone();
            thread::spawn(move || {
                let result = store.with_project("ready", |p| p.add_prompt("while slow"));
                done_tx.send(result.is_ok()).expect("send");
            });
        }
        let finished = done_rx.recv_timeout(Duration::from_secs(5));
        release_tx.send(()).expect("release");
        creator.join().expect("join").expect("slow create");

        assert_eq!(finished, Ok(true));
        assert!(matches!(
            store.create("slow").unwrap_err(),
            LedgerError::ProjectExists { .. }
        ));
    }
}
