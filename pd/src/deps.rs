//! Deps - the plugin manager context and its user-facing operations
//!
//! One `Deps` owns the session registry, the package layout, the host load
//! path and the confirmation surface. Everything a command needs flows
//! through it; there is no global state.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{Config, PathConfig};
use crate::error::DepsError;
use crate::feedback::{self, Confirm, EditorConfirm, ReportEntry};
use crate::layout::{ActivePaths, Layout, LoadPath};
use crate::notify::Notifier;
use crate::reconcile::{CheckoutOptions, PluginState, Reconciler};
use crate::runner::Runner;
use crate::session::Session;
use crate::snapshot::Snapshot;
use crate::spec::{HookContext, HookEvent, PluginDecl, PluginSpec, normalize};

/// Flags for [`Deps::update`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Check out right away instead of asking for confirmation
    pub force: bool,

    /// Skip downloading from `origin`
    pub offline: bool,
}

/// What an update pass found and did
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// Plugins as reconciled by the reported pass
    pub plugins: Vec<PluginState>,

    /// Report entries, errors first
    pub entries: Vec<ReportEntry>,

    /// Plugins that were checked out to a new commit
    pub applied: Vec<String>,

    /// The confirmation surface was dismissed
    pub cancelled: bool,
}

/// Plugin manager context
pub struct Deps {
    layout: Layout,
    paths: PathConfig,
    session: Session,
    load_path: Box<dyn LoadPath>,
    confirm: Box<dyn Confirm>,
    notifier: Notifier,
    reconciler: Reconciler,
}

impl std::fmt::Debug for Deps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deps")
            .field("layout", &self.layout)
            .field("paths", &self.paths)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Deps {
    /// Context with an in-memory load path and the editor confirmation surface
    pub fn new(config: &Config, notifier: Notifier) -> Self {
        debug!(package = ?config.path.package, "Deps::new: called");
        let scratch = dirs::cache_dir()
            .map(|d| d.join("plugdeps"))
            .unwrap_or_else(|| std::env::temp_dir().join("plugdeps"));
        let runner = Runner::new(config.run_options(), notifier.clone());
        Self {
            layout: Layout::new(&config.path.package),
            paths: config.path.clone(),
            session: Session::new(),
            load_path: Box::new(ActivePaths::new()),
            confirm: Box::new(EditorConfirm::new(scratch)),
            reconciler: Reconciler::new(runner, notifier.clone()),
            notifier,
        }
    }

    pub fn with_load_path(mut self, load_path: impl LoadPath + 'static) -> Self {
        self.load_path = Box::new(load_path);
        self
    }

    pub fn with_confirm(mut self, confirm: impl Confirm + 'static) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Registered specs in registration order
    pub fn get_session(&self) -> Vec<PluginSpec> {
        self.session.snapshot()
    }

    /// Register one plugin, installing it when absent from disk
    pub async fn add(&mut self, decl: impl Into<PluginDecl>) -> Result<Vec<PluginState>, DepsError> {
        self.add_many(vec![decl.into()]).await
    }

    /// Register plugins, installing the absent ones as one batch
    ///
    /// Dependencies are registered before their dependents. Returns the
    /// install batch (empty when everything was already on disk). Clone
    /// failures are reported, not returned; the spec is still registered.
    pub async fn add_many(&mut self, decls: Vec<PluginDecl>) -> Result<Vec<PluginState>, DepsError> {
        debug!(count = decls.len(), "Deps::add_many: called");
        let mut batch: Vec<PluginSpec> = Vec::new();
        for decl in decls {
            for spec in normalize(decl)? {
                match batch.iter_mut().find(|s| s.name == spec.name) {
                    Some(existing) => existing.merge(spec),
                    None => batch.push(spec),
                }
            }
        }

        let mut installs = Vec::new();
        for spec in &batch {
            if self.layout.find(&spec.name).is_some() {
                continue;
            }
            let mut merged = self.session.get(&spec.name).cloned().unwrap_or_else(|| PluginSpec::new(&spec.name));
            merged.merge(spec.clone());
            if merged.source.is_none() {
                return Err(DepsError::MissingSource(spec.name.clone()));
            }
            let path = self.layout.install_path(&spec.name);
            installs.push(PluginState::new(merged, path));
        }

        if !installs.is_empty() {
            self.notifier
                .info(format!("Installing {}", names_of(&installs).join(", ")));
            self.reconciler.install(&mut installs).await;
        }

        for spec in batch {
            if let Some(path) = self.layout.find(&spec.name) {
                self.load_path.activate(&spec.name, &path);
            }
            self.session.register(spec);
        }
        Ok(installs)
    }

    /// Drop a plugin from the session and the load path, optionally deleting it
    pub async fn remove(&mut self, name: &str, delete_dir: bool) -> Result<(), DepsError> {
        debug!(%name, delete_dir, "Deps::remove: called");
        let path = self.layout.find(name);
        let spec = self.session.get(name).cloned();
        if spec.is_none() && path.is_none() {
            return Err(DepsError::UnknownPlugin(name.to_string()));
        }

        if let Some(path) = &path {
            self.load_path.deactivate(name, path);
        }
        self.session.unregister(name);

        let Some(path) = path.filter(|_| delete_dir) else {
            return Ok(());
        };
        let spec = spec.unwrap_or_else(|| PluginSpec::new(name));
        let ctx = HookContext {
            name: name.to_string(),
            path: path.clone(),
            source: spec.source.clone(),
        };

        self.run_hook(&spec, HookEvent::PreDelete, &ctx).await;
        fs::remove_dir_all(&path)?;
        self.run_hook(&spec, HookEvent::PostDelete, &ctx).await;
        self.notifier.info(format!("Deleted `{}` from {}", name, path.display()));
        Ok(())
    }

    async fn run_hook(&self, spec: &PluginSpec, event: HookEvent, ctx: &HookContext) {
        let Some(hook) = spec.hooks.get(event) else {
            return;
        };
        if let Err(e) = hook.run(ctx).await {
            self.notifier
                .warn(format!("Error executing `{}` hook in `{}`:\n{:#}", event, spec.name, e));
        }
    }

    /// Batch of present plugins for the given names (all when empty)
    fn states_for(&self, names: &[String]) -> Result<Vec<PluginState>, DepsError> {
        let specs: Vec<PluginSpec> = if names.is_empty() {
            self.session.snapshot()
        } else {
            names
                .iter()
                .map(|n| {
                    self.session
                        .get(n)
                        .cloned()
                        .ok_or_else(|| DepsError::UnknownPlugin(n.clone()))
                })
                .collect::<Result<_, _>>()?
        };

        let mut states = Vec::new();
        for spec in specs {
            match self.layout.find(&spec.name) {
                Some(path) => states.push(PluginState::new(spec, path)),
                None => self
                    .notifier
                    .warn(format!("`{}` is not on disk, run `add` to install it", spec.name)),
            }
        }
        Ok(states)
    }

    /// Keep sources read back from `origin` for specs registered without one
    fn remember_sources(&mut self, states: &[PluginState]) {
        for p in states {
            if let (Some(source), Some(spec)) = (&p.spec.source, self.session.get_mut(p.name())) {
                if spec.source.is_none() {
                    debug!(name = %p.name(), %source, "Deps::remember_sources: recovered source");
                    spec.source = Some(source.clone());
                }
            }
        }
    }

    fn append_log(&self, entries: &[ReportEntry]) {
        if let Err(e) = feedback::log::append_section(&self.paths.log, "Update", &feedback::render(entries)) {
            self.notifier
                .warn(format!("Could not write update log {}: {}", self.paths.log.display(), e));
        }
    }

    /// Check out a synced batch, report errors and log the result
    async fn apply(&mut self, states: &mut [PluginState], action: &str) -> Vec<String> {
        let entries = feedback::build_entries(states);
        self.reconciler.checkout(states, CheckoutOptions::default()).await;
        self.reconciler.report_errors(states, action);
        self.append_log(&entries);
        states
            .iter()
            .filter(|p| p.is_ok() && p.needs_checkout)
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Reconcile plugins with their specs
    ///
    /// With `force`, checks out right away and appends the report to the
    /// update log. Otherwise the report goes to the confirmation surface and
    /// only plugins whose `+++ <name> +++` line survived are checked out, in
    /// a second offline pass.
    pub async fn update(&mut self, names: &[String], opts: UpdateOptions) -> Result<UpdateOutcome, DepsError> {
        debug!(?names, ?opts, "Deps::update: called");
        let mut states = self.states_for(names)?;
        if states.is_empty() {
            self.notifier.info("Nothing to update");
            return Ok(UpdateOutcome {
                plugins: states,
                entries: Vec::new(),
                applied: Vec::new(),
                cancelled: false,
            });
        }

        self.reconciler.sync(&mut states, opts.offline).await;
        self.remember_sources(&states);
        let entries = feedback::build_entries(&states);

        if opts.force {
            let applied = self.apply(&mut states, "update").await;
            return Ok(UpdateOutcome {
                plugins: states,
                entries,
                applied,
                cancelled: false,
            });
        }

        self.reconciler.report_errors(&states, "update");
        let document = feedback::confirm_document(&entries);
        let Some(saved) = self.confirm.confirm("Update", &document).await? else {
            self.notifier.info("Update is cancelled");
            return Ok(UpdateOutcome {
                plugins: states,
                entries,
                applied: Vec::new(),
                cancelled: true,
            });
        };

        let confirmed: Vec<String> = feedback::parse_confirmed(&saved)
            .into_iter()
            .filter(|n| states.iter().any(|p| p.name() == n && p.needs_checkout))
            .collect();
        debug!(?confirmed, "Deps::update: confirmed");
        let applied = if confirmed.is_empty() {
            self.notifier.info("Nothing to update");
            Vec::new()
        } else {
            let mut again = self.states_for(&confirmed)?;
            self.reconciler.sync(&mut again, true).await;
            self.apply(&mut again, "update").await
        };

        Ok(UpdateOutcome {
            plugins: states,
            entries,
            applied,
            cancelled: false,
        })
    }

    /// Delete plugin directories whose names are not in the session
    ///
    /// Returns the deleted directories.
    pub async fn clean(&mut self, force: bool) -> Result<Vec<PathBuf>, DepsError> {
        debug!(force, "Deps::clean: called");
        let orphans: Vec<PathBuf> = self
            .layout
            .list_installed()?
            .into_iter()
            .filter(|dir| {
                dir.file_name()
                    .and_then(|n| n.to_str())
                    .is_none_or(|n| !self.session.contains(n))
            })
            .collect();

        if orphans.is_empty() {
            self.notifier.info("Nothing to clean");
            return Ok(Vec::new());
        }

        let targets = if force {
            orphans
        } else {
            let document = clean_document(&orphans);
            let Some(saved) = self.confirm.confirm("Clean", &document).await? else {
                self.notifier.info("Clean is cancelled");
                return Ok(Vec::new());
            };
            let kept: Vec<PathBuf> = saved
                .lines()
                .filter_map(|l| l.strip_prefix("- "))
                .map(|l| PathBuf::from(l.trim()))
                .collect();
            orphans.into_iter().filter(|o| kept.contains(o)).collect()
        };

        let total = targets.len();
        let mut deleted = Vec::new();
        for (i, dir) in targets.into_iter().enumerate() {
            match fs::remove_dir_all(&dir) {
                Ok(()) => {
                    self.notifier
                        .info(format!("({}/{}) Deleted {}", i + 1, total, dir.display()));
                    deleted.push(dir);
                }
                Err(e) => self
                    .notifier
                    .error(format!("Could not delete {}: {}", dir.display(), e)),
            }
        }
        Ok(deleted)
    }

    /// Current commit of every registered plugin on disk
    pub async fn snap_get(&mut self) -> Result<Snapshot, DepsError> {
        debug!("Deps::snap_get: called");
        let mut states = self.states_for(&[])?;
        self.reconciler.infer_head(&mut states).await;
        self.reconciler.report_errors(&states, "reading snapshot");
        Ok(states
            .into_iter()
            .filter_map(|p| p.head.clone().map(|head| (p.spec.name, head)))
            .collect())
    }

    /// Check out each session plugin named in `snap` to its commit
    ///
    /// The session's `checkout` fields are left untouched. Names not in the
    /// session are ignored.
    pub async fn snap_set(&mut self, snap: &Snapshot) -> Result<Vec<PluginState>, DepsError> {
        debug!(count = snap.len(), "Deps::snap_set: called");
        let mut states: Vec<PluginState> = self
            .states_for(&[])?
            .into_iter()
            .filter_map(|mut p| {
                let commit = snap.get(p.name())?;
                p.spec.checkout = Some(commit.to_string());
                Some(p)
            })
            .collect();
        for (name, _) in snap.iter().filter(|(n, _)| !self.session.contains(n)) {
            debug!(%name, "Deps::snap_set: not in session, skipping");
        }

        self.reconciler.sync(&mut states, true).await;
        self.apply(&mut states, "applying snapshot").await;
        Ok(states)
    }

    fn snapshot_path(&self, path: Option<&Path>) -> PathBuf {
        path.map(Path::to_path_buf).unwrap_or_else(|| self.paths.snapshot.clone())
    }

    /// Write the current snapshot, to the configured file by default
    pub async fn snap_save(&mut self, path: Option<&Path>) -> Result<PathBuf, DepsError> {
        let path = self.snapshot_path(path);
        debug!(?path, "Deps::snap_save: called");
        let snap = self.snap_get().await?;
        snap.save(&path)?;
        self.notifier.info(format!("Saved snapshot to {}", path.display()));
        Ok(path)
    }

    /// Apply a saved snapshot, from the configured file by default
    pub async fn snap_load(&mut self, path: Option<&Path>) -> Result<Vec<PluginState>, DepsError> {
        let path = self.snapshot_path(path);
        debug!(?path, "Deps::snap_load: called");
        let snap = Snapshot::load(&path)?;
        self.snap_set(&snap).await
    }
}

fn names_of(states: &[PluginState]) -> Vec<String> {
    states.iter().map(|p| format!("`{}`", p.name())).collect()
}

fn clean_document(orphans: &[PathBuf]) -> String {
    let mut doc = String::from(
        "This is a confirmation report before a clean.\n\n\
         Lines `- <path>` are directories to be deleted.\n\
         Delete such a line to keep that directory.\n\
         Cancel the clean by exiting the editor with an error (`:cq` in Vim).\n\n",
    );
    for dir in orphans {
        doc.push_str(&format!("- {}\n", dir.display()));
    }
    doc
}
