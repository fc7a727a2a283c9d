//! plugdeps - Git-backed plugin manager
//!
//! plugdeps tracks a declared set of plugins, each backed by a Git
//! repository, and reconciles them with what is on disk: absent plugins are
//! cloned, present ones are fetched, compared and checked out to their
//! target ref. Git runs as child processes with bounded parallelism; one
//! broken plugin never stops the others.
//!
//! # Core Concepts
//!
//! - **Spec**: a normalized plugin declaration (source, name, checkout and
//!   monitor refs, hooks, dependencies)
//! - **Session**: the ordered, deduplicated specs registered in this process
//! - **Batch**: plugins driven together through the reconciliation phases
//! - **Snapshot**: a saved name to commit mapping
//!
//! # Modules
//!
//! - [`runner`] - Bounded-parallel process execution with sticky failures
//! - [`git`] - Git argument vectors
//! - [`spec`] - Declarations, hooks and normalization
//! - [`session`] - Session registry
//! - [`reconcile`] - Install/update/checkout phase pipeline
//! - [`feedback`] - Change reports, confirmation and the update log
//! - [`scheduler`] - Two-stage `now`/`later` task queue
//! - [`deps`] - The manager context with the user-facing operations
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod deps;
pub mod error;
pub mod feedback;
pub mod git;
pub mod layout;
pub mod notify;
pub mod reconcile;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod spec;

// Re-export commonly used types
pub use config::{Config, PathConfig};
pub use deps::{Deps, UpdateOptions, UpdateOutcome};
pub use error::DepsError;
pub use feedback::{AcceptAll, Confirm, EditorConfirm, FnConfirm, ReportEntry};
pub use layout::{ActivePaths, Layout, LoadPath};
pub use notify::{Level, Notice, Notifier};
pub use reconcile::{CheckoutOptions, PluginState, Reconciler};
pub use runner::{Job, JobFailure, RunOptions, RunSummary, Runner};
pub use scheduler::TwoStage;
pub use session::Session;
pub use snapshot::Snapshot;
pub use spec::{Hook, HookContext, HookEvent, Hooks, PluginDecl, PluginSpec, PluginTable, normalize};
