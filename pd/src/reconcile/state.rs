//! Per-plugin reconciliation state for one batch

use std::path::PathBuf;

use crate::runner::Job;
use crate::spec::{HookContext, PluginSpec};

/// A spec plus everything learned about it during one batch
///
/// Built from a copy of the session spec at the start of every pass, so no
/// transient field survives into an unrelated pass.
#[derive(Debug, Clone)]
pub struct PluginState {
    pub spec: PluginSpec,

    /// Plugin directory (may not exist yet for installs)
    pub path: PathBuf,

    pub job: Job,

    /// Commit currently checked out
    pub head: Option<String>,

    /// Commit the checkout ref resolves to
    pub checkout_to: Option<String>,

    /// Commit of the monitor ref before download
    pub monitor_from: Option<String>,

    /// Commit of the monitor ref after download
    pub monitor_to: Option<String>,

    /// Log of what a checkout will change (`head...checkout_to`)
    pub checkout_log: String,

    /// Log of upstream movement of the monitor ref (`monitor_from...monitor_to`)
    pub monitor_log: String,

    pub needs_checkout: bool,

    /// Cloned during this batch
    pub installed: bool,

    pub(crate) is_origin_branch: bool,
}

impl PluginState {
    pub fn new(spec: PluginSpec, path: PathBuf) -> Self {
        let job = Job::new(spec.name.clone(), path.clone());
        Self {
            spec,
            path,
            job,
            head: None,
            checkout_to: None,
            monitor_from: None,
            monitor_to: None,
            checkout_log: String::new(),
            monitor_log: String::new(),
            needs_checkout: false,
            installed: false,
            is_origin_branch: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn is_ok(&self) -> bool {
        self.job.is_ok()
    }

    /// Whether the monitor ref moved upstream during this pass
    pub fn has_monitor_changes(&self) -> bool {
        !self.monitor_log.trim().is_empty()
    }

    pub fn hook_context(&self) -> HookContext {
        HookContext {
            name: self.spec.name.clone(),
            path: self.path.clone(),
            source: self.spec.source.clone(),
        }
    }
}
