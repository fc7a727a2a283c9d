//! Session registry - the ordered, deduplicated set of active specs

use tracing::debug;

use crate::spec::PluginSpec;

/// Specs registered in this process, in first-registration order
///
/// Registering a name twice merges the new spec into the existing entry
/// (see [`PluginSpec::merge`]); the entry keeps its original position.
#[derive(Debug, Clone, Default)]
pub struct Session {
    specs: Vec<PluginSpec>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a spec, merging into an existing entry of the same name
    pub fn register(&mut self, spec: PluginSpec) {
        debug!(name = %spec.name, "Session::register: called");
        match self.specs.iter_mut().find(|s| s.name == spec.name) {
            Some(existing) => existing.merge(spec),
            None => self.specs.push(spec),
        }
    }

    /// Drop a spec by name, returning it
    pub fn unregister(&mut self, name: &str) -> Option<PluginSpec> {
        debug!(%name, "Session::unregister: called");
        let idx = self.specs.iter().position(|s| s.name == name)?;
        Some(self.specs.remove(idx))
    }

    pub fn get(&self, name: &str) -> Option<&PluginSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PluginSpec> {
        self.specs.iter_mut().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    /// Snapshot of every registered spec
    pub fn snapshot(&self) -> Vec<PluginSpec> {
        self.specs.clone()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
