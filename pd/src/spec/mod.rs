//! Plugin specifications: declarations, normalization and hooks

mod hooks;
mod normalize;

pub use hooks::{Hook, HookContext, HookEvent, HookFn, Hooks};
pub use normalize::{PluginDecl, PluginSpec, PluginTable, expand_source, normalize};
