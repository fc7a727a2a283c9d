//! Lifecycle hooks attached to a plugin specification

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use eyre::{Result, eyre};
use tokio::process::Command;
use tracing::debug;

/// Lifecycle events a plugin can react to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookEvent {
    PreInstall,
    PostInstall,
    PreChange,
    PostChange,
    PreDelete,
    PostDelete,
}

impl HookEvent {
    pub const ALL: [HookEvent; 6] = [
        HookEvent::PreInstall,
        HookEvent::PostInstall,
        HookEvent::PreChange,
        HookEvent::PostChange,
        HookEvent::PreDelete,
        HookEvent::PostDelete,
    ];

    /// Key used in configuration files
    pub fn key(&self) -> &'static str {
        match self {
            HookEvent::PreInstall => "pre_install",
            HookEvent::PostInstall => "post_install",
            HookEvent::PreChange => "pre_change",
            HookEvent::PostChange => "post_change",
            HookEvent::PreDelete => "pre_delete",
            HookEvent::PostDelete => "post_delete",
        }
    }

    /// Parse a configuration key; `pre_create`/`post_create` alias the install events
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "pre_install" | "pre_create" => Some(HookEvent::PreInstall),
            "post_install" | "post_create" => Some(HookEvent::PostInstall),
            "pre_change" => Some(HookEvent::PreChange),
            "post_change" => Some(HookEvent::PostChange),
            "pre_delete" => Some(HookEvent::PreDelete),
            "post_delete" => Some(HookEvent::PostDelete),
            _ => None,
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// What a hook gets to see about its plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookContext {
    pub name: String,
    pub path: PathBuf,
    pub source: Option<String>,
}

pub type HookFn = Arc<dyn Fn(&HookContext) -> Result<()> + Send + Sync>;

/// A hook: Rust callback or shell command run inside the plugin directory
#[derive(Clone)]
pub enum Hook {
    Command(String),
    Callback(HookFn),
}

impl Hook {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&HookContext) -> Result<()> + Send + Sync + 'static,
    {
        Hook::Callback(Arc::new(f))
    }

    /// Run the hook on the calling task; no timeout applies
    pub async fn run(&self, ctx: &HookContext) -> Result<()> {
        match self {
            Hook::Callback(f) => f(ctx),
            Hook::Command(script) => {
                debug!(name = %ctx.name, %script, "Hook::run: running shell hook");
                // Pre-install hooks run before the plugin directory exists
                let cwd = if ctx.path.is_dir() {
                    ctx.path.as_path()
                } else {
                    ctx.path.parent().unwrap_or(ctx.path.as_path())
                };
                let output = Command::new("sh")
                    .arg("-c")
                    .arg(script)
                    .current_dir(cwd)
                    .env("PLUGDEPS_NAME", &ctx.name)
                    .env("PLUGDEPS_PATH", &ctx.path)
                    .output()
                    .await?;
                if output.status.success() {
                    Ok(())
                } else {
                    Err(eyre!(
                        "`{}` exited with {}: {}",
                        script,
                        output.status,
                        String::from_utf8_lossy(&output.stderr).trim()
                    ))
                }
            }
        }
    }
}

impl PartialEq for Hook {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Hook::Command(a), Hook::Command(b)) => a == b,
            (Hook::Callback(a), Hook::Callback(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Command(script) => f.debug_tuple("Command").field(script).finish(),
            Hook::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Optional hook slot per lifecycle event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hooks(BTreeMap<HookEvent, Hook>);

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, event: HookEvent, hook: Hook) -> Self {
        self.0.insert(event, hook);
        self
    }

    pub fn set(&mut self, event: HookEvent, hook: Hook) {
        self.0.insert(event, hook);
    }

    pub fn get(&self, event: HookEvent) -> Option<&Hook> {
        self.0.get(&event)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HookEvent, &Hook)> {
        self.0.iter()
    }

    /// Hooks from `later` replace ours event by event
    pub fn merge(&mut self, later: Hooks) {
        self.0.extend(later.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn ctx(path: PathBuf) -> HookContext {
        HookContext {
            name: "plug".into(),
            path,
            source: None,
        }
    }

    #[test]
    fn test_event_aliases() {
        assert_eq!(HookEvent::from_key("pre_create"), Some(HookEvent::PreInstall));
        assert_eq!(HookEvent::from_key("post_create"), Some(HookEvent::PostInstall));
        assert_eq!(HookEvent::from_key("post_checkout"), None);
        for event in HookEvent::ALL {
            assert_eq!(HookEvent::from_key(event.key()), Some(event));
        }
    }

    #[tokio::test]
    async fn test_callback_hook_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let hook = Hook::callback(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        hook.run(&ctx(PathBuf::from("/tmp"))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_command_hook_runs_in_plugin_dir() {
        let temp = tempdir().unwrap();
        let hook = Hook::Command("touch built".into());

        hook.run(&ctx(temp.path().to_path_buf())).await.unwrap();
        assert!(temp.path().join("built").exists());
    }

    #[tokio::test]
    async fn test_command_hook_failure() {
        let temp = tempdir().unwrap();
        let hook = Hook::Command("exit 2".into());
        assert!(hook.run(&ctx(temp.path().to_path_buf())).await.is_err());
    }

    #[test]
    fn test_merge_later_wins_per_event() {
        let mut hooks = Hooks::new()
            .with(HookEvent::PostInstall, Hook::Command("make".into()))
            .with(HookEvent::PreDelete, Hook::Command("echo bye".into()));
        hooks.merge(Hooks::new().with(HookEvent::PostInstall, Hook::Command("make all".into())));

        assert_eq!(hooks.get(HookEvent::PostInstall), Some(&Hook::Command("make all".into())));
        assert_eq!(hooks.get(HookEvent::PreDelete), Some(&Hook::Command("echo bye".into())));
    }

    #[test]
    fn test_callback_equality_is_identity() {
        let a = Hook::callback(|_| Ok(()));
        let b = Hook::callback(|_| Ok(()));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
