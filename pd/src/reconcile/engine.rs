//! Reconciler - the install/update/checkout phase pipeline
//!
//! Every phase has the same shape: `prepare` picks each healthy plugin's next
//! command from its current fields, the [`Runner`] executes the batch, and
//! `process` folds the output back into the plugin. A failed job skips all
//! remaining phases for its plugin only. Phase N+1 never starts before phase
//! N finished for the whole batch.

use std::fs;

use tracing::debug;

use super::helptags;
use super::state::PluginState;
use crate::git::{self, commands};
use crate::notify::Notifier;
use crate::runner::Runner;
use crate::spec::HookEvent;

/// Knobs for the checkout stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutOptions {
    /// Run `pre_change`/`post_change` hooks around the checkout
    pub exec_hooks: bool,

    /// Regenerate help indexes of every plugin, not only checked-out ones
    pub all_helptags: bool,
}

impl Default for CheckoutOptions {
    fn default() -> Self {
        Self {
            exec_hooks: true,
            all_helptags: false,
        }
    }
}

type RefOf = fn(&PluginState) -> Option<String>;
type SetCommit = fn(&mut PluginState, String);

fn checkout_ref(p: &PluginState) -> Option<String> {
    p.spec.checkout.clone()
}

fn monitor_ref(p: &PluginState) -> Option<String> {
    p.spec.monitor.clone()
}

/// Drives batches of plugins through the reconciliation phases
#[derive(Debug, Clone)]
pub struct Reconciler {
    runner: Runner,
    notifier: Notifier,
}

impl Reconciler {
    pub fn new(runner: Runner, notifier: Notifier) -> Self {
        debug!("Reconciler::new: called");
        Self { runner, notifier }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    async fn run_phase<P, Q>(&self, plugs: &mut [PluginState], mut prepare: P, mut process: Q)
    where
        P: FnMut(&mut PluginState),
        Q: FnMut(&mut PluginState),
    {
        for p in plugs.iter_mut() {
            p.job.reset();
            if p.job.is_ok() {
                prepare(p);
            }
        }
        self.runner.run(plugs.iter_mut().map(|p| &mut p.job)).await;
        for p in plugs.iter_mut().filter(|p| p.job.is_ok()) {
            process(p);
        }
    }

    /// Run one hook event for every healthy plugin matching `filter`
    ///
    /// Hook failures are reported as warnings and never fail the plugin.
    async fn run_hooks<F>(&self, plugs: &[PluginState], event: HookEvent, filter: F)
    where
        F: Fn(&PluginState) -> bool,
    {
        for p in plugs.iter().filter(|p| p.is_ok() && filter(p)) {
            let Some(hook) = p.spec.hooks.get(event) else {
                continue;
            };
            debug!(name = %p.name(), %event, "Reconciler::run_hooks: executing hook");
            if let Err(e) = hook.run(&p.hook_context()).await {
                self.notifier
                    .warn(format!("Error executing `{}` hook in `{}`:\n{:#}", event, p.name(), e));
            }
        }
    }

    /// Notify every plugin whose job failed
    pub fn report_errors(&self, plugs: &[PluginState], action: &str) {
        for p in plugs {
            if let Some(failure) = p.job.failure() {
                self.notifier
                    .error(format!("Error in `{}` during {}\n{}", p.name(), action, failure));
            }
        }
    }

    /// Clone absent plugins and check them out to their target
    pub async fn install(&self, plugs: &mut [PluginState]) {
        debug!(count = plugs.len(), "Reconciler::install: called");
        for p in plugs.iter_mut() {
            let Some(parent) = p.path.parent().map(|d| d.to_path_buf()) else {
                p.job.fail(format!("Invalid install path {}", p.path.display()));
                continue;
            };
            if let Err(e) = fs::create_dir_all(&parent) {
                p.job.fail(format!("Failed to create {}: {}", parent.display(), e));
                continue;
            }
            p.job.cwd = parent;
        }

        self.run_hooks(plugs, HookEvent::PreInstall, |_| true).await;

        self.run_phase(
            plugs,
            |p| match p.spec.source.clone() {
                Some(source) => {
                    p.job.command = commands::clone(&source, &p.path);
                    p.job.exit_msg = Some(format!("Installed `{}`", p.name()));
                }
                None => p.job.fail("No `source` to install from"),
            },
            |p| {
                p.job.cwd = p.path.clone();
                p.installed = true;
            },
        )
        .await;

        self.ensure_target_refs(plugs).await;
        self.infer_head(plugs).await;
        self.infer_commit(plugs, checkout_ref, |p, c| p.checkout_to = Some(c)).await;
        self.decide(plugs);
        self.checkout(
            plugs,
            CheckoutOptions {
                exec_hooks: false,
                all_helptags: true,
            },
        )
        .await;

        self.run_hooks(plugs, HookEvent::PostInstall, |p| p.installed).await;
        self.report_errors(plugs, "installing plugin");
    }

    /// Re-derive state of present plugins; optionally download first
    ///
    /// Leaves every healthy plugin with `head`, `checkout_to`, both monitor
    /// commits, both logs and `needs_checkout` filled in. Nothing on disk
    /// changes apart from the origin URL and fetched refs.
    pub async fn sync(&self, plugs: &mut [PluginState], offline: bool) {
        debug!(count = plugs.len(), offline, "Reconciler::sync: called");
        self.ensure_origin_source(plugs).await;
        self.ensure_target_refs(plugs).await;
        self.infer_head(plugs).await;
        self.infer_commit(plugs, monitor_ref, |p, c| p.monitor_from = Some(c)).await;
        if !offline {
            self.download(plugs).await;
        }
        self.infer_commit(plugs, checkout_ref, |p, c| p.checkout_to = Some(c)).await;
        self.infer_commit(plugs, monitor_ref, |p, c| p.monitor_to = Some(c)).await;
        self.infer_log(plugs, |p| (p.head.clone(), p.checkout_to.clone()), |p, log| {
            p.checkout_log = log
        })
        .await;
        self.infer_log(plugs, |p| (p.monitor_from.clone(), p.monitor_to.clone()), |p, log| {
            p.monitor_log = log
        })
        .await;
        self.decide(plugs);
    }

    /// Force `origin` to the declared source, or recover the source from it
    pub async fn ensure_origin_source(&self, plugs: &mut [PluginState]) {
        self.run_phase(
            plugs,
            |p| {
                p.job.command = match &p.spec.source {
                    Some(source) => commands::set_origin(source),
                    None => commands::get_origin(),
                };
            },
            |p| {
                if p.spec.source.is_none() {
                    let out = p.job.out().to_string();
                    if !out.is_empty() {
                        p.spec.source = Some(out);
                    }
                }
            },
        )
        .await;
    }

    /// Fill unset `checkout`/`monitor` with the remote default branch
    pub async fn ensure_target_refs(&self, plugs: &mut [PluginState]) {
        self.run_phase(
            plugs,
            |p| {
                if p.spec.checkout.is_none() || p.spec.monitor.is_none() {
                    p.job.command = commands::get_default_origin_branch();
                }
            },
            |p| {
                if p.job.command.is_empty() {
                    return;
                }
                match git::parse_default_branch(p.job.out()) {
                    Some(branch) => {
                        if p.spec.checkout.is_none() {
                            p.spec.checkout = Some(branch.clone());
                        }
                        if p.spec.monitor.is_none() {
                            p.spec.monitor = Some(branch);
                        }
                    }
                    None => p.job.fail("Could not determine default branch of `origin`"),
                }
            },
        )
        .await;
    }

    /// Resolve `HEAD`, unless already known in this batch
    pub async fn infer_head(&self, plugs: &mut [PluginState]) {
        self.run_phase(
            plugs,
            |p| {
                if p.head.is_none() {
                    p.job.command = commands::get_hash("HEAD");
                }
            },
            |p| {
                if p.head.is_none() {
                    let out = p.job.out().to_string();
                    if out.is_empty() {
                        p.job.fail("Could not resolve `HEAD`");
                    } else {
                        p.head = Some(out);
                    }
                }
            },
        )
        .await;
    }

    /// Resolve a ref to a commit, preferring the remote branch of that name
    ///
    /// A literal `HEAD` resolves to the current commit even though an
    /// `origin/HEAD` ref exists; this is what freezes a plugin in place.
    async fn infer_commit(&self, plugs: &mut [PluginState], ref_of: RefOf, set: SetCommit) {
        self.run_phase(
            plugs,
            |p| match ref_of(p) {
                Some(r) => p.job.command = commands::is_origin_branch(&r),
                None => p.job.fail("No target ref to resolve"),
            },
            |p| p.is_origin_branch = !p.job.out().is_empty(),
        )
        .await;

        self.run_phase(
            plugs,
            |p| {
                let Some(r) = ref_of(p) else { return };
                let target = if p.is_origin_branch && r != "HEAD" {
                    format!("origin/{}", r)
                } else {
                    r
                };
                p.job.command = commands::get_hash(&target);
            },
            |p| {
                let out = p.job.out().to_string();
                if out.is_empty() {
                    p.job.fail("Could not resolve target ref to a commit");
                } else {
                    set(p, out);
                }
            },
        )
        .await;
    }

    pub async fn download(&self, plugs: &mut [PluginState]) {
        self.run_phase(
            plugs,
            |p| {
                p.job.command = commands::fetch();
                p.job.exit_msg = Some(format!("Downloaded updates for `{}`", p.name()));
            },
            |_| {},
        )
        .await;
    }

    async fn infer_log<R, S>(&self, plugs: &mut [PluginState], range: R, set: S)
    where
        R: Fn(&PluginState) -> (Option<String>, Option<String>),
        S: Fn(&mut PluginState, String),
    {
        self.run_phase(
            plugs,
            |p| {
                if let (Some(from), Some(to)) = range(p) {
                    if from != to {
                        p.job.command = commands::log(&from, &to);
                    }
                }
            },
            |p| {
                let log = p.job.out().to_string();
                set(p, log);
            },
        )
        .await;
    }

    /// A checkout is needed when healthy and not already at the target
    pub fn decide(&self, plugs: &mut [PluginState]) {
        for p in plugs.iter_mut() {
            p.needs_checkout = p.is_ok() && p.checkout_to.is_some() && p.head != p.checkout_to;
            debug!(name = %p.name(), needs_checkout = p.needs_checkout, "Reconciler::decide");
        }
    }

    /// Stash, run change hooks, check out, and rebuild help indexes
    pub async fn checkout(&self, plugs: &mut [PluginState], opts: CheckoutOptions) {
        debug!(count = plugs.len(), ?opts, "Reconciler::checkout: called");
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.run_phase(
            plugs,
            |p| {
                if p.needs_checkout {
                    p.job.command = commands::stash(&stamp);
                }
            },
            |_| {},
        )
        .await;

        if opts.exec_hooks {
            self.run_hooks(plugs, HookEvent::PreChange, |p| p.needs_checkout).await;
        }

        self.run_phase(
            plugs,
            |p| {
                let target = p.spec.checkout.clone().unwrap_or_default();
                if p.needs_checkout {
                    if let Some(commit) = &p.checkout_to {
                        p.job.command = commands::checkout(commit);
                    }
                    p.job.exit_msg = Some(format!("Checked out `{}` in `{}`", target, p.name()));
                } else if !p.installed {
                    p.job.exit_msg = Some(format!("`{}` is already at `{}`", p.name(), target));
                }
            },
            |_| {},
        )
        .await;

        if opts.exec_hooks {
            self.run_hooks(plugs, HookEvent::PostChange, |p| p.needs_checkout).await;
        }

        for p in plugs.iter().filter(|p| p.is_ok() && (opts.all_helptags || p.needs_checkout)) {
            if let Err(e) = helptags::regenerate(&p.path.join("doc")) {
                self.notifier
                    .warn(format!("Could not regenerate help tags for `{}`: {}", p.name(), e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunOptions;
    use crate::spec::PluginSpec;
    use std::path::Path;
    use std::process::Command;
    use tempfile::tempdir;

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git").args(args).current_dir(dir).output().unwrap();
        assert!(output.status.success(), "git {:?}: {}", args, String::from_utf8_lossy(&output.stderr));
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn setup_git_repo(dir: &Path) -> String {
        fs::create_dir_all(dir).unwrap();
        git(dir, &["init", "--quiet", "-b", "main"]);
        git(dir, &["config", "user.email", "test@test.com"]);
        git(dir, &["config", "user.name", "Test"]);
        git(dir, &["commit", "--quiet", "--allow-empty", "-m", "initial"]);
        git(dir, &["rev-parse", "HEAD"])
    }

    fn reconciler(notifier: &Notifier) -> Reconciler {
        let runner = Runner::new(RunOptions::default(), notifier.clone());
        Reconciler::new(runner, notifier.clone())
    }

    fn state(name: &str, source: &Path, path: &Path) -> PluginState {
        let spec = PluginSpec {
            source: Some(source.to_string_lossy().to_string()),
            ..PluginSpec::new(name)
        };
        PluginState::new(spec, path.to_path_buf())
    }

    #[test]
    fn test_decide() {
        let notifier = Notifier::capturing(true);
        let mut same = state("same", Path::new("/src"), Path::new("/p/same"));
        same.head = Some("a".into());
        same.checkout_to = Some("a".into());
        let mut moved = state("moved", Path::new("/src"), Path::new("/p/moved"));
        moved.head = Some("a".into());
        moved.checkout_to = Some("b".into());
        let mut broken = moved.clone();
        broken.job.fail("boom");

        let mut plugs = vec![same, moved, broken];
        reconciler(&notifier).decide(&mut plugs);

        let decided: Vec<bool> = plugs.iter().map(|p| p.needs_checkout).collect();
        assert_eq!(decided, vec![false, true, false]);
    }

    #[tokio::test]
    async fn test_install_then_sync() {
        let temp = tempdir().unwrap();
        let remote = temp.path().join("remote");
        let c1 = setup_git_repo(&remote);
        let path = temp.path().join("opt").join("plug");
        let notifier = Notifier::capturing(true);
        let engine = reconciler(&notifier);

        let mut plugs = vec![state("plug", &remote, &path)];
        engine.install(&mut plugs).await;

        let p = &plugs[0];
        assert!(p.is_ok(), "{:?}", p.job.failure());
        assert!(p.installed);
        assert_eq!(p.spec.checkout.as_deref(), Some("main"));
        assert_eq!(p.spec.monitor.as_deref(), Some("main"));
        assert_eq!(p.head.as_deref(), Some(c1.as_str()));
        assert!(!p.needs_checkout);

        git(&remote, &["commit", "--quiet", "--allow-empty", "-m", "second"]);
        let c2 = git(&remote, &["rev-parse", "HEAD"]);

        let mut plugs = vec![state("plug", &remote, &path)];
        engine.sync(&mut plugs, false).await;

        let p = &plugs[0];
        assert_eq!(p.head.as_deref(), Some(c1.as_str()));
        assert_eq!(p.monitor_from.as_deref(), Some(c1.as_str()));
        assert_eq!(p.checkout_to.as_deref(), Some(c2.as_str()));
        assert_eq!(p.monitor_to.as_deref(), Some(c2.as_str()));
        assert!(p.checkout_log.contains("second"));
        assert!(p.needs_checkout);

        engine.checkout(&mut plugs, CheckoutOptions::default()).await;
        assert_eq!(git(&path, &["rev-parse", "HEAD"]), c2);
    }

    #[tokio::test]
    async fn test_failure_skips_remaining_phases() {
        let temp = tempdir().unwrap();
        let remote = temp.path().join("remote");
        setup_git_repo(&remote);
        let good_path = temp.path().join("opt").join("good");
        let notifier = Notifier::capturing(true);
        let engine = reconciler(&notifier);
        engine.install(&mut [state("good", &remote, &good_path)]).await;

        let mut plugs = vec![
            state("gone", &remote, &temp.path().join("opt").join("gone")),
            state("good", &remote, &good_path),
        ];
        engine.sync(&mut plugs, true).await;

        assert!(!plugs[0].is_ok());
        assert!(plugs[0].head.is_none());
        assert!(plugs[0].checkout_to.is_none());
        assert!(plugs[1].is_ok());
        assert!(plugs[1].head.is_some());

        engine.report_errors(&plugs, "update");
        let notices = notifier.notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.starts_with("Error in `gone` during update"));
    }

    #[tokio::test]
    async fn test_known_head_not_resolved_again() {
        let temp = tempdir().unwrap();
        let remote = temp.path().join("remote");
        setup_git_repo(&remote);
        let notifier = Notifier::capturing(true);

        let mut plugs = vec![state("plug", &remote, &remote)];
        plugs[0].head = Some("cached".into());
        reconciler(&notifier).infer_head(&mut plugs).await;

        assert_eq!(plugs[0].head.as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn test_missing_default_branch_fails_plugin() {
        let temp = tempdir().unwrap();
        // a repository without any `origin` remote
        let repo = temp.path().join("plain");
        setup_git_repo(&repo);
        let notifier = Notifier::capturing(true);

        let mut plugs = vec![PluginState::new(PluginSpec::new("plain"), repo)];
        reconciler(&notifier).ensure_target_refs(&mut plugs).await;

        assert!(!plugs[0].is_ok());
    }
}
