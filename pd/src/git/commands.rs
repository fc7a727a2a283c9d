//! Git argument vectors
//!
//! Every function here is pure: same input, same argument vector. Nothing
//! touches the file system or spawns a process.

use std::path::Path;

fn git(args: &[&str]) -> Vec<String> {
    std::iter::once("git").chain(args.iter().copied()).map(String::from).collect()
}

/// Shallow-history clone with blob filtering and recursive submodules
pub fn clone(source: &str, path: &Path) -> Vec<String> {
    let path = path.to_string_lossy();
    git(&[
        "clone",
        "--quiet",
        "--filter=blob:none",
        "--recurse-submodules",
        "--also-filter-submodules",
        "--origin",
        "origin",
        source,
        &path,
    ])
}

/// Stash local changes, labelled with a timestamp
pub fn stash(timestamp: &str) -> Vec<String> {
    let message = format!("(plugdeps) {} Stash before checkout", timestamp);
    git(&["stash", "--quiet", "--message", &message])
}

pub fn checkout(target: &str) -> Vec<String> {
    git(&["checkout", "--quiet", target])
}

/// Fetch from origin, forcing tag updates and recursing into submodules
pub fn fetch() -> Vec<String> {
    git(&["fetch", "--quiet", "--tags", "--force", "--recurse-submodules=yes", "origin"])
}

pub fn set_origin(source: &str) -> Vec<String> {
    git(&["remote", "set-url", "origin", source])
}

pub fn get_origin() -> Vec<String> {
    git(&["remote", "get-url", "origin"])
}

/// Default branch of the remote, printed as `origin/<branch>`
pub fn get_default_origin_branch() -> Vec<String> {
    git(&["rev-parse", "--abbrev-ref", "origin/HEAD"])
}

/// Lists `origin/<name>` when it is a known remote branch, nothing otherwise
pub fn is_origin_branch(name: &str) -> Vec<String> {
    let pattern = format!("origin/{}", name);
    git(&["branch", "--list", "--remotes", "--format=%(refname:short)", &pattern])
}

/// Resolve a ref to the commit it points to
///
/// `rev-list` peels annotated tags to their commit; `rev-parse` would return
/// the tag object instead.
pub fn get_hash(rev: &str) -> Vec<String> {
    git(&["rev-list", "-1", rev])
}

/// Symmetric-difference log between two refs, decorated with tags only
pub fn log(from: &str, to: &str) -> Vec<String> {
    let range = format!("{}...{}", from, to);
    git(&[
        "log",
        "--pretty=format:%m %h | %ai | %an%d%n  %s%n",
        "--topo-order",
        "--decorate-refs=refs/tags",
        &range,
    ])
}

/// Strip the `origin/` prefix from `get_default_origin_branch` output
pub fn parse_default_branch(out: &str) -> Option<String> {
    let branch = out.trim().strip_prefix("origin/").unwrap_or(out.trim());
    if branch.is_empty() || branch == "HEAD" {
        None
    } else {
        Some(branch.to_string())
    }
}
