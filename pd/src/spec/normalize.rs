//! Plugin declarations and their normalization into specs

use std::sync::LazyLock;

use regex::Regex;
use serde_yaml::Value;
use tracing::{debug, warn};

use super::hooks::{Hook, HookEvent, Hooks};
use crate::error::DepsError;

static SHORTHAND_SOURCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w-]+/[\w.-]+$").expect("shorthand source regex is valid"));

/// A validated plugin specification with defaults applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginSpec {
    /// Directory basename, unique within a session
    pub name: String,

    /// Clone URI; only required to install a plugin that is not on disk
    pub source: Option<String>,

    /// Ref to reconcile the working tree to; `None` means the remote default branch
    pub checkout: Option<String>,

    /// Ref to watch for upstream changes; `None` means the remote default branch
    pub monitor: Option<String>,

    /// Names of direct dependencies
    pub depends: Vec<String>,

    pub hooks: Hooks,
}

impl PluginSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Fold a later registration of the same plugin into this one
    ///
    /// Set fields of `later` win, unset ones keep ours. Hooks merge per
    /// event and dependency names are concatenated without duplicates.
    pub fn merge(&mut self, later: PluginSpec) {
        debug!(name = %self.name, "PluginSpec::merge: called");
        if later.source.is_some() {
            self.source = later.source;
        }
        if later.checkout.is_some() {
            self.checkout = later.checkout;
        }
        if later.monitor.is_some() {
            self.monitor = later.monitor;
        }
        for dep in later.depends {
            if !self.depends.contains(&dep) {
                self.depends.push(dep);
            }
        }
        self.hooks.merge(later.hooks);
    }
}

/// Explicit declaration table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginTable {
    pub source: Option<String>,
    pub name: Option<String>,
    pub checkout: Option<String>,
    pub monitor: Option<String>,
    pub depends: Vec<PluginDecl>,
    pub hooks: Hooks,
}

/// User input describing a plugin: a bare string or a table
#[derive(Debug, Clone, PartialEq)]
pub enum PluginDecl {
    /// `owner/repo`, a URI or a path when it contains `/`; a plugin name otherwise
    Short(String),
    Table(PluginTable),
}

impl From<&str> for PluginDecl {
    fn from(s: &str) -> Self {
        PluginDecl::Short(s.to_string())
    }
}

impl From<String> for PluginDecl {
    fn from(s: String) -> Self {
        PluginDecl::Short(s)
    }
}

impl From<PluginTable> for PluginDecl {
    fn from(table: PluginTable) -> Self {
        PluginDecl::Table(table)
    }
}

impl From<PluginSpec> for PluginDecl {
    fn from(spec: PluginSpec) -> Self {
        PluginDecl::Table(PluginTable {
            source: spec.source,
            name: Some(spec.name),
            checkout: spec.checkout,
            monitor: spec.monitor,
            depends: spec.depends.into_iter().map(PluginDecl::Short).collect(),
            hooks: spec.hooks,
        })
    }
}

fn qualify(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

fn string_field(value: &Value, field: String) -> Result<Option<String>, DepsError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err(DepsError::invalid(field, "string")),
    }
}

impl PluginDecl {
    /// Parse a declaration from a configuration value
    pub fn from_value(value: &Value) -> Result<Self, DepsError> {
        Self::from_value_at(value, "")
    }

    /// Parse a declaration, qualifying error fields with `prefix`
    pub fn from_value_at(value: &Value, prefix: &str) -> Result<Self, DepsError> {
        debug!(%prefix, "PluginDecl::from_value_at: called");
        let map = match value {
            Value::String(s) => return Ok(PluginDecl::Short(s.clone())),
            Value::Mapping(map) => map,
            _ => {
                let field = if prefix.is_empty() { "spec" } else { prefix };
                return Err(DepsError::invalid(field, "string or table"));
            }
        };

        let mut table = PluginTable::default();
        for (key, val) in map {
            let Some(key) = key.as_str() else {
                return Err(DepsError::invalid(qualify(prefix, "<key>"), "string key"));
            };
            match key {
                "source" => table.source = string_field(val, qualify(prefix, key))?,
                "name" => table.name = string_field(val, qualify(prefix, key))?,
                "checkout" => table.checkout = string_field(val, qualify(prefix, key))?,
                "monitor" | "track" => table.monitor = string_field(val, qualify(prefix, key))?,
                "depends" => {
                    let items = match val {
                        Value::Null => continue,
                        Value::Sequence(items) => items,
                        _ => return Err(DepsError::invalid(qualify(prefix, key), "array")),
                    };
                    for (i, item) in items.iter().enumerate() {
                        let item_prefix = format!("{}[{}]", qualify(prefix, key), i);
                        table.depends.push(PluginDecl::from_value_at(item, &item_prefix)?);
                    }
                }
                "hooks" => {
                    let hooks = match val {
                        Value::Null => continue,
                        Value::Mapping(hooks) => hooks,
                        _ => return Err(DepsError::invalid(qualify(prefix, key), "table")),
                    };
                    for (hook_key, hook_val) in hooks {
                        let hook_key = hook_key.as_str().unwrap_or_default();
                        let field = qualify(&qualify(prefix, "hooks"), hook_key);
                        let event = HookEvent::from_key(hook_key)
                            .ok_or_else(|| DepsError::invalid(field.clone(), "a known hook name"))?;
                        match hook_val {
                            Value::String(script) => table.hooks.set(event, Hook::Command(script.clone())),
                            _ => return Err(DepsError::invalid(field, "string command")),
                        }
                    }
                }
                other => warn!(field = %qualify(prefix, other), "Ignoring unknown plugin field"),
            }
        }
        Ok(PluginDecl::Table(table))
    }
}

/// Rewrite `owner/repo` into a full GitHub URI; other sources pass through
pub fn expand_source(source: &str) -> String {
    if SHORTHAND_SOURCE.is_match(source) {
        format!("https://github.com/{}", source)
    } else {
        source.to_string()
    }
}

fn name_from_source(source: &str) -> Option<String> {
    source
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn validate_name(name: &str, field: String) -> Result<(), DepsError> {
    let bad = name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\');
    if bad {
        return Err(DepsError::invalid(field, "non-empty directory basename"));
    }
    Ok(())
}

fn non_empty(value: Option<String>, field: String) -> Result<Option<String>, DepsError> {
    match value {
        Some(s) if s.is_empty() => Err(DepsError::invalid(field, "non-empty string")),
        other => Ok(other),
    }
}

/// Validate a declaration and flatten it with its dependencies
///
/// Dependencies come before the plugin that needs them, depth first; the
/// declared plugin is always the last element.
pub fn normalize(decl: impl Into<PluginDecl>) -> Result<Vec<PluginSpec>, DepsError> {
    let mut out = Vec::new();
    normalize_into(decl.into(), "", &mut out)?;
    Ok(out)
}

fn normalize_into(decl: PluginDecl, prefix: &str, out: &mut Vec<PluginSpec>) -> Result<String, DepsError> {
    let table = match decl {
        PluginDecl::Short(s) if s.contains('/') => PluginTable {
            source: Some(s),
            ..Default::default()
        },
        PluginDecl::Short(s) => PluginTable {
            name: Some(s),
            ..Default::default()
        },
        PluginDecl::Table(table) => table,
    };

    let source = non_empty(table.source, qualify(prefix, "source"))?.map(|s| expand_source(&s));
    let name = match table.name {
        Some(name) => name,
        None => source
            .as_deref()
            .and_then(name_from_source)
            .ok_or_else(|| DepsError::invalid(qualify(prefix, "name"), "string (could not infer it from `source`)"))?,
    };
    validate_name(&name, qualify(prefix, "name"))?;

    let checkout = non_empty(table.checkout, qualify(prefix, "checkout"))?;
    let monitor = non_empty(table.monitor, qualify(prefix, "monitor"))?;

    let mut depends = Vec::new();
    for (i, dep) in table.depends.into_iter().enumerate() {
        let dep_prefix = format!("{}[{}]", qualify(prefix, "depends"), i);
        let dep_name = normalize_into(dep, &dep_prefix, out)?;
        if !depends.contains(&dep_name) {
            depends.push(dep_name);
        }
    }

    debug!(%name, ?source, deps = depends.len(), "normalize_into: normalized");
    out.push(PluginSpec {
        name: name.clone(),
        source,
        checkout,
        monitor,
        depends,
        hooks: table.hooks,
    });
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_shorthand_source_expanded_and_named() {
        let specs = normalize("user/repo").unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "repo");
        assert_eq!(specs[0].source.as_deref(), Some("https://github.com/user/repo"));
        assert_eq!(specs[0].checkout, None);
        assert_eq!(specs[0].monitor, None);
    }

    #[test]
    fn test_bare_name() {
        let specs = normalize("telescope").unwrap();
        assert_eq!(specs[0].name, "telescope");
        assert_eq!(specs[0].source, None);
    }

    #[test]
    fn test_full_uri_passes_through() {
        let specs = normalize("https://gitlab.com/group/sub/tool.git").unwrap();
        assert_eq!(specs[0].source.as_deref(), Some("https://gitlab.com/group/sub/tool.git"));
        assert_eq!(specs[0].name, "tool.git");
    }

    #[test]
    fn test_local_path_source() {
        let specs = normalize("/tmp/remotes/plug").unwrap();
        assert_eq!(specs[0].source.as_deref(), Some("/tmp/remotes/plug"));
        assert_eq!(specs[0].name, "plug");
    }

    #[test]
    fn test_name_required_without_source() {
        let err = normalize(PluginTable::default()).unwrap_err();
        assert!(matches!(err, DepsError::InvalidField { ref field, .. } if field == "name"));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let table = PluginTable {
            name: Some("..".into()),
            ..Default::default()
        };
        assert!(normalize(table).is_err());
    }

    #[test]
    fn test_depends_flattened_first() {
        let table = PluginTable {
            source: Some("user/parent".into()),
            depends: vec![
                PluginDecl::Table(PluginTable {
                    source: Some("user/mid".into()),
                    depends: vec!["user/leaf".into()],
                    ..Default::default()
                }),
                "user/other".into(),
            ],
            ..Default::default()
        };

        let names: Vec<String> = normalize(table).unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["leaf", "mid", "other", "parent"]);
    }

    #[test]
    fn test_parent_records_direct_dependency_names() {
        let table = PluginTable {
            source: Some("user/parent".into()),
            depends: vec!["user/a".into(), "user/b".into()],
            ..Default::default()
        };
        let specs = normalize(table).unwrap();
        assert_eq!(specs.last().unwrap().depends, vec!["a", "b"]);
    }

    #[test]
    fn test_from_value_table() {
        let value = yaml(
            r#"
source: user/repo
checkout: v1.0
track: main
hooks:
  post_create: make
  post_change: make
depends:
  - user/dep
"#,
        );
        let specs = normalize(PluginDecl::from_value(&value).unwrap()).unwrap();
        let spec = specs.last().unwrap();
        assert_eq!(spec.checkout.as_deref(), Some("v1.0"));
        assert_eq!(spec.monitor.as_deref(), Some("main"));
        assert_eq!(spec.hooks.get(HookEvent::PostInstall), Some(&Hook::Command("make".into())));
        assert_eq!(specs[0].name, "dep");
    }

    #[test]
    fn test_from_value_rejects_bad_depends() {
        let err = PluginDecl::from_value(&yaml("{source: user/repo, depends: user/dep}")).unwrap_err();
        assert_eq!(err.to_string(), "`depends` should be array");
    }

    #[test]
    fn test_from_value_rejects_non_string_hook() {
        let err = PluginDecl::from_value(&yaml("{source: user/repo, hooks: {post_change: 3}}")).unwrap_err();
        assert_eq!(err.to_string(), "`hooks.post_change` should be string command");
    }

    #[test]
    fn test_from_value_rejects_unknown_hook() {
        let err = PluginDecl::from_value(&yaml("{source: user/repo, hooks: {post_build: make}}")).unwrap_err();
        assert!(err.to_string().contains("hooks.post_build"));
    }

    #[test]
    fn test_from_value_nested_field_path() {
        let err = PluginDecl::from_value_at(&yaml("{source: user/repo, depends: [{checkout: 5}]}"), "plugins[1]")
            .unwrap_err();
        assert_eq!(err.to_string(), "`plugins[1].depends[0].checkout` should be string");
    }

    #[test]
    fn test_from_value_rejects_number() {
        let err = PluginDecl::from_value(&yaml("42")).unwrap_err();
        assert_eq!(err.to_string(), "`spec` should be string or table");
    }

    #[test]
    fn test_merge_prefers_latest_and_concatenates_depends() {
        let mut first = PluginSpec {
            name: "p".into(),
            source: Some("https://github.com/user/p".into()),
            checkout: Some("main".into()),
            depends: vec!["a".into()],
            ..Default::default()
        };
        first.merge(PluginSpec {
            name: "p".into(),
            checkout: Some("v2".into()),
            depends: vec!["a".into(), "b".into()],
            ..Default::default()
        });

        assert_eq!(first.source.as_deref(), Some("https://github.com/user/p"));
        assert_eq!(first.checkout.as_deref(), Some("v2"));
        assert_eq!(first.depends, vec!["a", "b"]);
    }

    fn decl_strategy() -> impl Strategy<Value = PluginDecl> {
        let leaf = prop_oneof![
            "[a-z]{1,6}/[a-z]{1,6}".prop_map(PluginDecl::Short),
            "[a-z]{1,8}".prop_map(PluginDecl::Short),
        ]
        .boxed();
        (
            leaf.clone(),
            proptest::option::of("[a-z]{1,6}"),
            proptest::option::of("[a-z]{1,6}"),
            proptest::collection::vec(leaf, 0..3),
        )
            .prop_map(|(base, checkout, monitor, depends)| {
                let source = match base {
                    PluginDecl::Short(s) => s,
                    PluginDecl::Table(_) => unreachable!(),
                };
                let (source, name) = if source.contains('/') {
                    (Some(source), None)
                } else {
                    (None, Some(source))
                };
                PluginDecl::Table(PluginTable {
                    source,
                    name,
                    checkout,
                    monitor,
                    depends,
                    hooks: Hooks::new(),
                })
            })
    }

    proptest! {
        #[test]
        fn proptest_normalize_is_idempotent(decl in decl_strategy()) {
            let once = normalize(decl).unwrap();
            let spec = once.last().unwrap().clone();
            let twice = normalize(PluginDecl::from(spec.clone())).unwrap();
            prop_assert_eq!(twice.last().unwrap(), &spec);
        }
    }
}
