//! Help index (`doc/tags`) regeneration

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

fn parse_tag(token: &str) -> Option<&str> {
    let inner = token.strip_prefix('*')?.strip_suffix('*')?;
    if inner.is_empty() || inner.contains('*') || inner.contains('|') {
        return None;
    }
    Some(inner)
}

fn escape_pattern(tag: &str) -> String {
    tag.replace('\\', "\\\\").replace('/', "\\/")
}

/// Rebuild `<doc_dir>/tags` from the `*tag*` anchors of `doc/**/*.txt`
///
/// The old index is always removed first. Returns the number of tags
/// written; zero with no index file when no help files remain.
pub fn regenerate(doc_dir: &Path) -> io::Result<usize> {
    debug!(?doc_dir, "helptags::regenerate: called");
    let index = doc_dir.join("tags");
    if index.exists() {
        fs::remove_file(&index)?;
    }
    if !doc_dir.is_dir() {
        return Ok(0);
    }

    let pattern = format!("{}/**/*.txt", glob::Pattern::escape(&doc_dir.to_string_lossy()));
    let mut files: Vec<_> = glob::glob(&pattern)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
        .filter_map(|entry| entry.ok())
        .collect();
    files.sort();
    if files.is_empty() {
        debug!("helptags::regenerate: no help files");
        return Ok(0);
    }

    let mut tags: Vec<(String, String)> = Vec::new();
    for file in &files {
        let rel = file.strip_prefix(doc_dir).unwrap_or(file).to_string_lossy().replace('\\', "/");
        let content = String::from_utf8_lossy(&fs::read(file)?).into_owned();
        for token in content.split_whitespace() {
            if let Some(tag) = parse_tag(token) {
                tags.push((tag.to_string(), rel.clone()));
            }
        }
    }

    tags.sort_by(|a, b| a.0.cmp(&b.0));
    let mut lines = Vec::with_capacity(tags.len());
    let mut last: Option<&str> = None;
    for (tag, file) in &tags {
        if last == Some(tag.as_str()) {
            warn!(%tag, %file, ?doc_dir, "Duplicate help tag");
            continue;
        }
        last = Some(tag.as_str());
        lines.push(format!("{}\t{}\t/*{}*", tag, file, escape_pattern(tag)));
    }

    let mut body = lines.join("\n");
    body.push('\n');
    fs::write(&index, body)?;
    Ok(lines.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_tag() {
        assert_eq!(parse_tag("*plug.txt*"), Some("plug.txt"));
        assert_eq!(parse_tag("*a/b*"), Some("a/b"));
        assert_eq!(parse_tag("**"), None);
        assert_eq!(parse_tag("*a*b*"), None);
        assert_eq!(parse_tag("*bold*,"), None);
        assert_eq!(parse_tag("plain"), None);
    }

    #[test]
    fn test_regenerate_writes_sorted_index() {
        let temp = tempdir().unwrap();
        let doc = temp.path().join("doc");
        fs::create_dir_all(&doc).unwrap();
        fs::write(doc.join("plug.txt"), "*plug.txt*  Plugin\n\n*plug-usage* *plug-setup*\nsee |plug-usage|\n").unwrap();

        let count = regenerate(&doc).unwrap();

        assert_eq!(count, 3);
        let index = fs::read_to_string(doc.join("tags")).unwrap();
        let lines: Vec<&str> = index.lines().collect();
        assert_eq!(lines[0], "plug-setup\tplug.txt\t/*plug-setup*");
        assert_eq!(lines[1], "plug-usage\tplug.txt\t/*plug-usage*");
        assert_eq!(lines[2], "plug.txt\tplug.txt\t/*plug.txt*");
    }

    #[test]
    fn test_duplicates_dropped() {
        let temp = tempdir().unwrap();
        let doc = temp.path().join("doc");
        fs::create_dir_all(&doc).unwrap();
        fs::write(doc.join("a.txt"), "*same*\n").unwrap();
        fs::write(doc.join("b.txt"), "*same*\n").unwrap();

        assert_eq!(regenerate(&doc).unwrap(), 1);
        let index = fs::read_to_string(doc.join("tags")).unwrap();
        assert_eq!(index, "same\ta.txt\t/*same*\n");
    }

    #[test]
    fn test_index_removed_when_no_help_files() {
        let temp = tempdir().unwrap();
        let doc = temp.path().join("doc");
        fs::create_dir_all(&doc).unwrap();
        fs::write(doc.join("tags"), "stale\tx.txt\t/*stale*\n").unwrap();

        assert_eq!(regenerate(&doc).unwrap(), 0);
        assert!(!doc.join("tags").exists());
    }

    #[test]
    fn test_missing_doc_dir() {
        let temp = tempdir().unwrap();
        assert_eq!(regenerate(&temp.path().join("doc")).unwrap(), 0);
    }
}
