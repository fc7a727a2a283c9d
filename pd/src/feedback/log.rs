//! Append-only update log

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use tracing::debug;

/// Append a timestamped section to the log file, creating it when needed
pub fn append_section(path: &Path, title: &str, body: &str) -> io::Result<()> {
    debug!(?path, %title, "append_section: called");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "========== {} {} ==========", title, stamp)?;
    writeln!(file, "{}", body.trim_end())?;
    writeln!(file)?;
    file.flush()
}

/// Last `lines` lines of the log, or all of it
pub fn tail(path: &Path, lines: Option<usize>) -> io::Result<String> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(String::new()),
        Err(e) => return Err(e),
    };
    let Some(n) = lines else {
        return Ok(content);
    };
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(n);
    Ok(all[start..].join("\n"))
}
