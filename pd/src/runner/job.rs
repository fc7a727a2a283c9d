//! Job - one process execution unit bound to a plugin directory

use std::fmt;
use std::path::PathBuf;

use tracing::debug;

/// Accumulated failure text of a job
///
/// Spawn failures, non-zero exits and timeouts all land here as plain lines;
/// callers only ask whether a failure exists and what it says.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFailure {
    lines: Vec<String>,
}

impl JobFailure {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
        }
    }

    /// Put a line in front so it is read first
    pub fn prepend(&mut self, line: impl Into<String>) {
        self.lines.insert(0, line.into());
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines.join("\n").trim_end())
    }
}

/// A process execution unit reused across the phases of one batch
///
/// `state` holds the stdout of the current phase while the job is healthy.
/// Once it turns into `Err`, it stays there: every later phase skips this job
/// without spawning anything.
#[derive(Debug, Clone)]
pub struct Job {
    /// Plugin name, used in progress messages
    pub name: String,

    /// Working directory for the command
    pub cwd: PathBuf,

    /// Argument vector; empty means "nothing to run this phase"
    pub command: Vec<String>,

    /// Message delivered when the phase finishes for this job
    pub exit_msg: Option<String>,

    state: Result<String, JobFailure>,
}

impl Job {
    pub fn new(name: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            cwd: cwd.into(),
            command: Vec::new(),
            exit_msg: None,
            state: Ok(String::new()),
        }
    }

    /// Clear per-phase fields; a recorded failure is preserved
    pub fn reset(&mut self) {
        self.command.clear();
        self.exit_msg = None;
        if let Ok(out) = &mut self.state {
            out.clear();
        }
    }

    pub fn is_ok(&self) -> bool {
        self.state.is_ok()
    }

    /// Whether the runner should spawn a process for this job
    pub fn is_runnable(&self) -> bool {
        self.is_ok() && !self.command.is_empty()
    }

    /// Stdout of the last phase, or the sticky failure
    pub fn result(&self) -> Result<&str, &JobFailure> {
        self.state.as_ref().map(|s| s.as_str())
    }

    /// Trimmed stdout of the last phase; empty when failed
    pub fn out(&self) -> &str {
        match &self.state {
            Ok(out) => out.trim(),
            Err(_) => "",
        }
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        self.state.as_ref().err()
    }

    pub fn set_out(&mut self, out: String) {
        if self.state.is_ok() {
            self.state = Ok(out);
        }
    }

    /// Record a failure line; appended when a failure already exists
    pub fn fail(&mut self, line: impl Into<String>) {
        let line = line.into();
        debug!(name = %self.name, %line, "Job::fail: called");
        match &mut self.state {
            Ok(_) => self.state = Err(JobFailure::new(line)),
            Err(failure) => failure.push(line),
        }
    }

    pub fn set_failure(&mut self, failure: JobFailure) {
        self.state = Err(failure);
    }

    /// Drop the sticky failure so the job can run again
    pub fn clear_failure(&mut self) {
        self.state = Ok(String::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_preserves_failure() {
        let mut job = Job::new("a", "/tmp");
        job.command = vec!["git".into(), "status".into()];
        job.fail("boom");
        job.reset();

        assert!(job.command.is_empty());
        assert!(!job.is_ok());
        assert_eq!(job.failure().unwrap().to_string(), "boom");
    }

    #[test]
    fn test_failed_job_not_runnable() {
        let mut job = Job::new("a", "/tmp");
        job.command = vec!["true".into()];
        assert!(job.is_runnable());

        job.fail("earlier phase failed");
        assert!(!job.is_runnable());
    }

    #[test]
    fn test_set_out_ignored_after_failure() {
        let mut job = Job::new("a", "/tmp");
        job.fail("x");
        job.set_out("late output".into());
        assert_eq!(job.out(), "");
    }

    #[test]
    fn test_failure_prepend_order() {
        let mut failure = JobFailure::new("fatal: repository not found");
        failure.prepend("Process exited with code 128");
        assert_eq!(failure.lines()[0], "Process exited with code 128");
        assert_eq!(
            failure.to_string(),
            "Process exited with code 128\nfatal: repository not found"
        );
    }

    #[test]
    fn test_clear_failure() {
        let mut job = Job::new("a", "/tmp");
        job.fail("x");
        job.clear_failure();
        assert!(job.is_ok());
        assert_eq!(job.result(), Ok(""));
    }
}
