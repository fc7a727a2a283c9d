//! Bounded-parallel process pool

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

use super::job::{Job, JobFailure};
use crate::notify::Notifier;

/// Concurrency parameters for a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Maximum number of simultaneously running processes
    pub n_threads: usize,

    /// Deadline for each individual process
    pub timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            n_threads: default_n_threads(),
            timeout: Duration::from_millis(30_000),
        }
    }
}

/// 80% of available cores, at least one
pub fn default_n_threads() -> usize {
    let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    ((cpus as f64) * 0.8).floor().max(1.0) as usize
}

/// What happened in one batch, for diagnostics only
///
/// Per-job success or failure is never reported here; inspect the jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Processes actually spawned
    pub spawned: usize,

    /// Highest number of processes observed running at once
    pub peak_active: usize,
}

/// Runs batches of jobs as child processes
#[derive(Debug, Clone)]
pub struct Runner {
    opts: RunOptions,
    notifier: Notifier,
}

impl Runner {
    pub fn new(opts: RunOptions, notifier: Notifier) -> Self {
        debug!(?opts, "Runner::new: called");
        Self { opts, notifier }
    }

    pub fn options(&self) -> &RunOptions {
        &self.opts
    }

    /// Run every runnable job, blocking until all of them finished
    ///
    /// Jobs start in slice order as slots free up. Jobs with an empty command
    /// or an existing failure are not spawned. Exit messages of healthy jobs
    /// are delivered as each job completes.
    pub async fn run<'j, I>(&self, jobs: I) -> RunSummary
    where
        I: IntoIterator<Item = &'j mut Job>,
    {
        let mut jobs: Vec<&mut Job> = jobs.into_iter().collect();
        let total = jobs.iter().filter(|j| j.is_ok() && (!j.command.is_empty() || j.exit_msg.is_some())).count();
        debug!(jobs = jobs.len(), total, n_threads = self.opts.n_threads, "Runner::run: called");

        let semaphore = Arc::new(Semaphore::new(self.opts.n_threads.max(1)));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut set = JoinSet::new();
        let mut spawned = vec![false; jobs.len()];
        let mut finished = vec![false; jobs.len()];
        let mut done = 0;

        for idx in 0..jobs.len() {
            let job = &mut jobs[idx];
            if !job.is_runnable() {
                // Nothing to spawn, but a pending message still counts as feedback
                if job.is_ok() {
                    if let Some(msg) = job.exit_msg.take() {
                        done += 1;
                        self.notifier.info(format!("({}/{}) {}", done, total, msg));
                    }
                }
                continue;
            }

            // Finish completed jobs while waiting for a free slot
            let permit = loop {
                tokio::select! {
                    acquired = semaphore.clone().acquire_owned() => break acquired,
                    Some(joined) = set.join_next() => {
                        self.complete(&mut jobs, &mut finished, &mut done, total, joined);
                    }
                }
            };
            let permit = match permit {
                Ok(permit) => permit,
                Err(e) => {
                    warn!(error = %e, "Runner::run: semaphore closed");
                    break;
                }
            };

            let job = &jobs[idx];
            let command = job.command.clone();
            let cwd = job.cwd.clone();
            let timeout = self.opts.timeout;
            let active = active.clone();
            let peak = peak.clone();
            spawned[idx] = true;

            set.spawn(async move {
                let _permit = permit;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let outcome = execute(&command, &cwd, timeout).await;
                active.fetch_sub(1, Ordering::SeqCst);
                (idx, outcome)
            });
        }

        while let Some(joined) = set.join_next().await {
            self.complete(&mut jobs, &mut finished, &mut done, total, joined);
        }

        for (idx, job) in jobs.iter_mut().enumerate() {
            if spawned[idx] && !finished[idx] {
                job.fail("Job did not complete");
            }
        }

        let summary = RunSummary {
            spawned: spawned.iter().filter(|s| **s).count(),
            peak_active: peak.load(Ordering::SeqCst),
        };
        debug!(?summary, "Runner::run: finished");
        summary
    }

    /// Fold one finished process back into its job and deliver its message
    fn complete(
        &self,
        jobs: &mut [&mut Job],
        finished: &mut [bool],
        done: &mut usize,
        total: usize,
        joined: Result<(usize, Result<String, JobFailure>), JoinError>,
    ) {
        let (idx, outcome) = match joined {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Runner::complete: job task failed");
                return;
            }
        };
        finished[idx] = true;
        let job = &mut jobs[idx];
        match outcome {
            Ok(out) => {
                job.set_out(out);
                if let Some(msg) = job.exit_msg.take() {
                    *done += 1;
                    self.notifier.info(format!("({}/{}) {}", done, total, msg));
                }
            }
            Err(failure) => {
                debug!(name = %job.name, %failure, "Runner::complete: job failed");
                job.set_failure(failure);
            }
        }
    }
}

/// Spawn one process and collect its output
async fn execute(command: &[String], cwd: &Path, timeout: Duration) -> Result<String, JobFailure> {
    let Some((program, args)) = command.split_first() else {
        return Ok(String::new());
    };
    debug!(%program, ?args, ?cwd, "execute: called");

    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => return Err(JobFailure::new(format!("Failed to spawn `{}`: {}", program, e))),
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) if output.status.success() => Ok(String::from_utf8_lossy(&output.stdout).into_owned()),
        Ok(Ok(output)) => {
            let mut failure = JobFailure::default();
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                failure.push(stderr.trim_end().to_string());
            }
            match output.status.code() {
                Some(code) => failure.prepend(format!("Process exited with code {}", code)),
                None => failure.prepend("Process terminated by signal"),
            }
            Err(failure)
        }
        Ok(Err(e)) => Err(JobFailure::new(format!("Failed to wait for `{}`: {}", program, e))),
        Err(_) => Err(JobFailure::new(format!(
            "Process timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    fn runner(n_threads: usize, timeout_ms: u64) -> Runner {
        Runner::new(
            RunOptions {
                n_threads,
                timeout: Duration::from_millis(timeout_ms),
            },
            Notifier::capturing(false),
        )
    }

    #[test]
    fn test_default_n_threads_at_least_one() {
        assert!(default_n_threads() >= 1);
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let temp = tempdir().unwrap();
        let mut job = Job::new("a", temp.path());
        job.command = sh("echo hello");

        let summary = runner(2, 5_000).run([&mut job]).await;

        assert_eq!(summary.spawned, 1);
        assert_eq!(job.out(), "hello");
    }

    #[tokio::test]
    async fn test_runs_in_cwd() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("marker.txt"), "x").unwrap();
        let mut job = Job::new("a", temp.path());
        job.command = sh("ls");

        runner(1, 5_000).run([&mut job]).await;

        assert!(job.out().contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_prepends_code_and_isolates_failure() {
        let temp = tempdir().unwrap();
        let mut bad = Job::new("bad", temp.path());
        bad.command = sh("echo oops >&2; exit 3");
        let mut good = Job::new("good", temp.path());
        good.command = sh("echo fine");

        runner(2, 5_000).run([&mut bad, &mut good]).await;

        let failure = bad.failure().expect("bad job should fail");
        assert_eq!(failure.lines()[0], "Process exited with code 3");
        assert!(failure.to_string().contains("oops"));
        assert_eq!(good.out(), "fine");
    }

    #[tokio::test]
    async fn test_stderr_on_success_is_not_failure() {
        let temp = tempdir().unwrap();
        let mut job = Job::new("a", temp.path());
        job.command = sh("echo warning >&2; echo ok");

        runner(1, 5_000).run([&mut job]).await;

        assert!(job.is_ok());
        assert_eq!(job.out(), "ok");
    }

    #[tokio::test]
    async fn test_spawn_failure_recorded() {
        let temp = tempdir().unwrap();
        let mut job = Job::new("a", temp.path());
        job.command = vec!["definitely-not-a-real-binary-xyz".into()];

        runner(1, 5_000).run([&mut job]).await;

        assert!(job.failure().unwrap().to_string().starts_with("Failed to spawn"));
    }

    #[tokio::test]
    async fn test_timeout_kills_and_records() {
        let temp = tempdir().unwrap();
        let mut job = Job::new("slow", temp.path());
        job.command = sh("sleep 5");

        let started = std::time::Instant::now();
        runner(1, 200).run([&mut job]).await;

        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(job.failure().unwrap().to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_failed_job_short_circuits() {
        let temp = tempdir().unwrap();
        let marker = temp.path().join("spawned");
        let mut job = Job::new("a", temp.path());
        job.fail("earlier failure");
        job.command = sh(&format!("touch {}", marker.display()));

        let summary = runner(1, 5_000).run([&mut job]).await;

        assert_eq!(summary.spawned, 0);
        assert!(!marker.exists());
        assert_eq!(job.out(), "");
        assert_eq!(job.failure().unwrap().to_string(), "earlier failure");
    }

    #[tokio::test]
    async fn test_concurrency_limit_respected() {
        let temp = tempdir().unwrap();
        let mut jobs: Vec<Job> = (0..6)
            .map(|i| {
                let mut job = Job::new(format!("j{}", i), temp.path());
                job.command = sh("sleep 0.2");
                job
            })
            .collect();

        let summary = runner(2, 5_000).run(jobs.iter_mut()).await;

        assert_eq!(summary.spawned, 6);
        assert!(summary.peak_active <= 2);
        assert!(jobs.iter().all(|j| j.is_ok()));
    }

    #[tokio::test]
    async fn test_exit_message_delivered_while_waiting_for_slot() {
        let temp = tempdir().unwrap();
        let notifier = Notifier::capturing(false);
        let runner = Runner::new(
            RunOptions {
                n_threads: 1,
                timeout: Duration::from_millis(5_000),
            },
            notifier.clone(),
        );

        let mut quick = Job::new("quick", temp.path());
        quick.command = sh("true");
        quick.exit_msg = Some("quick done".into());
        let mut slow = Job::new("slow", temp.path());
        slow.command = sh("sleep 1");
        let mut last = Job::new("last", temp.path());
        last.command = sh("true");

        let observer = async {
            tokio::time::sleep(Duration::from_millis(400)).await;
            notifier.notices().len()
        };
        let (_, seen_mid_batch) = tokio::join!(runner.run([&mut quick, &mut slow, &mut last]), observer);

        // `last` still waits behind `slow`, yet `quick` already reported
        assert_eq!(seen_mid_batch, 1);
        assert!(last.is_ok());
    }

    #[tokio::test]
    async fn test_exit_messages_delivered() {
        let temp = tempdir().unwrap();
        let notifier = Notifier::capturing(false);
        let runner = Runner::new(RunOptions::default(), notifier.clone());

        let mut spawned = Job::new("a", temp.path());
        spawned.command = sh("true");
        spawned.exit_msg = Some("Installed `a`".into());
        let mut noop = Job::new("b", temp.path());
        noop.exit_msg = Some("`b` is up to date".into());

        runner.run([&mut spawned, &mut noop]).await;

        let messages: Vec<String> = notifier.notices().into_iter().map(|n| n.message).collect();
        assert!(messages.iter().any(|m| m.ends_with("Installed `a`")));
        assert!(messages.iter().any(|m| m.ends_with("`b` is up to date")));
    }
}
