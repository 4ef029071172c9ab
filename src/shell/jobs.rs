//! Background jobs started with a trailing `&`
//!
//! Jobs run without a terminal, in their own process group, with their
//! output discarded. They are not terminated when the application quits.

use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};

#[derive(Debug)]
pub struct Job {
    pub command: String,
    child: Child,
    finished: Option<i32>,
}

impl Job {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn is_running(&mut self) -> bool {
        if self.finished.is_none() {
            if let Ok(Some(status)) = self.child.try_wait() {
                self.finished = Some(status.code().unwrap_or(-1));
            }
        }
        self.finished.is_none()
    }
}

#[derive(Debug, Default)]
pub struct JobList {
    jobs: Vec<Job>,
}

impl JobList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `program args..` in the background; returns the pid
    pub fn spawn(&mut self, program: &Path, args: &[String], command: &str, cwd: &Path) -> io::Result<u32> {
        if command.trim().is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
        }
        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()?;
        let pid = child.id();
        tracing::info!("Background job {} started: {}", pid, command);
        self.jobs.push(Job {
            command: command.to_string(),
            child,
            finished: None,
        });
        Ok(pid)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Lines printed by `jobs`
    pub fn report(&mut self) -> Vec<String> {
        if self.jobs.is_empty() {
            return vec!["[System] No background processes running".to_string()];
        }
        let mut lines = vec![format!(
            "[System] {} background process(es) running",
            self.jobs.len()
        )];
        for (i, job) in self.jobs.iter_mut().enumerate() {
            let status = if job.is_running() { "running" } else { "finished" };
            lines.push(format!("  [{}] PID {} - {}", i + 1, job.pid(), status));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn sh(jobs: &mut JobList, command: &str) -> u32 {
        let args = vec!["-c".to_string(), command.to_string()];
        jobs.spawn(Path::new("/bin/sh"), &args, command, &std::env::temp_dir())
            .unwrap()
    }

    #[test]
    fn test_empty_report() {
        let mut jobs = JobList::new();
        assert_eq!(jobs.report(), vec!["[System] No background processes running"]);
    }

    #[test]
    fn test_jobs_report_running_and_finished() {
        let mut jobs = JobList::new();
        let quick = sh(&mut jobs, "exit 0");
        let slow = sh(&mut jobs, "sleep 5");

        let deadline = Instant::now() + Duration::from_secs(5);
        while jobs.jobs[0].is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        let report = jobs.report();
        assert_eq!(report[0], "[System] 2 background process(es) running");
        assert_eq!(report[1], format!("  [1] PID {} - finished", quick));
        assert_eq!(report[2], format!("  [2] PID {} - running", slow));

        let _ = jobs.jobs[1].child.kill();
        let _ = jobs.jobs[1].child.wait();
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let mut jobs = JobList::new();
        let err = jobs
            .spawn(Path::new("/bin/sh"), &[], "  ", &std::env::temp_dir())
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(jobs.is_empty());
    }
}
