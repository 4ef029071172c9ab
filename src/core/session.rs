//! Session management
//!
//! A [`Session`] owns exactly one child process attached to a PTY and is
//! polled from the main loop. Process creation goes through the
//! [`Launcher`] seam so the mode controller can be driven by scripted
//! children in tests.

use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::pty::{PtyError, ReadOutcome, UnixPty};

/// Upper bound on bytes drained from a session in a single poll
const MAX_POLL_BYTES: usize = 64 * 1024;

/// Words the shell handles itself; they never resolve on PATH
const SHELL_WORDS: &[&str] = &[
    "!", ".", ":", "[", "[[", "{", "(", "alias", "bg", "break", "builtin", "case", "cd",
    "command", "continue", "declare", "echo", "eval", "exec", "exit", "export", "false", "fg",
    "for", "function", "getopts", "hash", "if", "kill", "let", "local", "printf", "pushd",
    "popd", "read", "readonly", "return", "select", "set", "shift", "source", "test", "time",
    "trap", "true", "type", "typeset", "ulimit", "umask", "unalias", "unset", "until", "wait",
    "while",
];

#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("empty command")]
    EmptyCommand,

    #[error(transparent)]
    Pty(#[from] PtyError),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    #[error("I/O error: {0}")]
    Io(#[source] PtyError),

    #[error("session is not running")]
    NotRunning,
}

/// Process side of a session: anything that reads and writes like a PTY
pub trait PtyBackend {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, PtyError>;
    fn write_all(&mut self, data: &[u8]) -> Result<(), PtyError>;
    fn resize(&mut self, rows: u16, cols: u16) -> Result<(), PtyError>;
    /// Exit code once the child has exited, reaping it
    fn try_wait(&mut self) -> Option<i32>;
    /// Stop the child and reap it; returns its exit code
    fn terminate(&mut self) -> i32;
    fn pid(&self) -> Option<u32>;
}

impl PtyBackend for UnixPty {
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, PtyError> {
        UnixPty::read(self, buf)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), PtyError> {
        UnixPty::write_all(self, data)
    }

    fn resize(&mut self, rows: u16, cols: u16) -> Result<(), PtyError> {
        self.set_winsize(rows, cols)
    }

    fn try_wait(&mut self) -> Option<i32> {
        UnixPty::try_wait(self)
    }

    fn terminate(&mut self) -> i32 {
        UnixPty::terminate(self)
    }

    fn pid(&self) -> Option<u32> {
        u32::try_from(UnixPty::pid(self)).ok()
    }
}

/// What to run and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Shell command line
    pub command: String,
    pub cwd: PathBuf,
    pub rows: u16,
    pub cols: u16,
}

/// Creates the process behind a session
pub trait Launcher {
    fn launch(&mut self, request: &SpawnRequest) -> Result<Box<dyn PtyBackend>, SpawnError>;
}

/// Runs command lines through the user's shell under a real PTY
#[derive(Debug, Clone)]
pub struct PtyLauncher {
    shell: PathBuf,
    term: String,
}

impl PtyLauncher {
    pub fn new(shell: impl Into<PathBuf>, term: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            term: term.into(),
        }
    }

    /// Argument vector for running `command` through the shell
    pub fn shell_argv(&self, command: &str) -> Vec<String> {
        let name = self
            .shell
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sh".to_string());
        let flag = if name == "bash" || name == "zsh" { "-lc" } else { "-c" };
        vec![name, flag.to_string(), command.to_string()]
    }

    fn environment(&self, rows: u16, cols: u16) -> Vec<(String, String)> {
        let mut vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| !matches!(k.as_str(), "TERM" | "LINES" | "COLUMNS"))
            .collect();
        vars.push(("TERM".to_string(), self.term.clone()));
        vars.push(("LINES".to_string(), rows.to_string()));
        vars.push(("COLUMNS".to_string(), cols.to_string()));
        vars
    }
}

impl Launcher for PtyLauncher {
    fn launch(&mut self, request: &SpawnRequest) -> Result<Box<dyn PtyBackend>, SpawnError> {
        let first = first_word(&request.command).ok_or(SpawnError::EmptyCommand)?;
        if needs_lookup(&first) && resolve_program(&first, &request.cwd).is_none() {
            return Err(SpawnError::NotFound(first));
        }

        let argv = self.shell_argv(&request.command);
        let env = self.environment(request.rows, request.cols);
        let pty = UnixPty::spawn(
            &self.shell,
            &argv,
            &request.cwd,
            &env,
            request.rows,
            request.cols,
        )?;
        Ok(Box::new(pty))
    }
}

/// First word of a command line, honoring shell quoting where it parses
pub fn first_word(command: &str) -> Option<String> {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return None;
    }
    match shell_words::split(trimmed) {
        Ok(words) => words.into_iter().next(),
        Err(_) => trimmed.split_whitespace().next().map(str::to_string),
    }
}

fn needs_lookup(word: &str) -> bool {
    if SHELL_WORDS.contains(&word) {
        return false;
    }
    // Assignment prefix such as `FOO=1 cmd`
    if let Some(eq) = word.find('=') {
        if eq > 0 && !word[..eq].contains('/') {
            return false;
        }
    }
    !word.contains(['$', '`', '*', '?', '(', ';', '|', '&', '<', '>'])
}

/// Locate an executable the way the shell would: paths containing `/`
/// are taken relative to `cwd`, bare names are searched on `PATH`.
pub fn resolve_program(name: &str, cwd: &Path) -> Option<PathBuf> {
    if name.contains('/') {
        let path = cwd.join(name);
        return is_executable(&path).then_some(path);
    }
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

pub(crate) fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Spawned,
    Running,
    /// Child exited on its own
    Exited(i32),
    /// Child was stopped by [`Session::terminate`]
    Terminated(i32),
}

/// A child process and its PTY
pub struct Session {
    backend: Box<dyn PtyBackend>,
    state: SessionState,
    command: String,
    cwd: PathBuf,
    /// Output drained while detecting exit, handed out by the next poll
    tail: Vec<u8>,
    read_buf: Vec<u8>,
}

impl Session {
    /// Start `request.command` through `launcher`
    pub fn spawn(launcher: &mut dyn Launcher, request: SpawnRequest) -> Result<Self, SpawnError> {
        let backend = launcher.launch(&request).map_err(|err| {
            warn!("Failed to spawn '{}': {}", request.command, err);
            err
        })?;
        let mut session = Self {
            backend,
            state: SessionState::Spawned,
            command: request.command,
            cwd: request.cwd,
            tail: Vec::new(),
            read_buf: vec![0u8; 4096],
        };
        info!(
            "Spawned '{}' (pid {:?}) in {}",
            session.command,
            session.backend.pid(),
            session.cwd.display()
        );
        session.state = SessionState::Running;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn pid(&self) -> Option<u32> {
        self.backend.pid()
    }

    /// Whether the child is still running. Detects exit as a side effect.
    pub fn is_alive(&mut self) -> bool {
        self.refresh();
        self.state == SessionState::Running
    }

    /// Exit code, available once the child is gone
    pub fn wait_exit_code(&self) -> Option<i32> {
        match self.state {
            SessionState::Exited(code) | SessionState::Terminated(code) => Some(code),
            SessionState::Spawned | SessionState::Running => None,
        }
    }

    /// Non-blocking read of whatever output is available.
    ///
    /// Returns `Ok(None)` when there is nothing new, including after the
    /// session has been terminated.
    pub fn poll_output(&mut self) -> Result<Option<Vec<u8>>, SessionError> {
        match self.state {
            SessionState::Running => {}
            SessionState::Exited(_) if !self.tail.is_empty() => {
                return Ok(Some(std::mem::take(&mut self.tail)));
            }
            _ => return Ok(None),
        }

        let mut out = Vec::new();
        let closed = self.drain_into(&mut out)?;
        if closed {
            self.finish_after_close();
        } else if let Some(code) = self.backend.try_wait() {
            // Output written just before exit is still buffered in the PTY
            if let Err(e) = self.drain_into(&mut out) {
                warn!("Reading final output of '{}' failed: {}", self.command, e);
            }
            self.mark_exited(code);
        }

        if out.is_empty() {
            Ok(None)
        } else {
            Ok(Some(out))
        }
    }

    /// Forward input bytes to the child
    pub fn write_input(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        if self.state != SessionState::Running {
            return Err(SessionError::NotRunning);
        }
        match self.backend.write_all(bytes) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("Write to '{}' failed: {}", self.command, err);
                if err.is_closed() {
                    self.refresh();
                }
                Err(SessionError::Io(err))
            }
        }
    }

    /// Propagate a window-size change to the child
    pub fn resize(&mut self, rows: u16, cols: u16) -> Result<(), SessionError> {
        if self.state != SessionState::Running {
            return Err(SessionError::NotRunning);
        }
        self.backend.resize(rows, cols).map_err(SessionError::Io)
    }

    /// Stop and reap the child. Safe to call in any state.
    pub fn terminate(&mut self) -> Option<i32> {
        match self.state {
            SessionState::Exited(code) | SessionState::Terminated(code) => {
                self.tail.clear();
                Some(code)
            }
            SessionState::Spawned | SessionState::Running => {
                let code = self.backend.terminate();
                info!("Terminated '{}' (exit code {})", self.command, code);
                self.state = SessionState::Terminated(code);
                self.tail.clear();
                Some(code)
            }
        }
    }

    /// Check for exit without handing out output
    fn refresh(&mut self) {
        if self.state != SessionState::Running {
            return;
        }
        if let Some(code) = self.backend.try_wait() {
            let mut tail = std::mem::take(&mut self.tail);
            if let Err(e) = self.drain_into(&mut tail) {
                warn!("Reading final output of '{}' failed: {}", self.command, e);
            }
            self.tail = tail;
            self.mark_exited(code);
        }
    }

    /// Read until the PTY is empty or closed. Returns true on close.
    fn drain_into(&mut self, out: &mut Vec<u8>) -> Result<bool, SessionError> {
        while out.len() < MAX_POLL_BYTES {
            match self.backend.read(&mut self.read_buf) {
                Ok(ReadOutcome::Data(n)) => out.extend_from_slice(&self.read_buf[..n]),
                Ok(ReadOutcome::Empty) => return Ok(false),
                Ok(ReadOutcome::Closed) => return Ok(true),
                Err(err) if err.is_closed() => return Ok(true),
                Err(err) => {
                    warn!("Read from '{}' failed: {}", self.command, err);
                    return Err(SessionError::Io(err));
                }
            }
        }
        Ok(false)
    }

    /// The slave side hung up; the child is exiting or gone
    fn finish_after_close(&mut self) {
        match self.backend.try_wait() {
            Some(code) => self.mark_exited(code),
            None => {
                debug!("PTY closed before '{}' was reaped", self.command);
                let code = self.backend.terminate();
                self.mark_exited(code);
            }
        }
    }

    fn mark_exited(&mut self, code: i32) {
        info!("'{}' exited with code {}", self.command, code);
        self.state = SessionState::Exited(code);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.terminate();
    }
}
