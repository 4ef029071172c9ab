//! Unix pseudo-terminal wrapper
//!
//! Allocates a PTY pair with `openpty`, forks, and execs the child on the
//! slave side as a session leader whose controlling terminal is the slave.
//! The master side is switched to non-blocking mode so the event loop can
//! poll it every tick.

use std::ffi::CString;
use std::io::{self, ErrorKind};
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::ptr;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

/// How long a terminated child gets to exit before SIGKILL
const TERMINATE_GRACE: Duration = Duration::from_millis(500);
/// Attempts at writing into a full PTY buffer before giving up
const WRITE_RETRIES: u32 = 50;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to allocate pseudo terminal: {0}")]
    OpenPty(#[source] io::Error),

    #[error("Failed to fork child process: {0}")]
    Fork(#[source] io::Error),

    #[error("Failed to execute {program}: {source}")]
    Exec {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Argument contains a NUL byte: {0:?}")]
    NulByte(String),

    #[error("Failed to configure PTY: {0}")]
    Configure(#[source] io::Error),

    #[error("Failed to resize PTY: {0}")]
    Resize(#[source] io::Error),

    #[error("Failed to read from PTY: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write to PTY: {0}")]
    Write(#[source] io::Error),
}

impl PtyError {
    /// Whether the error means the descriptor itself is gone
    pub fn is_closed(&self) -> bool {
        match self {
            PtyError::Read(err) | PtyError::Write(err) => matches!(
                err.raw_os_error(),
                Some(libc::EBADF) | Some(libc::EIO) | Some(libc::EPIPE)
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PtyError>;

/// Result of a non-blocking read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(usize),
    /// Nothing available right now
    Empty,
    /// The slave side has been closed by every process holding it
    Closed,
}

/// A child process attached to the slave side of a PTY
pub struct UnixPty {
    master_fd: RawFd,
    child_pid: libc::pid_t,
    /// Raw wait status once the child has been reaped
    status: Option<libc::c_int>,
}

impl UnixPty {
    /// Spawn `program` (an already-resolved path) with `argv` under a new PTY
    pub fn spawn(
        program: &Path,
        argv: &[String],
        cwd: &Path,
        env: &[(String, String)],
        rows: u16,
        cols: u16,
    ) -> Result<Self> {
        let program_c = cstring(program.as_os_str().as_bytes())?;
        let cwd_c = cstring(cwd.as_os_str().as_bytes())?;
        let argv_c = argv
            .iter()
            .map(|a| cstring(a.as_bytes()))
            .collect::<Result<Vec<_>>>()?;
        let env_c = env
            .iter()
            .map(|(k, v)| cstring(format!("{}={}", k, v).as_bytes()))
            .collect::<Result<Vec<_>>>()?;

        let mut argv_ptrs: Vec<*const libc::c_char> = argv_c.iter().map(|s| s.as_ptr()).collect();
        argv_ptrs.push(ptr::null());
        let mut env_ptrs: Vec<*const libc::c_char> = env_c.iter().map(|s| s.as_ptr()).collect();
        env_ptrs.push(ptr::null());

        // SAFETY: every pointer handed to the child refers to CStrings that
        // outlive the fork; the child only calls async-signal-safe functions.
        unsafe {
            let (master_fd, child_pid) =
                spawn_pty_child(&program_c, &argv_ptrs, &env_ptrs, &cwd_c, rows, cols)
                    .map_err(|err| match err {
                        PtyError::Exec { source, .. } => PtyError::Exec {
                            program: program.display().to_string(),
                            source,
                        },
                        other => other,
                    })?;
            let pty = Self {
                master_fd,
                child_pid,
                status: None,
            };
            set_nonblocking(master_fd)?;
            Ok(pty)
        }
    }

    pub fn pid(&self) -> libc::pid_t {
        self.child_pid
    }

    /// Read whatever is available without blocking
    pub fn read(&self, buf: &mut [u8]) -> Result<ReadOutcome> {
        loop {
            // SAFETY: buf is a valid writable slice and master_fd is owned by self.
            let n = unsafe {
                libc::read(
                    self.master_fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if n > 0 {
                return Ok(ReadOutcome::Data(n as usize));
            }
            if n == 0 {
                return Ok(ReadOutcome::Closed);
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                ErrorKind::Interrupted => continue,
                ErrorKind::WouldBlock => return Ok(ReadOutcome::Empty),
                // Linux reports a hung-up slave as EIO
                _ if err.raw_os_error() == Some(libc::EIO) => return Ok(ReadOutcome::Closed),
                _ => return Err(PtyError::Read(err)),
            }
        }
    }

    /// Write all bytes, retrying briefly while the kernel buffer is full
    pub fn write_all(&self, mut data: &[u8]) -> Result<()> {
        let mut retries = 0;
        while !data.is_empty() {
            // SAFETY: data is a valid readable slice and master_fd is owned by self.
            let written = unsafe {
                libc::write(
                    self.master_fd,
                    data.as_ptr() as *const libc::c_void,
                    data.len(),
                )
            };
            if written < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    ErrorKind::Interrupted => continue,
                    ErrorKind::WouldBlock if retries < WRITE_RETRIES => {
                        retries += 1;
                        thread::sleep(Duration::from_millis(1));
                        continue;
                    }
                    _ => return Err(PtyError::Write(err)),
                }
            }
            if written == 0 {
                return Err(PtyError::Write(io::Error::new(
                    ErrorKind::WriteZero,
                    "write to PTY returned 0",
                )));
            }
            data = &data[written as usize..];
        }
        Ok(())
    }

    /// Update the PTY window size and notify the child.
    pub fn set_winsize(&self, rows: u16, cols: u16) -> Result<()> {
        let ws = winsize(rows, cols);
        // SAFETY: ioctl reads ws, which is fully initialized; master_fd is owned by self.
        let result = unsafe { libc::ioctl(self.master_fd, libc::TIOCSWINSZ, &ws) };
        if result != 0 {
            return Err(PtyError::Resize(io::Error::last_os_error()));
        }
        if self.status.is_none() {
            // SAFETY: SIGWINCH is sent to the child owned by this handle.
            let _ = unsafe { libc::kill(self.child_pid, libc::SIGWINCH) };
        }
        Ok(())
    }

    /// Non-blocking check for child exit; reaps the child on completion.
    pub fn try_wait(&mut self) -> Option<i32> {
        if let Some(status) = self.status {
            return Some(exit_code(status));
        }
        let mut status = 0;
        // SAFETY: child_pid is owned by this handle; WNOHANG only inspects state.
        let ret = unsafe { libc::waitpid(self.child_pid, &mut status, libc::WNOHANG) };
        if ret == self.child_pid {
            self.status = Some(status);
            return Some(exit_code(status));
        }
        if ret < 0 {
            // Already reaped elsewhere; nothing left to wait for
            tracing::warn!(
                "waitpid({}) failed: {}",
                self.child_pid,
                io::Error::last_os_error()
            );
            self.status = Some(0);
            return Some(0);
        }
        None
    }

    /// Signal the child's process group, escalating to SIGKILL if it does
    /// not exit within the grace period, then reap it. Safe to call after
    /// the child already exited.
    pub fn terminate(&mut self) -> i32 {
        if let Some(code) = self.try_wait() {
            return code;
        }
        self.signal_group(libc::SIGHUP);
        self.signal_group(libc::SIGTERM);
        if let Some(code) = self.wait_for_exit(TERMINATE_GRACE) {
            return code;
        }

        tracing::warn!("Child {} ignored SIGTERM, sending SIGKILL", self.child_pid);
        self.signal_group(libc::SIGKILL);
        let mut status = 0;
        // SAFETY: blocking wait on our own child after SIGKILL.
        let ret = unsafe { libc::waitpid(self.child_pid, &mut status, 0) };
        if ret < 0 {
            tracing::warn!(
                "waitpid after SIGKILL failed: {}",
                io::Error::last_os_error()
            );
        }
        self.status = Some(status);
        exit_code(status)
    }

    fn signal_group(&self, signal: libc::c_int) {
        // SAFETY: the child called setsid, so its pid is also its process group id.
        unsafe {
            if libc::kill(-self.child_pid, signal) != 0 {
                let _ = libc::kill(self.child_pid, signal);
            }
        }
    }

    fn wait_for_exit(&mut self, timeout: Duration) -> Option<i32> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if let Some(code) = self.try_wait() {
                return Some(code);
            }
            thread::sleep(Duration::from_millis(10));
        }
        None
    }
}

impl Drop for UnixPty {
    fn drop(&mut self) {
        self.terminate();
        // SAFETY: master_fd is owned by this handle and closed exactly once.
        unsafe { close_fd(self.master_fd) };
    }
}

/// Shell-style exit code: the exit status, or 128 + signal number
pub fn exit_code(status: libc::c_int) -> i32 {
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        128 + libc::WTERMSIG(status)
    } else {
        status
    }
}

fn cstring(bytes: &[u8]) -> Result<CString> {
    CString::new(bytes).map_err(|_| PtyError::NulByte(String::from_utf8_lossy(bytes).into_owned()))
}

fn winsize(rows: u16, cols: u16) -> libc::winsize {
    // SAFETY: libc::winsize is a plain C struct; zeroed is a valid baseline.
    let mut ws: libc::winsize = unsafe { mem::zeroed() };
    ws.ws_row = rows.max(1);
    ws.ws_col = cols.max(1);
    ws
}

/// Forks and execs a child process under a new PTY.
///
/// # Safety
///
/// The pointer arrays must be NULL-terminated and point into live CStrings.
/// The child only uses async-signal-safe calls before `execve`; exec
/// failures are reported back through a close-on-exec pipe.
unsafe fn spawn_pty_child(
    program: &CString,
    argv: &[*const libc::c_char],
    envp: &[*const libc::c_char],
    cwd: &CString,
    rows: u16,
    cols: u16,
) -> Result<(RawFd, libc::pid_t)> {
    let mut master_fd: RawFd = -1;
    let mut slave_fd: RawFd = -1;
    let mut ws = winsize(rows, cols);

    if libc::openpty(
        &mut master_fd,
        &mut slave_fd,
        ptr::null_mut(),
        ptr::null_mut(),
        &mut ws,
    ) != 0
    {
        return Err(PtyError::OpenPty(io::Error::last_os_error()));
    }
    set_cloexec(master_fd);

    let mut pipe_fds: [RawFd; 2] = [-1, -1];
    if libc::pipe(pipe_fds.as_mut_ptr()) != 0 {
        let err = io::Error::last_os_error();
        close_fd(master_fd);
        close_fd(slave_fd);
        return Err(PtyError::Configure(err));
    }
    let [err_read, err_write] = pipe_fds;
    set_cloexec(err_read);
    set_cloexec(err_write);

    let pid = libc::fork();
    if pid < 0 {
        let err = io::Error::last_os_error();
        for fd in [master_fd, slave_fd, err_read, err_write] {
            close_fd(fd);
        }
        return Err(PtyError::Fork(err));
    }

    if pid == 0 {
        close_fd(master_fd);
        close_fd(err_read);
        child_exec(slave_fd, err_write, program, argv, envp, cwd);
    }

    close_fd(slave_fd);
    close_fd(err_write);

    // The write end closes on a successful exec, so EOF means the child is running
    let mut errno_buf = [0u8; 4];
    let mut filled = 0;
    while filled < errno_buf.len() {
        let n = libc::read(
            err_read,
            errno_buf[filled..].as_mut_ptr() as *mut libc::c_void,
            errno_buf.len() - filled,
        );
        if n > 0 {
            filled += n as usize;
        } else if n == 0 || io::Error::last_os_error().kind() != ErrorKind::Interrupted {
            break;
        }
    }
    close_fd(err_read);

    if filled == errno_buf.len() {
        let errno = i32::from_ne_bytes(errno_buf);
        let mut status = 0;
        libc::waitpid(pid, &mut status, 0);
        close_fd(master_fd);
        return Err(PtyError::Exec {
            program: String::new(),
            source: io::Error::from_raw_os_error(errno),
        });
    }

    Ok((master_fd, pid))
}

/// Child side of the fork. Never returns.
unsafe fn child_exec(
    slave_fd: RawFd,
    err_fd: RawFd,
    program: &CString,
    argv: &[*const libc::c_char],
    envp: &[*const libc::c_char],
    cwd: &CString,
) -> ! {
    let fail = || -> ! {
        let errno = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EINVAL);
        let bytes = errno.to_ne_bytes();
        let _ = libc::write(err_fd, bytes.as_ptr() as *const libc::c_void, bytes.len());
        libc::_exit(127);
    };

    if libc::setsid() == -1 {
        fail();
    }
    if libc::ioctl(slave_fd, libc::TIOCSCTTY as _, 0) == -1 {
        fail();
    }
    if libc::dup2(slave_fd, libc::STDIN_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDOUT_FILENO) < 0
        || libc::dup2(slave_fd, libc::STDERR_FILENO) < 0
    {
        fail();
    }
    if slave_fd > libc::STDERR_FILENO {
        close_fd(slave_fd);
    }
    if libc::chdir(cwd.as_ptr()) != 0 {
        fail();
    }

    // The parent ignores SIGPIPE; children expect default dispositions
    for signal in [
        libc::SIGPIPE,
        libc::SIGINT,
        libc::SIGQUIT,
        libc::SIGTSTP,
        libc::SIGTTIN,
        libc::SIGTTOU,
        libc::SIGCHLD,
    ] {
        libc::signal(signal, libc::SIG_DFL);
    }
    let mut empty: libc::sigset_t = mem::zeroed();
    libc::sigemptyset(&mut empty);
    libc::sigprocmask(libc::SIG_SETMASK, &empty, ptr::null_mut());

    libc::execve(program.as_ptr(), argv.as_ptr(), envp.as_ptr());
    fail();
}

/// Configure the PTY master for non-blocking reads.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor.
unsafe fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = libc::fcntl(fd, libc::F_GETFL, 0);
    if flags < 0 {
        return Err(PtyError::Configure(io::Error::last_os_error()));
    }
    if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
        return Err(PtyError::Configure(io::Error::last_os_error()));
    }
    Ok(())
}

unsafe fn set_cloexec(fd: RawFd) {
    let flags = libc::fcntl(fd, libc::F_GETFD, 0);
    if flags >= 0 {
        libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
    }
}

/// Close a file descriptor while ignoring errors.
///
/// # Safety
///
/// `fd` must be a valid, open file descriptor (or -1 to ignore).
unsafe fn close_fd(fd: RawFd) {
    if fd >= 0 {
        let _ = libc::close(fd);
    }
}
