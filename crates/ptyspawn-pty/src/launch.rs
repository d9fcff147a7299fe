//! Launching a program on a fresh pty
//!
//! [`spawn`] validates a [`LaunchSpec`], allocates a pty pair, forks, and
//! in the child attaches the slave as controlling terminal before replacing
//! the image with `execve`. Everything the child touches is built before the
//! fork, so the child runs only async-signal-safe libc calls.

use crate::pty::allocate;
use crate::session::PtySession;
use crate::size::WindowSize;
use crate::PtyError;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::waitpid;
use nix::errno::Errno;
use nix::unistd::{fork, ForkResult, Pid};
use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::{debug, warn};

/// TERM value given to the child when the caller supplies none.
pub const DEFAULT_TERM: &str = "vt100";

/// Search path used when neither the launch environment nor the launcher
/// has a `PATH`.
const FALLBACK_PATH: &str = "/usr/bin:/bin";

/// Exit status of a child whose exec failed.
pub const EXEC_FAILURE_STATUS: i32 = 1;

/// Everything needed to launch one program on a pty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    program: String,
    argv: Vec<String>,
    explicit_argv0: bool,
    env: Vec<String>,
    cwd: String,
    size: WindowSize,
    term: Option<String>,
}

impl LaunchSpec {
    /// A spec running `program` with no arguments, an empty environment, the
    /// inherited working directory and an 80x30 window.
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        Self {
            argv: vec![program.clone()],
            program,
            explicit_argv0: false,
            env: Vec::new(),
            cwd: String::new(),
            size: WindowSize::default(),
            term: None,
        }
    }

    /// Build a spec from the flat call surface: argv becomes
    /// `[program, args...]`.
    pub fn from_call<A, E>(
        program: &str,
        args: A,
        env: E,
        cwd: &str,
        cols: i64,
        rows: i64,
    ) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self::new(program)
            .args(args)
            .env(env)
            .cwd(cwd)
            .size(WindowSize::new(cols, rows))
    }

    /// Append arguments after argv[0].
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace the whole argument vector, argv[0] included. argv[0] is then
    /// passed to the program unchanged instead of the resolved path.
    pub fn with_argv<I>(mut self, argv: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.argv = argv.into_iter().map(Into::into).collect();
        self.explicit_argv0 = true;
        self
    }

    /// Replace the environment with `KEY=VALUE` entries.
    pub fn env<I>(mut self, env: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.env = env.into_iter().map(Into::into).collect();
        self
    }

    /// Add one variable to the environment.
    pub fn env_var(mut self, key: &str, value: &str) -> Self {
        self.env.push(format!("{key}={value}"));
        self
    }

    /// Working directory for the child. Empty keeps the inherited one.
    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn size(mut self, size: WindowSize) -> Self {
        self.size = size;
        self
    }

    /// Terminal name exported as `TERM`, overriding any `TERM=` entry.
    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.term = Some(term.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn env_entries(&self) -> &[String] {
        &self.env
    }

    pub fn working_dir(&self) -> &str {
        &self.cwd
    }

    pub fn window_size(&self) -> WindowSize {
        self.size
    }

    pub fn term_name(&self) -> Option<&str> {
        self.term.as_deref()
    }

    /// Check the spec without touching any OS state.
    pub fn validate(&self) -> Result<(), PtyError> {
        if self.program.is_empty() {
            return Err(PtyError::Validation("program path is empty".into()));
        }
        if self.argv.is_empty() {
            return Err(PtyError::Validation("argument vector is empty".into()));
        }
        check_nul("program path", &self.program)?;
        check_nul("working directory", &self.cwd)?;
        for arg in &self.argv {
            check_nul("argument", arg)?;
        }
        for entry in &self.env {
            check_nul("environment entry", entry)?;
            match entry.find('=') {
                Some(0) | None => {
                    return Err(PtyError::Validation(format!(
                        "environment entry {entry:?} is not KEY=VALUE"
                    )))
                }
                Some(_) => {}
            }
        }
        if let Some(term) = &self.term {
            if term.is_empty() {
                return Err(PtyError::Validation("terminal name is empty".into()));
            }
            check_nul("terminal name", term)?;
        }
        Ok(())
    }

    /// The environment the child will see: the caller's entries with `TERM`
    /// forced to the requested terminal name, or defaulted to `vt100`.
    pub fn effective_env(&self) -> Vec<String> {
        let mut env: Vec<String> = match &self.term {
            Some(term) => self
                .env
                .iter()
                .filter(|entry| !entry.starts_with("TERM="))
                .cloned()
                .chain(std::iter::once(format!("TERM={term}")))
                .collect(),
            None => self.env.clone(),
        };
        if !env.iter().any(|entry| entry.starts_with("TERM=")) {
            env.push(format!("TERM={DEFAULT_TERM}"));
        }
        env
    }

    /// Path of the program to exec. Names without a slash are looked up in
    /// the launch environment's `PATH`, then the launcher's. A name that
    /// cannot be found is returned unchanged so the exec fails in the child.
    pub fn resolved_program(&self) -> String {
        if self.program.contains('/') {
            return self.program.clone();
        }
        let search = self
            .env
            .iter()
            .find_map(|entry| entry.strip_prefix("PATH="))
            .map(str::to_owned)
            .or_else(|| std::env::var("PATH").ok())
            .unwrap_or_else(|| FALLBACK_PATH.to_owned());

        search
            .split(':')
            .map(|dir| if dir.is_empty() { "." } else { dir })
            .map(|dir| Path::new(dir).join(&self.program))
            .find(|candidate| is_executable(candidate))
            .map(|candidate| candidate.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.clone())
    }
}

fn check_nul(what: &str, value: &str) -> Result<(), PtyError> {
    if value.as_bytes().contains(&0) {
        return Err(PtyError::Validation(format!("{what} contains a NUL byte")));
    }
    Ok(())
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Exec image prepared in the parent. The pointer arrays borrow from the
/// owned strings, which live until the child execs or exits.
struct ExecImage {
    program: CString,
    _argv: Vec<CString>,
    _env: Vec<CString>,
    argv_ptrs: Vec<*const libc::c_char>,
    env_ptrs: Vec<*const libc::c_char>,
    cwd: Option<CString>,
    exec_failed: Vec<u8>,
    chdir_failed: Vec<u8>,
}

impl ExecImage {
    fn prepare(spec: &LaunchSpec) -> Result<Self, PtyError> {
        let resolved = spec.resolved_program();

        let mut argv = spec.argv.clone();
        if !spec.explicit_argv0 {
            argv[0] = resolved.clone();
        }

        let program = to_cstring(resolved.clone())?;
        let argv = argv
            .into_iter()
            .map(to_cstring)
            .collect::<Result<Vec<_>, _>>()?;
        let env = spec
            .effective_env()
            .into_iter()
            .map(to_cstring)
            .collect::<Result<Vec<_>, _>>()?;
        let cwd = if spec.cwd.is_empty() {
            None
        } else {
            Some(to_cstring(spec.cwd.clone())?)
        };

        let argv_ptrs = null_terminated(&argv);
        let env_ptrs = null_terminated(&env);

        Ok(Self {
            exec_failed: format!("ptyspawn: failed to exec {resolved}").into_bytes(),
            chdir_failed: format!("ptyspawn: failed to chdir to {}", spec.cwd).into_bytes(),
            program,
            _argv: argv,
            _env: env,
            argv_ptrs,
            env_ptrs,
            cwd,
        })
    }
}

fn to_cstring(value: String) -> Result<CString, PtyError> {
    CString::new(value).map_err(|_| PtyError::Validation("string contains a NUL byte".into()))
}

fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// Launch `spec` on a new pty.
///
/// Returns once the parent side is ready; the child may still be setting up
/// when this returns, which is harmless because the tty buffers traffic.
/// The caller owns the returned session: it must close the master and reap
/// the child.
pub fn spawn(spec: &LaunchSpec) -> Result<PtySession, PtyError> {
    spec.validate()?;
    let image = ExecImage::prepare(spec)?;

    let pair = allocate(spec.size)?;
    let master = pair.master;
    let slave = pair.slave;
    let device_path = pair.device_path;

    match unsafe { fork() }.map_err(|e| PtyError::system("fork", e))? {
        ForkResult::Child => exec_child(master.as_raw_fd(), slave.as_raw_fd(), &image),
        ForkResult::Parent { child } => {
            drop(slave);

            if let Err(err) = set_nonblocking(&master) {
                warn!(pid = %child, error = %err, "could not make pty master non-blocking, killing child");
                discard_child(child);
                return Err(err);
            }

            debug!(
                program = %spec.program,
                pid = %child,
                device = %device_path.display(),
                "spawned process on pty"
            );
            Ok(PtySession::new(master, device_path, child))
        }
    }
}

/// Launch from the flat call surface. See [`LaunchSpec::from_call`].
pub fn spawn_with<A, E>(
    program: &str,
    args: A,
    env: E,
    cwd: &str,
    cols: i64,
    rows: i64,
) -> Result<PtySession, PtyError>
where
    A: IntoIterator,
    A::Item: Into<String>,
    E: IntoIterator,
    E::Item: Into<String>,
{
    spawn(&LaunchSpec::from_call(program, args, env, cwd, cols, rows))
}

/// Kill and reap a child whose launch is being abandoned.
fn discard_child(child: Pid) {
    if let Err(e) = kill(child, Signal::SIGKILL) {
        warn!(pid = %child, error = %e, "could not kill child after failed launch");
    }
    loop {
        match waitpid(child, None) {
            Err(Errno::EINTR) => continue,
            Err(e) => {
                warn!(pid = %child, error = %e, "could not reap child after failed launch");
                break;
            }
            Ok(_) => break,
        }
    }
}

fn set_nonblocking(master: &OwnedFd) -> Result<(), PtyError> {
    let fd = master.as_raw_fd();
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(PtyError::io)?;
    let flags = OFlag::from_bits_truncate(flags);
    if flags.contains(OFlag::O_NONBLOCK) {
        return Ok(());
    }
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map_err(PtyError::io)?;
    Ok(())
}

/// Child side of the fork. Never returns: the image is replaced or the
/// process exits with [`EXEC_FAILURE_STATUS`].
fn exec_child(master: RawFd, slave: RawFd, image: &ExecImage) -> ! {
    unsafe {
        libc::close(master);

        if libc::setsid() < 0 {
            die(b"ptyspawn: setsid failed");
        }
        if libc::ioctl(slave, libc::TIOCSCTTY as _, 0) < 0 {
            die(b"ptyspawn: failed to set controlling terminal");
        }

        for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
            if libc::dup2(slave, target) < 0 {
                die(b"ptyspawn: dup2 failed");
            }
        }
        if slave > libc::STDERR_FILENO {
            libc::close(slave);
        } else {
            // dup2 onto itself keeps close-on-exec
            libc::fcntl(slave, libc::F_SETFD, 0);
        }

        // The Rust runtime ignores SIGPIPE and ignored dispositions survive exec.
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);

        if let Some(cwd) = &image.cwd {
            if libc::chdir(cwd.as_ptr()) < 0 {
                write_diagnostic(&image.chdir_failed, errno());
            }
        }

        libc::execve(
            image.program.as_ptr(),
            image.argv_ptrs.as_ptr(),
            image.env_ptrs.as_ptr(),
        );
        write_diagnostic(&image.exec_failed, errno());
        libc::_exit(EXEC_FAILURE_STATUS);
    }
}

fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn die(msg: &[u8]) -> ! {
    write_diagnostic(msg, errno());
    unsafe { libc::_exit(EXEC_FAILURE_STATUS) }
}

/// Write `msg (errno N)\n` to stderr without allocating.
fn write_diagnostic(msg: &[u8], errno: i32) {
    let mut digits = [0u8; 12];
    let mut at = digits.len();
    let mut value = errno.unsigned_abs();
    loop {
        at -= 1;
        digits[at] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    for part in [msg, b" (errno ".as_slice(), &digits[at..], b")\n".as_slice()] {
        unsafe {
            libc::write(
                libc::STDERR_FILENO,
                part.as_ptr().cast::<libc::c_void>(),
                part.len(),
            );
        }
    }
}
