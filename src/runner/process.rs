use crate::config::ServerSpec;
use crate::error::{Error, Result};
use crate::runner::PtyMaster;
use async_process::{Child, Command, ExitStatus, Stdio};
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::pty::openpty;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// The game server process, attached to a pseudo-terminal.
pub struct SupervisedProcess {
    child: Child,
    signal: ProcessSignal,
    terminal: Option<PtyMaster>,
}

impl SupervisedProcess {
    /// Starts the server's launch command inside its directory.
    #[tracing::instrument(skip(server), fields(server = %server.name))]
    pub fn spawn(server: &ServerSpec) -> Result<Self> {
        let program = server
            .command
            .as_deref()
            .ok_or_else(|| Error::Process(format!("server '{}' has no command", server.name)))?;
        let program = resolve_program(server, program);

        let pty = openpty(None, None)
            .map_err(|e| Error::Process(format!("Failed to allocate terminal: {}", e)))?;
        // Keep the master side out of the child.
        fcntl(pty.master.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
            .map_err(|e| Error::Process(format!("Failed to configure terminal: {}", e)))?;
        let slave = File::from(pty.slave);
        let master = PtyMaster::new(File::from(pty.master))
            .map_err(|e| Error::Process(format!("Failed to register terminal: {}", e)))?;

        let child = Command::new(&program)
            .args(server.launch_args())
            .current_dir(&server.path)
            .stdin(Stdio::from(slave.try_clone()?))
            .stdout(Stdio::from(slave.try_clone()?))
            .stderr(Stdio::from(slave))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Process(format!("Failed to start {}: {}", program.display(), e))
            })?;

        let pid = child.id();
        tracing::info!(pid, program = %program.display(), "Server process started");

        Ok(Self {
            child,
            signal: ProcessSignal {
                pid: Pid::from_raw(pid as i32),
                exited: CancellationToken::new(),
            },
            terminal: Some(master),
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn signal(&self) -> ProcessSignal {
        self.signal.clone()
    }

    /// Master side of the terminal; clone it for separate readers and writers.
    pub fn take_terminal(&mut self) -> Option<PtyMaster> {
        self.terminal.take()
    }

    /// Waits for the process to exit and marks it as gone.
    pub async fn wait(mut self) -> Result<ExitStatus> {
        let status = self.child.status().await;
        self.signal.exited.cancel();
        let status = status?;
        tracing::info!(%status, "Server process exited");
        Ok(status)
    }
}

fn resolve_program(server: &ServerSpec, program: &str) -> PathBuf {
    let path = PathBuf::from(program);
    if path.is_relative() && program.contains('/') {
        server.path.join(path)
    } else {
        path
    }
}

/// Signals the process without owning it.
#[derive(Debug, Clone)]
pub struct ProcessSignal {
    pid: Pid,
    exited: CancellationToken,
}

impl ProcessSignal {
    pub fn has_exited(&self) -> bool {
        self.exited.is_cancelled()
    }

    /// Completes once the process was reaped.
    pub async fn exited(&self) {
        self.exited.cancelled().await
    }

    pub fn terminate(&self) -> Result<()> {
        self.send(Signal::SIGTERM)
    }

    pub fn kill(&self) -> Result<()> {
        self.send(Signal::SIGKILL)
    }

    fn send(&self, signal: Signal) -> Result<()> {
        // A reaped pid may already belong to someone else.
        if self.has_exited() {
            return Ok(());
        }
        match kill(self.pid, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(Error::Process(format!(
                "Failed to send {} to {}: {}",
                signal, self.pid, e
            ))),
        }
    }
}
