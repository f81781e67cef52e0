use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;

use anyhow::{bail, Context, Result};
use nix::libc;
use tokio::io::unix::AsyncFd;

/// A child process attached to a freshly allocated pseudo-terminal.
///
/// The master side is owned exclusively by this struct; dropping it
/// closes the descriptor. All reads and writes go through the async
/// methods below, which drive the nonblocking fd off tokio readiness.
pub struct PtyProcess {
    pid: libc::pid_t,
    master: AsyncFd<OwnedFd>,
}

impl PtyProcess {
    /// Fork a child on a new PTY and exec `argv` into it.
    ///
    /// The child's stdin, stdout and stderr are the PTY slave. If the
    /// exec fails the child exits 127, which surfaces to the caller as
    /// an immediate EOF on the master.
    pub fn spawn(argv: &[String]) -> Result<Self> {
        if argv.is_empty() {
            bail!("Cannot spawn an empty command");
        }
        let program =
            CString::new(argv[0].as_str()).context("Command name contains a NUL byte")?;
        let args: Vec<CString> = argv
            .iter()
            .map(|a| CString::new(a.as_str()))
            .collect::<std::result::Result<_, _>>()
            .context("Command argument contains a NUL byte")?;

        let mut master_fd: libc::c_int = -1;
        let pid = unsafe {
            libc::forkpty(
                &mut master_fd as *mut libc::c_int,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        if pid < 0 {
            return Err(io::Error::last_os_error()).context("forkpty failed");
        }

        if pid == 0 {
            // Child, attached to the slave side
            std::env::set_var("TERM", "xterm-256color");
            let argv_ptrs: Vec<*const libc::c_char> = args
                .iter()
                .map(|a| a.as_ptr())
                .chain(std::iter::once(ptr::null()))
                .collect();
            unsafe {
                libc::execvp(program.as_ptr(), argv_ptrs.as_ptr());
                libc::_exit(127);
            }
        }

        // Parent. SAFETY: forkpty handed us a valid fd we now own.
        let owned = unsafe { OwnedFd::from_raw_fd(master_fd) };
        set_nonblocking(owned.as_raw_fd())?;
        let master = AsyncFd::new(owned).context("Failed to register PTY master with tokio")?;

        Ok(Self { pid, master })
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Read child output from the master. Returns `Ok(0)` at end of
    /// stream; EIO from a hung-up slave is normalized to end of stream.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.master.readable().await?;
            let result = guard.try_io(|inner| {
                let n = unsafe {
                    libc::read(
                        inner.as_raw_fd(),
                        buf.as_mut_ptr() as *mut libc::c_void,
                        buf.len(),
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });
            match result {
                Ok(Ok(n)) => return Ok(n),
                Ok(Err(err)) if err.raw_os_error() == Some(libc::EIO) => return Ok(0),
                Ok(Err(err)) => return Err(err),
                Err(_would_block) => continue,
            }
        }
    }

    /// Deliver input to the child's stdin, handling partial writes.
    pub async fn write_all(&self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let mut guard = self.master.writable().await?;
            let result = guard.try_io(|inner| {
                let n = unsafe {
                    libc::write(
                        inner.as_raw_fd(),
                        data.as_ptr() as *const libc::c_void,
                        data.len(),
                    )
                };
                if n < 0 {
                    Err(io::Error::last_os_error())
                } else {
                    Ok(n as usize)
                }
            });
            match result {
                Ok(Ok(n)) => data = &data[n..],
                Ok(Err(err)) => return Err(err),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }

    /// Update the PTY window size. The child observes this as SIGWINCH.
    pub fn resize(&self, columns: u16, rows: u16) -> io::Result<()> {
        let ws = libc::winsize {
            ws_row: rows,
            ws_col: columns,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let rc = unsafe { libc::ioctl(self.master.get_ref().as_raw_fd(), libc::TIOCSWINSZ, &ws) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Ask the child to terminate. Already-exited children are fine.
    pub fn terminate(&self) {
        unsafe {
            libc::kill(self.pid, libc::SIGTERM);
        }
    }

    /// Reap the child and return its exit code. Signal deaths map to
    /// `128 + signo`.
    pub async fn wait(&self) -> Result<i32> {
        let pid = self.pid;
        tokio::task::spawn_blocking(move || {
            let mut status: libc::c_int = 0;
            let rc = unsafe { libc::waitpid(pid, &mut status, 0) };
            if rc < 0 {
                return Err(io::Error::last_os_error()).context("waitpid failed");
            }
            Ok(decode_wait_status(status))
        })
        .await
        .context("Wait task panicked")?
    }
}

fn decode_wait_status(status: libc::c_int) -> i32 {
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        128 + libc::WTERMSIG(status)
    } else {
        -1
    }
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error()).context("fcntl(F_GETFL) failed");
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error()).context("fcntl(F_SETFL) failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_to_end(pty: &PtyProcess) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match pty.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
            }
        }
        out
    }

    #[tokio::test]
    async fn test_spawn_captures_child_output() {
        let pty = PtyProcess::spawn(&["echo".to_string(), "hello".to_string()]).unwrap();
        let out = read_to_end(&pty).await;
        assert!(String::from_utf8_lossy(&out).contains("hello"));
        assert_eq!(pty.wait().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wait_reports_exit_code() {
        let pty =
            PtyProcess::spawn(&["sh".to_string(), "-c".to_string(), "exit 3".to_string()])
                .unwrap();
        let _ = read_to_end(&pty).await;
        assert_eq!(pty.wait().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_write_reaches_child() {
        let pty = PtyProcess::spawn(&["cat".to_string()]).unwrap();
        pty.write_all(b"ping\n").await.unwrap();

        // The PTY line discipline echoes, and cat repeats the line.
        let mut seen = Vec::new();
        let mut buf = [0u8; 1024];
        let deadline = tokio::time::Duration::from_secs(5);
        tokio::time::timeout(deadline, async {
            loop {
                match pty.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        seen.extend_from_slice(&buf[..n]);
                        if String::from_utf8_lossy(&seen).contains("ping") {
                            break;
                        }
                    }
                }
            }
        })
        .await
        .unwrap();
        assert!(String::from_utf8_lossy(&seen).contains("ping"));

        pty.terminate();
        let code = pty.wait().await.unwrap();
        assert_eq!(code, 128 + libc::SIGTERM);
    }

    #[tokio::test]
    async fn test_resize_is_visible_to_child() {
        let pty = PtyProcess::spawn(&[
            "sh".to_string(),
            "-c".to_string(),
            "sleep 0.3; stty size".to_string(),
        ])
        .unwrap();
        pty.resize(120, 40).unwrap();
        let out = read_to_end(&pty).await;
        assert!(String::from_utf8_lossy(&out).contains("40 120"));
        let _ = pty.wait().await;
    }

    #[test]
    fn test_spawn_empty_command_fails() {
        assert!(PtyProcess::spawn(&[]).is_err());
    }
}
