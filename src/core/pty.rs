//! ConPTY wrapper.
//!
//! Safe wrapper around the Windows pseudo console (ConPTY): one instance owns
//! the pseudo console handle, the I/O pipe ends and the attached shell
//! process for its whole lifetime.

use thiserror::Error;

#[cfg(windows)]
use std::io;
#[cfg(windows)]
use std::path::Path;
#[cfg(windows)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(windows)]
use std::time::Duration;

#[cfg(windows)]
use windows::core::{PCWSTR, PWSTR};
#[cfg(windows)]
use windows::Win32::Foundation::{CloseHandle, HANDLE};
#[cfg(windows)]
use windows::Win32::Storage::FileSystem::{ReadFile, WriteFile};
#[cfg(windows)]
use windows::Win32::System::Console::{
    ClosePseudoConsole, CreatePseudoConsole, ResizePseudoConsole, COORD, HPCON,
};
#[cfg(windows)]
use windows::Win32::System::Pipes::{CreatePipe, PeekNamedPipe};
#[cfg(windows)]
use windows::Win32::System::Threading::{
    CreateProcessW, DeleteProcThreadAttributeList, GetExitCodeProcess,
    InitializeProcThreadAttributeList, TerminateProcess, UpdateProcThreadAttribute,
    WaitForSingleObject, EXTENDED_STARTUPINFO_PRESENT, LPPROC_THREAD_ATTRIBUTE_LIST,
    PROCESS_INFORMATION, STARTUPINFOEXW,
};
#[cfg(windows)]
use windows::Win32::System::IO::CancelIoEx;

#[derive(Error, Debug)]
pub enum PtyError {
    #[cfg(windows)]
    #[error("failed to create pipe: {0}")]
    PipeCreation(#[source] windows::core::Error),

    #[cfg(windows)]
    #[error("failed to create pseudo console: {0}")]
    ConsoleCreation(#[source] windows::core::Error),

    #[cfg(windows)]
    #[error("failed to spawn shell process: {0}")]
    ProcessSpawn(#[source] windows::core::Error),

    #[cfg(windows)]
    #[error("failed to resize pseudo console: {0}")]
    Resize(#[source] windows::core::Error),

    #[cfg(windows)]
    #[error("failed to read from pty: {0}")]
    Read(#[source] io::Error),

    #[cfg(windows)]
    #[error("failed to write to pty: {0}")]
    Write(#[source] io::Error),

    #[allow(dead_code)]
    #[error("pseudo terminals are not supported on this platform")]
    Unsupported,
}

#[cfg(windows)]
pub type Result<T> = std::result::Result<T, PtyError>;

/// Build the command line handed to `CreateProcessW`, wiring the requested
/// codepage in for shells that do not manage their own encoding.
#[cfg(windows)]
fn compose_command(command: Option<&str>, codepage: Option<u32>) -> String {
    let shell = command.unwrap_or("cmd.exe");
    let Some(cp) = codepage else {
        return shell.to_string();
    };
    let lower = shell.to_lowercase();
    if lower == "cmd.exe" || lower == "cmd" {
        format!("cmd.exe /k \"chcp {} >nul\"", cp)
    } else if lower.contains("powershell") || lower.contains("pwsh") {
        format!(
            "{} -NoExit -Command \"[Console]::OutputEncoding = [System.Text.Encoding]::UTF8\"",
            shell
        )
    } else if lower.contains("wsl") {
        shell.to_string()
    } else {
        format!("cmd.exe /k \"chcp {} >nul & {}\"", cp, shell)
    }
}

#[cfg(windows)]
fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Pseudo console plus its attached shell process.
#[cfg(windows)]
pub struct ConPty {
    hpc: HPCON,
    console_closed: AtomicBool,
    input_write: HANDLE,
    output_read: HANDLE,
    process: PROCESS_INFORMATION,
}

// The handles are only touched through &self methods that the kernel
// serializes; the session shares one instance between the UI and the reader.
#[cfg(windows)]
unsafe impl Send for ConPty {}
#[cfg(windows)]
unsafe impl Sync for ConPty {}

#[cfg(windows)]
impl ConPty {
    /// Allocate a pseudo console of `cols` x `rows` and spawn `command`
    /// (default `cmd.exe`) attached to it, in `working_dir` when given.
    pub fn spawn(
        command: Option<&str>,
        working_dir: Option<&Path>,
        cols: u16,
        rows: u16,
        codepage: Option<u32>,
    ) -> Result<Self> {
        unsafe { Self::spawn_inner(command, working_dir, cols, rows, codepage) }
    }

    unsafe fn spawn_inner(
        command: Option<&str>,
        working_dir: Option<&Path>,
        cols: u16,
        rows: u16,
        codepage: Option<u32>,
    ) -> Result<Self> {
        let mut pty_input_read = HANDLE::default();
        let mut pty_input_write = HANDLE::default();
        let mut pty_output_read = HANDLE::default();
        let mut pty_output_write = HANDLE::default();

        // Input pipe (we write, the console reads).
        CreatePipe(&mut pty_input_read, &mut pty_input_write, None, 0)
            .map_err(PtyError::PipeCreation)?;
        // Output pipe (the console writes, we read).
        CreatePipe(&mut pty_output_read, &mut pty_output_write, None, 0)
            .map_err(PtyError::PipeCreation)?;

        let size = COORD {
            X: cols as i16,
            Y: rows as i16,
        };
        let hpc = CreatePseudoConsole(size, pty_input_read, pty_output_write, 0)
            .map_err(PtyError::ConsoleCreation)?;

        // The console now owns its pipe ends.
        let _ = CloseHandle(pty_input_read);
        let _ = CloseHandle(pty_output_write);

        // Attribute list binding the child to the pseudo console.
        let mut attr_list_size: usize = 0;
        let _ = InitializeProcThreadAttributeList(
            LPPROC_THREAD_ATTRIBUTE_LIST::default(),
            1,
            0,
            &mut attr_list_size,
        );
        let mut attr_list_buffer = vec![0u8; attr_list_size];
        let attr_list = LPPROC_THREAD_ATTRIBUTE_LIST(attr_list_buffer.as_mut_ptr() as *mut _);
        InitializeProcThreadAttributeList(attr_list, 1, 0, &mut attr_list_size)
            .map_err(PtyError::ProcessSpawn)?;

        const PROC_THREAD_ATTRIBUTE_PSEUDOCONSOLE: usize = 0x00020016;
        UpdateProcThreadAttribute(
            attr_list,
            0,
            PROC_THREAD_ATTRIBUTE_PSEUDOCONSOLE,
            Some(hpc.0 as *const _),
            std::mem::size_of::<HPCON>(),
            None,
            None,
        )
        .map_err(PtyError::ProcessSpawn)?;

        let mut startup_info = STARTUPINFOEXW {
            StartupInfo: std::mem::zeroed(),
            lpAttributeList: attr_list,
        };
        startup_info.StartupInfo.cb = std::mem::size_of::<STARTUPINFOEXW>() as u32;

        let mut cmd_wide = wide(&compose_command(command, codepage));
        let cwd_wide = working_dir.map(|dir| wide(&dir.to_string_lossy()));
        let cwd_ptr = cwd_wide
            .as_ref()
            .map(|w| PCWSTR(w.as_ptr()))
            .unwrap_or(PCWSTR::null());

        let mut process_info = PROCESS_INFORMATION::default();
        let spawned = CreateProcessW(
            PCWSTR::null(),
            PWSTR(cmd_wide.as_mut_ptr()),
            None,
            None,
            false,
            EXTENDED_STARTUPINFO_PRESENT,
            None,
            cwd_ptr,
            &startup_info.StartupInfo,
            &mut process_info,
        );

        DeleteProcThreadAttributeList(attr_list);

        if let Err(e) = spawned {
            ClosePseudoConsole(hpc);
            let _ = CloseHandle(pty_input_write);
            let _ = CloseHandle(pty_output_read);
            return Err(PtyError::ProcessSpawn(e));
        }

        Ok(ConPty {
            hpc,
            console_closed: AtomicBool::new(false),
            input_write: pty_input_write,
            output_read: pty_output_read,
            process: process_info,
        })
    }

    /// Propagate new dimensions to the pseudo console.
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let size = COORD {
            X: cols as i16,
            Y: rows as i16,
        };
        unsafe {
            ResizePseudoConsole(self.hpc, size).map_err(PtyError::Resize)?;
        }
        Ok(())
    }

    /// Write input bytes to the shell.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let mut written: u32 = 0;
        unsafe {
            WriteFile(self.input_write, Some(data), Some(&mut written), None)
                .map_err(|e| PtyError::Write(io::Error::from_raw_os_error(e.code().0 as i32)))?;
        }
        Ok(written as usize)
    }

    /// Non-blocking read of shell output. `Ok(0)` means the process is alive
    /// but has produced nothing yet.
    pub fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        let mut available: u32 = 0;
        unsafe {
            if PeekNamedPipe(self.output_read, None, 0, None, Some(&mut available), None).is_err() {
                // Pipe gone: the process exited or the console was closed.
                return Err(PtyError::Read(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "pipe closed",
                )));
            }
        }
        if available == 0 {
            return Ok(0);
        }

        let to_read = (available as usize).min(buffer.len());
        let mut read: u32 = 0;
        unsafe {
            ReadFile(
                self.output_read,
                Some(&mut buffer[..to_read]),
                Some(&mut read),
                None,
            )
            .map_err(|e| PtyError::Read(io::Error::from_raw_os_error(e.code().0 as i32)))?;
        }
        Ok(read as usize)
    }

    pub fn is_running(&self) -> bool {
        unsafe {
            // WAIT_OBJECT_0 (0) means the process handle is signaled.
            WaitForSingleObject(self.process.hProcess, 0).0 != 0
        }
    }

    /// Block up to `timeout` for the process to exit.
    pub fn wait_exit(&self, timeout: Duration) -> bool {
        let millis = timeout.as_millis().min(u32::MAX as u128) as u32;
        unsafe { WaitForSingleObject(self.process.hProcess, millis).0 == 0 }
    }

    pub fn exit_code(&self) -> Option<u32> {
        if self.is_running() {
            return None;
        }
        let mut exit_code: u32 = 0;
        unsafe {
            GetExitCodeProcess(self.process.hProcess, &mut exit_code)
                .is_ok()
                .then_some(exit_code)
        }
    }

    /// Ask the shell to go away. Graceful closes the pseudo console, which
    /// makes conhost tear down its client; `force` kills the process.
    pub fn terminate(&self, force: bool) {
        if force {
            unsafe {
                let _ = TerminateProcess(self.process.hProcess, 1);
            }
        } else {
            self.close_console();
        }
    }

    /// Cancel a pending read so the reader thread can observe its stop flag.
    pub fn cancel_read(&self) {
        unsafe {
            let _ = CancelIoEx(self.output_read, None);
        }
    }

    fn close_console(&self) {
        if !self.console_closed.swap(true, Ordering::SeqCst) {
            unsafe { ClosePseudoConsole(self.hpc) };
        }
    }
}

#[cfg(windows)]
impl Drop for ConPty {
    fn drop(&mut self) {
        self.close_console();
        unsafe {
            let _ = CloseHandle(self.input_write);
            let _ = CloseHandle(self.output_read);
            let _ = CloseHandle(self.process.hProcess);
            let _ = CloseHandle(self.process.hThread);
        }
    }
}

#[cfg(test)]
mod tests {
    #[cfg(windows)]
    use super::*;

    #[test]
    #[cfg(windows)]
    fn spawn_and_reap() {
        let pty = ConPty::spawn(Some("cmd.exe /c echo hello"), None, 80, 24, None)
            .expect("conpty spawn");
        assert!(pty.wait_exit(std::time::Duration::from_secs(10)));
        assert_eq!(pty.exit_code(), Some(0));
    }

    #[test]
    #[cfg(windows)]
    fn compose_wraps_codepage() {
        assert_eq!(compose_command(None, None), "cmd.exe");
        assert_eq!(
            compose_command(Some("cmd.exe"), Some(65001)),
            "cmd.exe /k \"chcp 65001 >nul\""
        );
        assert!(compose_command(Some("pwsh.exe"), Some(65001)).starts_with("pwsh.exe -NoExit"));
        assert_eq!(compose_command(Some("wsl.exe"), Some(65001)), "wsl.exe");
    }
}
